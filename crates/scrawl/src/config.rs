//! Server configuration.

use std::time::Duration;

use scrawl_lobby::LobbyConfig;
use scrawl_persistence::PersistenceMode;

use crate::ScrawlError;

/// Everything a server process needs to know at startup.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// TCP port for the WebSocket listener.
    pub port: u16,

    /// How lobbies are written to the store.
    pub persistence: PersistenceMode,

    /// Whether lobbies are replicated over the pub/sub bus.
    pub pubsub: bool,

    /// Host of the Redis instance backing the store and the bus.
    pub db_host: String,

    /// How often idle lobbies are looked for.
    pub sweep_interval: Duration,

    /// How long a follower waits for the hosting process to answer a join.
    pub join_timeout: Duration,

    pub lobby: LobbyConfig,
}

impl ServerConfig {
    /// Reads `PORT`, `PERSISTENCE_MODE`, `PUBSUB` and `DB_HOST`, falling
    /// back to the defaults for anything unset.
    pub fn from_env() -> Result<Self, ScrawlError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env), reading variables through
    /// `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ScrawlError> {
        let mut config = Self::default();

        if let Some(port) = lookup("PORT").filter(|v| !v.trim().is_empty()) {
            config.port = port
                .trim()
                .parse()
                .map_err(|_| ScrawlError::Config(format!("PORT is not a port number: {port}")))?;
        }
        if let Some(mode) = lookup("PERSISTENCE_MODE") {
            config.persistence = mode.parse()?;
        }
        if let Some(pubsub) = lookup("PUBSUB") {
            config.pubsub = matches!(
                pubsub.trim().to_ascii_lowercase().as_str(),
                "true" | "1" | "yes"
            );
        }
        if let Some(host) = lookup("DB_HOST").filter(|v| !v.trim().is_empty()) {
            config.db_host = host.trim().to_string();
        }

        if config.pubsub && !config.persistence.is_enabled() {
            tracing::warn!("PUBSUB without persistence: other processes cannot discover lobbies");
        }
        Ok(config)
    }

    /// Connection URL of the store and bus.
    pub fn redis_url(&self) -> String {
        format!("redis://{}:6379", self.db_host)
    }

    /// The address the listener binds to.
    pub fn bind_address(&self) -> String {
        format!("0.0.0.0:{}", self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            persistence: PersistenceMode::None,
            pubsub: false,
            db_host: "localhost".to_string(),
            sweep_interval: Duration::from_secs(10),
            join_timeout: Duration::from_secs(5),
            lobby: LobbyConfig::default(),
        }
    }
}
