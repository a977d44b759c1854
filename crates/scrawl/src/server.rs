//! `ScrawlServer` builder and server loop.
//!
//! This is the entry point for running a Scrawl process. It ties the
//! layers together: transport → registry → lobby actors, with the store
//! and the bus picked from the configuration.

use std::sync::Arc;
use std::time::Duration;

use scrawl_persistence::{MemoryStore, RedisStore};
use scrawl_replication::RedisBus;
use scrawl_transport::WebSocketTransport;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::backend::{BusBackend, StoreBackend};
use crate::handler::handle_connection;
use crate::registry::LobbyRegistry;
use crate::{ScrawlError, ServerConfig};

/// Builder for configuring and starting a Scrawl server.
///
/// # Example
///
/// ```rust,ignore
/// use scrawl::prelude::*;
///
/// let server = ScrawlServer::builder()
///     .config(ServerConfig::from_env()?)
///     .build()
///     .await?;
/// server.run().await
/// ```
pub struct ScrawlServerBuilder {
    bind_addr: Option<String>,
    config: ServerConfig,
    store: Option<StoreBackend>,
    bus: Option<BusBackend>,
}

impl ScrawlServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            bind_addr: None,
            config: ServerConfig::default(),
            store: None,
            bus: None,
        }
    }

    /// Sets the address to bind to. Defaults to `0.0.0.0:{port}`.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = Some(addr.to_string());
        self
    }

    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Uses `store` instead of the one the configuration implies.
    pub fn store(mut self, store: StoreBackend) -> Self {
        self.store = Some(store);
        self
    }

    /// Replicates lobbies over `bus`, whatever the configuration says.
    pub fn bus(mut self, bus: BusBackend) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Connects the store and bus, restores stored lobbies, and binds the
    /// listener.
    pub async fn build(self) -> Result<ScrawlServer, ScrawlError> {
        let url = self.config.redis_url();

        let store = match self.store {
            Some(store) => store,
            None if self.config.persistence.is_enabled() => {
                StoreBackend::Redis(RedisStore::connect(&url).await?)
            }
            None => StoreBackend::Memory(MemoryStore::new()),
        };
        let bus = match self.bus {
            Some(bus) => Some(bus),
            None if self.config.pubsub => Some(BusBackend::Redis(RedisBus::connect(&url).await?)),
            None => None,
        };

        let bind_addr = self
            .bind_addr
            .unwrap_or_else(|| self.config.bind_address());
        let registry = Arc::new(LobbyRegistry::new(self.config, store, bus));

        let restored = registry.restore().await?;
        if restored > 0 {
            tracing::info!(restored, "restored stored lobbies");
        }

        let transport = WebSocketTransport::bind(&bind_addr).await?;
        Ok(ScrawlServer {
            transport,
            registry,
        })
    }
}

impl Default for ScrawlServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A Scrawl server process.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct ScrawlServer {
    transport: WebSocketTransport,
    registry: Arc<LobbyRegistry>,
}

impl ScrawlServer {
    /// Creates a new builder.
    pub fn builder() -> ScrawlServerBuilder {
        ScrawlServerBuilder::new()
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// The lobbies of this process. Lobby creation, joining and listing
    /// go through here.
    pub fn registry(&self) -> &Arc<LobbyRegistry> {
        &self.registry
    }

    /// Runs the accept loop and the idle-lobby sweeper.
    ///
    /// Each accepted connection gets a handler task. A handler that fails
    /// or panics only takes its own connection down. Runs until the
    /// process is terminated.
    pub async fn run(self) -> Result<(), ScrawlError> {
        let config = self.registry.config();
        tracing::info!(
            persistence = %config.persistence,
            pubsub = self.registry.is_replicated(),
            "Scrawl server running"
        );
        let _sweeper = spawn_sweeper(Arc::clone(&self.registry));

        loop {
            match self.transport.accept().await {
                Ok(conn) => {
                    let registry = Arc::clone(&self.registry);
                    let handler = tokio::spawn(handle_connection(conn, registry));
                    tokio::spawn(async move {
                        match handler.await {
                            Ok(Ok(())) => {}
                            Ok(Err(e)) => {
                                tracing::debug!(error = %e, "connection ended with error");
                            }
                            Err(e) if e.is_panic() => {
                                tracing::error!(error = %e, "connection handler panicked");
                            }
                            Err(_) => {}
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}

/// Evicts idle lobbies every `sweep_interval`.
fn spawn_sweeper(registry: Arc<LobbyRegistry>) -> JoinHandle<()> {
    let period = registry.config().sweep_interval.max(Duration::from_millis(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            let evicted = registry.evict_idle().await;
            if evicted > 0 {
                tracing::debug!(evicted, "idle sweep finished");
            }
        }
    })
}
