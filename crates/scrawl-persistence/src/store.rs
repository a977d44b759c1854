//! Where lobby documents are kept.
//!
//! A store only moves opaque text under lobby keys; encoding is the
//! codec's job and deciding when to write is the strategy's.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};

use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use scrawl_protocol::LobbyId;
use tracing::info;

use crate::error::PersistenceError;

/// Prefix of every lobby key in the store.
pub const KEY_PREFIX: &str = "scrawl:lobby:";

/// The store key of a lobby.
pub fn lobby_key(id: &LobbyId) -> String {
    format!("{KEY_PREFIX}{id}")
}

/// A key-value home for lobby documents.
pub trait LobbyStore: Send + Sync + 'static {
    fn save(
        &self,
        id: &LobbyId,
        document: String,
    ) -> impl Future<Output = Result<(), PersistenceError>> + Send;

    fn load(
        &self,
        id: &LobbyId,
    ) -> impl Future<Output = Result<Option<String>, PersistenceError>> + Send;

    /// Ids of every stored lobby.
    fn list(&self) -> impl Future<Output = Result<Vec<LobbyId>, PersistenceError>> + Send;

    fn delete(&self, id: &LobbyId) -> impl Future<Output = Result<(), PersistenceError>> + Send;
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

/// A process-local store. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    documents: Arc<RwLock<BTreeMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The raw text stored for a lobby, if any.
    pub fn get(&self, id: &LobbyId) -> Option<String> {
        self.documents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&lobby_key(id))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.documents.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl LobbyStore for MemoryStore {
    async fn save(&self, id: &LobbyId, document: String) -> Result<(), PersistenceError> {
        self.documents
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(lobby_key(id), document);
        Ok(())
    }

    async fn load(&self, id: &LobbyId) -> Result<Option<String>, PersistenceError> {
        Ok(self.get(id))
    }

    async fn list(&self) -> Result<Vec<LobbyId>, PersistenceError> {
        Ok(self
            .documents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .filter_map(|key| key.strip_prefix(KEY_PREFIX))
            .map(LobbyId::from)
            .collect())
    }

    async fn delete(&self, id: &LobbyId) -> Result<(), PersistenceError> {
        self.documents
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&lobby_key(id));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Redis
// ---------------------------------------------------------------------------

/// A store backed by Redis strings.
///
/// Holds one multiplexed connection; every call works on a clone of it,
/// so concurrent actors share the same socket without locking.
#[derive(Clone)]
pub struct RedisStore {
    conn: MultiplexedConnection,
}

impl RedisStore {
    /// Connects to `url`, e.g. `redis://db:6379`.
    pub async fn connect(url: &str) -> Result<Self, PersistenceError> {
        let client = redis::Client::open(url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        info!(url = %url, "connected to lobby store");
        Ok(Self { conn })
    }

    /// Wraps an already open connection.
    pub fn from_connection(conn: MultiplexedConnection) -> Self {
        Self { conn }
    }
}

impl LobbyStore for RedisStore {
    async fn save(&self, id: &LobbyId, document: String) -> Result<(), PersistenceError> {
        let mut conn = self.conn.clone();
        let _: () = conn.set(lobby_key(id), document).await?;
        Ok(())
    }

    async fn load(&self, id: &LobbyId) -> Result<Option<String>, PersistenceError> {
        let mut conn = self.conn.clone();
        Ok(conn.get(lobby_key(id)).await?)
    }

    async fn list(&self) -> Result<Vec<LobbyId>, PersistenceError> {
        let mut conn = self.conn.clone();
        let keys: Vec<String> = conn.keys(format!("{KEY_PREFIX}*")).await?;
        Ok(keys
            .iter()
            .filter_map(|key| key.strip_prefix(KEY_PREFIX))
            .map(LobbyId::from)
            .collect())
    }

    async fn delete(&self, id: &LobbyId) -> Result<(), PersistenceError> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(lobby_key(id)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lobby_key_is_namespaced() {
        assert_eq!(lobby_key(&LobbyId::from("abc")), "scrawl:lobby:abc");
    }

    #[tokio::test]
    async fn test_memory_store_save_list_delete() {
        let store = MemoryStore::new();
        let id = LobbyId::from("one");
        store.save(&id, "{}".into()).await.unwrap();
        store.save(&LobbyId::from("two"), "{}".into()).await.unwrap();

        assert_eq!(store.load(&id).await.unwrap().as_deref(), Some("{}"));
        let mut ids = store.list().await.unwrap();
        ids.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(ids, vec![LobbyId::from("one"), LobbyId::from("two")]);

        store.delete(&id).await.unwrap();
        assert!(store.load(&id).await.unwrap().is_none());
        assert_eq!(store.len(), 1);
    }
}
