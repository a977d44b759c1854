//! The store and bus a server runs on, chosen at startup.

use scrawl_persistence::{LobbyStore, MemoryStore, PersistenceError, RedisStore};
use scrawl_protocol::LobbyId;
use scrawl_replication::{Bus, BusError, MemoryBus, RedisBus, Subscription};

/// Where lobby documents live.
#[derive(Clone)]
pub enum StoreBackend {
    Memory(MemoryStore),
    Redis(RedisStore),
}

impl LobbyStore for StoreBackend {
    async fn save(&self, id: &LobbyId, document: String) -> Result<(), PersistenceError> {
        match self {
            Self::Memory(store) => store.save(id, document).await,
            Self::Redis(store) => store.save(id, document).await,
        }
    }

    async fn load(&self, id: &LobbyId) -> Result<Option<String>, PersistenceError> {
        match self {
            Self::Memory(store) => store.load(id).await,
            Self::Redis(store) => store.load(id).await,
        }
    }

    async fn list(&self) -> Result<Vec<LobbyId>, PersistenceError> {
        match self {
            Self::Memory(store) => store.list().await,
            Self::Redis(store) => store.list().await,
        }
    }

    async fn delete(&self, id: &LobbyId) -> Result<(), PersistenceError> {
        match self {
            Self::Memory(store) => store.delete(id).await,
            Self::Redis(store) => store.delete(id).await,
        }
    }
}

/// The pub/sub bus lobbies are replicated over.
#[derive(Clone)]
pub enum BusBackend {
    Memory(MemoryBus),
    Redis(RedisBus),
}

impl Bus for BusBackend {
    async fn publish(&self, channel: &str, payload: Vec<u8>) -> Result<(), BusError> {
        match self {
            Self::Memory(bus) => bus.publish(channel, payload).await,
            Self::Redis(bus) => bus.publish(channel, payload).await,
        }
    }

    async fn subscribe(&self, channel: &str) -> Result<Subscription, BusError> {
        match self {
            Self::Memory(bus) => bus.subscribe(channel).await,
            Self::Redis(bus) => bus.subscribe(channel).await,
        }
    }
}
