//! The persistence strategy handed to every lobby actor.

use std::sync::Arc;

use scrawl_lobby::{Lobby, LobbyConfig, LobbyDocument, LobbyError, Persister};
use scrawl_protocol::LobbyId;
use tracing::{debug, warn};

use crate::codec::{decode_document, encode_document};
use crate::error::PersistenceError;
use crate::mode::PersistenceMode;
use crate::store::LobbyStore;

/// A mode and a store, fixed at startup.
///
/// Cheap to clone. The server builds one and shares it with every
/// lobby it spawns; nothing changes the mode afterwards.
pub struct Persistence<S> {
    mode: PersistenceMode,
    store: Arc<S>,
}

impl<S> Clone for Persistence<S> {
    fn clone(&self) -> Self {
        Self {
            mode: self.mode,
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: LobbyStore> Persistence<S> {
    pub fn new(mode: PersistenceMode, store: Arc<S>) -> Self {
        Self { mode, store }
    }

    pub fn mode(&self) -> PersistenceMode {
        self.mode
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Writes the document according to the mode.
    pub async fn save(&self, doc: &LobbyDocument) -> Result<(), PersistenceError> {
        match self.mode {
            PersistenceMode::None => Ok(()),
            PersistenceMode::Basic => {
                let text = encode_document(doc)?;
                self.store
                    .save(&LobbyId::from(doc.lobby_id.as_str()), text)
                    .await?;
                debug!(lobby_id = %doc.lobby_id, "lobby saved");
                Ok(())
            }
            PersistenceMode::Events => Err(PersistenceError::Unsupported(self.mode)),
        }
    }

    /// Removes a lobby's document.
    pub async fn delete(&self, id: &LobbyId) -> Result<(), PersistenceError> {
        if !self.mode.is_enabled() {
            return Ok(());
        }
        self.store.delete(id).await
    }

    /// The stored document of a lobby, if there is one.
    pub async fn load_document(&self, id: &LobbyId) -> Result<Option<LobbyDocument>, PersistenceError> {
        if !self.mode.is_enabled() {
            return Ok(None);
        }
        match self.store.load(id).await? {
            Some(raw) => Ok(Some(decode_document(&raw)?)),
            None => Ok(None),
        }
    }

    /// Rebuilds one stored lobby.
    pub async fn load(
        &self,
        id: &LobbyId,
        config: LobbyConfig,
        now: i64,
    ) -> Result<Lobby, PersistenceError> {
        let doc = self
            .load_document(id)
            .await?
            .ok_or_else(|| PersistenceError::NotFound(id.clone()))?;
        Ok(Lobby::from_document(doc, config, now)?)
    }

    /// Rebuilds every stored lobby. Documents that fail to load are
    /// logged and skipped.
    pub async fn load_all(&self, config: &LobbyConfig, now: i64) -> Result<Vec<Lobby>, PersistenceError> {
        if !self.mode.is_enabled() {
            return Ok(Vec::new());
        }
        let mut lobbies = Vec::new();
        for id in self.store.list().await? {
            match self.load(&id, config.clone(), now).await {
                Ok(lobby) => lobbies.push(lobby),
                Err(e) => warn!(lobby_id = %id, error = %e, "skipping unreadable stored lobby"),
            }
        }
        Ok(lobbies)
    }
}

impl<S: LobbyStore> Persister for Persistence<S> {
    async fn persist(&self, doc: LobbyDocument) -> Result<(), LobbyError> {
        Ok(self.save(&doc).await?)
    }

    async fn remove(&self, id: &LobbyId) -> Result<(), LobbyError> {
        Ok(self.delete(id).await?)
    }
}
