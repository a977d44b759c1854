use scrawl_lobby::LobbyError;
use scrawl_protocol::{LobbyId, ProtocolError};

use crate::mode::PersistenceMode;

/// Errors that can occur while storing or loading lobbies.
///
/// None of these are fatal to the process. The actor logs a failed
/// write and keeps serving the lobby from memory.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    /// The configured mode has no write path.
    #[error("persistence mode {0} is not supported")]
    Unsupported(PersistenceMode),

    /// The mode string is not one of `NONE`, `BASIC`, `EVENTS`.
    #[error("unknown persistence mode: {0}")]
    UnknownMode(String),

    /// A document failed to encode or decode.
    #[error(transparent)]
    Codec(#[from] ProtocolError),

    /// A decoded document does not describe a valid lobby.
    #[error(transparent)]
    Lobby(#[from] LobbyError),

    /// The backing store failed.
    #[error("store error: {0}")]
    Store(#[from] redis::RedisError),

    #[error("lobby {0} not found in store")]
    NotFound(LobbyId),
}

impl From<PersistenceError> for LobbyError {
    fn from(e: PersistenceError) -> Self {
        match e {
            PersistenceError::Lobby(inner) => inner,
            other => LobbyError::Persistence(Box::new(other)),
        }
    }
}
