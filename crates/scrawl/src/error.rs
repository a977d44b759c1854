//! Unified error type for the Scrawl server.

use scrawl_lobby::LobbyError;
use scrawl_persistence::PersistenceError;
use scrawl_protocol::{LobbyId, ProtocolError};
use scrawl_replication::BusError;
use scrawl_transport::TransportError;

/// Top-level error that wraps every layer's error.
///
/// The `#[from]` attribute on each variant generates the `From` impl, so
/// `?` converts layer errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum ScrawlError {
    /// A transport-level error (bind, upgrade, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A lobby-level error (full, unknown session, bad settings).
    #[error(transparent)]
    Lobby(#[from] LobbyError),

    /// The lobby store failed.
    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    /// The pub/sub bus failed.
    #[error(transparent)]
    Bus(#[from] BusError),

    /// No lobby with this id exists here or in the store.
    #[error("lobby {0} does not exist")]
    NotFound(LobbyId),

    /// The configuration could not be read.
    #[error("invalid configuration: {0}")]
    Config(String),
}
