//! Error types for the lobby layer.

use scrawl_protocol::{LobbyId, PlayerId, ProtocolError};

/// Errors raised by lobby operations.
///
/// None of these take the lobby down: the actor replies with the error
/// (or logs it for fire-and-forget commands) and keeps serving.
#[derive(Debug, thiserror::Error)]
pub enum LobbyError {
    /// Every seat is taken.
    #[error("lobby {0} is full")]
    Full(LobbyId),

    /// Too many players already joined from this address.
    #[error("too many clients from address {0}")]
    IpLimit(String),

    /// The session already has an open socket in this lobby.
    #[error("player {0} already has an open connection")]
    AlreadyOpen(PlayerId),

    /// The player is not in this lobby.
    #[error("player {0} not in lobby")]
    UnknownPlayer(PlayerId),

    /// No player in this lobby holds the session token.
    #[error("unknown session")]
    UnknownSession,

    /// A custom lobby id is already taken.
    #[error("lobby {0} already exists")]
    AlreadyExists(LobbyId),

    /// Only the owner may do this.
    #[error("player {0} is not the lobby owner")]
    NotOwner(PlayerId),

    /// Only the drawer may do this.
    #[error("player {0} is not the drawer")]
    NotDrawer(PlayerId),

    /// Fewer than two connected players.
    #[error("at least two connected players are needed to start")]
    NotEnoughPlayers,

    /// The lobby is in a state that does not allow this operation.
    #[error("invalid lobby state for this operation: {0}")]
    InvalidState(String),

    /// A setting is out of bounds.
    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    /// The event decoded but its content is unusable (bad word index,
    /// vote for an unknown player, ...).
    #[error("invalid event: {0}")]
    InvalidEvent(String),

    /// Decoding or encoding a message failed.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The persistence backend failed. The in-memory lobby is unaffected.
    #[error("persistence failed: {0}")]
    Persistence(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The actor is gone or its queue is closed.
    #[error("lobby {0} is unavailable")]
    Unavailable(LobbyId),
}
