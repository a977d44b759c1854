//! What travels on the bus.

use scrawl_lobby::{JoinTicket, LobbyError};
use scrawl_protocol::{Codec, JsonCodec, LobbyId, PlayerId};
use serde::{Deserialize, Serialize};

use crate::error::BusError;

/// The channel carrying player commands to the reference process.
pub fn inbound_channel(lobby: &LobbyId) -> String {
    format!("{lobby}-in")
}

/// The channel carrying frames from the lobby actor to the sockets.
pub fn outbound_channel(lobby: &LobbyId) -> String {
    format!("{lobby}-out")
}

/// Where the reference answers one join request.
pub fn join_reply_channel(lobby: &LobbyId, nonce: &str) -> String {
    format!("{lobby}-join-{nonce}")
}

/// What a [`BusFrame`] asks the receiving side to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameKind {
    /// Inbound: a raw player frame. Outbound: a frame to write.
    #[default]
    Event,
    /// Inbound: a socket opened. `Data` carries a [`ConnectInfo`].
    Connect,
    /// Inbound: a socket closed. `Data` carries the socket's token.
    Disconnect,
    /// Outbound: force-close the player's socket.
    Close,
    /// Inbound: a player asks for a seat. `Data` carries a
    /// [`JoinRequest`]; the `PlayerId` is empty.
    Join,
}

/// One bus message.
///
/// `Data` is the player frame as text. Frames without a `Kind` are
/// events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusFrame {
    #[serde(rename = "LobbyId")]
    pub lobby_id: LobbyId,
    #[serde(rename = "PlayerId")]
    pub player_id: PlayerId,
    #[serde(rename = "Data", default)]
    pub data: String,
    #[serde(rename = "Kind", default)]
    pub kind: FrameKind,
}

impl BusFrame {
    pub fn event(lobby_id: LobbyId, player_id: PlayerId, data: impl Into<String>) -> Self {
        Self {
            lobby_id,
            player_id,
            data: data.into(),
            kind: FrameKind::Event,
        }
    }

    /// A frame without payload.
    pub fn signal(lobby_id: LobbyId, player_id: PlayerId, kind: FrameKind) -> Self {
        Self {
            lobby_id,
            player_id,
            data: String::new(),
            kind,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, BusError> {
        Ok(JsonCodec.encode(self)?)
    }

    pub fn decode(raw: &[u8]) -> Result<Self, BusError> {
        Ok(JsonCodec.decode(raw)?)
    }
}

/// A seat request forwarded by a process that does not host the lobby.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinRequest {
    pub name: String,
    pub address: String,
    /// Channel the reference publishes the [`JoinReply`] on.
    pub reply: String,
}

/// The reference's answer to a [`JoinRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum JoinReply {
    Joined {
        #[serde(rename = "playerId")]
        player_id: PlayerId,
        session: String,
    },
    Full,
    IpLimit { address: String },
    Unavailable,
}

impl JoinReply {
    pub fn from_result(result: &Result<JoinTicket, LobbyError>) -> Self {
        match result {
            Ok(ticket) => Self::Joined {
                player_id: ticket.player_id.clone(),
                session: ticket.session.clone(),
            },
            Err(LobbyError::Full(_)) => Self::Full,
            Err(LobbyError::IpLimit(address)) => Self::IpLimit {
                address: address.clone(),
            },
            Err(_) => Self::Unavailable,
        }
    }

    pub fn into_result(self, lobby: &LobbyId) -> Result<JoinTicket, LobbyError> {
        match self {
            Self::Joined { player_id, session } => Ok(JoinTicket { player_id, session }),
            Self::Full => Err(LobbyError::Full(lobby.clone())),
            Self::IpLimit { address } => Err(LobbyError::IpLimit(address)),
            Self::Unavailable => Err(LobbyError::Unavailable(lobby.clone())),
        }
    }
}

/// Who connected, sent with a `connect` frame so the reference can
/// create the player if it was admitted by a follower.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConnectInfo {
    pub name: String,
    pub session: String,
    #[serde(default)]
    pub address: String,
    /// The socket's slot token on the process holding it.
    #[serde(default)]
    pub token: u64,
}

impl ConnectInfo {
    /// Reads the info from a connect frame. Older frames carry the bare
    /// name instead of a JSON object.
    pub fn parse(data: &str) -> Self {
        JsonCodec.decode(data.as_bytes()).unwrap_or_else(|_| Self {
            name: data.to_string(),
            ..Self::default()
        })
    }

    pub fn to_data(&self) -> Result<String, BusError> {
        Ok(JsonCodec.encode_text(self)?)
    }
}
