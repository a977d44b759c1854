//! Players and their per-turn state.

use std::collections::BTreeSet;

use scrawl_protocol::{PlayerId, generate_token};
use serde::{Deserialize, Serialize};

/// What a player is doing in the current turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerState {
    /// Still trying to guess the word.
    Guessing,
    /// The drawer of the current turn.
    Drawing,
    /// Already guessed, or no turn is running.
    Standby,
}

impl PlayerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Guessing => "guessing",
            Self::Drawing => "drawing",
            Self::Standby => "standby",
        }
    }

    /// Parses a document tag; anything unknown reads as `Standby`.
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "guessing" => Self::Guessing,
            "drawing" => Self::Drawing,
            _ => Self::Standby,
        }
    }
}

/// A member of a lobby.
///
/// The session token is the player's secret; it is never part of any
/// outbound event. Everything else here is public.
#[derive(Debug, Clone, PartialEq)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub(crate) session: String,
    pub last_known_address: String,
    /// `true` while a socket is bound to this player.
    pub connected: bool,
    /// Unix ms of the last disconnect; `Some` while inside the reconnect
    /// window.
    pub disconnect_time: Option<i64>,
    pub score: u32,
    /// Points earned in the most recent turn.
    pub last_score: u32,
    pub rank: u32,
    /// Ids of the players who voted to kick this player.
    pub votes_for_kick: BTreeSet<PlayerId>,
    pub state: PlayerState,
}

impl Player {
    /// A fresh, not yet connected player with a new id and session.
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self::with_id(PlayerId::generate(), name, address)
    }

    /// A fresh player with a known id (replicated placeholders).
    pub fn with_id(id: PlayerId, name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            session: generate_token(),
            last_known_address: address.into(),
            connected: false,
            disconnect_time: None,
            score: 0,
            last_score: 0,
            rank: 0,
            votes_for_kick: BTreeSet::new(),
            state: PlayerState::Standby,
        }
    }

    /// The session token that proves this player's identity.
    pub fn session(&self) -> &str {
        &self.session
    }

    /// The public view sent in `update-players` and friends.
    pub fn view(&self) -> PlayerView {
        PlayerView {
            id: self.id.clone(),
            name: self.name.clone(),
            score: self.score,
            connected: self.connected,
            last_score: self.last_score,
            rank: self.rank,
            state: self.state,
        }
    }
}

/// The public part of a [`Player`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerView {
    pub id: PlayerId,
    pub name: String,
    pub score: u32,
    pub connected: bool,
    pub last_score: u32,
    pub rank: u32,
    pub state: PlayerState,
}
