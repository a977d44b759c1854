//! Lobby engine for Scrawl.
//!
//! Each lobby runs as an isolated Tokio task (actor model) that owns the
//! game state; connections, the round timer and bus listeners talk to it
//! through a [`LobbyHandle`].
//!
//! # Key types
//!
//! - [`Lobby`]: the state machine: turns, hints, guesses, scoring
//! - [`LobbyActor`] / [`LobbyHandle`]: the single-consumer command queue
//!   around a lobby
//! - [`ClientEvent`] / [`ServerEvent`]: what players send and receive
//! - [`LobbyDocument`]: the stored form of a lobby
//! - [`ConnectionTable`] / [`SessionIndex`]: local sockets and sessions
//! - [`LobbySettings`] / [`LobbyConfig`]: owner settings and engine knobs

mod actor;
mod config;
mod connections;
mod document;
mod error;
mod events;
mod lobby;
mod player;
pub mod scoring;
pub mod words;

pub use actor::{
    ActorContext, Clock, Dispatch, LobbyActor, LobbyHandle, ManualClock, NoPersistence,
    Persister, SystemClock,
};
pub use config::{LobbyConfig, LobbySettings, LobbyState, ScoreRules};
pub use connections::{ConnectionTable, Outbound, SessionIndex};
pub use document::{LobbyDocument, PlayerDocument};
pub use error::LobbyError;
pub use events::{
    ChatMessage, ClientEvent, GameOver, KickVote, NameChange, NextTurn, OwnerChange, Ready,
    ServerEvent, WordChosen,
};
pub use lobby::{JoinTicket, Lobby, LobbyInfo, Outgoing};
pub use player::{Player, PlayerState, PlayerView};
pub use words::{WordFolder, WordPack};
