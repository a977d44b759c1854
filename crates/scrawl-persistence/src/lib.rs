//! # scrawl-persistence
//!
//! Keeps lobbies in an external store so they outlive a process and can
//! be picked up by another one.
//!
//! What gets written is decided once, at startup, by a
//! [`PersistenceMode`]. The chosen mode and a [`LobbyStore`] are bundled
//! into a [`Persistence`] value that the lobby actors call after every
//! mutation through the `Persister` seam.
//!
//! ## Key types
//!
//! - [`PersistenceMode`]: `NONE`, `BASIC` or `EVENTS`
//! - [`LobbyStore`]: where documents live ([`MemoryStore`], [`RedisStore`])
//! - [`Persistence`]: mode + store, plugged into every lobby actor
//! - [`encode_document`] / [`decode_document`]: the canonical JSON form

mod codec;
mod error;
mod mode;
mod store;
mod strategy;

pub use codec::{decode_document, encode_document};
pub use error::PersistenceError;
pub use mode::PersistenceMode;
pub use store::{KEY_PREFIX, LobbyStore, MemoryStore, RedisStore, lobby_key};
pub use strategy::Persistence;
