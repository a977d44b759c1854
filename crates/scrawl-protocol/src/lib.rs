//! Wire protocol for Scrawl.
//!
//! This crate defines what travels between browsers and the server, and
//! between server processes on the bus:
//!
//! - **Types** ([`GameEvent`], [`LobbyId`], [`PlayerId`], [`Recipient`]):
//!   the message envelope and the identifiers it refers to.
//! - **Drawing** ([`DrawingPrimitive`], [`WordHint`]): payloads that are
//!   stored and relayed without interpretation.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how those messages are
//!   converted to/from bytes.
//! - **Tracing stamp** ([`TraceProvider`]): the opaque trace/span ids
//!   attached to every outgoing envelope.
//! - **Errors** ([`ProtocolError`]).
//!
//! The protocol layer knows nothing about lobbies or connections. It only
//! knows how to name things and how to (de)serialize them.
//!
//! ```text
//! Transport (frames) → Protocol (GameEvent) → Lobby (ClientEvent / ServerEvent)
//! ```

mod codec;
mod drawing;
mod error;
mod types;

pub use codec::{Codec, JsonCodec};
pub use drawing::{DrawingPrimitive, Fill, Line, RgbColor, WordHint};
pub use error::ProtocolError;
pub use types::{
    GameEvent, LobbyId, NoTrace, PlayerId, Recipient, TraceContext,
    TraceProvider, generate_token,
};
