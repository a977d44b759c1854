//! # Scrawl
//!
//! A multiplayer draw-and-guess lobby server.
//!
//! One player draws a secret word while the others race to guess it in
//! chat. Every lobby runs as its own actor; connections reach it over
//! WebSockets, optionally through a Redis pub/sub bus when several
//! processes share lobbies, and its state can be written to Redis after
//! every change.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use scrawl::prelude::*;
//!
//! # async fn start() -> Result<(), ScrawlError> {
//! let server = ScrawlServer::builder()
//!     .bind("0.0.0.0:8080")
//!     .config(ServerConfig::from_env()?)
//!     .build()
//!     .await?;
//! server.run().await
//! # }
//! ```

mod backend;
mod config;
mod error;
mod handler;
mod registry;
mod server;

pub use backend::{BusBackend, StoreBackend};
pub use config::ServerConfig;
pub use error::ScrawlError;
pub use registry::{
    Admitted, CreateLobbyRequest, CreatedLobby, DRAWING_BOARD_BASE_HEIGHT,
    DRAWING_BOARD_BASE_WIDTH, Ingress, LobbyDescriptor, LobbyListing, LobbyRegistry,
    SESSION_COOKIE, lobby_from_path,
};
pub use server::{ScrawlServer, ScrawlServerBuilder};

/// Everything needed to run a server and drive its lobbies.
pub mod prelude {
    pub use crate::{
        BusBackend, CreateLobbyRequest, CreatedLobby, LobbyDescriptor, LobbyListing,
        LobbyRegistry, SESSION_COOKIE, ScrawlError, ScrawlServer, ScrawlServerBuilder,
        ServerConfig, StoreBackend,
    };
    pub use scrawl_lobby::{JoinTicket, LobbyConfig, LobbyInfo, LobbySettings, LobbyState};
    pub use scrawl_persistence::{MemoryStore, PersistenceMode};
    pub use scrawl_protocol::{LobbyId, PlayerId};
    pub use scrawl_replication::MemoryBus;
}
