//! Local socket bookkeeping shared between the lobby actor and the
//! connection handlers.
//!
//! The actor decides *what* to send and pushes frames onto per-player
//! queues without blocking; each connection's writer task drains its queue
//! and does the actual I/O under that connection's write guard. Both maps
//! here are synchronous because the actor and the upgrade gate only ever
//! hold them for a lookup.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use scrawl_protocol::{LobbyId, PlayerId};
use tokio::sync::mpsc;

use crate::actor::Dispatch;

/// What a connection's writer task is asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Write one text frame.
    Frame(String),
    /// Close the socket.
    Close,
}

struct Entry {
    token: u64,
    sender: mpsc::UnboundedSender<Outbound>,
}

/// The sockets open on this process, keyed by player.
///
/// Cheap to clone; all clones share one table. Each registration gets a
/// token so a handler that lost its slot to a newer socket cannot remove
/// the newer one on its way out. Tokens start at a random offset, so those
/// handed out by different processes do not collide on the lobby actor.
#[derive(Clone)]
pub struct ConnectionTable {
    entries: Arc<RwLock<HashMap<PlayerId, Entry>>>,
    next_token: Arc<AtomicU64>,
}

impl Default for ConnectionTable {
    fn default() -> Self {
        Self {
            entries: Arc::default(),
            next_token: Arc::new(AtomicU64::new(rand::random::<u64>() >> 1)),
        }
    }
}

impl ConnectionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a fresh outbound queue to `player`, closing any previous one.
    pub fn register(&self, player: PlayerId) -> (u64, mpsc::UnboundedReceiver<Outbound>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let previous = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(player, Entry { token, sender });
        if let Some(previous) = previous {
            let _ = previous.sender.send(Outbound::Close);
        }
        (token, receiver)
    }

    /// Removes the player's queue if it is still the one registered under
    /// `token`.
    pub fn unregister(&self, player: &PlayerId, token: u64) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        match entries.get(player) {
            Some(entry) if entry.token == token => {
                entries.remove(player);
                true
            }
            _ => false,
        }
    }

    /// Queues a frame for the player. Returns `false` if they have no
    /// socket here.
    pub fn send(&self, player: &PlayerId, frame: &str) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(player)
            .is_some_and(|entry| entry.sender.send(Outbound::Frame(frame.to_string())).is_ok())
    }

    /// Asks the player's writer to close the socket and forgets it.
    pub fn close(&self, player: &PlayerId) -> bool {
        let removed = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(player);
        match removed {
            Some(entry) => {
                let _ = entry.sender.send(Outbound::Close);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, player: &PlayerId) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(player)
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Dispatch for ConnectionTable {
    fn deliver(&self, player: &PlayerId, frame: &str) {
        self.send(player, frame);
    }

    fn close(&self, player: &PlayerId) {
        ConnectionTable::close(self, player);
    }
}

/// Maps session tokens to the lobby and player they identify.
///
/// The upgrade gate consults this on every WebSocket request, so it is
/// process-wide and synchronous.
#[derive(Clone, Default)]
pub struct SessionIndex {
    sessions: Arc<RwLock<HashMap<String, (LobbyId, PlayerId)>>>,
}

impl SessionIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, session: impl Into<String>, lobby: LobbyId, player: PlayerId) {
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(session.into(), (lobby, player));
    }

    pub fn lookup(&self, session: &str) -> Option<(LobbyId, PlayerId)> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(session)
            .cloned()
    }

    pub fn remove(&self, session: &str) -> Option<(LobbyId, PlayerId)> {
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(session)
    }

    /// Drops every session of a lobby.
    pub fn remove_lobby(&self, lobby: &LobbyId) {
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|_, (owner, _)| owner != lobby);
    }
}
