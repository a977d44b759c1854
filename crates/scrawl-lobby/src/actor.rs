//! The lobby actor: an isolated Tokio task that owns one [`Lobby`].
//!
//! Every mutation reaches the lobby as a command on a single mpsc queue,
//! so connections, the round timer and bus listeners can all feed the
//! same lobby concurrently and the result is as if one thread had applied
//! their commands in queue order. The actor only decides what to send;
//! delivery goes through a [`Dispatch`] that never blocks.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use scrawl_protocol::{LobbyId, PlayerId, Recipient, TraceProvider};
use scrawl_tick::{RoundTimer, TimerConfig};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

use crate::config::LobbySettings;
use crate::connections::SessionIndex;
use crate::document::LobbyDocument;
use crate::error::LobbyError;
use crate::events::{ClientEvent, ServerEvent};
use crate::lobby::{JoinTicket, Lobby, LobbyInfo, Outgoing};

// ---------------------------------------------------------------------------
// Seams
// ---------------------------------------------------------------------------

/// Delivers encoded frames to players.
///
/// Implementations must not block: the actor calls these while it holds
/// the lobby. Locally that means pushing onto a connection's outbound
/// queue; with replication it means handing the frame to the bus
/// publisher.
pub trait Dispatch: Send + Sync + 'static {
    fn deliver(&self, player: &PlayerId, frame: &str);

    /// Force-closes the player's socket, wherever it is.
    fn close(&self, player: &PlayerId);
}

/// Writes lobby documents somewhere durable.
pub trait Persister: Send + Sync + 'static {
    fn persist(&self, doc: LobbyDocument) -> impl Future<Output = Result<(), LobbyError>> + Send;

    fn remove(&self, id: &LobbyId) -> impl Future<Output = Result<(), LobbyError>> + Send;
}

/// Keeps nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPersistence;

impl Persister for NoPersistence {
    async fn persist(&self, _doc: LobbyDocument) -> Result<(), LobbyError> {
        Ok(())
    }

    async fn remove(&self, _id: &LobbyId) -> Result<(), LobbyError> {
        Ok(())
    }
}

/// Wall-clock source in Unix milliseconds.
pub trait Clock: Send + Sync + 'static {
    fn now_ms(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or_default()
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Clone, Default)]
pub struct ManualClock(Arc<AtomicI64>);

impl ManualClock {
    pub fn new(start: i64) -> Self {
        Self(Arc::new(AtomicI64::new(start)))
    }

    pub fn set(&self, now: i64) {
        self.0.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, ms: i64) {
        self.0.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// Everything an actor needs besides the lobby itself.
pub struct ActorContext<P> {
    pub persister: Arc<P>,
    pub dispatch: Arc<dyn Dispatch>,
    pub sessions: SessionIndex,
    pub trace: Arc<dyn TraceProvider>,
    pub clock: Arc<dyn Clock>,
    /// Whether to run a round timer. Tests drive ticks by hand.
    pub timer: bool,
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

pub(crate) enum LobbyCommand {
    Join {
        name: String,
        address: String,
        reply: oneshot::Sender<Result<JoinTicket, LobbyError>>,
    },
    Rejoin {
        session: String,
        address: String,
        reply: oneshot::Sender<Result<PlayerId, LobbyError>>,
    },
    AttachRemote {
        player: PlayerId,
        name: String,
        session: String,
        address: String,
        reply: oneshot::Sender<Result<(), LobbyError>>,
    },
    Connect {
        player: PlayerId,
        socket: u64,
        reply: Option<oneshot::Sender<Result<(), LobbyError>>>,
    },
    Disconnect {
        player: PlayerId,
        socket: u64,
    },
    Event {
        player: PlayerId,
        raw: Vec<u8>,
    },
    Leave {
        player: PlayerId,
        reply: oneshot::Sender<Result<(), LobbyError>>,
    },
    EditSettings {
        player: PlayerId,
        settings: LobbySettings,
        reply: oneshot::Sender<Result<(), LobbyError>>,
    },
    Tick,
    Info {
        reply: oneshot::Sender<LobbyInfo>,
    },
    Snapshot {
        reply: oneshot::Sender<LobbyDocument>,
    },
    Persist {
        reply: oneshot::Sender<Result<(), LobbyError>>,
    },
    Shutdown {
        purge: bool,
        reply: oneshot::Sender<()>,
    },
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Handle to a running lobby actor.
///
/// Cheap to clone; the registry, every connection handler and the bus
/// listeners each hold one.
#[derive(Clone)]
pub struct LobbyHandle {
    id: LobbyId,
    sender: mpsc::Sender<LobbyCommand>,
}

impl LobbyHandle {
    pub fn id(&self) -> &LobbyId {
        &self.id
    }

    /// Returns `true` once the actor has stopped.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    async fn send(&self, command: LobbyCommand) -> Result<(), LobbyError> {
        self.sender
            .send(command)
            .await
            .map_err(|_| LobbyError::Unavailable(self.id.clone()))
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> LobbyCommand,
    ) -> Result<T, LobbyError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(build(reply_tx)).await?;
        reply_rx
            .await
            .map_err(|_| LobbyError::Unavailable(self.id.clone()))
    }

    /// Adds a new player and returns their id and session.
    pub async fn join(&self, name: &str, address: &str) -> Result<JoinTicket, LobbyError> {
        self.request(|reply| LobbyCommand::Join {
            name: name.to_string(),
            address: address.to_string(),
            reply,
        })
        .await?
    }

    /// Re-attaches a known session.
    pub async fn rejoin(&self, session: &str, address: &str) -> Result<PlayerId, LobbyError> {
        self.request(|reply| LobbyCommand::Rejoin {
            session: session.to_string(),
            address: address.to_string(),
            reply,
        })
        .await?
    }

    /// Makes sure a player connecting through another process exists
    /// here. A player the lobby has no seat for is refused and their
    /// socket is closed.
    pub async fn attach_remote(
        &self,
        player: PlayerId,
        name: &str,
        session: &str,
        address: &str,
    ) -> Result<(), LobbyError> {
        self.request(|reply| LobbyCommand::AttachRemote {
            player,
            name: name.to_string(),
            session: session.to_string(),
            address: address.to_string(),
            reply,
        })
        .await?
    }

    /// Marks the player connected through `socket` and sends them `ready`.
    pub async fn connect(&self, player: PlayerId, socket: u64) -> Result<(), LobbyError> {
        self.request(|reply| LobbyCommand::Connect {
            player,
            socket,
            reply: Some(reply),
        })
        .await?
    }

    /// Connects without waiting for the outcome.
    pub async fn notify_connect(&self, player: PlayerId, socket: u64) -> Result<(), LobbyError> {
        self.send(LobbyCommand::Connect {
            player,
            socket,
            reply: None,
        })
        .await
    }

    /// Reports that `socket` closed. Ignored if the player has connected
    /// through a newer socket since.
    pub async fn disconnect(&self, player: PlayerId, socket: u64) -> Result<(), LobbyError> {
        self.send(LobbyCommand::Disconnect { player, socket }).await
    }

    /// Hands a raw inbound frame to the lobby (fire-and-forget).
    pub async fn send_event(&self, player: PlayerId, raw: Vec<u8>) -> Result<(), LobbyError> {
        self.send(LobbyCommand::Event { player, raw }).await
    }

    pub async fn leave(&self, player: PlayerId) -> Result<(), LobbyError> {
        self.request(|reply| LobbyCommand::Leave { player, reply })
            .await?
    }

    pub async fn edit_settings(
        &self,
        player: PlayerId,
        settings: LobbySettings,
    ) -> Result<(), LobbyError> {
        self.request(|reply| LobbyCommand::EditSettings {
            player,
            settings,
            reply,
        })
        .await?
    }

    /// Advances the lobby clock once, as the round timer does.
    pub async fn tick(&self) -> Result<(), LobbyError> {
        self.send(LobbyCommand::Tick).await
    }

    pub async fn info(&self) -> Result<LobbyInfo, LobbyError> {
        self.request(|reply| LobbyCommand::Info { reply }).await
    }

    /// The lobby's full state as a document.
    pub async fn snapshot(&self) -> Result<LobbyDocument, LobbyError> {
        self.request(|reply| LobbyCommand::Snapshot { reply }).await
    }

    /// Writes the document now and reports the outcome.
    pub async fn persist(&self) -> Result<(), LobbyError> {
        self.request(|reply| LobbyCommand::Persist { reply }).await?
    }

    /// Stops the actor. With `purge`, the stored document is removed too.
    pub async fn shutdown(&self, purge: bool) -> Result<(), LobbyError> {
        self.request(|reply| LobbyCommand::Shutdown { purge, reply })
            .await
    }
}

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

/// The task that owns a lobby.
pub struct LobbyActor<P: Persister> {
    lobby: Lobby,
    ctx: ActorContext<P>,
    receiver: mpsc::Receiver<LobbyCommand>,
    /// The socket each connected player last connected through.
    sockets: HashMap<PlayerId, u64>,
}

impl<P: Persister> LobbyActor<P> {
    /// Spawns the actor (and its round timer) and returns a handle.
    pub fn spawn(lobby: Lobby, ctx: ActorContext<P>) -> LobbyHandle {
        let config = lobby.config().clone();
        let id = lobby.id().clone();
        let (tx, rx) = mpsc::channel(config.command_buffer.max(1));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        for player in lobby.players() {
            ctx.sessions
                .insert(player.session(), id.clone(), player.id.clone());
        }

        if ctx.timer {
            RoundTimer::new(TimerConfig::every(config.tick_interval), shutdown_rx).spawn(
                id.clone(),
                tx.clone(),
                |_| LobbyCommand::Tick,
            );
        }

        let actor = LobbyActor {
            lobby,
            ctx,
            receiver: rx,
            sockets: HashMap::new(),
        };
        tokio::spawn(actor.run(shutdown_tx));

        LobbyHandle { id, sender: tx }
    }

    async fn run(mut self, shutdown: watch::Sender<bool>) {
        info!(lobby_id = %self.lobby.id(), "lobby actor started");

        while let Some(command) = self.receiver.recv().await {
            match command {
                LobbyCommand::Join {
                    name,
                    address,
                    reply,
                } => {
                    let result = self.lobby.join(&name, &address);
                    if let Ok(ticket) = &result {
                        self.ctx.sessions.insert(
                            ticket.session.clone(),
                            self.lobby.id().clone(),
                            ticket.player_id.clone(),
                        );
                        self.persist().await;
                    }
                    let _ = reply.send(result);
                }
                LobbyCommand::Rejoin {
                    session,
                    address,
                    reply,
                } => {
                    let result = self.lobby.rejoin(&session, &address);
                    let _ = reply.send(result);
                }
                LobbyCommand::AttachRemote {
                    player,
                    name,
                    session,
                    address,
                    reply,
                } => {
                    let attached = self
                        .lobby
                        .attach_remote(player.clone(), &name, &session, &address);
                    let result = match attached {
                        Ok(attached) => {
                            if attached {
                                if let Some(attached) = self.lobby.player(&player) {
                                    self.ctx.sessions.insert(
                                        attached.session(),
                                        self.lobby.id().clone(),
                                        player,
                                    );
                                }
                                self.persist().await;
                            }
                            Ok(())
                        }
                        Err(e) => {
                            warn!(lobby_id = %self.lobby.id(), player_id = %player, error = %e, "remote player refused");
                            self.ctx.dispatch.close(&player);
                            Err(e)
                        }
                    };
                    let _ = reply.send(result);
                }
                LobbyCommand::Connect {
                    player,
                    socket,
                    reply,
                } => {
                    let now = self.ctx.clock.now_ms();
                    let result = self.lobby.connect(&player, now).map(|out| self.dispatch(out));
                    match &result {
                        Ok(()) => {
                            self.sockets.insert(player.clone(), socket);
                            self.persist().await;
                        }
                        Err(e) => {
                            warn!(lobby_id = %self.lobby.id(), player_id = %player, error = %e, "connect rejected");
                        }
                    }
                    if let Some(reply) = reply {
                        let _ = reply.send(result);
                    }
                }
                LobbyCommand::Disconnect { player, socket } => {
                    if self.sockets.get(&player) != Some(&socket) {
                        debug!(lobby_id = %self.lobby.id(), player_id = %player, socket, "ignoring disconnect of a replaced socket");
                        continue;
                    }
                    self.sockets.remove(&player);
                    let now = self.ctx.clock.now_ms();
                    let out = self.lobby.disconnect(&player, now);
                    if !out.is_empty() {
                        self.dispatch(out);
                        self.persist().await;
                    }
                }
                LobbyCommand::Event { player, raw } => {
                    self.handle_event(player, &raw).await;
                }
                LobbyCommand::Leave { player, reply } => {
                    let now = self.ctx.clock.now_ms();
                    let result = self.lobby.leave(&player, now).map(|out| self.dispatch(out));
                    if result.is_ok() {
                        self.persist().await;
                    }
                    let _ = reply.send(result);
                }
                LobbyCommand::EditSettings {
                    player,
                    settings,
                    reply,
                } => {
                    let result = self
                        .lobby
                        .edit_settings(&player, settings)
                        .map(|out| self.dispatch(out));
                    if result.is_ok() {
                        self.persist().await;
                    }
                    let _ = reply.send(result);
                }
                LobbyCommand::Tick => {
                    let now = self.ctx.clock.now_ms();
                    let lobby = &self.lobby;
                    self.sockets.retain(|player, _| lobby.player(player).is_some());
                    let out = self.lobby.tick(now);
                    if !out.is_empty() {
                        self.dispatch(out);
                        self.persist().await;
                    }
                }
                LobbyCommand::Info { reply } => {
                    let _ = reply.send(self.lobby.info());
                }
                LobbyCommand::Snapshot { reply } => {
                    let _ = reply.send(self.lobby.to_document());
                }
                LobbyCommand::Persist { reply } => {
                    let result = self.ctx.persister.persist(self.lobby.to_document()).await;
                    let _ = reply.send(result);
                }
                LobbyCommand::Shutdown { purge, reply } => {
                    info!(lobby_id = %self.lobby.id(), purge, "lobby shutting down");
                    for player in self.lobby.connected_players() {
                        self.ctx.dispatch.close(player);
                    }
                    self.ctx.sessions.remove_lobby(self.lobby.id());
                    if purge {
                        if let Err(e) = self.ctx.persister.remove(self.lobby.id()).await {
                            error!(lobby_id = %self.lobby.id(), error = %e, "failed to remove stored lobby");
                        }
                    }
                    let _ = reply.send(());
                    break;
                }
            }
        }

        let _ = shutdown.send(true);
        info!(lobby_id = %self.lobby.id(), "lobby actor stopped");
    }

    async fn handle_event(&mut self, player: PlayerId, raw: &[u8]) {
        let event = match ClientEvent::decode(raw) {
            Ok(event) => event,
            Err(e) => {
                debug!(lobby_id = %self.lobby.id(), player_id = %player, error = %e, "undecodable event");
                self.reply_error(&player, format!("invalid message: {e}"));
                return;
            }
        };

        let now = self.ctx.clock.now_ms();
        let mutates = !matches!(event, ClientEvent::KeepAlive);
        match self.lobby.handle_event(&player, event, now) {
            Ok(out) => {
                self.dispatch(out);
                if mutates {
                    self.persist().await;
                }
            }
            Err(e) => {
                warn!(lobby_id = %self.lobby.id(), player_id = %player, error = %e, "event rejected");
                self.reply_error(&player, e.to_string());
            }
        }
    }

    fn reply_error(&self, player: &PlayerId, message: String) {
        self.dispatch(vec![Outgoing::Event {
            to: Recipient::Player(player.clone()),
            event: ServerEvent::SystemMessage(message),
        }]);
    }

    /// Encodes each event once and hands it to every connected recipient.
    fn dispatch(&self, out: Vec<Outgoing>) {
        if out.is_empty() {
            return;
        }
        let trace = self.ctx.trace.current();
        for item in out {
            match item {
                Outgoing::Event { to, event } => {
                    let frame = match event.encode(&trace) {
                        Ok(frame) => frame,
                        Err(e) => {
                            error!(lobby_id = %self.lobby.id(), kind = event.kind(), error = %e, "failed to encode event");
                            continue;
                        }
                    };
                    for player in self.lobby.connected_players().filter(|p| to.includes(p)) {
                        self.ctx.dispatch.deliver(player, &frame);
                    }
                }
                Outgoing::Removed { player, session } => {
                    self.ctx.dispatch.close(&player);
                    self.ctx.sessions.remove(&session);
                }
            }
        }
    }

    /// Write-through after a mutation. Failures are logged; the lobby
    /// keeps running on its in-memory state.
    async fn persist(&self) {
        if let Err(e) = self.ctx.persister.persist(self.lobby.to_document()).await {
            error!(lobby_id = %self.lobby.id(), error = %e, "failed to persist lobby");
        }
    }
}
