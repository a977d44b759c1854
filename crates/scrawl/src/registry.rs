//! The lobbies this process knows about.
//!
//! A process is the *reference* for the lobbies it created (or restored
//! from the store): it runs their actors. With replication on, it can
//! also *follow* lobbies hosted elsewhere, keeping only the sessions and
//! sockets of players who connected through it and relaying their
//! commands over the bus.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use scrawl_lobby::{
    ActorContext, Clock, ConnectionTable, Dispatch, JoinTicket, Lobby, LobbyActor, LobbyDocument,
    LobbyError, LobbyHandle, LobbyInfo, LobbySettings, LobbyState, SessionIndex, SystemClock,
    WordPack,
};
use scrawl_persistence::Persistence;
use scrawl_protocol::{LobbyId, NoTrace, PlayerId, TraceProvider};
use scrawl_replication::{
    BusDispatch, BusIngress, ConnectInfo, Publisher, request_join, spawn_inbound, spawn_outbound,
};
use scrawl_transport::{Rejection, UpgradeGate, UpgradeRequest};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::backend::{BusBackend, StoreBackend};
use crate::{ScrawlError, ServerConfig};

/// Name of the cookie carrying a player's session token.
pub const SESSION_COOKIE: &str = "usersession";

/// Logical size of the drawing board. Clients scale to their viewport.
pub const DRAWING_BOARD_BASE_WIDTH: u32 = 1600;
pub const DRAWING_BOARD_BASE_HEIGHT: u32 = 900;

// ---------------------------------------------------------------------------
// Requests and responses
// ---------------------------------------------------------------------------

/// Everything needed to open a lobby.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateLobbyRequest {
    /// The creator's display name.
    pub username: String,
    /// Word pack name, e.g. `english`.
    pub language: String,
    pub settings: LobbySettings,
    pub custom_words: Vec<String>,
    /// A requested lobby id. A fresh one is generated when absent.
    pub lobby_id: Option<String>,
}

impl Default for CreateLobbyRequest {
    fn default() -> Self {
        Self {
            username: String::new(),
            language: WordPack::default().name().to_string(),
            settings: LobbySettings::default(),
            custom_words: Vec::new(),
            lobby_id: None,
        }
    }
}

impl CreateLobbyRequest {
    /// Splits a comma separated word list as entered in the lobby form.
    pub fn parse_custom_words(raw: &str) -> Vec<String> {
        raw.split(',')
            .map(str::trim)
            .filter(|word| !word.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// What a client needs to render a freshly created lobby.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LobbyDescriptor {
    pub lobby_id: LobbyId,
    pub drawing_board_base_width: u32,
    pub drawing_board_base_height: u32,
    pub settings: LobbySettings,
}

impl LobbyDescriptor {
    fn new(lobby_id: LobbyId, settings: LobbySettings) -> Self {
        Self {
            lobby_id,
            drawing_board_base_width: DRAWING_BOARD_BASE_WIDTH,
            drawing_board_base_height: DRAWING_BOARD_BASE_HEIGHT,
            settings,
        }
    }
}

/// A created lobby and its creator's credentials.
#[derive(Debug, Clone)]
pub struct CreatedLobby {
    pub descriptor: LobbyDescriptor,
    /// The creator's player id and session; the session goes into the
    /// [`SESSION_COOKIE`].
    pub ticket: JoinTicket,
}

/// One row of the public lobby listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LobbyListing {
    pub lobby_id: LobbyId,
    pub player_count: usize,
    pub max_players: usize,
    pub round: u32,
    pub rounds: u32,
    pub state: LobbyState,
    pub wordpack: String,
}

impl From<LobbyInfo> for LobbyListing {
    fn from(info: LobbyInfo) -> Self {
        Self {
            lobby_id: info.id,
            player_count: info.player_count,
            max_players: info.max_players,
            round: info.round,
            rounds: info.rounds,
            state: info.state,
            wordpack: info.word_pack.name().to_string(),
        }
    }
}

/// A socket the gate let through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admitted {
    pub lobby: LobbyId,
    pub player: PlayerId,
    pub session: String,
    pub address: String,
}

// ---------------------------------------------------------------------------
// Ingress
// ---------------------------------------------------------------------------

/// Where a connection's commands go.
#[derive(Clone)]
pub enum Ingress {
    /// Straight into the actor on this process.
    Local(LobbyHandle),
    /// Onto the lobby's inbound channel, for the reference to apply.
    Bus(BusIngress),
}

impl Ingress {
    /// Announces the socket described by `info`, whose `token` names the
    /// socket in later disconnects.
    pub async fn connect(&self, player: PlayerId, info: &ConnectInfo) -> Result<(), ScrawlError> {
        match self {
            Self::Local(handle) => Ok(handle.connect(player, info.token).await?),
            Self::Bus(ingress) => Ok(ingress.connect(player, info)?),
        }
    }

    pub async fn disconnect(&self, player: PlayerId, socket: u64) -> Result<(), ScrawlError> {
        match self {
            Self::Local(handle) => Ok(handle.disconnect(player, socket).await?),
            Self::Bus(ingress) => Ok(ingress.disconnect(player, socket)?),
        }
    }

    pub async fn event(&self, player: PlayerId, raw: Vec<u8>) -> Result<(), ScrawlError> {
        match self {
            Self::Local(handle) => Ok(handle.send_event(player, raw).await?),
            Self::Bus(ingress) => Ok(ingress.event(player, &raw)?),
        }
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

struct Replication {
    bus: Arc<BusBackend>,
    publisher: Publisher,
}

struct LobbyEntry {
    /// Present on the reference only.
    handle: Option<LobbyHandle>,
    /// Present whenever replication is on.
    ingress: Option<BusIngress>,
    /// Display names of the players known here, for connect frames.
    names: Mutex<HashMap<PlayerId, String>>,
    /// Stops the bus listeners.
    shutdown: watch::Sender<bool>,
}

impl LobbyEntry {
    fn remember(&self, player: &PlayerId, name: &str) {
        self.names
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(player.clone(), name.to_string());
    }

    fn name_of(&self, player: &PlayerId) -> String {
        self.names
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(player)
            .cloned()
            .unwrap_or_default()
    }

    fn players(&self) -> Vec<PlayerId> {
        self.names
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    fn ingress(&self) -> Option<Ingress> {
        match (&self.ingress, &self.handle) {
            (Some(ingress), _) => Some(Ingress::Bus(ingress.clone())),
            (None, Some(handle)) => Some(Ingress::Local(handle.clone())),
            (None, None) => None,
        }
    }
}

/// The process-wide lobby map plus everything lobbies share: the session
/// index, the local socket table, the store and the bus.
pub struct LobbyRegistry {
    config: ServerConfig,
    lobbies: RwLock<HashMap<LobbyId, Arc<LobbyEntry>>>,
    sessions: SessionIndex,
    connections: ConnectionTable,
    persistence: Persistence<StoreBackend>,
    replication: Option<Replication>,
    clock: Arc<dyn Clock>,
    trace: Arc<dyn TraceProvider>,
}

impl LobbyRegistry {
    /// Creates an empty registry. With `bus`, lobbies are replicated and
    /// a publisher task is started.
    pub fn new(config: ServerConfig, store: StoreBackend, bus: Option<BusBackend>) -> Self {
        let persistence = Persistence::new(config.persistence, Arc::new(store));
        let replication = bus.map(|bus| {
            let bus = Arc::new(bus);
            Replication {
                publisher: Publisher::spawn(Arc::clone(&bus)),
                bus,
            }
        });
        Self {
            config,
            lobbies: RwLock::new(HashMap::new()),
            sessions: SessionIndex::new(),
            connections: ConnectionTable::new(),
            persistence,
            replication,
            clock: Arc::new(SystemClock),
            trace: Arc::new(NoTrace),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn connections(&self) -> &ConnectionTable {
        &self.connections
    }

    pub fn sessions(&self) -> &SessionIndex {
        &self.sessions
    }

    pub fn is_replicated(&self) -> bool {
        self.replication.is_some()
    }

    /// Number of lobbies known to this process.
    pub fn len(&self) -> usize {
        self.lobbies.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: &LobbyId) -> bool {
        self.lobbies
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(id)
    }

    /// The actor of a lobby this process hosts.
    pub fn handle(&self, id: &LobbyId) -> Option<LobbyHandle> {
        self.entry(id).and_then(|entry| entry.handle.clone())
    }

    /// Where a connection to this lobby sends its commands.
    pub fn ingress(&self, id: &LobbyId) -> Option<Ingress> {
        self.entry(id).and_then(|entry| entry.ingress())
    }

    /// What a socket holding slot `token` announces when it connects.
    pub fn connect_info(&self, admitted: &Admitted, token: u64) -> ConnectInfo {
        let name = self
            .entry(&admitted.lobby)
            .map(|entry| entry.name_of(&admitted.player))
            .unwrap_or_default();
        ConnectInfo {
            name,
            session: admitted.session.clone(),
            address: admitted.address.clone(),
            token,
        }
    }

    fn entry(&self, id: &LobbyId) -> Option<Arc<LobbyEntry>> {
        self.lobbies
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    fn now(&self) -> i64 {
        self.clock.now_ms()
    }

    // -- creation -----------------------------------------------------------

    /// Opens a lobby with its creator as the first player and owner.
    pub async fn create_lobby(
        &self,
        request: CreateLobbyRequest,
        address: &str,
    ) -> Result<CreatedLobby, ScrawlError> {
        let word_pack = WordPack::from_name(&request.language).ok_or_else(|| {
            LobbyError::InvalidSettings(format!("unknown language {:?}", request.language))
        })?;

        let requested = request
            .lobby_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty());
        let id = match requested {
            Some(custom) => {
                let id = LobbyId::from(custom);
                if self.contains(&id) || self.persistence.load_document(&id).await?.is_some() {
                    return Err(LobbyError::AlreadyExists(id).into());
                }
                id
            }
            None => LobbyId::generate(),
        };

        let mut lobby = Lobby::new(
            id.clone(),
            request.settings,
            word_pack,
            request.custom_words,
            self.config.lobby.clone(),
            self.now(),
        )?;
        let ticket = lobby.join(&request.username, address)?;
        let settings = lobby.settings().clone();

        let handle = self.start_reference(lobby).await?;
        if let Err(e) = handle.persist().await {
            warn!(lobby_id = %id, error = %e, "could not store new lobby");
        }

        info!(lobby_id = %id, player_id = %ticket.player_id, public = settings.public, "lobby created");
        Ok(CreatedLobby {
            descriptor: LobbyDescriptor::new(id, settings),
            ticket,
        })
    }

    /// Spawns the actor (and, when replicated, the bus listeners) of a
    /// lobby this process hosts.
    async fn start_reference(&self, lobby: Lobby) -> Result<LobbyHandle, ScrawlError> {
        let id = lobby.id().clone();
        let names = lobby
            .players()
            .iter()
            .map(|player| (player.id.clone(), player.name.clone()))
            .collect();

        let dispatch: Arc<dyn Dispatch> = match &self.replication {
            Some(replication) => Arc::new(BusDispatch::new(id.clone(), replication.publisher.clone())),
            None => Arc::new(self.connections.clone()),
        };
        let handle = LobbyActor::spawn(
            lobby,
            ActorContext {
                persister: Arc::new(self.persistence.clone()),
                dispatch,
                sessions: self.sessions.clone(),
                trace: Arc::clone(&self.trace),
                clock: Arc::clone(&self.clock),
                timer: true,
            },
        );

        let (shutdown, shutdown_rx) = watch::channel(false);
        let ingress = match &self.replication {
            Some(replication) => {
                let listening = async {
                    spawn_inbound(Arc::clone(&replication.bus), handle.clone(), shutdown_rx.clone())
                        .await?;
                    spawn_outbound(
                        Arc::clone(&replication.bus),
                        id.clone(),
                        self.connections.clone(),
                        shutdown_rx,
                    )
                    .await
                };
                if let Err(e) = listening.await {
                    let _ = shutdown.send(true);
                    let _ = handle.shutdown(false).await;
                    return Err(e.into());
                }
                Some(BusIngress::new(id.clone(), replication.publisher.clone()))
            }
            None => None,
        };

        let entry = LobbyEntry {
            handle: Some(handle.clone()),
            ingress,
            names: Mutex::new(names),
            shutdown,
        };
        if let Err(e) = self.install(id, entry) {
            let _ = handle.shutdown(false).await;
            return Err(e.into());
        }
        Ok(handle)
    }

    /// Starts following a lobby hosted by another process.
    async fn start_follower(&self, doc: LobbyDocument) -> Result<(), ScrawlError> {
        let Some(replication) = &self.replication else {
            return Err(ScrawlError::NotFound(LobbyId(doc.lobby_id)));
        };
        let id = LobbyId(doc.lobby_id.clone());
        let mut names = HashMap::new();
        for player in doc.players.iter().flatten() {
            let player_id = PlayerId(player.id.clone());
            self.sessions
                .insert(player.user_session.clone(), id.clone(), player_id.clone());
            names.insert(player_id, player.name.clone());
        }

        let (shutdown, shutdown_rx) = watch::channel(false);
        spawn_outbound(
            Arc::clone(&replication.bus),
            id.clone(),
            self.connections.clone(),
            shutdown_rx,
        )
        .await?;

        let entry = LobbyEntry {
            handle: None,
            ingress: Some(BusIngress::new(id.clone(), replication.publisher.clone())),
            names: Mutex::new(names),
            shutdown,
        };
        match self.install(id.clone(), entry) {
            Ok(()) => info!(lobby_id = %id, "following lobby"),
            // Someone else started following first; theirs is as good.
            Err(_) => debug!(lobby_id = %id, "lobby already followed"),
        }
        Ok(())
    }

    fn install(&self, id: LobbyId, entry: LobbyEntry) -> Result<(), LobbyError> {
        let mut lobbies = self.lobbies.write().unwrap_or_else(PoisonError::into_inner);
        if lobbies.contains_key(&id) {
            let _ = entry.shutdown.send(true);
            return Err(LobbyError::AlreadyExists(id));
        }
        lobbies.insert(id, Arc::new(entry));
        Ok(())
    }

    /// Makes sure the lobby is known here, following it from the store if
    /// another process hosts it.
    async fn ensure_known(&self, id: &LobbyId) -> Result<Arc<LobbyEntry>, ScrawlError> {
        if let Some(entry) = self.entry(id) {
            return Ok(entry);
        }
        if self.replication.is_some() {
            if let Some(doc) = self.persistence.load_document(id).await? {
                self.start_follower(doc).await?;
            }
        }
        self.entry(id).ok_or_else(|| ScrawlError::NotFound(id.clone()))
    }

    /// Re-reads the sessions of a followed lobby from the store, picking
    /// up players who joined through other processes.
    async fn refresh_sessions(&self, id: &LobbyId, entry: &LobbyEntry) -> Result<(), ScrawlError> {
        if let Some(doc) = self.persistence.load_document(id).await? {
            for player in doc.players.iter().flatten() {
                let player_id = PlayerId(player.id.clone());
                self.sessions
                    .insert(player.user_session.clone(), id.clone(), player_id.clone());
                entry.remember(&player_id, &player.name);
            }
        }
        Ok(())
    }

    /// Restores every stored lobby as hosted by this process.
    ///
    /// With replication on nothing is restored: stored lobbies belong to
    /// whichever process created them and are followed on demand.
    pub async fn restore(&self) -> Result<usize, ScrawlError> {
        if self.replication.is_some() {
            return Ok(0);
        }
        let lobbies = self
            .persistence
            .load_all(&self.config.lobby, self.now())
            .await?;
        let mut restored = 0;
        for lobby in lobbies {
            let id = lobby.id().clone();
            match self.start_reference(lobby).await {
                Ok(_) => {
                    info!(lobby_id = %id, "lobby restored");
                    restored += 1;
                }
                Err(e) => warn!(lobby_id = %id, error = %e, "could not restore lobby"),
            }
        }
        Ok(restored)
    }

    // -- players ------------------------------------------------------------

    /// Adds a player to a lobby, or re-attaches them if `session` already
    /// belongs to one of its players.
    pub async fn join_lobby(
        &self,
        id: &LobbyId,
        name: &str,
        address: &str,
        session: Option<&str>,
    ) -> Result<JoinTicket, ScrawlError> {
        let entry = self.ensure_known(id).await?;

        if let Some(session) = session {
            if entry.handle.is_none() && self.sessions.lookup(session).is_none() {
                self.refresh_sessions(id, &entry).await?;
            }
            if let Some((lobby, player)) = self.sessions.lookup(session) {
                if lobby == *id {
                    return self.rejoin(&entry, player, session, address).await;
                }
            }
        }

        let ticket = match (&entry.handle, &self.replication) {
            (Some(handle), _) => handle.join(name, address).await?,
            (None, Some(replication)) => {
                let reply = request_join(
                    &*replication.bus,
                    id,
                    name,
                    address,
                    self.config.join_timeout,
                )
                .await?;
                let ticket = reply.into_result(id)?;
                self.sessions
                    .insert(ticket.session.clone(), id.clone(), ticket.player_id.clone());
                ticket
            }
            (None, None) => return Err(ScrawlError::NotFound(id.clone())),
        };
        entry.remember(&ticket.player_id, name);
        debug!(lobby_id = %id, player_id = %ticket.player_id, "player joined");
        Ok(ticket)
    }

    async fn rejoin(
        &self,
        entry: &LobbyEntry,
        player: PlayerId,
        session: &str,
        address: &str,
    ) -> Result<JoinTicket, ScrawlError> {
        let player_id = match &entry.handle {
            Some(handle) => handle.rejoin(session, address).await?,
            None if self.connections.contains(&player) => {
                return Err(LobbyError::AlreadyOpen(player).into());
            }
            None => player,
        };
        Ok(JoinTicket {
            player_id,
            session: session.to_string(),
        })
    }

    /// Removes the session's player from a hosted lobby for good.
    pub async fn leave(&self, id: &LobbyId, session: &str) -> Result<(), ScrawlError> {
        let (handle, player) = self.hosted_player(id, session)?;
        handle.leave(player).await?;
        Ok(())
    }

    /// Applies the owner's settings to a hosted lobby.
    pub async fn edit_settings(
        &self,
        id: &LobbyId,
        session: &str,
        settings: LobbySettings,
    ) -> Result<(), ScrawlError> {
        let (handle, player) = self.hosted_player(id, session)?;
        handle.edit_settings(player, settings).await?;
        Ok(())
    }

    fn hosted_player(&self, id: &LobbyId, session: &str) -> Result<(LobbyHandle, PlayerId), ScrawlError> {
        let handle = self.handle(id).ok_or_else(|| ScrawlError::NotFound(id.clone()))?;
        match self.sessions.lookup(session) {
            Some((lobby, player)) if lobby == *id => Ok((handle, player)),
            _ => Err(LobbyError::UnknownSession.into()),
        }
    }

    // -- queries ------------------------------------------------------------

    /// A summary of a lobby, hosted here or (when replicated) elsewhere.
    pub async fn info(&self, id: &LobbyId) -> Result<LobbyInfo, ScrawlError> {
        if let Some(handle) = self.handle(id) {
            return Ok(handle.info().await?);
        }
        if self.replication.is_some() {
            if let Some(doc) = self.persistence.load_document(id).await? {
                let lobby = Lobby::from_document(doc, self.config.lobby.clone(), self.now())?;
                return Ok(lobby.info());
            }
        }
        Err(ScrawlError::NotFound(id.clone()))
    }

    /// Public lobbies, ordered by id.
    pub async fn list_public(&self) -> Vec<LobbyListing> {
        let mut listings = Vec::new();
        let mut seen = HashSet::new();

        for handle in self.hosted() {
            match handle.info().await {
                Ok(info) => {
                    seen.insert(info.id.clone());
                    if info.public {
                        listings.push(info.into());
                    }
                }
                Err(e) => debug!(lobby_id = %handle.id(), error = %e, "lobby vanished while listing"),
            }
        }

        if self.replication.is_some() {
            match self.persistence.load_all(&self.config.lobby, self.now()).await {
                Ok(lobbies) => listings.extend(
                    lobbies
                        .iter()
                        .filter(|lobby| !seen.contains(lobby.id()))
                        .map(Lobby::info)
                        .filter(|info| info.public)
                        .map(LobbyListing::from),
                ),
                Err(e) => warn!(error = %e, "could not list stored lobbies"),
            }
        }

        listings.sort_by(|a, b| a.lobby_id.cmp(&b.lobby_id));
        listings
    }

    fn hosted(&self) -> Vec<LobbyHandle> {
        self.lobbies
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter_map(|entry| entry.handle.clone())
            .collect()
    }

    // -- teardown -----------------------------------------------------------

    /// Tears a lobby down: stops its actor and listeners, closes its
    /// sockets on this process and removes its stored document.
    ///
    /// Returns `false` if the lobby was not known here.
    pub async fn delete(&self, id: &LobbyId) -> bool {
        let removed = self
            .lobbies
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
        let Some(entry) = removed else {
            return false;
        };

        if let Some(handle) = &entry.handle {
            if let Err(e) = handle.shutdown(true).await {
                debug!(lobby_id = %id, error = %e, "lobby already stopped");
            }
        }
        let _ = entry.shutdown.send(true);
        for player in entry.players() {
            self.connections.close(&player);
        }
        self.sessions.remove_lobby(id);
        info!(lobby_id = %id, "lobby removed");
        true
    }

    /// Removes hosted lobbies that have had nobody connected for longer
    /// than the eviction grace, and stops following lobbies whose stored
    /// document is gone. Returns how many lobbies were dropped.
    pub async fn evict_idle(&self) -> usize {
        let grace = i64::try_from(self.config.lobby.empty_lobby_grace.as_millis()).unwrap_or(i64::MAX);
        let now = self.now();
        let entries: Vec<(LobbyId, Arc<LobbyEntry>)> = self
            .lobbies
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(id, entry)| (id.clone(), Arc::clone(entry)))
            .collect();

        let mut evicted = 0;
        for (id, entry) in entries {
            let idle = match &entry.handle {
                Some(handle) => match handle.info().await {
                    Ok(info) => info.empty_since.is_some_and(|since| now - since >= grace),
                    Err(_) => true,
                },
                None => matches!(self.persistence.load_document(&id).await, Ok(None)),
            };
            if idle && self.delete(&id).await {
                info!(lobby_id = %id, "idle lobby evicted");
                evicted += 1;
            }
        }
        evicted
    }
}

// ---------------------------------------------------------------------------
// Upgrade gate
// ---------------------------------------------------------------------------

/// Extracts the lobby id from `/v1/lobby/{id}/ws`, allowing a root path
/// in front.
pub fn lobby_from_path(path: &str) -> Option<LobbyId> {
    let rest = path.trim_end_matches('/').strip_suffix("/ws")?;
    let (prefix, id) = rest.rsplit_once('/')?;
    if id.is_empty() || !prefix.ends_with("/v1/lobby") {
        return None;
    }
    Some(LobbyId::from(id))
}

impl LobbyRegistry {
    /// Follows the requested lobby and reloads its sessions when the
    /// upgrade would otherwise be refused for lack of them here.
    async fn prepare_upgrade(&self, request: &UpgradeRequest) {
        if self.replication.is_none() {
            return;
        }
        let Some(lobby) = lobby_from_path(&request.path) else {
            return;
        };
        let Some(session) = request.cookie(SESSION_COOKIE).filter(|s| !s.is_empty()) else {
            return;
        };
        if matches!(self.sessions.lookup(session), Some((known, _)) if known == lobby) {
            return;
        }
        let entry = match self.ensure_known(&lobby).await {
            Ok(entry) => entry,
            Err(e) => {
                debug!(lobby_id = %lobby, error = %e, "upgrade for a lobby not found anywhere");
                return;
            }
        };
        if entry.handle.is_none() {
            if let Err(e) = self.refresh_sessions(&lobby, &entry).await {
                warn!(lobby_id = %lobby, error = %e, "could not reload sessions for upgrade");
            }
        }
    }
}

impl UpgradeGate for LobbyRegistry {
    type Admission = Admitted;

    async fn prepare(&self, request: &UpgradeRequest) {
        self.prepare_upgrade(request).await;
    }

    fn admit(&self, request: &UpgradeRequest) -> Result<Admitted, Rejection> {
        let lobby = lobby_from_path(&request.path)
            .ok_or_else(|| Rejection::not_found("no such endpoint"))?;
        let session = request
            .cookie(SESSION_COOKIE)
            .filter(|session| !session.is_empty())
            .ok_or_else(|| Rejection::unauthorized("session cookie missing"))?;
        if !self.contains(&lobby) {
            return Err(Rejection::not_found(format!("lobby {lobby} does not exist")));
        }
        let player = match self.sessions.lookup(session) {
            Some((owner, player)) if owner == lobby => player,
            _ => return Err(Rejection::unauthorized("session not recognized")),
        };
        if self.connections.contains(&player) {
            return Err(Rejection::unauthorized("session already has an open connection"));
        }
        Ok(Admitted {
            lobby,
            player,
            session: session.to_string(),
            address: request.remote_addr.clone(),
        })
    }
}
