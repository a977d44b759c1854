//! The lobby state machine.
//!
//! [`Lobby`] is plain data plus pure transitions: every operation takes
//! the current time in Unix milliseconds and returns the events it wants
//! sent as a list of [`Outgoing`] items. It never touches a socket or a
//! clock, so the actor can serialize calls into it and the tests can
//! drive it deterministically.

use rand::rngs::StdRng;
use rand::seq::{IndexedRandom, SliceRandom};
use rand::{Rng, SeedableRng};
use scrawl_protocol::{DrawingPrimitive, LobbyId, PlayerId, Recipient, WordHint};
use tracing::{debug, info};

use crate::config::{LobbyConfig, LobbySettings, LobbyState};
use crate::error::LobbyError;
use crate::events::{
    ChatMessage, ClientEvent, GameOver, KickVote, NameChange, NextTurn, OwnerChange, Ready,
    ServerEvent, WordChosen,
};
use crate::player::{Player, PlayerState, PlayerView};
use crate::scoring;
use crate::words::{self, WordFolder, WordPack};

/// Longest accepted display name, in characters.
const MAX_NAME_LEN: usize = 30;

/// Number of words offered to the drawer.
const WORD_CHOICES: usize = 3;

/// Something the lobby wants done after a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Outgoing {
    /// Send `event` to every connected player `to` addresses.
    Event { to: Recipient, event: ServerEvent },
    /// The player was hard-removed: close their socket if one is open
    /// and forget their session.
    Removed { player: PlayerId, session: String },
}

impl Outgoing {
    fn to(to: Recipient, event: ServerEvent) -> Self {
        Self::Event { to, event }
    }

    fn all(event: ServerEvent) -> Self {
        Self::to(Recipient::All, event)
    }

    fn player(player: &PlayerId, event: ServerEvent) -> Self {
        Self::to(Recipient::Player(player.clone()), event)
    }
}

/// Proof of a successful join: the new player's id and secret session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinTicket {
    pub player_id: PlayerId,
    pub session: String,
}

/// A summary of a lobby for listings and eviction.
#[derive(Debug, Clone, PartialEq)]
pub struct LobbyInfo {
    pub id: LobbyId,
    pub state: LobbyState,
    pub round: u32,
    pub rounds: u32,
    pub player_count: usize,
    pub connected_count: usize,
    pub max_players: usize,
    pub public: bool,
    pub word_pack: WordPack,
    pub owner: Option<PlayerId>,
    pub drawer: Option<PlayerId>,
    /// Unix ms since which nobody has been connected; `None` while
    /// somebody is.
    pub empty_since: Option<i64>,
}

/// One game session's authoritative state.
#[derive(Debug, Clone)]
pub struct Lobby {
    pub(crate) id: LobbyId,
    pub(crate) settings: LobbySettings,
    /// Drawing time as first configured; kept for stored documents.
    pub(crate) drawing_time_new: u32,
    pub(crate) custom_words: Vec<String>,
    /// Shuffled words still to be offered; refilled from the pack.
    pub(crate) words: Vec<String>,
    pub(crate) word_pack: WordPack,
    pub(crate) folder: WordFolder,
    pub(crate) players: Vec<Player>,
    pub(crate) state: LobbyState,
    pub(crate) drawer: Option<PlayerId>,
    pub(crate) owner: Option<PlayerId>,
    pub(crate) creator: Option<PlayerId>,
    pub(crate) current_word: String,
    pub(crate) word_hints: Vec<WordHint>,
    pub(crate) word_hints_shown: Vec<WordHint>,
    pub(crate) hints_left: u32,
    pub(crate) hint_count: u32,
    pub(crate) round: u32,
    pub(crate) word_choice: Vec<String>,
    /// Deadline of the running turn, or of the word choice while the
    /// drawer is still choosing.
    pub(crate) round_end_time: i64,
    pub(crate) score_earned_by_guessers: u32,
    pub(crate) current_drawing: Vec<DrawingPrimitive>,
    pub(crate) last_player_disconnect_time: Option<i64>,
    pub(crate) created_at: i64,
    pub(crate) config: LobbyConfig,
    pub(crate) rng: StdRng,
}

impl Lobby {
    /// Creates an empty lobby. The first player to join becomes owner.
    pub fn new(
        id: LobbyId,
        settings: LobbySettings,
        word_pack: WordPack,
        custom_words: Vec<String>,
        config: LobbyConfig,
        now: i64,
    ) -> Result<Self, LobbyError> {
        settings.validate()?;
        let folder = word_pack.folder();
        let custom_words = custom_words
            .iter()
            .map(|word| folder.fold(word))
            .filter(|word| !word.is_empty())
            .collect();
        let mut lobby = Self {
            id,
            drawing_time_new: settings.drawing_time,
            settings,
            custom_words,
            words: Vec::new(),
            word_pack,
            folder,
            players: Vec::new(),
            state: LobbyState::Unstarted,
            drawer: None,
            owner: None,
            creator: None,
            current_word: String::new(),
            word_hints: Vec::new(),
            word_hints_shown: Vec::new(),
            hints_left: 0,
            hint_count: 0,
            round: 0,
            word_choice: Vec::new(),
            round_end_time: 0,
            score_earned_by_guessers: 0,
            current_drawing: Vec::new(),
            last_player_disconnect_time: None,
            created_at: now,
            config,
            rng: StdRng::from_os_rng(),
        };
        lobby.refill_words();
        Ok(lobby)
    }

    /// Replaces the random source with a seeded one.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn id(&self) -> &LobbyId {
        &self.id
    }

    pub fn settings(&self) -> &LobbySettings {
        &self.settings
    }

    pub fn config(&self) -> &LobbyConfig {
        &self.config
    }

    pub fn state(&self) -> LobbyState {
        self.state
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn player(&self, id: &PlayerId) -> Option<&Player> {
        self.players.iter().find(|p| p.id == *id)
    }

    pub fn player_by_session(&self, session: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.session == session)
    }

    pub fn drawer(&self) -> Option<&PlayerId> {
        self.drawer.as_ref()
    }

    pub fn owner(&self) -> Option<&PlayerId> {
        self.owner.as_ref()
    }

    pub fn current_word(&self) -> &str {
        &self.current_word
    }

    pub fn word_choice(&self) -> &[String] {
        &self.word_choice
    }

    pub fn word_hints(&self) -> &[WordHint] {
        &self.word_hints
    }

    pub fn hints_left(&self) -> u32 {
        self.hints_left
    }

    pub fn round_end_time(&self) -> i64 {
        self.round_end_time
    }

    pub fn current_drawing(&self) -> &[DrawingPrimitive] {
        &self.current_drawing
    }

    pub fn word_pack(&self) -> WordPack {
        self.word_pack
    }

    pub fn connected_count(&self) -> usize {
        self.players.iter().filter(|p| p.connected).count()
    }

    /// Ids of the players with an open socket, in join order.
    pub fn connected_players(&self) -> impl Iterator<Item = &PlayerId> {
        self.players.iter().filter(|p| p.connected).map(|p| &p.id)
    }

    pub fn info(&self) -> LobbyInfo {
        let connected_count = self.connected_count();
        LobbyInfo {
            id: self.id.clone(),
            state: self.state,
            round: self.round,
            rounds: self.settings.rounds,
            player_count: self.players.len(),
            connected_count,
            max_players: self.settings.max_players,
            public: self.settings.public,
            word_pack: self.word_pack,
            owner: self.owner.clone(),
            drawer: self.drawer.clone(),
            empty_since: (connected_count == 0)
                .then(|| self.last_player_disconnect_time.unwrap_or(self.created_at)),
        }
    }

    fn index_of(&self, id: &PlayerId) -> Option<usize> {
        self.players.iter().position(|p| p.id == *id)
    }

    fn player_mut(&mut self, id: &PlayerId) -> Result<&mut Player, LobbyError> {
        self.players
            .iter_mut()
            .find(|p| p.id == *id)
            .ok_or_else(|| LobbyError::UnknownPlayer(id.clone()))
    }

    fn views(&self) -> Vec<PlayerView> {
        self.players.iter().map(Player::view).collect()
    }

    fn is_drawer(&self, id: &PlayerId) -> bool {
        self.drawer.as_ref() == Some(id)
    }

    /// The drawer is still picking a word.
    fn choosing_word(&self) -> bool {
        self.state == LobbyState::Ongoing && self.current_word.is_empty()
    }

    /// A word is chosen and the drawing clock is running.
    fn word_chosen(&self) -> bool {
        self.state == LobbyState::Ongoing && !self.current_word.is_empty()
    }

    fn guessing_players_left(&self) -> bool {
        self.players
            .iter()
            .any(|p| p.connected && p.state == PlayerState::Guessing)
    }

    /// The hints a given player should see: everything for the drawer and
    /// for those who already guessed, the partial set for the rest.
    fn hints_for(&self, player: &Player) -> Vec<WordHint> {
        if self.word_chosen() && player.state != PlayerState::Guessing {
            self.word_hints_shown.clone()
        } else {
            self.word_hints.clone()
        }
    }

    // -----------------------------------------------------------------------
    // Membership
    // -----------------------------------------------------------------------

    /// Adds a new player. They are not connected until their socket is.
    pub fn join(&mut self, name: &str, address: &str) -> Result<JoinTicket, LobbyError> {
        self.check_seat(address)?;

        let name = self.sanitize_name(name);
        let mut player = Player::new(name, address);
        if self.state == LobbyState::Ongoing {
            player.state = PlayerState::Guessing;
        }
        let ticket = JoinTicket {
            player_id: player.id.clone(),
            session: player.session.clone(),
        };
        self.adopt(player);
        info!(lobby_id = %self.id, player_id = %ticket.player_id, "player joined");
        Ok(ticket)
    }

    /// Re-attaches a returning session, updating its address.
    pub fn rejoin(&mut self, session: &str, address: &str) -> Result<PlayerId, LobbyError> {
        let player = self
            .players
            .iter_mut()
            .find(|p| p.session == session)
            .ok_or(LobbyError::UnknownSession)?;
        if player.connected {
            return Err(LobbyError::AlreadyOpen(player.id.clone()));
        }
        player.last_known_address = address.to_string();
        Ok(player.id.clone())
    }

    /// Ensures a player first seen through the bus exists locally.
    ///
    /// Returns `true` if a placeholder was created. New placeholders take
    /// a seat like any join, so capacity and the per-address limit apply.
    /// An empty `session` keeps a generated one.
    pub fn attach_remote(
        &mut self,
        id: PlayerId,
        name: &str,
        session: &str,
        address: &str,
    ) -> Result<bool, LobbyError> {
        if self.index_of(&id).is_some() {
            return Ok(false);
        }
        self.check_seat(address)?;
        let name = self.sanitize_name(name);
        let mut player = Player::with_id(id, name, address);
        if !session.is_empty() {
            player.session = session.to_string();
        }
        if self.state == LobbyState::Ongoing {
            player.state = PlayerState::Guessing;
        }
        info!(lobby_id = %self.id, player_id = %player.id, "remote player attached");
        self.adopt(player);
        Ok(true)
    }

    /// Fails if the lobby has no free seat for a player from `address`.
    fn check_seat(&self, address: &str) -> Result<(), LobbyError> {
        if self.players.len() >= self.settings.max_players {
            return Err(LobbyError::Full(self.id.clone()));
        }
        let same_address = self
            .players
            .iter()
            .filter(|p| p.last_known_address == address)
            .count();
        if same_address >= self.settings.clients_per_ip_limit {
            return Err(LobbyError::IpLimit(address.to_string()));
        }
        Ok(())
    }

    fn adopt(&mut self, player: Player) {
        if self.owner.is_none() {
            self.owner = Some(player.id.clone());
        }
        if self.creator.is_none() {
            self.creator = Some(player.id.clone());
        }
        self.players.push(player);
    }

    fn sanitize_name(&self, name: &str) -> String {
        let name: String = name.trim().chars().take(MAX_NAME_LEN).collect();
        if name.is_empty() {
            format!("Player {}", self.players.len() + 1)
        } else {
            name
        }
    }

    /// Binds a socket to the player.
    pub fn connect(&mut self, id: &PlayerId, _now: i64) -> Result<Vec<Outgoing>, LobbyError> {
        let player = self.player_mut(id)?;
        player.connected = true;
        player.disconnect_time = None;
        info!(lobby_id = %self.id, player_id = %id, "player connected");

        let Some(player) = self.player(id) else {
            return Err(LobbyError::UnknownPlayer(id.clone()));
        };
        let ready = Ready {
            player_id: player.id.clone(),
            player_name: player.name.clone(),
            allow_drawing: self.is_drawer(id) && self.word_chosen(),
            owner_id: self.owner.clone(),
            round: self.round,
            rounds: self.settings.rounds,
            round_end_time: self.round_end_time,
            game_state: self.state,
            drawing_time_setting: self.settings.drawing_time,
            word_hints: self.hints_for(player),
            players: self.views(),
            current_drawing: self.current_drawing.clone(),
        };

        let mut out = vec![
            Outgoing::player(id, ServerEvent::Ready(Box::new(ready))),
            Outgoing::all(ServerEvent::UpdatePlayers(self.views())),
        ];
        if self.is_drawer(id) && self.choosing_word() {
            out.push(Outgoing::player(
                id,
                ServerEvent::YourTurn(self.word_choice.clone()),
            ));
        }
        Ok(out)
    }

    /// Marks the player disconnected and starts their reconnect window.
    pub fn disconnect(&mut self, id: &PlayerId, now: i64) -> Vec<Outgoing> {
        let Ok(player) = self.player_mut(id) else {
            return Vec::new();
        };
        if !player.connected {
            return Vec::new();
        }
        player.connected = false;
        player.disconnect_time = Some(now);
        self.last_player_disconnect_time = Some(now);
        info!(lobby_id = %self.id, player_id = %id, "player disconnected");
        let mut out = vec![Outgoing::all(ServerEvent::UpdatePlayers(self.views()))];
        if self.word_chosen() && !self.is_drawer(id) && !self.guessing_players_left() {
            info!(lobby_id = %self.id, "last guesser left, ending turn");
            out.extend(self.end_turn(now));
        }
        out
    }

    /// Explicitly leaves the lobby.
    pub fn leave(&mut self, id: &PlayerId, now: i64) -> Result<Vec<Outgoing>, LobbyError> {
        if self.index_of(id).is_none() {
            return Err(LobbyError::UnknownPlayer(id.clone()));
        }
        info!(lobby_id = %self.id, player_id = %id, "player left");
        Ok(self.remove_player(id, now))
    }

    /// Hard-removes a player, fixing up ownership and the running turn.
    fn remove_player(&mut self, id: &PlayerId, now: i64) -> Vec<Outgoing> {
        let Some(index) = self.index_of(id) else {
            return Vec::new();
        };
        let was_drawer = self.is_drawer(id);
        let player = self.players.remove(index);
        for other in &mut self.players {
            other.votes_for_kick.remove(id);
        }

        let mut out = vec![Outgoing::Removed {
            player: player.id.clone(),
            session: player.session.clone(),
        }];

        if self.owner.as_ref() == Some(id) {
            let successor = self
                .players
                .iter()
                .find(|p| p.connected)
                .or_else(|| self.players.first());
            self.owner = successor.map(|p| p.id.clone());
            if let Some(owner) = successor {
                info!(lobby_id = %self.id, player_id = %owner.id, "ownership transferred");
                out.push(Outgoing::all(ServerEvent::OwnerChange(OwnerChange {
                    player_id: owner.id.clone(),
                    player_name: owner.name.clone(),
                })));
            }
        }

        out.push(Outgoing::all(ServerEvent::UpdatePlayers(self.views())));

        if self.state == LobbyState::Ongoing {
            if was_drawer {
                info!(lobby_id = %self.id, player_id = %id, "drawer removed, ending turn");
                self.drawer = None;
                out.push(Outgoing::all(ServerEvent::DrawerKicked));
                out.extend(self.finish_turn(index, now));
            } else if self.word_chosen() && !self.guessing_players_left() {
                out.extend(self.end_turn(now));
            }
        }
        out
    }

    // -----------------------------------------------------------------------
    // Settings
    // -----------------------------------------------------------------------

    /// Replaces the settings. Owner only, and only before the game starts.
    pub fn edit_settings(
        &mut self,
        by: &PlayerId,
        settings: LobbySettings,
    ) -> Result<Vec<Outgoing>, LobbyError> {
        if self.owner.as_ref() != Some(by) {
            return Err(LobbyError::NotOwner(by.clone()));
        }
        if self.state != LobbyState::Unstarted {
            return Err(LobbyError::InvalidState(format!(
                "settings can only change before the game starts, lobby is {}",
                self.state
            )));
        }
        settings.validate()?;
        if settings.max_players < self.players.len() {
            return Err(LobbyError::InvalidSettings(format!(
                "maxPlayers cannot be lower than the {} players present",
                self.players.len()
            )));
        }
        self.settings = settings;
        info!(lobby_id = %self.id, "settings changed");
        Ok(vec![Outgoing::all(ServerEvent::LobbySettingsChanged(
            self.settings.clone(),
        ))])
    }

    // -----------------------------------------------------------------------
    // Player events
    // -----------------------------------------------------------------------

    /// Applies one decoded event from a player.
    pub fn handle_event(
        &mut self,
        from: &PlayerId,
        event: ClientEvent,
        now: i64,
    ) -> Result<Vec<Outgoing>, LobbyError> {
        if self.index_of(from).is_none() {
            return Err(LobbyError::UnknownPlayer(from.clone()));
        }
        debug!(lobby_id = %self.id, player_id = %from, kind = event.kind(), "event");

        match event {
            ClientEvent::NameChange(name) => self.change_name(from, &name),
            ClientEvent::Start => self.start(from, now),
            ClientEvent::ChooseWord(index) => self.choose_word(from, index, now),
            ClientEvent::Message(text) => Ok(self.message(from, &text, now)),
            ClientEvent::Draw(primitive) => Ok(self.draw(from, primitive)),
            ClientEvent::ClearDrawingBoard => Ok(self.clear_drawing(from)),
            ClientEvent::KickVote(target) => self.vote_kick(from, &target, now),
            ClientEvent::KeepAlive => Ok(Vec::new()),
        }
    }

    fn change_name(&mut self, id: &PlayerId, name: &str) -> Result<Vec<Outgoing>, LobbyError> {
        let name: String = name.trim().chars().take(MAX_NAME_LEN).collect();
        if name.is_empty() {
            return Err(LobbyError::InvalidEvent("name must not be empty".into()));
        }
        self.player_mut(id)?.name = name.clone();
        Ok(vec![Outgoing::all(ServerEvent::NameChange(NameChange {
            player_id: id.clone(),
            player_name: name,
        }))])
    }

    fn start(&mut self, by: &PlayerId, now: i64) -> Result<Vec<Outgoing>, LobbyError> {
        if self.owner.as_ref() != Some(by) {
            return Err(LobbyError::NotOwner(by.clone()));
        }
        if !self.state.is_startable() {
            return Err(LobbyError::InvalidState(format!(
                "cannot start a lobby that is {}",
                self.state
            )));
        }
        if self.connected_count() < 2 {
            return Err(LobbyError::NotEnoughPlayers);
        }

        if self.state == LobbyState::GameOver {
            self.transition(LobbyState::Unstarted);
        }
        for player in &mut self.players {
            player.score = 0;
            player.last_score = 0;
            player.rank = 0;
            player.state = PlayerState::Standby;
        }
        self.round = 1;
        self.transition(LobbyState::Ongoing);

        let first = self
            .players
            .iter()
            .position(|p| p.connected)
            .ok_or(LobbyError::NotEnoughPlayers)?;
        Ok(self.begin_turn(first, None, now))
    }

    fn transition(&mut self, target: LobbyState) {
        debug_assert!(self.state.can_transition_to(target));
        info!(lobby_id = %self.id, from = %self.state, to = %target, "lobby state changed");
        self.state = target;
    }

    fn choose_word(
        &mut self,
        by: &PlayerId,
        index: usize,
        now: i64,
    ) -> Result<Vec<Outgoing>, LobbyError> {
        if !self.choosing_word() {
            return Err(LobbyError::InvalidState("no word choice is pending".into()));
        }
        if !self.is_drawer(by) {
            return Err(LobbyError::NotDrawer(by.clone()));
        }
        let word = self.word_choice.get(index).cloned().ok_or_else(|| {
            LobbyError::InvalidEvent(format!("word index {index} out of range"))
        })?;
        Ok(self.set_word(word, now))
    }

    fn message(&mut self, from: &PlayerId, text: &str, now: i64) -> Vec<Outgoing> {
        let text = text.trim();
        if text.is_empty() {
            return Vec::new();
        }
        let Some(sender) = self.player(from) else {
            return Vec::new();
        };
        let chat = ChatMessage {
            author: sender.name.clone(),
            author_id: from.clone(),
            content: text.to_string(),
        };

        if !self.word_chosen() {
            return vec![Outgoing::all(ServerEvent::Message(chat))];
        }

        if sender.state != PlayerState::Guessing {
            // The drawer and those who already know the word only talk
            // among themselves.
            return self
                .players
                .iter()
                .filter(|p| p.connected && p.state != PlayerState::Guessing)
                .map(|p| Outgoing::player(&p.id, ServerEvent::NonGuessingPlayerMessage(chat.clone())))
                .collect();
        }

        let guess = self.folder.fold(text);
        if guess == self.current_word {
            return self.correct_guess(from, now);
        }
        if words::edit_distance(&guess, &self.current_word) == 1 {
            return vec![Outgoing::player(from, ServerEvent::CloseGuess(text.to_string()))];
        }
        vec![Outgoing::all(ServerEvent::Message(chat))]
    }

    fn correct_guess(&mut self, id: &PlayerId, now: i64) -> Vec<Outgoing> {
        let order = self
            .players
            .iter()
            .filter(|p| !self.is_drawer(&p.id) && p.state == PlayerState::Standby)
            .count() as u32;
        let drawing_ms = self.settings.drawing_time_ms().max(1);
        let time_left = (self.round_end_time - now).clamp(0, drawing_ms);
        let elapsed = 1.0 - time_left as f64 / drawing_ms as f64;
        let points = scoring::guesser_points(
            &self.config.score,
            elapsed,
            self.hints_left,
            self.hint_count,
            order,
            self.score_earned_by_guessers,
        );
        self.score_earned_by_guessers += points;

        let shown = self.word_hints_shown.clone();
        let lobby_id = self.id.clone();
        let Ok(player) = self.player_mut(id) else {
            return Vec::new();
        };
        player.score += points;
        player.last_score = points;
        player.state = PlayerState::Standby;
        info!(lobby_id = %lobby_id, player_id = %id, points, order, "correct guess");

        let mut out = vec![
            Outgoing::all(ServerEvent::CorrectGuess(id.clone())),
            Outgoing::player(id, ServerEvent::UpdateWordhint(shown)),
            Outgoing::all(ServerEvent::UpdatePlayers(self.views())),
        ];
        if !self.guessing_players_left() {
            out.extend(self.end_turn(now));
        }
        out
    }

    fn draw(&mut self, from: &PlayerId, primitive: DrawingPrimitive) -> Vec<Outgoing> {
        if !(self.is_drawer(from) && self.word_chosen()) {
            debug!(lobby_id = %self.id, player_id = %from, "ignoring drawing from non-drawer");
            return Vec::new();
        }
        self.current_drawing.push(primitive.clone());
        vec![Outgoing::to(
            Recipient::AllExcept(from.clone()),
            ServerEvent::drawing(primitive),
        )]
    }

    fn clear_drawing(&mut self, from: &PlayerId) -> Vec<Outgoing> {
        if !(self.is_drawer(from) && self.word_chosen()) {
            return Vec::new();
        }
        self.current_drawing.clear();
        vec![Outgoing::to(
            Recipient::AllExcept(from.clone()),
            ServerEvent::ClearDrawingBoard,
        )]
    }

    fn vote_kick(
        &mut self,
        from: &PlayerId,
        target: &PlayerId,
        now: i64,
    ) -> Result<Vec<Outgoing>, LobbyError> {
        if !self.settings.enable_votekick {
            return Err(LobbyError::InvalidState("vote kick is disabled".into()));
        }
        if from == target {
            return Err(LobbyError::InvalidEvent("cannot vote to kick yourself".into()));
        }
        let Some(index) = self.index_of(target) else {
            return Err(LobbyError::UnknownPlayer(target.clone()));
        };
        self.players[index].votes_for_kick.insert(from.clone());

        let connected = self.connected_count();
        let required = connected / 2 + 1;
        let victim = &self.players[index];
        let votes = victim
            .votes_for_kick
            .iter()
            .filter(|voter| self.player(voter).is_some_and(|p| p.connected))
            .count();

        let mut out = vec![Outgoing::all(ServerEvent::KickVote(KickVote {
            player_id: victim.id.clone(),
            player_name: victim.name.clone(),
            vote_count: votes,
            required_vote_count: required,
        }))];
        if votes >= required {
            info!(lobby_id = %self.id, player_id = %target, votes, "player kicked");
            out.extend(self.remove_player(target, now));
        }
        Ok(out)
    }

    // -----------------------------------------------------------------------
    // Turns
    // -----------------------------------------------------------------------

    fn begin_turn(&mut self, drawer: usize, previous_word: Option<String>, now: i64) -> Vec<Outgoing> {
        let drawer_id = self.players[drawer].id.clone();
        let views = self.views();

        for (i, player) in self.players.iter_mut().enumerate() {
            player.state = if i == drawer {
                PlayerState::Drawing
            } else {
                PlayerState::Guessing
            };
            player.last_score = 0;
        }
        self.drawer = Some(drawer_id.clone());
        self.current_word.clear();
        self.word_hints.clear();
        self.word_hints_shown.clear();
        self.hints_left = 0;
        self.hint_count = 0;
        self.score_earned_by_guessers = 0;
        self.word_choice = self.pick_candidates();
        self.round_end_time = now + self.config.word_choice_timeout.as_millis() as i64;

        info!(lobby_id = %self.id, player_id = %drawer_id, round = self.round, "turn started");
        vec![
            Outgoing::all(ServerEvent::NextTurn(NextTurn {
                round: self.round,
                players: views,
                round_end_time: self.round_end_time,
                previous_word,
            })),
            Outgoing::player(&drawer_id, ServerEvent::YourTurn(self.word_choice.clone())),
        ]
    }

    fn set_word(&mut self, word: String, now: i64) -> Vec<Outgoing> {
        self.word_hints_shown = word.chars().map(WordHint::shown).collect();
        self.word_hints = word
            .chars()
            .map(|c| if c == ' ' { WordHint::shown(c) } else { WordHint::hidden() })
            .collect();
        self.hint_count = words::hint_count(&word);
        self.hints_left = self.hint_count;
        self.current_word = word;
        self.word_choice.clear();
        self.round_end_time = now + self.settings.drawing_time_ms();

        let mut out = vec![Outgoing::all(ServerEvent::WordChosen(WordChosen {
            round_end_time: self.round_end_time,
            hints: self.word_hints.clone(),
        }))];
        if let Some(drawer) = &self.drawer {
            out.push(Outgoing::player(
                drawer,
                ServerEvent::UpdateWordhint(self.word_hints_shown.clone()),
            ));
        }
        out
    }

    /// Ends the running turn normally: the drawer earns their share and
    /// the next connected player in join order draws.
    fn end_turn(&mut self, now: i64) -> Vec<Outgoing> {
        let next_from = match self.drawer.as_ref().and_then(|d| self.index_of(d)) {
            Some(index) => {
                let guessers = self
                    .players
                    .iter()
                    .filter(|p| p.state == PlayerState::Standby && p.id != self.players[index].id)
                    .count() as u32;
                let points = scoring::drawer_points(self.score_earned_by_guessers, guessers);
                let drawer = &mut self.players[index];
                drawer.score += points;
                drawer.last_score = points;
                index + 1
            }
            None => 0,
        };
        self.finish_turn(next_from, now)
    }

    /// Clears per-turn state and moves on, starting the drawer search at
    /// `next_from`.
    fn finish_turn(&mut self, next_from: usize, now: i64) -> Vec<Outgoing> {
        let previous_word = (!self.current_word.is_empty())
            .then(|| std::mem::take(&mut self.current_word));
        self.current_drawing.clear();
        self.word_hints.clear();
        self.word_hints_shown.clear();
        self.word_choice.clear();
        self.hints_left = 0;
        self.hint_count = 0;
        self.update_ranks();

        if self.connected_count() < 2 {
            return self.game_over(previous_word);
        }

        let next = self.players[next_from.min(self.players.len())..]
            .iter()
            .position(|p| p.connected)
            .map(|offset| next_from + offset);
        match next {
            Some(index) => self.begin_turn(index, previous_word, now),
            None => {
                self.round += 1;
                if self.round > self.settings.rounds {
                    self.round = self.settings.rounds;
                    return self.game_over(previous_word);
                }
                match self.players.iter().position(|p| p.connected) {
                    Some(index) => self.begin_turn(index, previous_word, now),
                    None => self.game_over(previous_word),
                }
            }
        }
    }

    fn game_over(&mut self, previous_word: Option<String>) -> Vec<Outgoing> {
        self.drawer = None;
        self.current_word.clear();
        self.round_end_time = 0;
        for player in &mut self.players {
            player.state = PlayerState::Standby;
        }
        self.update_ranks();
        self.transition(LobbyState::GameOver);
        vec![Outgoing::all(ServerEvent::GameOver(GameOver {
            round: self.round,
            players: self.views(),
            previous_word,
        }))]
    }

    /// Ranks by score, highest first; ties keep join order.
    fn update_ranks(&mut self) {
        let mut order: Vec<usize> = (0..self.players.len()).collect();
        order.sort_by(|&a, &b| self.players[b].score.cmp(&self.players[a].score));
        for (rank, index) in order.into_iter().enumerate() {
            self.players[index].rank = rank as u32 + 1;
        }
    }

    // -----------------------------------------------------------------------
    // Timer
    // -----------------------------------------------------------------------

    /// Advances time: expires reconnect windows, picks a word for a slow
    /// drawer, reveals hints, and ends turns that ran out of time.
    pub fn tick(&mut self, now: i64) -> Vec<Outgoing> {
        let mut out = Vec::new();

        let grace = self.config.reconnect_grace.as_millis() as i64;
        let expired: Vec<PlayerId> = self
            .players
            .iter()
            .filter(|p| !p.connected && p.disconnect_time.is_some_and(|t| now - t >= grace))
            .map(|p| p.id.clone())
            .collect();
        for id in expired {
            info!(lobby_id = %self.id, player_id = %id, "reconnect window expired");
            out.extend(self.remove_player(&id, now));
        }

        if self.choosing_word() && now >= self.round_end_time {
            if let Some(word) = self.word_choice.choose(&mut self.rng).cloned() {
                debug!(lobby_id = %self.id, "word choice timed out, picking at random");
                out.extend(self.set_word(word, now));
            }
        } else if self.word_chosen() {
            if now >= self.round_end_time {
                info!(lobby_id = %self.id, "turn time is up");
                out.extend(self.end_turn(now));
            } else if !self.guessing_players_left() {
                out.extend(self.end_turn(now));
            } else {
                out.extend(self.reveal_due_hints(now));
            }
        }
        out
    }

    /// Reveals every hint whose release time has passed. Hint `k` of `n`
    /// is due once the time left drops to `k × drawing_time / (n + 1)`.
    fn reveal_due_hints(&mut self, now: i64) -> Vec<Outgoing> {
        let drawing_ms = self.settings.drawing_time_ms();
        let time_left = self.round_end_time - now;
        let mut revealed = false;
        while self.hints_left > 0
            && time_left <= i64::from(self.hints_left) * drawing_ms / i64::from(self.hint_count + 1)
        {
            let hidden: Vec<usize> = self
                .word_hints
                .iter()
                .enumerate()
                .filter(|(_, hint)| hint.is_hidden())
                .map(|(i, _)| i)
                .collect();
            let Some(&index) = hidden.choose(&mut self.rng) else {
                break;
            };
            self.word_hints[index] = self.word_hints_shown[index];
            self.hints_left -= 1;
            revealed = true;
        }
        if !revealed {
            return Vec::new();
        }
        self.players
            .iter()
            .filter(|p| p.connected && p.state == PlayerState::Guessing)
            .map(|p| Outgoing::player(&p.id, ServerEvent::UpdateWordhint(self.word_hints.clone())))
            .collect()
    }

    // -----------------------------------------------------------------------
    // Words
    // -----------------------------------------------------------------------

    fn refill_words(&mut self) {
        let mut words = self.word_pack.words();
        words.shuffle(&mut self.rng);
        self.words = words;
    }

    fn next_pack_word(&mut self) -> String {
        if self.words.is_empty() {
            self.refill_words();
        }
        self.words.pop().unwrap_or_default()
    }

    /// Draws three distinct candidates, each from the custom words with
    /// probability `customWordsChance`%.
    fn pick_candidates(&mut self) -> Vec<String> {
        let mut picks: Vec<String> = Vec::with_capacity(WORD_CHOICES);
        let mut attempts = 0;
        while picks.len() < WORD_CHOICES && attempts < WORD_CHOICES * 10 {
            attempts += 1;
            let use_custom = !self.custom_words.is_empty()
                && self.rng.random_range(0..100) < self.settings.custom_words_chance;
            let word = if use_custom {
                self.custom_words
                    .choose(&mut self.rng)
                    .cloned()
                    .unwrap_or_default()
            } else {
                self.next_pack_word()
            };
            if !word.is_empty() && !picks.contains(&word) {
                picks.push(word);
            }
        }
        picks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: i64 = 1_700_000_000_000;

    fn lobby() -> Lobby {
        Lobby::new(
            LobbyId::from("test"),
            LobbySettings::default(),
            WordPack::English,
            Vec::new(),
            LobbyConfig::default(),
            T0,
        )
        .unwrap()
        .with_seed(7)
    }

    fn joined(lobby: &mut Lobby, name: &str, address: &str) -> PlayerId {
        let ticket = lobby.join(name, address).unwrap();
        lobby.connect(&ticket.player_id, T0).unwrap();
        ticket.player_id
    }

    #[test]
    fn test_join_first_player_becomes_owner_and_creator() {
        let mut lobby = lobby();
        let a = joined(&mut lobby, "alice", "1.1.1.1");
        let _b = joined(&mut lobby, "bob", "2.2.2.2");
        assert_eq!(lobby.owner(), Some(&a));
        assert_eq!(lobby.creator, Some(a));
    }

    #[test]
    fn test_join_rejects_when_full() {
        let mut lobby = lobby();
        lobby.settings.max_players = 2;
        lobby.join("a", "1").unwrap();
        lobby.join("b", "2").unwrap();
        assert!(matches!(lobby.join("c", "3"), Err(LobbyError::Full(_))));
    }

    #[test]
    fn test_join_enforces_ip_limit() {
        let mut lobby = lobby();
        lobby.join("a", "1.1.1.1").unwrap();
        assert!(matches!(
            lobby.join("b", "1.1.1.1"),
            Err(LobbyError::IpLimit(_))
        ));
    }

    #[test]
    fn test_join_blank_name_gets_default() {
        let mut lobby = lobby();
        let ticket = lobby.join("   ", "1").unwrap();
        assert_eq!(lobby.player(&ticket.player_id).unwrap().name, "Player 1");
    }

    #[test]
    fn test_attach_remote_takes_a_seat_like_join() {
        let mut lobby = lobby();
        lobby.settings.max_players = 2;
        lobby.join("a", "1.1.1.1").unwrap();

        assert!(matches!(
            lobby.attach_remote(PlayerId::from("r1"), "r1", "s1", "1.1.1.1"),
            Err(LobbyError::IpLimit(_))
        ));
        assert!(lobby.attach_remote(PlayerId::from("r2"), "r2", "s2", "2.2.2.2").unwrap());
        assert!(!lobby.attach_remote(PlayerId::from("r2"), "r2", "s2", "2.2.2.2").unwrap());
        assert!(matches!(
            lobby.attach_remote(PlayerId::from("r3"), "r3", "s3", "3.3.3.3"),
            Err(LobbyError::Full(_))
        ));
        assert_eq!(lobby.players().len(), 2);
        assert_eq!(lobby.player_by_session("s2").map(|p| p.id.clone()), Some(PlayerId::from("r2")));
    }

    #[test]
    fn test_rejoin_open_session_rejected() {
        let mut lobby = lobby();
        let ticket = lobby.join("a", "1").unwrap();
        lobby.connect(&ticket.player_id, T0).unwrap();
        assert!(matches!(
            lobby.rejoin(&ticket.session, "1"),
            Err(LobbyError::AlreadyOpen(_))
        ));
        lobby.disconnect(&ticket.player_id, T0);
        assert_eq!(lobby.rejoin(&ticket.session, "9").unwrap(), ticket.player_id);
        assert_eq!(lobby.player(&ticket.player_id).unwrap().last_known_address, "9");
    }

    #[test]
    fn test_start_requires_owner_and_two_players() {
        let mut lobby = lobby();
        let a = joined(&mut lobby, "a", "1");
        assert!(matches!(
            lobby.handle_event(&a, ClientEvent::Start, T0),
            Err(LobbyError::NotEnoughPlayers)
        ));
        let b = joined(&mut lobby, "b", "2");
        assert!(matches!(
            lobby.handle_event(&b, ClientEvent::Start, T0),
            Err(LobbyError::NotOwner(_))
        ));
        lobby.handle_event(&a, ClientEvent::Start, T0).unwrap();
        assert_eq!(lobby.state(), LobbyState::Ongoing);
        assert_eq!(lobby.drawer(), Some(&a));
        assert_eq!(lobby.word_choice().len(), 3);
    }

    #[test]
    fn test_correct_guess_is_credited_once() {
        let mut lobby = lobby();
        let a = joined(&mut lobby, "a", "1");
        let b = joined(&mut lobby, "b", "2");
        let c = joined(&mut lobby, "c", "3");
        lobby.handle_event(&a, ClientEvent::Start, T0).unwrap();
        lobby.handle_event(&a, ClientEvent::ChooseWord(0), T0).unwrap();
        let word = lobby.current_word().to_string();

        lobby
            .handle_event(&b, ClientEvent::Message(word.to_uppercase()), T0 + 1000)
            .unwrap();
        let after_first = lobby.player(&b).unwrap().score;
        assert!(after_first > 0);

        let out = lobby
            .handle_event(&b, ClientEvent::Message(word.clone()), T0 + 2000)
            .unwrap();
        assert_eq!(lobby.player(&b).unwrap().score, after_first);
        assert!(out.iter().all(|o| !matches!(
            o,
            Outgoing::Event { event: ServerEvent::CorrectGuess(_), .. }
        )));
        // c still guessing, so the turn keeps going.
        assert_eq!(lobby.current_word(), word);
        assert_eq!(lobby.player(&c).unwrap().state, PlayerState::Guessing);
    }

    #[test]
    fn test_close_guess_is_private() {
        let mut lobby = lobby();
        let a = joined(&mut lobby, "a", "1");
        let b = joined(&mut lobby, "b", "2");
        lobby.handle_event(&a, ClientEvent::Start, T0).unwrap();
        lobby.handle_event(&a, ClientEvent::ChooseWord(0), T0).unwrap();
        let mut near = lobby.current_word().to_string();
        near.push('x');

        let out = lobby
            .handle_event(&b, ClientEvent::Message(near.clone()), T0)
            .unwrap();
        assert_eq!(
            out,
            vec![Outgoing::Event {
                to: Recipient::Player(b.clone()),
                event: ServerEvent::CloseGuess(near),
            }]
        );
    }

    #[test]
    fn test_drawer_chat_only_reaches_non_guessers() {
        let mut lobby = lobby();
        let a = joined(&mut lobby, "a", "1");
        let b = joined(&mut lobby, "b", "2");
        lobby.handle_event(&a, ClientEvent::Start, T0).unwrap();
        lobby.handle_event(&a, ClientEvent::ChooseWord(0), T0).unwrap();

        let out = lobby
            .handle_event(&a, ClientEvent::Message("no hints from me".into()), T0)
            .unwrap();
        assert_eq!(out.len(), 1);
        assert!(matches!(
            &out[0],
            Outgoing::Event { to: Recipient::Player(p), event: ServerEvent::NonGuessingPlayerMessage(_) } if *p == a
        ));
        let _ = b;
    }

    #[test]
    fn test_drawing_from_non_drawer_is_ignored() {
        let mut lobby = lobby();
        let a = joined(&mut lobby, "a", "1");
        let b = joined(&mut lobby, "b", "2");
        lobby.handle_event(&a, ClientEvent::Start, T0).unwrap();
        lobby.handle_event(&a, ClientEvent::ChooseWord(0), T0).unwrap();

        let fill = DrawingPrimitive::Fill(scrawl_protocol::Fill {
            x: 1.into(),
            y: 1.into(),
            color: scrawl_protocol::RgbColor {
                r: 0.into(),
                g: 0.into(),
                b: 0.into(),
            },
        });
        assert!(lobby.handle_event(&b, ClientEvent::Draw(fill.clone()), T0).unwrap().is_empty());
        assert!(lobby.current_drawing().is_empty());

        let out = lobby.handle_event(&a, ClientEvent::Draw(fill), T0).unwrap();
        assert_eq!(lobby.current_drawing().len(), 1);
        assert!(matches!(&out[0], Outgoing::Event { to: Recipient::AllExcept(p), .. } if *p == a));
    }

    #[test]
    fn test_last_guesser_disconnect_ends_turn() {
        let mut lobby = lobby();
        let a = joined(&mut lobby, "a", "1");
        let b = joined(&mut lobby, "b", "2");
        let c = joined(&mut lobby, "c", "3");
        lobby.handle_event(&a, ClientEvent::Start, T0).unwrap();
        lobby.handle_event(&a, ClientEvent::ChooseWord(0), T0).unwrap();
        let word = lobby.current_word().to_string();
        lobby.handle_event(&b, ClientEvent::Message(word.clone()), T0 + 1000).unwrap();
        assert_eq!(lobby.current_word(), word);

        let out = lobby.disconnect(&c, T0 + 2000);
        assert!(out.iter().any(|o| matches!(
            o,
            Outgoing::Event { event: ServerEvent::NextTurn(_), .. }
        )));
        assert_eq!(lobby.drawer(), Some(&b));
        assert!(lobby.current_word().is_empty());
        assert!(lobby.player(&a).unwrap().score > 0);
    }

    #[test]
    fn test_drawer_disconnect_keeps_turn_during_grace() {
        let mut lobby = lobby();
        let a = joined(&mut lobby, "a", "1");
        joined(&mut lobby, "b", "2");
        lobby.handle_event(&a, ClientEvent::Start, T0).unwrap();
        lobby.handle_event(&a, ClientEvent::ChooseWord(0), T0).unwrap();
        let word = lobby.current_word().to_string();

        lobby.disconnect(&a, T0 + 1000);
        lobby.tick(T0 + 2000);
        assert_eq!(lobby.drawer(), Some(&a));
        assert_eq!(lobby.current_word(), word);
    }

    #[test]
    fn test_word_choice_times_out_to_random_word() {
        let mut lobby = lobby();
        let a = joined(&mut lobby, "a", "1");
        joined(&mut lobby, "b", "2");
        lobby.handle_event(&a, ClientEvent::Start, T0).unwrap();
        let choices = lobby.word_choice().to_vec();

        lobby.tick(T0 + 29_000);
        assert!(lobby.current_word().is_empty());
        lobby.tick(T0 + 30_000);
        assert!(choices.contains(&lobby.current_word().to_string()));
        assert_eq!(lobby.round_end_time(), T0 + 30_000 + 120_000);
    }

    #[test]
    fn test_hints_reveal_on_schedule() {
        let mut lobby = lobby();
        let a = joined(&mut lobby, "a", "1");
        joined(&mut lobby, "b", "2");
        lobby.handle_event(&a, ClientEvent::Start, T0).unwrap();
        lobby.word_choice = vec!["elephant".into()];
        lobby.handle_event(&a, ClientEvent::ChooseWord(0), T0).unwrap();
        assert_eq!(lobby.hints_left(), 3);

        // 3 hints over 120 s: due at 90 s, 60 s and 30 s left.
        lobby.tick(T0 + 29_000);
        assert_eq!(lobby.hints_left(), 3);
        let out = lobby.tick(T0 + 30_000);
        assert_eq!(lobby.hints_left(), 2);
        assert_eq!(out.len(), 1);
        lobby.tick(T0 + 90_000);
        assert_eq!(lobby.hints_left(), 0);
        let shown = lobby.word_hints().iter().filter(|h| !h.is_hidden()).count();
        assert_eq!(shown, 3);
    }

    #[test]
    fn test_turn_ends_at_deadline_and_rotates_drawer() {
        let mut lobby = lobby();
        let a = joined(&mut lobby, "a", "1");
        let b = joined(&mut lobby, "b", "2");
        lobby.handle_event(&a, ClientEvent::Start, T0).unwrap();
        lobby.handle_event(&a, ClientEvent::ChooseWord(0), T0).unwrap();

        lobby.tick(T0 + 120_000);
        assert_eq!(lobby.drawer(), Some(&b));
        assert_eq!(lobby.round(), 1);
        assert!(lobby.current_drawing().is_empty());
    }

    #[test]
    fn test_game_over_after_last_round() {
        let mut lobby = lobby();
        lobby.settings.rounds = 1;
        let a = joined(&mut lobby, "a", "1");
        let b = joined(&mut lobby, "b", "2");
        lobby.handle_event(&a, ClientEvent::Start, T0).unwrap();

        lobby.handle_event(&a, ClientEvent::ChooseWord(0), T0).unwrap();
        let word = lobby.current_word().to_string();
        lobby.handle_event(&b, ClientEvent::Message(word), T0).unwrap();
        assert_eq!(lobby.drawer(), Some(&b));

        lobby.handle_event(&b, ClientEvent::ChooseWord(0), T0).unwrap();
        let out = lobby.tick(T0 + 200_000);
        assert_eq!(lobby.state(), LobbyState::GameOver);
        assert!(lobby.drawer().is_none());
        assert!(out.iter().any(|o| matches!(
            o,
            Outgoing::Event { event: ServerEvent::GameOver(_), .. }
        )));
        // A lone guesser and the drawer's average share tie; join order
        // breaks it.
        let (pa, pb) = (lobby.player(&a).unwrap(), lobby.player(&b).unwrap());
        assert!(pb.score > 0);
        assert_eq!(pa.score, pb.score);
        assert_eq!((pa.rank, pb.rank), (1, 2));
    }

    #[test]
    fn test_rematch_resets_scores() {
        let mut lobby = lobby();
        lobby.settings.rounds = 1;
        let a = joined(&mut lobby, "a", "1");
        let b = joined(&mut lobby, "b", "2");
        lobby.handle_event(&a, ClientEvent::Start, T0).unwrap();
        lobby.handle_event(&a, ClientEvent::ChooseWord(0), T0).unwrap();
        let word = lobby.current_word().to_string();
        lobby.handle_event(&b, ClientEvent::Message(word), T0).unwrap();
        lobby.tick(T0 + 200_000);
        lobby.tick(T0 + 400_000);
        assert_eq!(lobby.state(), LobbyState::GameOver);

        lobby.handle_event(&a, ClientEvent::Start, T0 + 500_000).unwrap();
        assert_eq!(lobby.state(), LobbyState::Ongoing);
        assert!(lobby.players().iter().all(|p| p.score == 0));
    }

    #[test]
    fn test_ranks_break_ties_by_join_order() {
        let mut lobby = lobby();
        let a = joined(&mut lobby, "a", "1");
        let b = joined(&mut lobby, "b", "2");
        let c = joined(&mut lobby, "c", "3");
        lobby.players[0].score = 10;
        lobby.players[1].score = 30;
        lobby.players[2].score = 10;
        lobby.update_ranks();
        assert_eq!(lobby.player(&b).unwrap().rank, 1);
        assert_eq!(lobby.player(&a).unwrap().rank, 2);
        assert_eq!(lobby.player(&c).unwrap().rank, 3);
    }

    #[test]
    fn test_vote_kick_needs_majority_of_connected() {
        let mut lobby = lobby();
        let a = joined(&mut lobby, "a", "1");
        let b = joined(&mut lobby, "b", "2");
        let c = joined(&mut lobby, "c", "3");

        assert!(matches!(
            lobby.handle_event(&a, ClientEvent::KickVote(a.clone()), T0),
            Err(LobbyError::InvalidEvent(_))
        ));

        lobby.handle_event(&a, ClientEvent::KickVote(c.clone()), T0).unwrap();
        assert!(lobby.player(&c).is_some());
        let out = lobby.handle_event(&b, ClientEvent::KickVote(c.clone()), T0).unwrap();
        assert!(lobby.player(&c).is_none());
        assert!(out.iter().any(|o| matches!(o, Outgoing::Removed { player, .. } if *player == c)));
    }

    #[test]
    fn test_kicking_drawer_ends_turn() {
        let mut lobby = lobby();
        let a = joined(&mut lobby, "a", "1");
        let b = joined(&mut lobby, "b", "2");
        let c = joined(&mut lobby, "c", "3");
        lobby.handle_event(&a, ClientEvent::Start, T0).unwrap();
        lobby.handle_event(&a, ClientEvent::ChooseWord(0), T0).unwrap();

        lobby.handle_event(&b, ClientEvent::KickVote(a.clone()), T0).unwrap();
        let out = lobby.handle_event(&c, ClientEvent::KickVote(a.clone()), T0).unwrap();

        assert!(out.iter().any(|o| matches!(
            o,
            Outgoing::Event { event: ServerEvent::DrawerKicked, .. }
        )));
        assert_eq!(lobby.drawer(), Some(&b));
        // Ownership moved on with the kicked owner.
        assert_eq!(lobby.owner(), Some(&b));
    }

    #[test]
    fn test_edit_settings_owner_only_before_start() {
        let mut lobby = lobby();
        let a = joined(&mut lobby, "a", "1");
        let b = joined(&mut lobby, "b", "2");
        let changed = LobbySettings {
            rounds: 2,
            ..LobbySettings::default()
        };
        assert!(matches!(
            lobby.edit_settings(&b, changed.clone()),
            Err(LobbyError::NotOwner(_))
        ));
        lobby.edit_settings(&a, changed.clone()).unwrap();
        assert_eq!(lobby.settings().rounds, 2);

        let too_small = LobbySettings {
            max_players: 2,
            ..changed.clone()
        };
        lobby.join("c", "3").unwrap();
        assert!(lobby.edit_settings(&a, too_small).is_err());

        lobby.handle_event(&a, ClientEvent::Start, T0).unwrap();
        assert!(matches!(
            lobby.edit_settings(&a, changed),
            Err(LobbyError::InvalidState(_))
        ));
    }

    #[test]
    fn test_info_reports_empty_since() {
        let mut lobby = lobby();
        assert_eq!(lobby.info().empty_since, Some(T0));
        let a = joined(&mut lobby, "a", "1");
        assert_eq!(lobby.info().empty_since, None);
        lobby.disconnect(&a, T0 + 5);
        assert_eq!(lobby.info().empty_since, Some(T0 + 5));
    }

    #[test]
    fn test_custom_words_always_used_at_full_chance() {
        let mut lobby = Lobby::new(
            LobbyId::from("custom"),
            LobbySettings {
                custom_words_chance: 100,
                ..LobbySettings::default()
            },
            WordPack::English,
            vec![" Foo ".into(), "BAR".into(), "baz".into()],
            LobbyConfig::default(),
            T0,
        )
        .unwrap()
        .with_seed(1);
        let mut picks = lobby.pick_candidates();
        picks.sort();
        assert_eq!(picks, vec!["bar", "baz", "foo"]);
    }
}
