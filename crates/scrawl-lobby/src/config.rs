//! Lobby settings, engine tuning, and the lobby state machine.

use std::ops::RangeInclusive;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::LobbyError;

// ---------------------------------------------------------------------------
// LobbySettings
// ---------------------------------------------------------------------------

/// The owner-editable settings of a lobby.
///
/// Field names and order match the stored document and the
/// `lobby-settings-changed` payload:
///
/// ```text
/// {"maxPlayers":12,"public":false,"enableVotekick":true,
///  "customWordsChance":50,"clientsPerIpLimit":1,"drawingTime":120,"rounds":4}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LobbySettings {
    /// Capacity, counting disconnected players still inside their
    /// reconnect window.
    pub max_players: usize,

    /// Whether the lobby shows up in the public listing.
    pub public: bool,

    /// Whether players may vote to kick each other.
    pub enable_votekick: bool,

    /// Percentage (0–100) of word candidates drawn from the custom words.
    pub custom_words_chance: u32,

    /// How many players may share one network address.
    pub clients_per_ip_limit: usize,

    /// Length of a drawing turn, in seconds.
    pub drawing_time: u32,

    /// Number of rounds in a game.
    pub rounds: u32,
}

impl LobbySettings {
    pub const MAX_PLAYERS: RangeInclusive<usize> = 2..=24;
    pub const DRAWING_TIME: RangeInclusive<u32> = 60..=300;
    pub const ROUNDS: RangeInclusive<u32> = 1..=20;
    pub const CUSTOM_WORDS_CHANCE: RangeInclusive<u32> = 0..=100;
    pub const CLIENTS_PER_IP_LIMIT: RangeInclusive<usize> = 1..=24;

    /// Checks every field against its bounds.
    pub fn validate(&self) -> Result<(), LobbyError> {
        check("maxPlayers", &Self::MAX_PLAYERS, self.max_players)?;
        check("drawingTime", &Self::DRAWING_TIME, self.drawing_time)?;
        check("rounds", &Self::ROUNDS, self.rounds)?;
        check(
            "customWordsChance",
            &Self::CUSTOM_WORDS_CHANCE,
            self.custom_words_chance,
        )?;
        check(
            "clientsPerIpLimit",
            &Self::CLIENTS_PER_IP_LIMIT,
            self.clients_per_ip_limit,
        )?;
        Ok(())
    }

    /// The drawing time as a duration in milliseconds.
    pub fn drawing_time_ms(&self) -> i64 {
        i64::from(self.drawing_time) * 1000
    }
}

fn check<T>(field: &str, range: &RangeInclusive<T>, value: T) -> Result<(), LobbyError>
where
    T: PartialOrd + std::fmt::Display,
{
    if range.contains(&value) {
        Ok(())
    } else {
        Err(LobbyError::InvalidSettings(format!(
            "{field} must be between {} and {}, got {value}",
            range.start(),
            range.end()
        )))
    }
}

impl Default for LobbySettings {
    fn default() -> Self {
        Self {
            max_players: 12,
            public: false,
            enable_votekick: true,
            custom_words_chance: 50,
            clients_per_ip_limit: 1,
            drawing_time: 120,
            rounds: 4,
        }
    }
}

// ---------------------------------------------------------------------------
// Engine tuning
// ---------------------------------------------------------------------------

/// Constants of the scoring formula.
///
/// A correct guess is worth
/// `(base × (1 − time_decay × elapsed) + hint_bonus × hints_left / hint_count) × order_decay^order`,
/// capped so the guessers of one turn never share more than `pool`.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreRules {
    pub base: f64,
    /// Fraction of `base` lost by the end of the turn.
    pub time_decay: f64,
    pub hint_bonus: f64,
    /// Multiplier applied once per earlier correct guesser.
    pub order_decay: f64,
    /// Maximum points the guessers of a single turn can earn together.
    pub pool: u32,
}

impl Default for ScoreRules {
    fn default() -> Self {
        Self {
            base: 200.0,
            time_decay: 0.5,
            hint_bonus: 60.0,
            order_decay: 0.5,
            pool: 520,
        }
    }
}

/// Process-side knobs that are not part of the stored lobby.
#[derive(Debug, Clone)]
pub struct LobbyConfig {
    /// How long a disconnected player keeps their seat.
    pub reconnect_grace: Duration,

    /// How long the drawer has to pick a word before one is picked for them.
    pub word_choice_timeout: Duration,

    /// Cadence of the round timer.
    pub tick_interval: Duration,

    /// How long a lobby may sit without connected players before the
    /// registry evicts it.
    pub empty_lobby_grace: Duration,

    /// Capacity of the actor's command queue.
    pub command_buffer: usize,

    pub score: ScoreRules,
}

impl Default for LobbyConfig {
    fn default() -> Self {
        Self {
            reconnect_grace: Duration::from_secs(60),
            word_choice_timeout: Duration::from_secs(30),
            tick_interval: Duration::from_secs(1),
            empty_lobby_grace: Duration::from_secs(180),
            command_buffer: 256,
            score: ScoreRules::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// LobbyState
// ---------------------------------------------------------------------------

/// The lifecycle state of a lobby.
///
/// ```text
/// Unstarted → Ongoing → GameOver
///     ↑                    │
///     └────── rematch ─────┘
/// ```
///
/// - **Unstarted**: waiting for the owner to start. Settings are editable.
/// - **Ongoing**: turns are running; exactly one player is the drawer.
/// - **GameOver**: all rounds played, final ranks are fixed. The owner
///   can start again, which passes back through `Unstarted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LobbyState {
    #[serde(rename = "unstarted")]
    Unstarted,
    #[serde(rename = "ongoing")]
    Ongoing,
    #[serde(rename = "gameOver")]
    GameOver,
}

impl LobbyState {
    /// The wire/document tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unstarted => "unstarted",
            Self::Ongoing => "ongoing",
            Self::GameOver => "gameOver",
        }
    }

    /// Parses a document tag. An empty tag (lobbies written before the
    /// state was recorded) reads as `Unstarted`.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "unstarted" | "" => Some(Self::Unstarted),
            "ongoing" => Some(Self::Ongoing),
            "gameOver" => Some(Self::GameOver),
            _ => None,
        }
    }

    /// Returns `true` if transitioning to `target` is valid.
    pub fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Unstarted, Self::Ongoing)
                | (Self::Ongoing, Self::GameOver)
                | (Self::GameOver, Self::Unstarted)
        )
    }

    /// Returns `true` if the owner may start a game from this state.
    pub fn is_startable(&self) -> bool {
        matches!(self, Self::Unstarted | Self::GameOver)
    }
}

impl std::fmt::Display for LobbyState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
