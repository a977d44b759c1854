//! Typed inbound and outbound lobby events.
//!
//! Inbound frames arrive as a generic [`GameEvent`] envelope and are
//! turned into a [`ClientEvent`] by matching on the type tag. Outbound
//! [`ServerEvent`]s serialize straight into the envelope shape:
//!
//! ```text
//! {"type":"correct-guess","data":"<player id>","traceId":"…","spanId":"…"}
//! ```

use scrawl_protocol::{
    Codec, DrawingPrimitive, Fill, GameEvent, JsonCodec, Line, PlayerId, ProtocolError,
    TraceContext, WordHint,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::{LobbySettings, LobbyState};
use crate::player::PlayerView;

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

/// Something a player asked the lobby to do.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// `name-change`: a new display name.
    NameChange(String),
    /// `start`: the owner starts (or restarts) the game.
    Start,
    /// `choose-word`: the drawer picks one of the offered words by index.
    ChooseWord(usize),
    /// `message`: chat, which doubles as a guess.
    Message(String),
    /// `line` / `fill`: a drawing primitive, relayed untouched.
    Draw(DrawingPrimitive),
    /// `clear-drawing-board`
    ClearDrawingBoard,
    /// `kick-vote`: vote to kick the given player.
    KickVote(PlayerId),
    /// `keep-alive`: keeps proxies from closing idle sockets.
    KeepAlive,
}

impl ClientEvent {
    /// Decodes a raw frame.
    pub fn decode(raw: &[u8]) -> Result<Self, ProtocolError> {
        let envelope: GameEvent = JsonCodec.decode(raw)?;
        Self::from_envelope(envelope)
    }

    /// Interprets an already decoded envelope.
    pub fn from_envelope(envelope: GameEvent) -> Result<Self, ProtocolError> {
        let GameEvent { kind, data, .. } = envelope;
        match kind.as_str() {
            "name-change" => Ok(Self::NameChange(payload(data)?)),
            "start" => Ok(Self::Start),
            "choose-word" => Ok(Self::ChooseWord(payload(data)?)),
            "message" => Ok(Self::Message(payload(data)?)),
            "line" => Ok(Self::Draw(DrawingPrimitive::Line(payload::<Line>(data)?))),
            "fill" => Ok(Self::Draw(DrawingPrimitive::Fill(payload::<Fill>(data)?))),
            "clear-drawing-board" => Ok(Self::ClearDrawingBoard),
            "kick-vote" => Ok(Self::KickVote(payload(data)?)),
            "keep-alive" => Ok(Self::KeepAlive),
            _ => Err(ProtocolError::UnknownType(kind)),
        }
    }

    /// The envelope tag, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NameChange(_) => "name-change",
            Self::Start => "start",
            Self::ChooseWord(_) => "choose-word",
            Self::Message(_) => "message",
            Self::Draw(primitive) => primitive.kind(),
            Self::ClearDrawingBoard => "clear-drawing-board",
            Self::KickVote(_) => "kick-vote",
            Self::KeepAlive => "keep-alive",
        }
    }
}

fn payload<T: DeserializeOwned>(data: serde_json::Value) -> Result<T, ProtocolError> {
    serde_json::from_value(data).map_err(ProtocolError::Decode)
}

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

/// Sent once to a player right after their socket connects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ready {
    pub player_id: PlayerId,
    pub player_name: String,
    pub allow_drawing: bool,
    pub owner_id: Option<PlayerId>,
    pub round: u32,
    pub rounds: u32,
    pub round_end_time: i64,
    pub game_state: LobbyState,
    pub drawing_time_setting: u32,
    pub word_hints: Vec<WordHint>,
    pub players: Vec<PlayerView>,
    pub current_drawing: Vec<DrawingPrimitive>,
}

/// Announces a new turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NextTurn {
    pub round: u32,
    pub players: Vec<PlayerView>,
    /// While the drawer is still choosing, this is the choice deadline.
    pub round_end_time: i64,
    /// The word of the turn that just ended, if any.
    pub previous_word: Option<String>,
}

/// The drawer picked a word; the drawing clock is running.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WordChosen {
    pub round_end_time: i64,
    pub hints: Vec<WordHint>,
}

/// A chat line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub author: String,
    pub author_id: PlayerId,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NameChange {
    pub player_id: PlayerId,
    pub player_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KickVote {
    pub player_id: PlayerId,
    pub player_name: String,
    pub vote_count: usize,
    pub required_vote_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerChange {
    pub player_id: PlayerId,
    pub player_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameOver {
    pub round: u32,
    pub players: Vec<PlayerView>,
    pub previous_word: Option<String>,
}

/// Everything the lobby sends to players.
///
/// Adjacently tagged with kebab-case tags, so each variant serializes
/// directly as an envelope body: `{"type": "...", "data": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    Ready(Box<Ready>),
    UpdatePlayers(Vec<PlayerView>),
    UpdateWordhint(Vec<WordHint>),
    /// The three candidate words, sent only to the drawer.
    YourTurn(Vec<String>),
    NextTurn(NextTurn),
    WordChosen(WordChosen),
    SystemMessage(String),
    Message(ChatMessage),
    /// Chat from the drawer or players who already guessed; only
    /// non-guessing players receive it.
    NonGuessingPlayerMessage(ChatMessage),
    /// The id of a player who guessed the word.
    CorrectGuess(PlayerId),
    /// The guess was one edit away from the word. Private to the guesser.
    CloseGuess(String),
    Line(Line),
    Fill(Fill),
    ClearDrawingBoard,
    NameChange(NameChange),
    KickVote(KickVote),
    DrawerKicked,
    OwnerChange(OwnerChange),
    GameOver(GameOver),
    LobbySettingsChanged(LobbySettings),
}

/// The outbound wire shape: the event body plus the tracing stamp.
#[derive(Serialize)]
struct StampedFrame<'a> {
    #[serde(flatten)]
    event: &'a ServerEvent,
    #[serde(rename = "traceId")]
    trace_id: &'a str,
    #[serde(rename = "spanId")]
    span_id: &'a str,
}

impl ServerEvent {
    /// A relayed drawing primitive.
    pub fn drawing(primitive: DrawingPrimitive) -> Self {
        match primitive {
            DrawingPrimitive::Line(line) => Self::Line(line),
            DrawingPrimitive::Fill(fill) => Self::Fill(fill),
        }
    }

    /// Encodes the event as a text frame carrying the given stamp.
    pub fn encode(&self, trace: &TraceContext) -> Result<String, ProtocolError> {
        JsonCodec.encode_text(&StampedFrame {
            event: self,
            trace_id: &trace.trace_id,
            span_id: &trace.span_id,
        })
    }

    /// The event as a generic envelope.
    pub fn to_envelope(&self, trace: &TraceContext) -> Result<GameEvent, ProtocolError> {
        let frame = self.encode(trace)?;
        JsonCodec.decode(frame.as_bytes())
    }

    /// The envelope tag, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Ready(_) => "ready",
            Self::UpdatePlayers(_) => "update-players",
            Self::UpdateWordhint(_) => "update-wordhint",
            Self::YourTurn(_) => "your-turn",
            Self::NextTurn(_) => "next-turn",
            Self::WordChosen(_) => "word-chosen",
            Self::SystemMessage(_) => "system-message",
            Self::Message(_) => "message",
            Self::NonGuessingPlayerMessage(_) => "non-guessing-player-message",
            Self::CorrectGuess(_) => "correct-guess",
            Self::CloseGuess(_) => "close-guess",
            Self::Line(_) => "line",
            Self::Fill(_) => "fill",
            Self::ClearDrawingBoard => "clear-drawing-board",
            Self::NameChange(_) => "name-change",
            Self::KickVote(_) => "kick-vote",
            Self::DrawerKicked => "drawer-kicked",
            Self::OwnerChange(_) => "owner-change",
            Self::GameOver(_) => "game-over",
            Self::LobbySettingsChanged(_) => "lobby-settings-changed",
        }
    }
}
