//! Core protocol types: identifiers, the message envelope, recipients,
//! and the tracing stamp.

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A unique identifier for a lobby.
///
/// Lobby ids appear in URLs, bus channel names, and store keys, so they
/// are plain strings. Creators may pick their own id; otherwise one is
/// generated with [`generate_token`].
///
/// `#[serde(transparent)]` makes `LobbyId("abc")` serialize as just
/// `"abc"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LobbyId(pub String);

impl LobbyId {
    /// Generates a fresh random lobby id.
    pub fn generate() -> Self {
        Self(generate_token())
    }

    /// Borrows the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LobbyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LobbyId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// A unique identifier for a player within a lobby.
///
/// Player ids are public: every client sees every other player's id in
/// `update-players`. The secret that proves identity is the session
/// token, which is never broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub String);

impl PlayerId {
    /// Generates a fresh random player id.
    pub fn generate() -> Self {
        Self(generate_token())
    }

    /// Borrows the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlayerId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Generates a random 32-character hex string (128 bits of entropy).
///
/// Used for session tokens and generated ids. 128 bits is enough that
/// guessing another player's session is infeasible.
pub fn generate_token() -> String {
    let bytes: [u8; 16] = rand::rng().random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

// ---------------------------------------------------------------------------
// Recipient: who should receive a message?
// ---------------------------------------------------------------------------

/// Specifies who should receive an outgoing event.
///
/// The lobby state machine returns `(Recipient, event)` pairs; the actor
/// resolves them against the set of currently connected players.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recipient {
    /// Every connected player in the lobby.
    All,

    /// One specific player.
    Player(PlayerId),

    /// Every connected player EXCEPT the specified one. Used for relaying
    /// a drawer's strokes to everybody else.
    AllExcept(PlayerId),
}

impl Recipient {
    /// Returns `true` if `player` is addressed by this recipient.
    pub fn includes(&self, player: &PlayerId) -> bool {
        match self {
            Self::All => true,
            Self::Player(target) => target == player,
            Self::AllExcept(excluded) => excluded != player,
        }
    }
}

// ---------------------------------------------------------------------------
// GameEvent: the envelope
// ---------------------------------------------------------------------------

/// The message envelope. Every frame on a player socket is one of these,
/// in both directions.
///
/// ```text
/// { "type": "line", "data": { ... }, "traceId": "…", "spanId": "…" }
/// ```
///
/// `data` is arbitrary JSON: the router decides how to interpret it based
/// on `type`. The two tracing ids are opaque stamps; the server never
/// reads them on inbound messages and fills them on outbound ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameEvent {
    /// The type tag, e.g. `"message"` or `"update-players"`.
    #[serde(rename = "type")]
    pub kind: String,

    /// The payload, interpreted according to `kind`.
    #[serde(default)]
    pub data: serde_json::Value,

    /// Trace id stamped by the tracing collaborator.
    #[serde(rename = "traceId", default)]
    pub trace_id: String,

    /// Span id stamped by the tracing collaborator.
    #[serde(rename = "spanId", default)]
    pub span_id: String,
}

impl GameEvent {
    /// Creates an unstamped envelope.
    pub fn new(kind: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            data,
            trace_id: String::new(),
            span_id: String::new(),
        }
    }

    /// Attaches the given tracing ids.
    pub fn stamped(mut self, trace: &TraceContext) -> Self {
        self.trace_id = trace.trace_id.clone();
        self.span_id = trace.span_id.clone();
        self
    }
}

// ---------------------------------------------------------------------------
// Tracing stamp
// ---------------------------------------------------------------------------

/// The opaque pair of ids attached to outgoing envelopes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TraceContext {
    pub trace_id: String,
    pub span_id: String,
}

/// Supplies the trace/span ids for outgoing envelopes.
///
/// Distributed tracing itself lives outside this server; whatever
/// provider is plugged in here is only asked for the current ids.
pub trait TraceProvider: Send + Sync + 'static {
    /// Returns the ids of the span the caller is currently in.
    fn current(&self) -> TraceContext;
}

/// A [`TraceProvider`] that stamps empty ids.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTrace;

impl TraceProvider for NoTrace {
    fn current(&self) -> TraceContext {
        TraceContext::default()
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_player_id_serializes_as_plain_string() {
        let json = serde_json::to_string(&PlayerId("abc".into())).unwrap();
        assert_eq!(json, "\"abc\"");
    }

    #[test]
    fn test_generate_token_is_32_hex_chars() {
        let token = generate_token();
        assert_eq!(token.len(), 32);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(token, generate_token(), "tokens must not repeat");
    }

    #[test]
    fn test_game_event_json_format() {
        let event = GameEvent::new("message", serde_json::json!("hi")).stamped(
            &TraceContext {
                trace_id: "t1".into(),
                span_id: "s1".into(),
            },
        );
        let json: serde_json::Value = serde_json::to_value(&event).unwrap();

        assert_eq!(json["type"], "message");
        assert_eq!(json["data"], "hi");
        assert_eq!(json["traceId"], "t1");
        assert_eq!(json["spanId"], "s1");
    }

    #[test]
    fn test_game_event_missing_trace_ids_default_to_empty() {
        // Browsers never send tracing ids.
        let event: GameEvent =
            serde_json::from_str(r#"{"type":"start"}"#).unwrap();
        assert_eq!(event.kind, "start");
        assert!(event.data.is_null());
        assert!(event.trace_id.is_empty());
        assert!(event.span_id.is_empty());
    }

    #[test]
    fn test_game_event_missing_type_returns_error() {
        let result: Result<GameEvent, _> = serde_json::from_str(r#"{"data": 1}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_recipient_includes() {
        let a = PlayerId::from("a");
        let b = PlayerId::from("b");
        assert!(Recipient::All.includes(&a));
        assert!(Recipient::Player(a.clone()).includes(&a));
        assert!(!Recipient::Player(a.clone()).includes(&b));
        assert!(!Recipient::AllExcept(a.clone()).includes(&a));
        assert!(Recipient::AllExcept(a).includes(&b));
    }
}
