//! The stored form of a lobby.
//!
//! [`LobbyDocument`] is the shape written to the store and sent to a
//! process that takes over a lobby. Field names and order are fixed and
//! the document serializes canonically: decoding a stored document and
//! encoding it again yields the same bytes. Owner, creator and drawer are
//! embedded as full player snapshots. A missing drawer is written as
//! `null`; documents that leave the key out keep leaving it out.
//! Runtime-only parts (the ticker, the case folder) are kept as opaque
//! placeholders so older documents still parse.
//!
//! Timestamps are written as Unix milliseconds. RFC 3339 strings, as
//! written by older servers, are accepted on read.

use std::collections::{BTreeMap, BTreeSet};

use rand::SeedableRng;
use rand::rngs::StdRng;
use scrawl_protocol::{DrawingPrimitive, LobbyId, PlayerId, WordHint};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::warn;

use crate::config::{LobbyConfig, LobbySettings, LobbyState};
use crate::error::LobbyError;
use crate::lobby::Lobby;
use crate::player::{Player, PlayerState};
use crate::words::WordPack;

/// A stored lobby.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LobbyDocument {
    #[serde(rename = "LobbyID")]
    pub lobby_id: String,
    pub editable_lobby_settings: Option<LobbySettings>,
    pub drawing_time_new: u32,
    pub custom_words: Option<Vec<String>>,
    pub words: Option<Vec<String>>,
    pub players: Option<Vec<PlayerDocument>>,
    pub state: String,
    /// Outer `None`: the key was absent. `Some(None)`: it was `null`.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present"
    )]
    pub drawer: Option<Option<PlayerDocument>>,
    pub owner: Option<PlayerDocument>,
    pub creator: Option<PlayerDocument>,
    pub current_word: String,
    pub word_hints: Option<Vec<WordHint>>,
    pub word_hints_shown: Option<Vec<WordHint>>,
    pub hints_left: u32,
    pub hint_count: u32,
    pub round: u32,
    pub word_choice: Option<Vec<String>>,
    pub wordpack: String,
    pub round_end_time: i64,
    #[serde(default)]
    pub time_left_ticker: serde_json::Value,
    pub score_earned_by_guessers: u32,
    pub current_drawing: Option<Vec<DrawingPrimitive>>,
    #[serde(default)]
    pub lowercaser: serde_json::Value,
    #[serde(default, deserialize_with = "timestamp::deserialize")]
    pub last_player_disconnect_time: Option<i64>,
}

/// A stored player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PlayerDocument {
    pub user_session: String,
    pub last_known_address: String,
    #[serde(default, deserialize_with = "timestamp::deserialize")]
    pub disconnect_time: Option<i64>,
    /// Ids of the players this player voted to kick.
    pub voted_for_kick: Option<BTreeMap<String, bool>>,
    #[serde(rename = "ID")]
    pub id: String,
    pub name: String,
    pub score: u32,
    pub connected: bool,
    pub last_score: u32,
    pub rank: u32,
    pub state: String,
}

impl PlayerDocument {
    /// A snapshot carrying nothing but an id, for references to players
    /// no longer in the lobby.
    fn reference(id: &PlayerId) -> Self {
        Self {
            user_session: String::new(),
            last_known_address: String::new(),
            disconnect_time: None,
            voted_for_kick: None,
            id: id.0.clone(),
            name: String::new(),
            score: 0,
            connected: false,
            last_score: 0,
            rank: 0,
            state: String::new(),
        }
    }
}

fn non_empty<T>(items: Vec<T>) -> Option<Vec<T>> {
    (!items.is_empty()).then_some(items)
}

/// Marks a field that was in the input, `null` included.
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

mod timestamp {
    use serde::{Deserialize, Deserializer, de};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Stored {
        Millis(i64),
        Text(String),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
        match Option::<Stored>::deserialize(deserializer)? {
            None => Ok(None),
            Some(Stored::Millis(ms)) => Ok(Some(ms)),
            Some(Stored::Text(text)) => parse_rfc3339(&text)
                .map(Some)
                .ok_or_else(|| de::Error::custom(format!("invalid timestamp {text:?}"))),
        }
    }

    /// Unix milliseconds of an RFC 3339 timestamp such as
    /// `2023-11-14T22:13:20.5+01:00`. Digits past milliseconds are dropped.
    pub(super) fn parse_rfc3339(text: &str) -> Option<i64> {
        let bytes = text.as_bytes();
        if bytes.len() < 20
            || bytes[4] != b'-'
            || bytes[7] != b'-'
            || !matches!(bytes[10], b'T' | b't' | b' ')
            || bytes[13] != b':'
            || bytes[16] != b':'
        {
            return None;
        }
        let number = |from: usize, to: usize| -> Option<i64> {
            let digits = text.get(from..to)?;
            if !digits.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            digits.parse().ok()
        };
        let (year, month, day) = (number(0, 4)?, number(5, 7)?, number(8, 10)?);
        let (hour, minute, second) = (number(11, 13)?, number(14, 16)?, number(17, 19)?);
        if !(1..=12).contains(&month)
            || !(1..=31).contains(&day)
            || hour > 23
            || minute > 59
            || second > 60
        {
            return None;
        }

        let mut rest = text.get(19..)?;
        let mut millis = 0;
        if let Some(fraction) = rest.strip_prefix('.') {
            let digits = fraction.bytes().take_while(u8::is_ascii_digit).count();
            if digits == 0 {
                return None;
            }
            millis = format!("{:0<3}", &fraction[..digits.min(3)]).parse().ok()?;
            rest = &fraction[digits..];
        }
        let offset_minutes = match rest {
            "Z" | "z" => 0,
            _ => {
                let sign = match rest.as_bytes().first()? {
                    b'+' => 1,
                    b'-' => -1,
                    _ => return None,
                };
                if rest.len() != 6 || rest.as_bytes()[3] != b':' {
                    return None;
                }
                let hours: i64 = rest.get(1..3)?.parse().ok()?;
                let minutes: i64 = rest.get(4..6)?.parse().ok()?;
                sign * (hours * 60 + minutes)
            }
        };

        let seconds = days_from_civil(year, month, day) * 86_400
            + hour * 3_600
            + minute * 60
            + second
            - offset_minutes * 60;
        Some(seconds * 1_000 + millis)
    }

    /// Days since 1970-01-01 in the proleptic Gregorian calendar.
    fn days_from_civil(year: i64, month: i64, day: i64) -> i64 {
        let year = if month <= 2 { year - 1 } else { year };
        let era = year.div_euclid(400);
        let year_of_era = year - era * 400;
        let day_of_year = (153 * ((month + 9) % 12) + 2) / 5 + day - 1;
        let day_of_era = year_of_era * 365 + year_of_era / 4 - year_of_era / 100 + day_of_year;
        era * 146_097 + day_of_era - 719_468
    }
}

impl Lobby {
    /// Captures the full lobby state.
    pub fn to_document(&self) -> LobbyDocument {
        let players: Vec<PlayerDocument> =
            self.players.iter().map(|p| self.player_document(p)).collect();
        let snapshot = |id: &Option<PlayerId>| {
            id.as_ref().map(|id| {
                players
                    .iter()
                    .find(|p| p.id == id.0)
                    .cloned()
                    .unwrap_or_else(|| PlayerDocument::reference(id))
            })
        };

        LobbyDocument {
            lobby_id: self.id.0.clone(),
            editable_lobby_settings: Some(self.settings.clone()),
            drawing_time_new: self.drawing_time_new,
            custom_words: non_empty(self.custom_words.clone()),
            words: non_empty(self.words.clone()),
            state: self.state.as_str().to_string(),
            drawer: Some(snapshot(&self.drawer)),
            owner: snapshot(&self.owner),
            creator: snapshot(&self.creator),
            players: non_empty(players),
            current_word: self.current_word.clone(),
            word_hints: non_empty(self.word_hints.clone()),
            word_hints_shown: non_empty(self.word_hints_shown.clone()),
            hints_left: self.hints_left,
            hint_count: self.hint_count,
            round: self.round,
            word_choice: non_empty(self.word_choice.clone()),
            wordpack: self.word_pack.name().to_string(),
            round_end_time: self.round_end_time,
            time_left_ticker: serde_json::Value::Null,
            score_earned_by_guessers: self.score_earned_by_guessers,
            current_drawing: non_empty(self.current_drawing.clone()),
            lowercaser: serde_json::Value::Object(serde_json::Map::new()),
            last_player_disconnect_time: self.last_player_disconnect_time,
        }
    }

    fn player_document(&self, player: &Player) -> PlayerDocument {
        let voted: BTreeMap<String, bool> = self
            .players
            .iter()
            .filter(|target| target.votes_for_kick.contains(&player.id))
            .map(|target| (target.id.0.clone(), true))
            .collect();
        PlayerDocument {
            user_session: player.session.clone(),
            last_known_address: player.last_known_address.clone(),
            disconnect_time: player.disconnect_time,
            voted_for_kick: (!voted.is_empty()).then_some(voted),
            id: player.id.0.clone(),
            name: player.name.clone(),
            score: player.score,
            connected: player.connected,
            last_score: player.last_score,
            rank: player.rank,
            state: player.state.as_str().to_string(),
        }
    }

    /// Rebuilds a lobby from its stored form.
    ///
    /// Settings are taken as stored without re-validation. Every player
    /// comes back disconnected, with `now` as the start of their
    /// reconnect window, since no socket survives the move.
    pub fn from_document(
        doc: LobbyDocument,
        config: LobbyConfig,
        now: i64,
    ) -> Result<Self, LobbyError> {
        let state = LobbyState::from_tag(&doc.state)
            .ok_or_else(|| LobbyError::InvalidState(format!("unknown lobby state {:?}", doc.state)))?;
        let word_pack = WordPack::from_name(&doc.wordpack).unwrap_or_else(|| {
            warn!(lobby_id = %doc.lobby_id, wordpack = %doc.wordpack, "unknown word pack, using default");
            WordPack::default()
        });

        let stored = doc.players.unwrap_or_default();
        let mut players: Vec<Player> = stored
            .iter()
            .map(|p| Player {
                id: PlayerId(p.id.clone()),
                name: p.name.clone(),
                session: p.user_session.clone(),
                last_known_address: p.last_known_address.clone(),
                connected: false,
                disconnect_time: if p.connected { Some(now) } else { p.disconnect_time },
                score: p.score,
                last_score: p.last_score,
                rank: p.rank,
                votes_for_kick: BTreeSet::new(),
                state: PlayerState::from_tag(&p.state),
            })
            .collect();
        for voter in &stored {
            for (target, voted) in voter.voted_for_kick.iter().flatten() {
                if !voted {
                    continue;
                }
                if let Some(target) = players.iter_mut().find(|p| p.id.0 == *target) {
                    target.votes_for_kick.insert(PlayerId(voter.id.clone()));
                }
            }
        }

        let reference = |p: Option<PlayerDocument>| p.map(|p| PlayerId(p.id));
        let settings = doc.editable_lobby_settings.unwrap_or_default();
        let last_disconnect = if stored.iter().any(|p| p.connected) {
            Some(now)
        } else {
            doc.last_player_disconnect_time
        };

        Ok(Lobby {
            id: LobbyId(doc.lobby_id),
            drawing_time_new: doc.drawing_time_new,
            settings,
            custom_words: doc.custom_words.unwrap_or_default(),
            words: doc.words.unwrap_or_default(),
            word_pack,
            folder: word_pack.folder(),
            players,
            state,
            drawer: reference(doc.drawer.flatten()),
            owner: reference(doc.owner),
            creator: reference(doc.creator),
            current_word: doc.current_word,
            word_hints: doc.word_hints.unwrap_or_default(),
            word_hints_shown: doc.word_hints_shown.unwrap_or_default(),
            hints_left: doc.hints_left,
            hint_count: doc.hint_count,
            round: doc.round,
            word_choice: doc.word_choice.unwrap_or_default(),
            round_end_time: doc.round_end_time,
            score_earned_by_guessers: doc.score_earned_by_guessers,
            current_drawing: doc.current_drawing.unwrap_or_default(),
            last_player_disconnect_time: last_disconnect,
            created_at: now,
            config,
            rng: StdRng::from_os_rng(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ClientEvent;

    const T0: i64 = 1_700_000_000_000;

    fn started_lobby() -> (Lobby, PlayerId, PlayerId) {
        let mut lobby = Lobby::new(
            LobbyId::from("doc"),
            LobbySettings::default(),
            WordPack::German,
            vec!["Zeppelin".into()],
            LobbyConfig::default(),
            T0,
        )
        .unwrap()
        .with_seed(3);
        let a = lobby.join("anna", "1").unwrap().player_id;
        let b = lobby.join("ben", "2").unwrap().player_id;
        lobby.connect(&a, T0).unwrap();
        lobby.connect(&b, T0).unwrap();
        lobby.handle_event(&a, ClientEvent::Start, T0).unwrap();
        lobby.handle_event(&a, ClientEvent::ChooseWord(0), T0).unwrap();
        (lobby, a, b)
    }

    #[test]
    fn test_document_field_order() {
        let (lobby, _, _) = started_lobby();
        let json = serde_json::to_string(&lobby.to_document()).unwrap();
        let keys = [
            "\"LobbyID\"",
            "\"EditableLobbySettings\"",
            "\"DrawingTimeNew\"",
            "\"CustomWords\"",
            "\"Words\"",
            "\"Players\"",
            "\"Drawer\"",
            "\"Owner\"",
            "\"Creator\"",
            "\"CurrentWord\"",
            "\"WordHints\"",
            "\"WordHintsShown\"",
            "\"Wordpack\"",
            "\"TimeLeftTicker\":null",
            "\"Lowercaser\":{}",
            "\"LastPlayerDisconnectTime\"",
        ];
        let positions: Vec<usize> = keys.iter().map(|k| json.find(k).unwrap()).collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]), "{json}");
    }

    #[test]
    fn test_document_without_drawer_writes_null() {
        let lobby = Lobby::new(
            LobbyId::from("idle"),
            LobbySettings::default(),
            WordPack::English,
            Vec::new(),
            LobbyConfig::default(),
            T0,
        )
        .unwrap();
        let json = serde_json::to_string(&lobby.to_document()).unwrap();
        assert!(json.contains("\"Drawer\":null"));
        assert!(json.contains("\"Owner\":null"));
    }

    fn stored_json(drawer: &str) -> String {
        format!(
            concat!(
                r#"{{"LobbyID":"x","EditableLobbySettings":null,"DrawingTimeNew":0,"#,
                r#""CustomWords":null,"Words":null,"Players":null,"State":"unstarted","#,
                r#"{}"Owner":null,"Creator":null,"CurrentWord":"","WordHints":null,"#,
                r#""WordHintsShown":null,"HintsLeft":0,"HintCount":0,"Round":0,"#,
                r#""WordChoice":null,"Wordpack":"english","RoundEndTime":0,"#,
                r#""TimeLeftTicker":null,"ScoreEarnedByGuessers":0,"CurrentDrawing":null,"#,
                r#""Lowercaser":{{}},"LastPlayerDisconnectTime":null}}"#
            ),
            drawer
        )
    }

    #[test]
    fn test_document_null_drawer_round_trips_byte_identical() {
        let json = stored_json(r#""Drawer":null,"#);
        let doc: LobbyDocument = serde_json::from_str(&json).unwrap();
        assert_eq!(doc.drawer, Some(None));
        assert_eq!(serde_json::to_string(&doc).unwrap(), json);
    }

    #[test]
    fn test_document_absent_drawer_round_trips_byte_identical() {
        let json = stored_json("");
        let doc: LobbyDocument = serde_json::from_str(&json).unwrap();
        assert_eq!(doc.drawer, None);
        assert_eq!(serde_json::to_string(&doc).unwrap(), json);
    }

    #[test]
    fn test_document_rfc3339_timestamps_read_as_millis() {
        let json = stored_json("").replace(
            r#""LastPlayerDisconnectTime":null"#,
            r#""LastPlayerDisconnectTime":"2023-11-14T23:13:20.5+01:00""#,
        );
        let doc: LobbyDocument = serde_json::from_str(&json).unwrap();
        assert_eq!(doc.last_player_disconnect_time, Some(T0 + 500));
        let written = serde_json::to_string(&doc).unwrap();
        assert!(written.contains(&format!(r#""LastPlayerDisconnectTime":{}"#, T0 + 500)));
    }

    #[test]
    fn test_parse_rfc3339_accepts_go_formats() {
        assert_eq!(timestamp::parse_rfc3339("2023-11-14T22:13:20Z"), Some(T0));
        assert_eq!(
            timestamp::parse_rfc3339("2023-11-14T22:13:20.123456789Z"),
            Some(T0 + 123)
        );
        assert_eq!(timestamp::parse_rfc3339("2023-11-14T17:13:20-05:00"), Some(T0));
        assert_eq!(timestamp::parse_rfc3339("1970-01-01T00:00:00Z"), Some(0));
        assert_eq!(timestamp::parse_rfc3339("1969-12-31T23:59:59Z"), Some(-1_000));
        assert_eq!(timestamp::parse_rfc3339("2024-02-29T00:00:00Z"), Some(1_709_164_800_000));
    }

    #[test]
    fn test_parse_rfc3339_rejects_garbage() {
        assert_eq!(timestamp::parse_rfc3339("yesterday"), None);
        assert_eq!(timestamp::parse_rfc3339("2023-13-14T22:13:20Z"), None);
        assert_eq!(timestamp::parse_rfc3339("2023-11-14T22:13:20"), None);
        assert_eq!(timestamp::parse_rfc3339("2023-11-14T22:13:20.Z"), None);
    }

    #[test]
    fn test_lobby_survives_document_round_trip() {
        let (lobby, a, b) = started_lobby();
        let doc = lobby.to_document();
        let restored = Lobby::from_document(doc.clone(), LobbyConfig::default(), T0 + 5).unwrap();

        assert_eq!(restored.state(), LobbyState::Ongoing);
        assert_eq!(restored.drawer(), Some(&a));
        assert_eq!(restored.current_word(), lobby.current_word());
        assert_eq!(restored.word_pack(), WordPack::German);
        assert_eq!(
            restored.player(&b).unwrap().session(),
            lobby.player(&b).unwrap().session()
        );
        // No socket survives, so everyone is inside a reconnect window.
        assert!(restored.players().iter().all(|p| !p.connected));
        assert_eq!(restored.player(&a).unwrap().disconnect_time, Some(T0 + 5));
    }

    #[test]
    fn test_kick_votes_stored_by_voter() {
        let (mut lobby, a, b) = started_lobby();
        let c = lobby.join("cleo", "3").unwrap().player_id;
        lobby.connect(&c, T0).unwrap();
        lobby.handle_event(&b, ClientEvent::KickVote(c.clone()), T0).unwrap();

        let doc = lobby.to_document();
        let players = doc.players.clone().unwrap();
        let voter = players.iter().find(|p| p.id == b.0).unwrap();
        assert_eq!(voter.voted_for_kick.as_ref().unwrap().get(&c.0), Some(&true));

        let restored = Lobby::from_document(doc, LobbyConfig::default(), T0).unwrap();
        assert!(restored.player(&c).unwrap().votes_for_kick.contains(&b));
        assert!(restored.player(&a).unwrap().votes_for_kick.is_empty());
    }

    #[test]
    fn test_unknown_state_rejected() {
        let (lobby, _, _) = started_lobby();
        let mut doc = lobby.to_document();
        doc.state = "paused".into();
        assert!(matches!(
            Lobby::from_document(doc, LobbyConfig::default(), T0),
            Err(LobbyError::InvalidState(_))
        ));
    }
}
