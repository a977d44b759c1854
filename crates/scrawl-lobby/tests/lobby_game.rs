//! Integration tests for the lobby engine and its actor.

use std::sync::{Arc, Mutex};

use scrawl_lobby::{
    ActorContext, ClientEvent, Dispatch, Lobby, LobbyActor, LobbyConfig, LobbyDocument,
    LobbyError, LobbyHandle, LobbySettings, LobbyState, ManualClock, NoPersistence, Persister,
    PlayerState, ScoreRules, SessionIndex, WordPack,
};
use scrawl_protocol::{LobbyId, NoTrace, PlayerId};
use serde_json::Value;

const T0: i64 = 1_700_000_000_000;

// =========================================================================
// Mock dispatch: records every frame and close per player.
// =========================================================================

#[derive(Default)]
struct Recorder {
    frames: Mutex<Vec<(PlayerId, String)>>,
    closed: Mutex<Vec<PlayerId>>,
}

impl Dispatch for Recorder {
    fn deliver(&self, player: &PlayerId, frame: &str) {
        self.frames
            .lock()
            .unwrap()
            .push((player.clone(), frame.to_string()));
    }

    fn close(&self, player: &PlayerId) {
        self.closed.lock().unwrap().push(player.clone());
    }
}

impl Recorder {
    fn raw_for(&self, player: &PlayerId) -> Vec<String> {
        self.frames
            .lock()
            .unwrap()
            .iter()
            .filter(|(p, _)| p == player)
            .map(|(_, f)| f.clone())
            .collect()
    }

    fn frames_for(&self, player: &PlayerId) -> Vec<Value> {
        self.raw_for(player)
            .iter()
            .map(|f| serde_json::from_str(f).unwrap())
            .collect()
    }

    fn kinds_for(&self, player: &PlayerId) -> Vec<String> {
        self.frames_for(player)
            .iter()
            .map(|v| v["type"].as_str().unwrap().to_string())
            .collect()
    }

    fn was_closed(&self, player: &PlayerId) -> bool {
        self.closed.lock().unwrap().contains(player)
    }
}

/// A store that always fails.
struct BrokenStore;

impl Persister for BrokenStore {
    async fn persist(&self, _doc: LobbyDocument) -> Result<(), LobbyError> {
        Err(LobbyError::Persistence("disk on fire".into()))
    }

    async fn remove(&self, _id: &LobbyId) -> Result<(), LobbyError> {
        Err(LobbyError::Persistence("disk on fire".into()))
    }
}

// =========================================================================
// Helpers
// =========================================================================

fn settings(max_players: usize, rounds: u32) -> LobbySettings {
    LobbySettings {
        max_players,
        rounds,
        ..LobbySettings::default()
    }
}

fn new_lobby(settings: LobbySettings, config: LobbyConfig) -> Lobby {
    Lobby::new(
        LobbyId::from("it"),
        settings,
        WordPack::English,
        Vec::new(),
        config,
        T0,
    )
    .unwrap()
    .with_seed(42)
}

fn spawn_with<P: Persister>(
    lobby: Lobby,
    persister: P,
    clock: &ManualClock,
) -> (LobbyHandle, Arc<Recorder>, SessionIndex) {
    let recorder = Arc::new(Recorder::default());
    let sessions = SessionIndex::new();
    let handle = LobbyActor::spawn(
        lobby,
        ActorContext {
            persister: Arc::new(persister),
            dispatch: recorder.clone(),
            sessions: sessions.clone(),
            trace: Arc::new(NoTrace),
            clock: Arc::new(clock.clone()),
            timer: false,
        },
    );
    (handle, recorder, sessions)
}

fn spawn(lobby: Lobby, clock: &ManualClock) -> (LobbyHandle, Arc<Recorder>, SessionIndex) {
    spawn_with(lobby, NoPersistence, clock)
}

fn event(kind: &str, data: Value) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({ "type": kind, "data": data })).unwrap()
}

async fn join_connected(handle: &LobbyHandle, name: &str, address: &str) -> (PlayerId, String) {
    let ticket = handle.join(name, address).await.unwrap();
    handle.connect(ticket.player_id.clone(), 0).await.unwrap();
    (ticket.player_id, ticket.session)
}

fn doc_player<'a>(doc: &'a LobbyDocument, id: &PlayerId) -> &'a scrawl_lobby::PlayerDocument {
    doc.players
        .as_ref()
        .unwrap()
        .iter()
        .find(|p| p.id == id.0)
        .unwrap()
}

// =========================================================================
// Two-player game through the actor
// =========================================================================

#[tokio::test]
async fn test_two_player_game_line_relay_and_guess_scores() {
    let clock = ManualClock::new(T0);
    let (handle, recorder, _) = spawn(new_lobby(settings(2, 1), LobbyConfig::default()), &clock);

    let (a, _) = join_connected(&handle, "alice", "10.0.0.1").await;
    let (b, _) = join_connected(&handle, "bob", "10.0.0.2").await;
    assert!(matches!(
        handle.join("carol", "10.0.0.3").await,
        Err(LobbyError::Full(_))
    ));

    handle.send_event(a.clone(), event("start", Value::Null)).await.unwrap();
    let info = handle.info().await.unwrap();
    assert_eq!(info.state, LobbyState::Ongoing);
    let drawer = info.drawer.clone().unwrap();
    assert!(drawer == a || drawer == b);
    let guesser = if drawer == a { b.clone() } else { a.clone() };
    assert!(recorder.kinds_for(&drawer).contains(&"your-turn".to_string()));

    handle
        .send_event(drawer.clone(), event("choose-word", serde_json::json!(0)))
        .await
        .unwrap();
    let line = r#"{"type":"line","data":{"fromX":1,"fromY":2.5,"toX":3,"toY":4,"color":{"r":255,"g":127,"b":0},"lineWidth":5}}"#;
    handle
        .send_event(drawer.clone(), line.as_bytes().to_vec())
        .await
        .unwrap();

    let doc = handle.snapshot().await.unwrap();
    let word = doc.current_word.clone();
    assert!(!word.is_empty());

    let expected = format!("{},\"traceId\":\"\",\"spanId\":\"\"}}", &line[..line.len() - 1]);
    assert!(recorder.raw_for(&guesser).contains(&expected));
    assert!(!recorder.raw_for(&drawer).contains(&expected));

    clock.advance(10_000);
    handle
        .send_event(guesser.clone(), event("message", Value::String(word.to_uppercase())))
        .await
        .unwrap();

    let doc = handle.snapshot().await.unwrap();
    assert!(doc_player(&doc, &guesser).score > 0);
    // The only guesser got it, so the turn moved on.
    assert_ne!(doc.current_word, word);
    assert!(recorder.kinds_for(&drawer).contains(&"correct-guess".to_string()));
}

// =========================================================================
// Serializability
// =========================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_events_match_sequential_replay() {
    let mut lobby = new_lobby(settings(8, 3), LobbyConfig::default());
    let mut ids = Vec::new();
    for (i, name) in ["ann", "ben", "cal", "dee"].iter().enumerate() {
        let ticket = lobby.join(name, &format!("10.0.0.{i}")).unwrap();
        lobby.connect(&ticket.player_id, T0).unwrap();
        ids.push(ticket.player_id);
    }
    let (a, b, c) = (ids[0].clone(), ids[1].clone(), ids[2].clone());
    lobby.handle_event(&a, ClientEvent::Start, T0).unwrap();
    lobby.handle_event(&a, ClientEvent::ChooseWord(0), T0).unwrap();
    let word = lobby.current_word().to_string();
    let mut replay = lobby.clone();

    let clock = ManualClock::new(T0 + 5_000);
    let (handle, recorder, _) = spawn(lobby, &clock);

    let mut tasks = Vec::new();
    for sender in [b.clone(), c.clone()] {
        let handle = handle.clone();
        let word = word.clone();
        tasks.push(tokio::spawn(async move {
            for i in 0..12 {
                let text = if i == 6 {
                    word.clone()
                } else {
                    format!("chat line number {i} from {sender}")
                };
                handle
                    .send_event(sender.clone(), event("message", Value::String(text)))
                    .await
                    .unwrap();
                tokio::task::yield_now().await;
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }
    let concurrent = handle.snapshot().await.unwrap();

    // The drawer sees every message in the order the actor applied them.
    for frame in recorder.frames_for(&a) {
        let (author, text) = match frame["type"].as_str().unwrap() {
            "message" | "non-guessing-player-message" => (
                frame["data"]["authorId"].as_str().unwrap().to_string(),
                frame["data"]["content"].as_str().unwrap().to_string(),
            ),
            "correct-guess" => (frame["data"].as_str().unwrap().to_string(), word.clone()),
            _ => continue,
        };
        replay
            .handle_event(&PlayerId(author), ClientEvent::Message(text), T0 + 5_000)
            .unwrap();
    }

    assert_eq!(
        serde_json::to_string(&concurrent).unwrap(),
        serde_json::to_string(&replay.to_document()).unwrap()
    );
    assert_eq!(doc_player(&concurrent, &b).state, "standby");
    assert_eq!(doc_player(&concurrent, &c).state, "standby");
}

// =========================================================================
// Invariants over a whole game
// =========================================================================

fn assert_single_drawer(lobby: &Lobby) {
    let drawing: Vec<&PlayerId> = lobby
        .players()
        .iter()
        .filter(|p| p.state == PlayerState::Drawing)
        .map(|p| &p.id)
        .collect();
    if lobby.state() == LobbyState::Ongoing {
        let drawer = lobby.drawer().expect("ongoing lobby has a drawer");
        assert_eq!(drawing, vec![drawer]);
    } else {
        assert!(lobby.drawer().is_none());
        assert!(drawing.is_empty());
    }
}

#[test]
fn test_full_game_keeps_exactly_one_drawer() {
    let mut lobby = new_lobby(settings(4, 2), LobbyConfig::default());
    let ids: Vec<PlayerId> = ["ann", "ben", "cal"]
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let ticket = lobby.join(name, &format!("10.0.1.{i}")).unwrap();
            lobby.connect(&ticket.player_id, T0).unwrap();
            ticket.player_id
        })
        .collect();
    assert_single_drawer(&lobby);
    lobby.handle_event(&ids[0], ClientEvent::Start, T0).unwrap();

    let mut now = T0;
    let mut turns = 0;
    let mut drawers = Vec::new();
    while lobby.state() == LobbyState::Ongoing {
        assert_single_drawer(&lobby);
        assert!(turns < 50, "game never ended");
        if lobby.current_word().is_empty() {
            drawers.push(lobby.drawer().unwrap().clone());
            now = lobby.round_end_time();
            lobby.tick(now);
            turns += 1;
            continue;
        }
        assert_single_drawer(&lobby);
        // One player guesses, the other runs out of time.
        let guesser = lobby
            .players()
            .iter()
            .find(|p| p.state == PlayerState::Guessing)
            .map(|p| p.id.clone())
            .unwrap();
        now += 1_000;
        let word = lobby.current_word().to_string();
        lobby.handle_event(&guesser, ClientEvent::Message(word), now).unwrap();
        assert_single_drawer(&lobby);
        now = lobby.round_end_time();
        lobby.tick(now);
    }

    assert_single_drawer(&lobby);
    assert_eq!(lobby.state(), LobbyState::GameOver);
    // 3 players × 2 rounds, each drawing once per round in join order.
    assert_eq!(drawers.len(), 6);
    assert_eq!(&drawers[..3], &ids[..]);
    assert_eq!(&drawers[3..], &ids[..]);
    // Ranks are a permutation of 1..=3.
    let mut ranks: Vec<u32> = lobby.players().iter().map(|p| p.rank).collect();
    ranks.sort();
    assert_eq!(ranks, vec![1, 2, 3]);
}

#[test]
fn test_guesser_points_never_exceed_pool() {
    let config = LobbyConfig {
        score: ScoreRules {
            order_decay: 1.0,
            ..ScoreRules::default()
        },
        ..LobbyConfig::default()
    };
    let mut lobby = new_lobby(settings(8, 1), config);
    let ids: Vec<PlayerId> = (0..5)
        .map(|i| {
            let ticket = lobby.join(&format!("p{i}"), &format!("10.0.2.{i}")).unwrap();
            lobby.connect(&ticket.player_id, T0).unwrap();
            ticket.player_id
        })
        .collect();
    lobby.handle_event(&ids[0], ClientEvent::Start, T0).unwrap();
    lobby.handle_event(&ids[0], ClientEvent::ChooseWord(0), T0).unwrap();
    let word = lobby.current_word().to_string();

    for guesser in &ids[1..4] {
        lobby
            .handle_event(guesser, ClientEvent::Message(word.clone()), T0)
            .unwrap();
    }
    let awarded: u32 = ids[1..4]
        .iter()
        .map(|id| lobby.player(id).unwrap().score)
        .sum();
    assert_eq!(awarded, ScoreRules::default().pool);
    assert_eq!(lobby.player(&ids[3]).unwrap().score, 0);
}

// =========================================================================
// Disconnect, reconnect, and grace expiry
// =========================================================================

#[tokio::test]
async fn test_reconnect_within_grace_keeps_score_rank_and_votes() {
    let clock = ManualClock::new(T0);
    let (handle, _recorder, sessions) =
        spawn(new_lobby(settings(6, 2), LobbyConfig::default()), &clock);
    let (a, _) = join_connected(&handle, "ann", "10.0.3.1").await;
    let (b, b_session) = join_connected(&handle, "ben", "10.0.3.2").await;
    let (c, _) = join_connected(&handle, "cal", "10.0.3.3").await;
    assert_eq!(sessions.lookup(&b_session), Some((LobbyId::from("it"), b.clone())));

    handle.send_event(a.clone(), event("start", Value::Null)).await.unwrap();
    handle
        .send_event(a.clone(), event("choose-word", serde_json::json!(0)))
        .await
        .unwrap();
    let word = handle.snapshot().await.unwrap().current_word;
    clock.advance(2_000);
    handle
        .send_event(b.clone(), event("message", Value::String(word)))
        .await
        .unwrap();
    handle
        .send_event(c.clone(), event("kick-vote", Value::String(b.0.clone())))
        .await
        .unwrap();
    let before = handle.snapshot().await.unwrap();

    clock.advance(1_000);
    handle.disconnect(b.clone(), 0).await.unwrap();
    assert!(matches!(
        handle.rejoin("not-a-session", "10.0.3.2").await,
        Err(LobbyError::UnknownSession)
    ));
    clock.advance(30_000);
    handle.tick().await.unwrap();
    assert_eq!(handle.rejoin(&b_session, "10.0.3.9").await.unwrap(), b);
    handle.connect(b.clone(), 1).await.unwrap();

    let after = handle.snapshot().await.unwrap();
    let (old, new) = (doc_player(&before, &b), doc_player(&after, &b));
    assert_eq!(new.score, old.score);
    assert_eq!(new.rank, old.rank);
    assert!(new.connected);
    assert_eq!(new.last_known_address, "10.0.3.9");
    // c's vote against b survived the round trip.
    assert_eq!(
        doc_player(&after, &c).voted_for_kick,
        doc_player(&before, &c).voted_for_kick
    );
    assert!(doc_player(&after, &c).voted_for_kick.is_some());
}

#[tokio::test]
async fn test_drawer_grace_expiry_removes_and_ends_turn() {
    let clock = ManualClock::new(T0);
    let (handle, recorder, sessions) =
        spawn(new_lobby(settings(6, 2), LobbyConfig::default()), &clock);
    let (a, a_session) = join_connected(&handle, "ann", "10.0.4.1").await;
    let (b, _) = join_connected(&handle, "ben", "10.0.4.2").await;
    let (c, _) = join_connected(&handle, "cal", "10.0.4.3").await;

    handle.send_event(a.clone(), event("start", Value::Null)).await.unwrap();
    handle
        .send_event(a.clone(), event("choose-word", serde_json::json!(0)))
        .await
        .unwrap();
    handle.disconnect(a.clone(), 0).await.unwrap();

    clock.advance(59_000);
    handle.tick().await.unwrap();
    assert_eq!(handle.info().await.unwrap().drawer, Some(a.clone()));

    clock.advance(1_000);
    handle.tick().await.unwrap();
    let info = handle.info().await.unwrap();
    assert_eq!(info.player_count, 2);
    assert_eq!(info.drawer, Some(b.clone()));
    assert_eq!(info.owner, Some(b.clone()));
    assert!(recorder.was_closed(&a));
    assert!(sessions.lookup(&a_session).is_none());
    assert!(recorder.kinds_for(&c).contains(&"drawer-kicked".to_string()));
}

#[tokio::test]
async fn test_disconnect_of_replaced_socket_keeps_player_connected() {
    let clock = ManualClock::new(T0);
    let (handle, _recorder, _sessions) =
        spawn(new_lobby(settings(6, 2), LobbyConfig::default()), &clock);
    let ticket = handle.join("ann", "10.0.5.1").await.unwrap();
    let a = ticket.player_id;
    handle.connect(a.clone(), 7).await.unwrap();

    // Reconnect lands before the old socket's disconnect.
    handle.connect(a.clone(), 8).await.unwrap();
    handle.disconnect(a.clone(), 7).await.unwrap();
    assert_eq!(handle.info().await.unwrap().connected_count, 1);

    handle.disconnect(a.clone(), 8).await.unwrap();
    assert_eq!(handle.info().await.unwrap().connected_count, 0);
}

#[tokio::test]
async fn test_attach_remote_into_full_lobby_is_refused_and_closed() {
    let clock = ManualClock::new(T0);
    let (handle, recorder, _sessions) =
        spawn(new_lobby(settings(2, 2), LobbyConfig::default()), &clock);
    join_connected(&handle, "ann", "10.0.6.1").await;
    join_connected(&handle, "ben", "10.0.6.2").await;

    let stranger = PlayerId::generate();
    let result = handle
        .attach_remote(stranger.clone(), "cal", "s-cal", "10.0.6.3")
        .await;

    assert!(matches!(result, Err(LobbyError::Full(_))));
    assert!(recorder.was_closed(&stranger));
    assert_eq!(handle.info().await.unwrap().player_count, 2);
}

// =========================================================================
// Vote kick, errors, persistence failures
// =========================================================================

#[tokio::test]
async fn test_vote_kick_majority_closes_socket() {
    let clock = ManualClock::new(T0);
    let (handle, recorder, _) = spawn(new_lobby(settings(6, 2), LobbyConfig::default()), &clock);
    let (a, _) = join_connected(&handle, "ann", "10.0.5.1").await;
    let (b, _) = join_connected(&handle, "ben", "10.0.5.2").await;
    let (c, _) = join_connected(&handle, "cal", "10.0.5.3").await;

    handle
        .send_event(a.clone(), event("kick-vote", Value::String(c.0.clone())))
        .await
        .unwrap();
    assert_eq!(handle.info().await.unwrap().player_count, 3);
    let vote = recorder
        .frames_for(&b)
        .into_iter()
        .find(|f| f["type"] == "kick-vote")
        .unwrap();
    assert_eq!(vote["data"]["voteCount"], 1);
    assert_eq!(vote["data"]["requiredVoteCount"], 2);

    handle
        .send_event(b.clone(), event("kick-vote", Value::String(c.0.clone())))
        .await
        .unwrap();
    assert_eq!(handle.info().await.unwrap().player_count, 2);
    assert!(recorder.was_closed(&c));
}

#[tokio::test]
async fn test_malformed_event_gets_system_message_and_lobby_survives() {
    let clock = ManualClock::new(T0);
    let (handle, recorder, _) = spawn(new_lobby(settings(6, 2), LobbyConfig::default()), &clock);
    let (a, _) = join_connected(&handle, "ann", "10.0.6.1").await;

    handle.send_event(a.clone(), b"{not json".to_vec()).await.unwrap();
    handle
        .send_event(a.clone(), event("teleport", Value::Null))
        .await
        .unwrap();
    handle.send_event(a.clone(), event("start", Value::Null)).await.unwrap();

    let errors: Vec<Value> = recorder
        .frames_for(&a)
        .into_iter()
        .filter(|f| f["type"] == "system-message")
        .collect();
    assert_eq!(errors.len(), 3);
    assert!(errors[2]["data"].as_str().unwrap().contains("two connected players"));
    assert_eq!(handle.info().await.unwrap().state, LobbyState::Unstarted);
}

#[tokio::test]
async fn test_persistence_failure_is_reported_not_fatal() {
    let clock = ManualClock::new(T0);
    let (handle, _, _) = spawn_with(
        new_lobby(settings(6, 2), LobbyConfig::default()),
        BrokenStore,
        &clock,
    );
    let (a, _) = join_connected(&handle, "ann", "10.0.7.1").await;

    assert!(matches!(
        handle.persist().await,
        Err(LobbyError::Persistence(_))
    ));
    let (b, _) = join_connected(&handle, "ben", "10.0.7.2").await;
    handle.send_event(a.clone(), event("start", Value::Null)).await.unwrap();
    let info = handle.info().await.unwrap();
    assert_eq!(info.state, LobbyState::Ongoing);
    assert!(info.drawer == Some(a) || info.drawer == Some(b));
}

#[tokio::test]
async fn test_shutdown_closes_sockets_and_stops_actor() {
    let clock = ManualClock::new(T0);
    let (handle, recorder, sessions) =
        spawn(new_lobby(settings(6, 2), LobbyConfig::default()), &clock);
    let (a, session) = join_connected(&handle, "ann", "10.0.8.1").await;

    handle.shutdown(true).await.unwrap();
    assert!(recorder.was_closed(&a));
    assert!(sessions.lookup(&session).is_none());
    assert!(matches!(
        handle.info().await,
        Err(LobbyError::Unavailable(_))
    ));
}
