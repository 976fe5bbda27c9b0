use std::{collections::HashSet, sync::Arc, time::Duration};

use alias_game_back::{
    config::{AppConfig, FallbackWords},
    dao::{
        cache::MemoryCache,
        models::{RoomEntity, RoomStatus, TeamSide, WordEntity},
        room_store::{DurableBackend, MemoryRoomStore, StaticLexicon},
    },
    dto::identity::Identity,
    error::ServiceError,
    services::{
        broadcaster::ConnectionHandle,
        game_service::{self, AnswerOutcome},
        reconcile,
        room_service::{self, LeaveOutcome},
        websocket_service::{self, SocketSession},
    },
    state::{AppState, SharedState, game::Game, state_machine::GameState},
};
use axum::extract::ws::Message;
use serde_json::Value;
use tokio::sync::mpsc::{self, UnboundedReceiver};

fn words() -> Vec<WordEntity> {
    [
        ("w1", "guitar", &["strings", "music"][..], "banjo"),
        ("w2", "volcano", &["lava", "eruption"], "geyser"),
        ("w3", "penguin", &["bird", "ice"], "puffin"),
        ("w4", "honey", &["bee", "sweet"], "syrup"),
        ("w5", "castle", &["king", "tower"], "palace"),
        ("w6", "rocket", &["space", "launch"], "missile"),
        ("w7", "pirate", &["ship", "treasure"], "sailor"),
        ("w8", "coffee", &["cup", "morning"], "espresso"),
        ("w9", "desert", &["sand", "camel"], "dune"),
        ("w10", "library", &["book", "quiet"], "bookshop"),
        ("w11", "umbrella", &["rain", "open"], "parasol"),
        ("w12", "mirror", &["reflection", "glass"], "window"),
    ]
    .into_iter()
    .map(|(id, word, taboo, similar)| WordEntity {
        id: id.into(),
        word: word.into(),
        taboo_words: taboo.iter().map(|t| (*t).to_owned()).collect(),
        similar_words: vec![similar.to_owned()],
    })
    .collect()
}

fn config() -> AppConfig {
    AppConfig {
        words: FallbackWords(words()),
        ..AppConfig::default()
    }
}

struct Harness {
    state: SharedState,
    cache: MemoryCache,
    rooms: Arc<MemoryRoomStore>,
}

async fn harness() -> Harness {
    let cache = MemoryCache::new();
    let rooms = Arc::new(MemoryRoomStore::new());
    let state = attach(&cache, &rooms).await;
    Harness {
        state,
        cache,
        rooms,
    }
}

async fn attach(cache: &MemoryCache, rooms: &Arc<MemoryRoomStore>) -> SharedState {
    let state = AppState::new(config(), Arc::new(cache.clone()));
    state
        .install_durable(DurableBackend {
            rooms: rooms.clone(),
            lexicon: Arc::new(StaticLexicon::new(words())),
        })
        .await;
    state
}

fn user(id: &str) -> Identity {
    Identity::new(id, Some(format!("Player {id}")), None)
}

async fn connect(state: &SharedState, user_id: &str) -> UnboundedReceiver<Message> {
    let connection_id = format!("conn-{user_id}");
    state
        .presence()
        .register(user_id, &connection_id, false)
        .await
        .unwrap();
    let (tx, rx) = mpsc::unbounded_channel();
    state
        .broadcaster()
        .register(ConnectionHandle::new(connection_id, user_id.into(), tx));
    rx
}

fn drain(rx: &mut UnboundedReceiver<Message>) -> Vec<Value> {
    let mut events = Vec::new();
    while let Ok(message) = rx.try_recv() {
        if let Message::Text(text) = message {
            events.push(serde_json::from_str(text.as_str()).unwrap());
        }
    }
    events
}

fn kinds(events: &[Value]) -> Vec<String> {
    events
        .iter()
        .map(|event| event["type"].as_str().unwrap().to_owned())
        .collect()
}

/// Host plus three players: A = [h, p2], B = [p1, p3].
async fn full_room(state: &SharedState) -> RoomEntity {
    let room = room_service::create_room(state, &user("h")).await.unwrap();
    for id in ["p1", "p2", "p3"] {
        room_service::join_room(state, &room.code, &user(id))
            .await
            .unwrap();
    }
    room_service::get_room(state, &room.code).await.unwrap()
}

fn teammate(game: &Game) -> String {
    game.teams
        .side(game.current_team)
        .players
        .iter()
        .find(|id| **id != game.current_describer)
        .cloned()
        .unwrap()
}

#[tokio::test]
async fn host_then_player_split_across_teams() {
    let Harness { state, .. } = harness().await;
    let mut host_rx = connect(&state, "h").await;

    let room = room_service::create_room(&state, &user("h")).await.unwrap();
    assert_eq!(room.teams.a, vec!["h".to_owned()]);
    assert!(room.teams.b.is_empty());
    assert_eq!(room.status, RoomStatus::Waiting);
    assert_eq!(room.code.len(), 5);

    let room = room_service::join_room(&state, &room.code, &user("p"))
        .await
        .unwrap();
    assert_eq!(room.teams.a, vec!["h".to_owned()]);
    assert_eq!(room.teams.b, vec!["p".to_owned()]);

    let events = drain(&mut host_rx);
    let kinds = kinds(&events);
    assert!(kinds.contains(&"player:joined".to_owned()));
    let last_state = events
        .iter()
        .rev()
        .find(|event| event["type"] == "team-state")
        .unwrap();
    assert_eq!(last_state["data"]["teams"]["B"][0], "p");
}

#[tokio::test]
async fn duplicate_join_conflicts_and_full_room_refuses() {
    let Harness { state, .. } = harness().await;
    let room = room_service::create_room(&state, &user("h")).await.unwrap();

    let err = room_service::join_room(&state, &room.code, &user("h"))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Conflict(_)));

    for n in 1..12 {
        room_service::join_room(&state, &room.code, &user(&format!("p{n}")))
            .await
            .unwrap();
    }
    let err = room_service::join_room(&state, &room.code, &user("late"))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Conflict(_)));
}

#[tokio::test]
async fn teams_stay_disjoint_through_switches_and_leaves() {
    let Harness { state, .. } = harness().await;
    let room = full_room(&state).await;
    let code = room.code.clone();
    room_service::join_room(&state, &code, &user("p4")).await.unwrap();

    room_service::update_teams(&state, &code, TeamSide::A, &user("p1"))
        .await
        .unwrap();
    room_service::update_teams(&state, &code, TeamSide::B, &user("h"))
        .await
        .unwrap();
    room_service::leave_room(&state, &code, &user("p2")).await.unwrap();

    let room = room_service::get_room(&state, &code).await.unwrap();
    let a: HashSet<_> = room.teams.a.iter().collect();
    let b: HashSet<_> = room.teams.b.iter().collect();
    assert!(a.is_disjoint(&b));
    let active: HashSet<_> = room
        .players
        .iter()
        .filter(|player| player.active)
        .map(|player| &player.id)
        .collect();
    let assigned: HashSet<_> = a.union(&b).copied().collect();
    assert_eq!(active, assigned);
    assert_eq!(room.teams.len(), 4);
}

#[tokio::test]
async fn leaving_twice_is_a_no_op() {
    let Harness { state, .. } = harness().await;
    let room = room_service::create_room(&state, &user("h")).await.unwrap();
    room_service::join_room(&state, &room.code, &user("p")).await.unwrap();

    let first = room_service::leave_room(&state, &room.code, &user("p"))
        .await
        .unwrap();
    let second = room_service::leave_room(&state, &room.code, &user("p"))
        .await
        .unwrap();
    assert_eq!(first, LeaveOutcome::Left);
    assert_eq!(second, LeaveOutcome::AlreadyInactive);

    let room = room_service::get_room(&state, &room.code).await.unwrap();
    assert_eq!(room.players.len(), 2);
    assert!(!room.players.iter().any(|player| player.id == "p" && player.active));
    assert!(room.teams.side_of("p").is_none());

    let rejoined = room_service::join_room(&state, &room.code, &user("p"))
        .await
        .unwrap();
    assert_eq!(rejoined.players.len(), 2);
}

#[tokio::test]
async fn last_player_leaving_closes_the_room() {
    let Harness { state, rooms, .. } = harness().await;
    let room = room_service::create_room(&state, &user("h")).await.unwrap();

    let outcome = room_service::leave_room(&state, &room.code, &user("h"))
        .await
        .unwrap();
    assert_eq!(outcome, LeaveOutcome::RoomClosed);

    let err = room_service::get_room(&state, &room.code).await.unwrap_err();
    assert!(matches!(err, ServiceError::RoomInactive(_)));
    use alias_game_back::dao::room_store::RoomStore;
    let stored = rooms.find_room(room.code.clone()).await.unwrap().unwrap();
    assert_eq!(stored.status, RoomStatus::Finished);
    assert!(state.locks().is_empty());
}

#[tokio::test]
async fn only_the_host_starts_and_teams_must_be_large_enough() {
    let Harness { state, .. } = harness().await;
    let room = room_service::create_room(&state, &user("h")).await.unwrap();
    room_service::join_room(&state, &room.code, &user("p1")).await.unwrap();

    let err = game_service::create_game(&state, &room.code, &user("h"))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Conflict(_)));

    for id in ["p2", "p3"] {
        room_service::join_room(&state, &room.code, &user(id)).await.unwrap();
    }
    let err = game_service::create_game(&state, &room.code, &user("p1"))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Forbidden(_)));

    let (room, game) = game_service::create_game(&state, &room.code, &user("h"))
        .await
        .unwrap();
    assert_eq!(room.status, RoomStatus::InGame);
    assert_eq!(game.state, GameState::Playing);
    assert!(game.word_to_guess.is_some());
    assert!(
        game.teams
            .side(game.current_team)
            .players
            .contains(&game.current_describer)
    );

    let err = room_service::update_teams(&state, &room.code, TeamSide::A, &user("p1"))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Conflict(_)));
}

#[tokio::test]
async fn two_turn_game_records_the_result() {
    let Harness { state, rooms, .. } = harness().await;
    let room = full_room(&state).await;
    let code = room.code.clone();
    game_service::create_game(&state, &code, &user("h")).await.unwrap();

    let game = game_service::load_game(&state, &code).await.unwrap();
    let scoring_side = game.current_team;
    let guesser = user(&teammate(&game));
    let secret = game.word_to_guess.clone().unwrap().word;
    let outcome = game_service::check_for_answer(&state, &code, &guesser, &secret.to_uppercase())
        .await
        .unwrap();
    assert_eq!(outcome, AnswerOutcome::Correct);

    let game = game_service::advance_turn(&state, &code, Some(0)).await.unwrap();
    assert_eq!(game.turns_played, 1);
    assert_eq!(game.current_team, scoring_side.other());
    assert_eq!(game.state, GameState::Playing);

    let game = game_service::advance_turn(&state, &code, Some(1)).await.unwrap();
    assert_eq!(game.turns_played, 2);
    assert_eq!(game.state, GameState::Finished);
    let used: HashSet<_> = game.words.used.iter().map(|word| word.id.clone()).collect();
    assert_eq!(used.len(), game.words.used.len());

    let room = room_service::get_room(&state, &code).await.unwrap();
    assert_eq!(room.status, RoomStatus::Waiting);
    assert_eq!(room.games.len(), 1);
    let expected = match scoring_side {
        TeamSide::A => (1, 0),
        TeamSide::B => (0, 1),
    };
    assert_eq!((room.games[0].a, room.games[0].b), expected);
    assert_eq!((room.global_score.a, room.global_score.b), expected);

    use alias_game_back::dao::room_store::RoomStore;
    let stored = rooms.find_room(code.clone()).await.unwrap().unwrap();
    assert_eq!(stored.games, room.games);

    let err = game_service::advance_turn(&state, &code, None).await.unwrap_err();
    assert!(matches!(err, ServiceError::Conflict(_)));
}

#[tokio::test]
async fn taboo_warning_reaches_only_the_describer() {
    let Harness { state, .. } = harness().await;
    let mut receivers = Vec::new();
    for id in ["h", "p1", "p2", "p3"] {
        receivers.push((id, connect(&state, id).await));
    }
    let room = full_room(&state).await;
    game_service::create_game(&state, &room.code, &user("h")).await.unwrap();
    let game = game_service::load_game(&state, &room.code).await.unwrap();
    let describer = game.current_describer.clone();
    let secret = game.word_to_guess.clone().unwrap();

    for (id, rx) in receivers.iter_mut() {
        let events = kinds(&drain(rx));
        assert!(events.contains(&"game:started".to_owned()));
        assert_eq!(events.contains(&"game:word".to_owned()), *id == describer);
    }

    let clue = format!("it is not a {}", secret.word);
    let outcome = game_service::check_for_answer(&state, &room.code, &user(&describer), &clue)
        .await
        .unwrap();
    assert_eq!(outcome, AnswerOutcome::Taboo { word: secret.word.clone() });

    for (id, rx) in receivers.iter_mut() {
        let events = kinds(&drain(rx));
        if *id == describer {
            assert_eq!(events, vec!["game:taboo-word".to_owned()]);
        } else {
            assert!(events.is_empty(), "{id} saw {events:?}");
        }
    }
    let after = game_service::load_game(&state, &room.code).await.unwrap();
    assert_eq!(after.scores(), game.scores());
}

#[tokio::test]
async fn guesses_from_outside_the_playing_team_are_ignored() {
    let Harness { state, .. } = harness().await;
    let room = full_room(&state).await;
    game_service::create_game(&state, &room.code, &user("h")).await.unwrap();
    let game = game_service::load_game(&state, &room.code).await.unwrap();
    let secret = game.word_to_guess.clone().unwrap().word;
    let outsider = game.teams.side(game.current_team.other()).players[0].clone();

    let outcome = game_service::check_for_answer(&state, &room.code, &user(&outsider), &secret)
        .await
        .unwrap();
    assert_eq!(outcome, AnswerOutcome::Invalid);

    let outcome =
        game_service::check_for_answer(&state, &room.code, &user(&teammate(&game)), "something else")
            .await
            .unwrap();
    assert_eq!(outcome, AnswerOutcome::Incorrect);
    let after = game_service::load_game(&state, &room.code).await.unwrap();
    assert_eq!(after.scores(), game.scores());
    assert_eq!(after.word_to_guess, game.word_to_guess);
}

#[tokio::test]
async fn concurrent_advances_apply_once() {
    let Harness { state, .. } = harness().await;
    let room = full_room(&state).await;
    game_service::create_game(&state, &room.code, &user("h")).await.unwrap();

    let (first, second) = tokio::join!(
        game_service::advance_turn(&state, &room.code, Some(0)),
        game_service::advance_turn(&state, &room.code, Some(0)),
    );
    assert!(first.is_ok() != second.is_ok());
    let rejected = first.err().or(second.err()).unwrap();
    assert!(matches!(rejected, ServiceError::Conflict(_)));

    let game = game_service::load_game(&state, &room.code).await.unwrap();
    assert_eq!(game.turns_played, 1);
}

#[tokio::test(start_paused = true)]
async fn turn_timer_advances_each_turn_exactly_once() {
    let Harness { state, .. } = harness().await;
    let room = full_room(&state).await;
    game_service::create_game(&state, &room.code, &user("h")).await.unwrap();

    tokio::time::sleep(Duration::from_secs(30)).await;
    let game = game_service::load_game(&state, &room.code).await.unwrap();
    assert_eq!(game.turns_played, 0);

    game_service::advance_turn(&state, &room.code, Some(0)).await.unwrap();
    tokio::time::sleep(Duration::from_secs(45)).await;
    let game = game_service::load_game(&state, &room.code).await.unwrap();
    assert_eq!(game.turns_played, 1, "the first timer must not fire after a manual advance");

    tokio::time::sleep(Duration::from_secs(20)).await;
    let game = game_service::load_game(&state, &room.code).await.unwrap();
    assert_eq!(game.turns_played, 2);
    assert_eq!(game.state, GameState::Finished);

    let room = room_service::get_room(&state, &room.code).await.unwrap();
    assert_eq!(room.status, RoomStatus::Waiting);
    assert_eq!(room.games.len(), 1);
}

#[tokio::test]
async fn word_skips_respect_the_cooldown() {
    let Harness { state, .. } = harness().await;
    let room = full_room(&state).await;
    game_service::create_game(&state, &room.code, &user("h")).await.unwrap();
    let game = game_service::load_game(&state, &room.code).await.unwrap();
    let describer = user(&game.current_describer);

    let err = game_service::get_new_word(&state, &room.code, &user(&teammate(&game)))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Forbidden(_)));

    game_service::get_new_word(&state, &room.code, &describer).await.unwrap();
    let skipped = game_service::load_game(&state, &room.code).await.unwrap();
    assert_ne!(skipped.word_to_guess, game.word_to_guess);
    assert_eq!(skipped.turns_played, 0);
    assert_eq!(skipped.scores(), game.scores());

    let err = game_service::get_new_word(&state, &room.code, &describer)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Cooldown { remaining_secs } if remaining_secs >= 9));
}

#[tokio::test]
async fn leaving_below_the_minimum_interrupts_the_game() {
    let Harness { state, .. } = harness().await;
    let mut host_rx = connect(&state, "h").await;
    let room = full_room(&state).await;
    game_service::create_game(&state, &room.code, &user("h")).await.unwrap();
    drain(&mut host_rx);

    room_service::leave_room(&state, &room.code, &user("p3")).await.unwrap();

    let game = game_service::load_game(&state, &room.code).await.unwrap();
    assert_eq!(game.state, GameState::Abandoned);
    let room = room_service::get_room(&state, &room.code).await.unwrap();
    assert_eq!(room.status, RoomStatus::Waiting);
    assert!(room.games.is_empty());
    let events = kinds(&drain(&mut host_rx));
    assert!(events.contains(&"game:interrupted".to_owned()));
    assert!(events.contains(&"player:left".to_owned()));
}

#[tokio::test]
async fn lobby_lists_only_waiting_rooms() {
    let Harness { state, .. } = harness().await;
    let playing = full_room(&state).await;
    game_service::create_game(&state, &playing.code, &user("h")).await.unwrap();
    let waiting = room_service::create_room(&state, &user("other-host"))
        .await
        .unwrap();

    let listed = room_service::get_rooms(&state, 20).await.unwrap();
    let codes: Vec<_> = listed.iter().map(|room| room.code.clone()).collect();
    assert_eq!(codes, vec![waiting.code]);
}

#[tokio::test]
async fn rooms_cannot_be_created_while_degraded() {
    let state = AppState::new(config(), Arc::new(MemoryCache::new()));
    let err = room_service::create_room(&state, &user("h")).await.unwrap_err();
    assert!(matches!(err, ServiceError::Degraded));
}

#[tokio::test]
async fn host_finishes_the_room_for_everyone() {
    let Harness { state, .. } = harness().await;
    let mut player_rx = connect(&state, "p1").await;
    let room = full_room(&state).await;
    game_service::create_game(&state, &room.code, &user("h")).await.unwrap();

    let err = room_service::finish_room(&state, &room.code, &user("p1"))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Forbidden(_)));

    drain(&mut player_rx);
    room_service::finish_room(&state, &room.code, &user("h")).await.unwrap();
    let events = kinds(&drain(&mut player_rx));
    assert_eq!(events, vec!["game:interrupted".to_owned(), "room:close".to_owned()]);
    assert!(state.broadcaster().members(&room.code).is_empty());
    assert!(state.games().fetch::<Game>(&room.code).await.unwrap().is_none());

    let err = room_service::join_room(&state, &room.code, &user("p1"))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::RoomInactive(_)));
}

#[tokio::test]
async fn disconnect_releases_session_and_leaves_room() {
    let Harness { state, .. } = harness().await;
    let mut host_rx = connect(&state, "h").await;
    let _player_rx = connect(&state, "p").await;
    let room = room_service::create_room(&state, &user("h")).await.unwrap();
    room_service::join_room(&state, &room.code, &user("p")).await.unwrap();
    drain(&mut host_rx);

    websocket_service::disconnect(&state, &user("p"), "conn-p").await;

    assert_eq!(state.presence().resolve("p").await.unwrap(), None);
    let room = room_service::get_room(&state, &room.code).await.unwrap();
    assert!(!room.players.iter().any(|player| player.id == "p" && player.active));
    assert!(kinds(&drain(&mut host_rx)).contains(&"player:left".to_owned()));
}

#[tokio::test]
async fn superseded_connection_does_not_evict_its_successor() {
    let Harness { state, .. } = harness().await;
    let _old_rx = connect(&state, "p").await;
    let room = room_service::create_room(&state, &user("h")).await.unwrap();
    room_service::join_room(&state, &room.code, &user("p")).await.unwrap();

    state.presence().register("p", "conn-p-2", true).await.unwrap();
    websocket_service::disconnect(&state, &user("p"), "conn-p").await;

    assert_eq!(
        state.presence().resolve("p").await.unwrap().as_deref(),
        Some("conn-p-2")
    );
    let room = room_service::get_room(&state, &room.code).await.unwrap();
    assert!(room.players.iter().any(|player| player.id == "p" && player.active));
}

#[tokio::test]
async fn restart_reconciliation_closes_cached_rooms() {
    let Harness {
        state,
        cache,
        rooms,
    } = harness().await;
    let playing = full_room(&state).await;
    game_service::create_game(&state, &playing.code, &user("h")).await.unwrap();
    let idle = room_service::create_room(&state, &user("solo")).await.unwrap();
    for id in ["h", "p1"] {
        state
            .presence()
            .register(id, &format!("conn-{id}"), false)
            .await
            .unwrap();
    }

    let restarted = attach(&cache, &rooms).await;
    let report = reconcile::reconcile(&restarted).await.unwrap();
    assert_eq!(report.rooms_finished, 2);
    assert_eq!(report.rooms_evicted, 2);
    assert_eq!(report.games_evicted, 1);
    assert_eq!(report.sessions_cleared, 2);

    use alias_game_back::dao::room_store::RoomStore;
    for code in [&playing.code, &idle.code] {
        assert!(restarted.rooms().fetch::<RoomEntity>(code).await.unwrap().is_none());
        let stored = rooms.find_room(code.clone()).await.unwrap().unwrap();
        assert_eq!(stored.status, RoomStatus::Finished);
        let err = room_service::get_room(&restarted, code).await.unwrap_err();
        assert!(matches!(err, ServiceError::RoomInactive(_)));
    }
    assert_eq!(restarted.presence().resolve("h").await.unwrap(), None);
}

#[tokio::test(start_paused = true)]
async fn failed_advance_keeps_the_turn_timed() {
    let mut config = config();
    config.game.max_turns = 10;
    let state = AppState::new(config, Arc::new(MemoryCache::new()));
    state
        .install_durable(DurableBackend {
            rooms: Arc::new(MemoryRoomStore::new()),
            lexicon: Arc::new(StaticLexicon::new(words().into_iter().take(1).collect())),
        })
        .await;
    let room = full_room(&state).await;
    game_service::create_game(&state, &room.code, &user("h")).await.unwrap();
    let armed = state.locks().lock(&room.code).await.pending();
    assert!(matches!(armed, Some((_, 0))));

    let err = game_service::advance_turn(&state, &room.code, Some(0))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Internal(_)));
    assert_eq!(state.locks().lock(&room.code).await.pending(), armed);

    tokio::time::sleep(Duration::from_secs(61)).await;
    let rearmed = state.locks().lock(&room.code).await.pending();
    assert!(matches!(rearmed, Some((_, 0))), "timer lost after a failed timed advance");
    assert_ne!(rearmed, armed);
    let game = game_service::load_game(&state, &room.code).await.unwrap();
    assert_eq!(game.state, GameState::Playing);
    assert_eq!(game.turns_played, 0);
}

#[tokio::test]
async fn unknown_room_codes_leave_no_lock_slots() {
    let Harness { state, .. } = harness().await;
    for index in 0..500 {
        let code = format!("Q{index:04}");
        let err = room_service::join_room(&state, &code, &user("p1"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }
    assert!(state.locks().is_empty());
}

#[tokio::test]
async fn near_miss_guesses_are_announced_to_the_room() {
    let Harness { state, .. } = harness().await;
    let mut host_rx = connect(&state, "h").await;
    let room = full_room(&state).await;
    game_service::create_game(&state, &room.code, &user("h")).await.unwrap();
    let game = game_service::load_game(&state, &room.code).await.unwrap();
    let near = game.word_to_guess.clone().unwrap().similar_words[0].clone();
    drain(&mut host_rx);

    let guesser = user(&teammate(&game));
    let outcome =
        game_service::check_for_answer(&state, &room.code, &guesser, &format!("maybe {near}"))
            .await
            .unwrap();
    assert_eq!(outcome, AnswerOutcome::Similar { word: near.clone() });

    let events = drain(&mut host_rx);
    assert_eq!(kinds(&events), vec!["game:similar-word".to_owned()]);
    assert_eq!(events[0]["data"]["similarWord"], near.as_str());
    let after = game_service::load_game(&state, &room.code).await.unwrap();
    assert_eq!(after.scores(), game.scores());
    assert_eq!(after.word_to_guess, game.word_to_guess);
}

#[tokio::test(start_paused = true)]
async fn cache_miss_rehydrates_a_waiting_room_for_a_bounded_time() {
    let Harness { state, .. } = harness().await;
    let room = room_service::create_room(&state, &user("h")).await.unwrap();
    assert!(state.rooms().remove(&room.code).await.unwrap());

    let rehydrated = room_service::get_room(&state, &room.code).await.unwrap();
    assert_eq!(rehydrated.code, room.code);
    assert_eq!(rehydrated.host_id, "h");
    assert_eq!(rehydrated.status, RoomStatus::Waiting);
    let cached = state.rooms().fetch::<RoomEntity>(&room.code).await.unwrap();
    assert_eq!(cached.map(|room| room.code), Some(room.code.clone()));

    tokio::time::advance(state.config().cache.rehydrate + Duration::from_secs(1)).await;
    assert!(
        state
            .rooms()
            .fetch::<RoomEntity>(&room.code)
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn socket_without_room_follows_the_players_membership() {
    let Harness { state, .. } = harness().await;
    let room = room_service::create_room(&state, &user("h")).await.unwrap();
    room_service::join_room(&state, &room.code, &user("p1")).await.unwrap();
    let _rx = connect(&state, "p1").await;
    let _stranger_rx = connect(&state, "stranger").await;
    assert_eq!(state.broadcaster().group_of("conn-p1"), None);

    let session = |id: &str| SocketSession {
        identity: user(id),
        connection_id: format!("conn-{id}"),
        room: None,
        superseded: None,
    };
    let followed = websocket_service::follow_room(&state, &session("p1")).await;
    assert_eq!(followed.as_deref(), Some(room.code.as_str()));
    assert_eq!(
        state.broadcaster().group_of("conn-p1").as_deref(),
        Some(room.code.as_str())
    );
    assert_eq!(websocket_service::follow_room(&state, &session("stranger")).await, None);

    websocket_service::disconnect(&state, &user("p1"), "conn-p1").await;
    let room = room_service::get_room(&state, &room.code).await.unwrap();
    assert!(room.players.iter().any(|player| player.id == "p1" && !player.active));
}
