use serde::Serialize;
use tracing::warn;

use crate::{
    dao::models::{RoomEntity, ScoreEntity},
    dto::{
        events::{
            ChatEvent, CorrectAnswerEvent, DescriberChangedEvent, ErrorEvent, GameFinishedEvent,
            GameInterruptedEvent, GameSnapshotEvent, PlayerPresenceEvent, RateLimitEvent,
            RoomClosedEvent, RoomUpdatedEvent, SessionReadyEvent, SimilarWordEvent,
            SupersededEvent, TabooEvent, TeamStateEvent, WordEvent,
        },
        game::GameView,
        identity::Identity,
        ws::{Envelope, EnvelopeStatus},
    },
    error::ServiceError,
    services::broadcaster,
    state::{SharedState, game::Game},
};

pub const EVENT_PLAYER_JOINED: &str = "player:joined";
pub const EVENT_PLAYER_LEFT: &str = "player:left";
pub const EVENT_TEAM_STATE: &str = "team-state";
pub const EVENT_ROOM_CLOSE: &str = "room:close";
pub const EVENT_ROOM_UPDATED: &str = "room:updated";
pub const EVENT_GAME_STARTED: &str = "game:started";
pub const EVENT_TURN_UPDATED: &str = "game:turn-updated";
pub const EVENT_CORRECT_ANSWER: &str = "game:correct-answer";
pub const EVENT_GAME_FINISHED: &str = "game:finished";
pub const EVENT_GAME_INTERRUPTED: &str = "game:interrupted";
pub const EVENT_DESCRIBER_CHANGED: &str = "game:describer-changed";
pub const EVENT_WORD: &str = "game:word";
pub const EVENT_TABOO_WORD: &str = "game:taboo-word";
pub const EVENT_SIMILAR_WORD: &str = "game:similar-word";
pub const EVENT_CHAT_MESSAGE: &str = "chat:message";
pub const EVENT_RATE_LIMIT: &str = "rate-limit";
pub const EVENT_ERROR: &str = "error";
pub const EVENT_SUPERSEDED: &str = "session:superseded";
pub const EVENT_SESSION_READY: &str = "session:ready";

/// Announce a new or returning player.
pub fn broadcast_player_joined(state: &SharedState, room_code: &str, identity: &Identity) {
    let payload = PlayerPresenceEvent {
        room_code: room_code.to_owned(),
        user_id: identity.user_id.clone(),
        user_name: identity.user_name.clone(),
    };
    let message = format!("{} joined the room", identity.user_name);
    send_room_event(state, room_code, EVENT_PLAYER_JOINED, EnvelopeStatus::Info, &payload, Some(message));
}

/// Announce a departure.
pub fn broadcast_player_left(state: &SharedState, room_code: &str, identity: &Identity) {
    let payload = PlayerPresenceEvent {
        room_code: room_code.to_owned(),
        user_id: identity.user_id.clone(),
        user_name: identity.user_name.clone(),
    };
    let message = format!("{} left the room", identity.user_name);
    send_room_event(state, room_code, EVENT_PLAYER_LEFT, EnvelopeStatus::Info, &payload, Some(message));
}

/// Broadcast the room's rosters.
pub fn broadcast_team_state(state: &SharedState, room: &RoomEntity) {
    let payload = TeamStateEvent {
        room_code: room.code.clone(),
        teams: room.teams.clone(),
        players: room.players.clone(),
    };
    send_room_event(state, &room.code, EVENT_TEAM_STATE, EnvelopeStatus::Info, &payload, None);
}

/// Tell the room it is closed for good.
pub fn broadcast_room_closed(state: &SharedState, room_code: &str, global_score: ScoreEntity) {
    let payload = RoomClosedEvent {
        room_code: room_code.to_owned(),
        global_score,
    };
    send_room_event(
        state,
        room_code,
        EVENT_ROOM_CLOSE,
        EnvelopeStatus::System,
        &payload,
        Some("The room has been closed".into()),
    );
}

/// Broadcast the room record after a game result was recorded.
pub fn broadcast_room_updated(state: &SharedState, room: &RoomEntity) {
    let payload = RoomUpdatedEvent { room: room.clone() };
    send_room_event(state, &room.code, EVENT_ROOM_UPDATED, EnvelopeStatus::Info, &payload, None);
}

/// Announce the first turn of a game.
pub fn broadcast_game_started(state: &SharedState, game: &Game) {
    let payload = GameSnapshotEvent {
        game: GameView::from(game),
    };
    send_room_event(
        state,
        &game.room_code,
        EVENT_GAME_STARTED,
        EnvelopeStatus::Success,
        &payload,
        Some("The game has started".into()),
    );
}

/// Announce a new turn.
pub fn broadcast_turn_updated(state: &SharedState, game: &Game) {
    let payload = GameSnapshotEvent {
        game: GameView::from(game),
    };
    send_room_event(state, &game.room_code, EVENT_TURN_UPDATED, EnvelopeStatus::Info, &payload, None);
}

/// Announce a correct guess with the scores after it.
pub fn broadcast_correct_answer(
    state: &SharedState,
    game: &Game,
    guesser: &Identity,
    text: &str,
    word: &str,
) {
    let payload = CorrectAnswerEvent {
        user_id: guesser.user_id.clone(),
        user_name: guesser.user_name.clone(),
        text: text.to_owned(),
        word: word.to_owned(),
        game: GameView::from(game),
    };
    let message = format!("{} guessed the word", guesser.user_name);
    send_room_event(
        state,
        &game.room_code,
        EVENT_CORRECT_ANSWER,
        EnvelopeStatus::Success,
        &payload,
        Some(message),
    );
}

/// Announce the end of a game.
pub fn broadcast_game_finished(
    state: &SharedState,
    room_code: &str,
    result: ScoreEntity,
    global_score: ScoreEntity,
) {
    let payload = GameFinishedEvent {
        room_code: room_code.to_owned(),
        result,
        global_score,
    };
    send_room_event(
        state,
        room_code,
        EVENT_GAME_FINISHED,
        EnvelopeStatus::Success,
        &payload,
        Some("The game is over".into()),
    );
}

/// Announce an abandoned game.
pub fn broadcast_game_interrupted(state: &SharedState, room_code: &str, reason: &str) {
    let payload = GameInterruptedEvent {
        room_code: room_code.to_owned(),
        reason: reason.to_owned(),
    };
    send_room_event(
        state,
        room_code,
        EVENT_GAME_INTERRUPTED,
        EnvelopeStatus::System,
        &payload,
        Some(reason.to_owned()),
    );
}

/// Announce a describer handover after a departure.
pub fn broadcast_describer_changed(state: &SharedState, room_code: &str, describer: Option<String>) {
    let payload = DescriberChangedEvent {
        room_code: room_code.to_owned(),
        describer,
    };
    send_room_event(state, room_code, EVENT_DESCRIBER_CHANGED, EnvelopeStatus::Info, &payload, None);
}

/// Tell the room a guess came close.
pub fn broadcast_similar_word(
    state: &SharedState,
    room_code: &str,
    guesser: &Identity,
    text: &str,
    similar_word: &str,
) {
    let payload = SimilarWordEvent {
        user_id: guesser.user_id.clone(),
        user_name: guesser.user_name.clone(),
        text: text.to_owned(),
        similar_word: similar_word.to_owned(),
    };
    let message = format!("{} is getting close", guesser.user_name);
    send_room_event(
        state,
        room_code,
        EVENT_SIMILAR_WORD,
        EnvelopeStatus::Info,
        &payload,
        Some(message),
    );
}

/// Relay player text to the room.
pub fn broadcast_chat(state: &SharedState, room_code: &str, author: &Identity, text: &str) {
    let payload = ChatEvent {
        user_id: author.user_id.clone(),
        user_name: author.user_name.clone(),
        text: text.to_owned(),
    };
    send_room_event(state, room_code, EVENT_CHAT_MESSAGE, EnvelopeStatus::Chat, &payload, None);
}

/// Privately hand the secret word to the current describer.
pub async fn send_word_to_describer(state: &SharedState, game: &Game) {
    let Some(word) = game.word_to_guess.clone() else {
        return;
    };
    let payload = WordEvent {
        room_code: game.room_code.clone(),
        word,
    };
    send_user_event(
        state,
        &game.current_describer,
        EVENT_WORD,
        EnvelopeStatus::Info,
        &payload,
        None,
    )
    .await;
}

/// Warn the offending describer, and nobody else, about a banned word.
pub fn send_taboo_warning(state: &SharedState, connection_id: &str, text: &str, word: &str) {
    let payload = TabooEvent {
        text: text.to_owned(),
        word: word.to_owned(),
    };
    let message = format!("\"{word}\" is not allowed while describing");
    send_connection_event(
        state,
        connection_id,
        EVENT_TABOO_WORD,
        EnvelopeStatus::Error,
        &payload,
        Some(message),
    );
}

/// Report a refused action to the connection that sent it.
pub fn send_error(state: &SharedState, connection_id: &str, action: Option<&str>, err: &ServiceError) {
    let remaining_secs = match err {
        ServiceError::Cooldown { remaining_secs } => Some(*remaining_secs),
        _ => None,
    };
    let payload = ErrorEvent {
        code: err.code().to_owned(),
        action: action.map(str::to_owned),
        remaining_secs,
    };
    send_connection_event(
        state,
        connection_id,
        EVENT_ERROR,
        EnvelopeStatus::Error,
        &payload,
        Some(err.public_message()),
    );
}

/// Warn a connection that an action was throttled.
pub fn send_rate_limited(state: &SharedState, connection_id: &str, action: &str, retry_after_ms: u64) {
    let payload = RateLimitEvent {
        action: action.to_owned(),
        retry_after_ms,
    };
    send_connection_event(
        state,
        connection_id,
        EVENT_RATE_LIMIT,
        EnvelopeStatus::Error,
        &payload,
        Some(format!("Slow down, retry in {retry_after_ms} ms")),
    );
}

/// Tell a connection it was replaced by a newer one of the same user.
pub fn send_superseded(state: &SharedState, connection_id: &str) {
    let payload = SupersededEvent {
        connection_id: connection_id.to_owned(),
    };
    send_connection_event(
        state,
        connection_id,
        EVENT_SUPERSEDED,
        EnvelopeStatus::System,
        &payload,
        Some("Session opened elsewhere".into()),
    );
}

/// Greet a freshly registered connection.
pub fn send_session_ready(
    state: &SharedState,
    connection_id: &str,
    user_id: &str,
    room_code: Option<String>,
) {
    let payload = SessionReadyEvent {
        connection_id: connection_id.to_owned(),
        user_id: user_id.to_owned(),
        room_code,
    };
    send_connection_event(state, connection_id, EVENT_SESSION_READY, EnvelopeStatus::System, &payload, None);
}

fn build(kind: &str, status: EnvelopeStatus, payload: &impl Serialize, message: Option<String>) -> Option<Envelope> {
    match Envelope::new(kind, status, payload, message) {
        Ok(envelope) => Some(envelope),
        Err(err) => {
            warn!(event = kind, error = %err, "failed to serialize event payload");
            None
        }
    }
}

fn send_room_event(
    state: &SharedState,
    room_code: &str,
    kind: &str,
    status: EnvelopeStatus,
    payload: &impl Serialize,
    message: Option<String>,
) {
    if let Some(envelope) = build(kind, status, payload, message) {
        state.broadcaster().emit_room(room_code, &envelope);
    }
}

fn send_connection_event(
    state: &SharedState,
    connection_id: &str,
    kind: &str,
    status: EnvelopeStatus,
    payload: &impl Serialize,
    message: Option<String>,
) {
    if let Some(envelope) = build(kind, status, payload, message) {
        state.broadcaster().emit_connection(connection_id, &envelope);
    }
}

async fn send_user_event(
    state: &SharedState,
    user_id: &str,
    kind: &str,
    status: EnvelopeStatus,
    payload: &impl Serialize,
    message: Option<String>,
) {
    let Some(envelope) = build(kind, status, payload, message) else {
        return;
    };
    if let Err(err) = broadcaster::emit_user(state, user_id, &envelope).await {
        warn!(user = %user_id, event = kind, error = %err, "failed to deliver user event");
    }
}
