use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::{runtime::Handle, sync::mpsc, task::JoinHandle};
use tracing::{debug, info, warn};

use crate::{
    dao::models::RoomEntity,
    dto::{
        identity::Identity,
        validation::{normalize_room_code, validate_room_code},
        ws::ClientAction,
    },
    error::ServiceError,
    services::{
        broadcaster::ConnectionHandle,
        game_service,
        rate_limiter::RateBucket,
        room_events,
        room_service::{self, LeaveOutcome},
    },
    state::SharedState,
};

/// A connection admitted by the presence registry, ready to be upgraded.
#[derive(Debug, Clone)]
pub struct SocketSession {
    /// Owner of the connection.
    pub identity: Identity,
    /// Server-assigned connection id, already bound in the presence registry.
    pub connection_id: String,
    /// Room the client asked to follow on connect.
    pub room: Option<String>,
    /// Connection this one replaced, to be told and closed.
    pub superseded: Option<String>,
}

/// Runs disconnect cleanup even when the socket task is cancelled or panics.
struct DisconnectGuard {
    state: SharedState,
    identity: Identity,
    connection_id: String,
    armed: bool,
}

impl DisconnectGuard {
    fn new(state: &SharedState, session: &SocketSession) -> Self {
        Self {
            state: state.clone(),
            identity: session.identity.clone(),
            connection_id: session.connection_id.clone(),
            armed: true,
        }
    }

    async fn release(mut self) {
        self.armed = false;
        disconnect(&self.state, &self.identity, &self.connection_id).await;
    }
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let state = self.state.clone();
        let identity = self.identity.clone();
        let connection_id = self.connection_id.clone();
        match Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    disconnect(&state, &identity, &connection_id).await;
                });
            }
            Err(_) => warn!(connection = %connection_id, "no runtime left for disconnect cleanup"),
        }
    }
}

/// Handle the full lifecycle of a player WebSocket connection.
pub async fn handle_socket(state: SharedState, socket: WebSocket, session: SocketSession) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();
    let guard = DisconnectGuard::new(&state, &session);

    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let connection_id = session.connection_id.clone();
    let identity = session.identity.clone();
    state.broadcaster().register(ConnectionHandle::new(
        connection_id.clone(),
        identity.user_id.clone(),
        outbound_tx.clone(),
    ));
    if let Some(previous) = session.superseded.as_deref() {
        info!(user = %identity.user_id, previous = %previous, "session superseded");
        room_events::send_superseded(&state, previous);
        state.broadcaster().close(previous);
    }

    let room = follow_room(&state, &session).await;
    info!(user = %identity.user_id, connection = %connection_id, room = ?room, "player connected");
    room_events::send_session_ready(&state, &connection_id, &identity.user_id, room);

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => {
                handle_frame(&state, &identity, &connection_id, text.as_str()).await;
            }
            Ok(Message::Ping(payload)) => {
                let _ = outbound_tx.send(Message::Pong(payload));
            }
            Ok(Message::Close(frame)) => {
                debug!(connection = %connection_id, "client closed the socket");
                let _ = outbound_tx.send(Message::Close(frame));
                break;
            }
            Ok(Message::Binary(_)) | Ok(Message::Pong(_)) => {}
            Err(err) => {
                warn!(connection = %connection_id, error = %err, "websocket error");
                break;
            }
        }
    }

    guard.release().await;
    info!(user = %identity.user_id, connection = %connection_id, "player disconnected");
    finalize(writer_task, outbound_tx).await;
}

/// Subscribe the connection to a room the user is an active member of.
///
/// Without an explicit room the user's current membership is looked up, so a
/// player who joined over HTTP first still receives room events.
pub async fn follow_room(state: &SharedState, session: &SocketSession) -> Option<String> {
    let code = match session.room.as_deref() {
        Some(raw) => {
            let code = normalize_room_code(raw);
            validate_room_code(&code).ok()?;
            code
        }
        None => match room_service::active_room_of(state, &session.identity.user_id).await {
            Ok(code) => code?,
            Err(err) => {
                err.log("follow_room");
                return None;
            }
        },
    };
    let room: RoomEntity = match room_service::get_room(state, &code).await {
        Ok(room) => room,
        Err(err) => {
            err.log("follow_room");
            return None;
        }
    };
    let member = room
        .players
        .iter()
        .any(|player| player.id == session.identity.user_id && player.active);
    if !member {
        debug!(room = %code, user = %session.identity.user_id, "not a member; room not followed");
        return None;
    }
    state
        .broadcaster()
        .join_group(&session.connection_id, &code);
    Some(code)
}

fn bucket_for(action: &ClientAction) -> RateBucket {
    match action {
        ClientAction::ChatMessage(_) => RateBucket::ChatMessage,
        ClientAction::GameMessage(_) | ClientAction::PassTurn(_) => RateBucket::GameMessage,
        ClientAction::SkipWord => RateBucket::SkipWord,
        ClientAction::JoinTeam(_) => RateBucket::JoinTeam,
    }
}

async fn handle_frame(state: &SharedState, identity: &Identity, connection_id: &str, raw: &str) {
    let action = match ClientAction::from_json_str(raw) {
        Ok(action) => action,
        Err(err) => {
            debug!(connection = %connection_id, error = %err, "rejected inbound frame");
            let err = ServiceError::Validation(err.to_string());
            room_events::send_error(state, connection_id, None, &err);
            return;
        }
    };
    let name = action.name();

    match state
        .rate_limiter()
        .admit(bucket_for(&action), connection_id)
        .await
    {
        Ok(()) => {}
        Err(ServiceError::RateLimited { retry_after_ms }) => {
            debug!(connection = %connection_id, action = name, retry_after_ms, "action throttled");
            room_events::send_rate_limited(state, connection_id, name, retry_after_ms);
            return;
        }
        Err(err) => {
            err.log(name);
            room_events::send_error(state, connection_id, Some(name), &err);
            return;
        }
    }

    if let Err(err) = dispatch(state, identity, connection_id, action).await {
        err.log(name);
        room_events::send_error(state, connection_id, Some(name), &err);
    }
}

async fn dispatch(
    state: &SharedState,
    identity: &Identity,
    connection_id: &str,
    action: ClientAction,
) -> Result<(), ServiceError> {
    let Some(room) = state.broadcaster().group_of(connection_id) else {
        return Err(ServiceError::Conflict("join a room first".into()));
    };

    match action {
        ClientAction::ChatMessage(payload) => {
            room_events::broadcast_chat(state, &room, identity, payload.text.trim());
        }
        ClientAction::GameMessage(payload) => {
            let outcome =
                game_service::check_for_answer(state, &room, identity, payload.text.trim()).await?;
            debug!(room = %room, user = %identity.user_id, outcome = ?outcome, "game message handled");
        }
        ClientAction::SkipWord => game_service::get_new_word(state, &room, identity).await?,
        ClientAction::PassTurn(payload) => {
            game_service::pass_turn(state, &room, identity, payload.expected_turn).await?;
        }
        ClientAction::JoinTeam(payload) => {
            room_service::update_teams(state, &room, payload.team, identity).await?;
        }
    }
    Ok(())
}

/// Unregister the connection, release its session and leave its room.
///
/// A connection that lost its presence entry to a newer one leaves the room
/// membership to its successor.
pub async fn disconnect(state: &SharedState, identity: &Identity, connection_id: &str) {
    let room = state.broadcaster().group_of(connection_id);
    state.broadcaster().unregister(connection_id);

    match state
        .presence()
        .release(&identity.user_id, connection_id)
        .await
    {
        Ok(true) => {}
        Ok(false) => {
            debug!(user = %identity.user_id, connection = %connection_id, "superseded connection closed");
            return;
        }
        Err(err) => err.log("release_session"),
    }

    let Some(code) = room else {
        return;
    };
    match room_service::leave_room(state, &code, identity).await {
        Ok(LeaveOutcome::RoomClosed) => {
            info!(room = %code, user = %identity.user_id, "last player disconnected")
        }
        Ok(outcome) => debug!(room = %code, user = %identity.user_id, ?outcome, "left on disconnect"),
        Err(err) => err.log("leave_on_disconnect"),
    }
}

async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}
