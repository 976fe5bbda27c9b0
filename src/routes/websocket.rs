use std::net::SocketAddr;

use axum::{
    Extension, Router,
    extract::{ConnectInfo, Query, State, WebSocketUpgrade},
    http::HeaderMap,
    response::{IntoResponse, Response},
    routing::get,
};
use tracing::warn;
use uuid::Uuid;

use crate::{
    dto::{identity::Identity, ws::ConnectParams},
    error::AppError,
    routes::rate_limit::client_ip,
    services::{
        presence::Registration,
        rate_limiter::RateBucket,
        websocket_service::{self, SocketSession},
    },
    state::SharedState,
};

#[utoipa::path(
    get,
    path = "/ws",
    tag = "players",
    params(ConnectParams),
    responses(
        (status = 101, description = "Switching protocols to WebSocket"),
        (status = 401, description = "No user identity"),
        (status = 409, description = "User already connected; retry with `override=true`"),
        (status = 429, description = "Too many connection attempts")
    )
)]
/// Upgrade the HTTP connection into a player WebSocket session.
///
/// The session is bound in the presence registry before the upgrade so a
/// duplicate connection is refused with a plain HTTP status.
pub async fn ws_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    connect_info: Option<Extension<ConnectInfo<SocketAddr>>>,
    Query(params): Query<ConnectParams>,
    ws: WebSocketUpgrade,
) -> Result<Response, AppError> {
    let ip = client_ip(&headers, connect_info.as_ref().map(|Extension(info)| info));
    state
        .rate_limiter()
        .admit(RateBucket::SocketConnect, &ip)
        .await?;

    let identity = Identity::from_headers(&headers)
        .or_else(|| {
            params
                .user_id
                .clone()
                .filter(|id| !id.trim().is_empty())
                .map(|id| Identity::new(id.trim(), params.user_name.clone(), params.role.clone()))
        })
        .ok_or_else(|| AppError::Unauthorized("missing user identity".into()))?;

    let connection_id = Uuid::new_v4().to_string();
    let registration = state
        .presence()
        .register(&identity.user_id, &connection_id, params.force)
        .await?;
    let superseded = match registration {
        Registration::Fresh => None,
        Registration::Superseded { previous } => Some(previous),
    };

    let session = SocketSession {
        identity,
        connection_id,
        room: params.room,
        superseded,
    };
    let failed = session.clone();
    let release_state = state.clone();

    Ok(ws
        .on_failed_upgrade(move |err| {
            warn!(user = %failed.identity.user_id, error = %err, "websocket upgrade failed");
            tokio::spawn(async move {
                if let Err(err) = release_state
                    .presence()
                    .release(&failed.identity.user_id, &failed.connection_id)
                    .await
                {
                    err.log("release_session");
                }
            });
        })
        .on_upgrade(move |socket| websocket_service::handle_socket(state, socket, session))
        .into_response())
}

/// Configure the WebSocket endpoint.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/ws", get(ws_handler))
}
