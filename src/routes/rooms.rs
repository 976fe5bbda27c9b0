use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post, put},
};
use axum_valid::Valid;

use crate::{
    dao::models::RoomEntity,
    dto::{
        game::GameView,
        identity::Identity,
        room::{ChangeTeamRequest, GameStartedResponse, ListRoomsQuery, RoomSummary},
        validation::{normalize_room_code, validate_room_code},
    },
    error::AppError,
    services::{game_service, room_service},
    state::SharedState,
};

/// Routes managing rooms and starting their games.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/rooms", get(list_rooms).post(create_room))
        .route("/rooms/{code}", get(get_room))
        .route("/rooms/{code}/join", post(join_room))
        .route("/rooms/{code}/leave", delete(leave_room))
        .route("/rooms/{code}/team", put(change_team))
        .route("/rooms/{code}/start", post(start_game))
        .route("/rooms/{code}/finish", post(finish_room))
}

fn room_code(raw: &str) -> Result<String, AppError> {
    let code = normalize_room_code(raw);
    validate_room_code(&code)
        .map_err(|_| AppError::BadRequest(format!("`{raw}` is not a valid room code")))?;
    Ok(code)
}

/// List rooms waiting for players, most recently active first.
#[utoipa::path(
    get,
    path = "/rooms",
    tag = "rooms",
    params(ListRoomsQuery),
    responses(
        (status = 200, description = "Waiting rooms", body = [RoomSummary])
    )
)]
pub async fn list_rooms(
    State(state): State<SharedState>,
    Valid(Query(query)): Valid<Query<ListRoomsQuery>>,
) -> Result<Json<Vec<RoomSummary>>, AppError> {
    let rooms = room_service::get_rooms(&state, query.limit()).await?;
    Ok(Json(rooms.iter().map(RoomSummary::from).collect()))
}

/// Open a room hosted by the caller.
#[utoipa::path(
    post,
    path = "/rooms",
    tag = "rooms",
    responses(
        (status = 201, description = "Room created", body = RoomEntity),
        (status = 503, description = "Durable store unavailable")
    )
)]
pub async fn create_room(
    State(state): State<SharedState>,
    identity: Identity,
) -> Result<(StatusCode, Json<RoomEntity>), AppError> {
    let room = room_service::create_room(&state, &identity).await?;
    Ok((StatusCode::CREATED, Json(room)))
}

/// Fetch a live room.
#[utoipa::path(
    get,
    path = "/rooms/{code}",
    tag = "rooms",
    params(("code" = String, Path, description = "Room code")),
    responses(
        (status = 200, description = "Room", body = RoomEntity),
        (status = 404, description = "Unknown room"),
        (status = 410, description = "Room finished")
    )
)]
pub async fn get_room(
    State(state): State<SharedState>,
    Path(code): Path<String>,
) -> Result<Json<RoomEntity>, AppError> {
    let room = room_service::get_room(&state, &room_code(&code)?).await?;
    Ok(Json(room))
}

/// Join a room, or come back to one.
#[utoipa::path(
    post,
    path = "/rooms/{code}/join",
    tag = "rooms",
    params(("code" = String, Path, description = "Room code")),
    responses(
        (status = 200, description = "Joined", body = RoomEntity),
        (status = 409, description = "Already in the room, room full or in a game")
    )
)]
pub async fn join_room(
    State(state): State<SharedState>,
    Path(code): Path<String>,
    identity: Identity,
) -> Result<Json<RoomEntity>, AppError> {
    let room = room_service::join_room(&state, &room_code(&code)?, &identity).await?;
    Ok(Json(room))
}

/// Leave a room. Leaving twice is a no-op.
#[utoipa::path(
    delete,
    path = "/rooms/{code}/leave",
    tag = "rooms",
    params(("code" = String, Path, description = "Room code")),
    responses(
        (status = 204, description = "Left"),
        (status = 404, description = "Not a member")
    )
)]
pub async fn leave_room(
    State(state): State<SharedState>,
    Path(code): Path<String>,
    identity: Identity,
) -> Result<StatusCode, AppError> {
    room_service::leave_room(&state, &room_code(&code)?, &identity).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Switch the caller to the other team.
#[utoipa::path(
    put,
    path = "/rooms/{code}/team",
    tag = "rooms",
    params(("code" = String, Path, description = "Room code")),
    request_body = ChangeTeamRequest,
    responses(
        (status = 200, description = "Team changed", body = RoomEntity),
        (status = 409, description = "Game in progress")
    )
)]
pub async fn change_team(
    State(state): State<SharedState>,
    Path(code): Path<String>,
    identity: Identity,
    Valid(Json(request)): Valid<Json<ChangeTeamRequest>>,
) -> Result<Json<RoomEntity>, AppError> {
    let room =
        room_service::update_teams(&state, &room_code(&code)?, request.team, &identity).await?;
    Ok(Json(room))
}

/// Start a game. Host only.
#[utoipa::path(
    post,
    path = "/rooms/{code}/start",
    tag = "rooms",
    params(("code" = String, Path, description = "Room code")),
    responses(
        (status = 200, description = "Game started", body = GameStartedResponse),
        (status = 403, description = "Caller is not the host"),
        (status = 409, description = "Room not waiting or teams too small")
    )
)]
pub async fn start_game(
    State(state): State<SharedState>,
    Path(code): Path<String>,
    identity: Identity,
) -> Result<Json<GameStartedResponse>, AppError> {
    let (room, game) = game_service::create_game(&state, &room_code(&code)?, &identity).await?;
    Ok(Json(GameStartedResponse {
        room,
        game: GameView::from(&game),
    }))
}

/// Close a room for good. Host only.
#[utoipa::path(
    post,
    path = "/rooms/{code}/finish",
    tag = "rooms",
    params(("code" = String, Path, description = "Room code")),
    responses(
        (status = 204, description = "Room closed"),
        (status = 403, description = "Caller is not the host")
    )
)]
pub async fn finish_room(
    State(state): State<SharedState>,
    Path(code): Path<String>,
    identity: Identity,
) -> Result<StatusCode, AppError> {
    room_service::finish_room(&state, &room_code(&code)?, &identity).await?;
    Ok(StatusCode::NO_CONTENT)
}
