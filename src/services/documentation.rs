use utoipa::OpenApi;

#[derive(OpenApi)]
/// OpenAPI description of the room coordinator's HTTP surface.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::rooms::list_rooms,
        crate::routes::rooms::create_room,
        crate::routes::rooms::get_room,
        crate::routes::rooms::join_room,
        crate::routes::rooms::leave_room,
        crate::routes::rooms::change_team,
        crate::routes::rooms::start_game,
        crate::routes::rooms::finish_room,
        crate::routes::websocket::ws_handler,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::room::RoomSummary,
            crate::dto::room::ChangeTeamRequest,
            crate::dto::room::GameStartedResponse,
            crate::dto::game::GameView,
            crate::dto::identity::Identity,
            crate::dto::ws::Envelope,
            crate::dto::ws::EnvelopeStatus,
            crate::dto::ws::TextPayload,
            crate::dto::ws::JoinTeamPayload,
            crate::dto::ws::PassTurnPayload,
            crate::dao::models::RoomEntity,
            crate::dao::models::RoomStatus,
            crate::dao::models::TeamSide,
            crate::state::state_machine::GameState,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "rooms", description = "Room lifecycle and game start"),
        (name = "players", description = "Player WebSocket sessions"),
    )
)]
pub struct ApiDoc;
