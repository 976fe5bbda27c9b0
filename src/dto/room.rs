use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::dao::models::{RoomEntity, RoomStatus, TeamSide, TeamsEntity};

use super::game::GameView;

/// Query accepted by `GET /rooms`.
#[derive(Debug, Default, Deserialize, Validate, IntoParams)]
pub struct ListRoomsQuery {
    /// Maximum number of rooms to return (1-50, default 20).
    #[validate(range(min = 1, max = 50))]
    pub limit: Option<usize>,
}

impl ListRoomsQuery {
    /// Effective limit.
    pub fn limit(&self) -> usize {
        self.limit.unwrap_or(20)
    }
}

/// Body of `PUT /rooms/{code}/team`.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ChangeTeamRequest {
    /// Destination side.
    pub team: TeamSide,
}

/// Lobby listing entry.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    /// Shareable code.
    pub code: String,
    /// Creator.
    pub host_id: String,
    /// Players currently in the room.
    pub active_players: usize,
    /// Current split.
    pub teams: TeamsEntity,
    /// Lifecycle status.
    pub status: RoomStatus,
    /// Creation time in unix milliseconds.
    pub created_at: i64,
}

impl From<&RoomEntity> for RoomSummary {
    fn from(room: &RoomEntity) -> Self {
        Self {
            code: room.code.clone(),
            host_id: room.host_id.clone(),
            active_players: room.players.iter().filter(|player| player.active).count(),
            teams: room.teams.clone(),
            status: room.status,
            created_at: room.created_at,
        }
    }
}

/// Response of `POST /rooms/{code}/start`.
#[derive(Debug, Serialize, ToSchema)]
pub struct GameStartedResponse {
    /// Room after switching to `in-game`.
    pub room: RoomEntity,
    /// Public game state.
    pub game: GameView,
}
