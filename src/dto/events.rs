//! Payloads carried in the `data` field of outbound envelopes.

use serde::Serialize;
use utoipa::ToSchema;

use crate::dao::models::{PlayerEntity, RoomEntity, ScoreEntity, TeamsEntity, WordEntity};

use super::game::GameView;

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// `player:joined` / `player:left`.
pub struct PlayerPresenceEvent {
    pub room_code: String,
    pub user_id: String,
    pub user_name: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// `team-state`: membership after any roster change.
pub struct TeamStateEvent {
    pub room_code: String,
    pub teams: TeamsEntity,
    pub players: Vec<PlayerEntity>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// `room:close`.
pub struct RoomClosedEvent {
    pub room_code: String,
    pub global_score: ScoreEntity,
}

#[derive(Debug, Serialize, ToSchema)]
/// `room:updated`.
pub struct RoomUpdatedEvent {
    pub room: RoomEntity,
}

#[derive(Debug, Serialize, ToSchema)]
/// `game:started` and `game:turn-updated`.
pub struct GameSnapshotEvent {
    pub game: GameView,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// `game:correct-answer`.
pub struct CorrectAnswerEvent {
    pub user_id: String,
    pub user_name: String,
    pub text: String,
    /// Word that was guessed.
    pub word: String,
    pub game: GameView,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// `game:finished`.
pub struct GameFinishedEvent {
    pub room_code: String,
    pub result: ScoreEntity,
    pub global_score: ScoreEntity,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// `game:interrupted`.
pub struct GameInterruptedEvent {
    pub room_code: String,
    pub reason: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// `game:describer-changed`.
pub struct DescriberChangedEvent {
    pub room_code: String,
    pub describer: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// `game:word`, sent to the describer only.
pub struct WordEvent {
    pub room_code: String,
    pub word: WordEntity,
}

#[derive(Debug, Serialize, ToSchema)]
/// `game:taboo-word`, sent to the describer only.
pub struct TabooEvent {
    pub text: String,
    /// Banned term that was used.
    pub word: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// `game:similar-word`: a guess that named a near miss.
pub struct SimilarWordEvent {
    pub user_id: String,
    pub user_name: String,
    pub text: String,
    pub similar_word: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// `chat:message`.
pub struct ChatEvent {
    pub user_id: String,
    pub user_name: String,
    pub text: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// `rate-limit`.
pub struct RateLimitEvent {
    pub action: String,
    pub retry_after_ms: u64,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// `error`.
pub struct ErrorEvent {
    /// Machine-readable error class.
    pub code: String,
    /// Action that failed, when triggered by a client frame.
    pub action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_secs: Option<u64>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// `session:superseded`, sent before closing a replaced connection.
pub struct SupersededEvent {
    pub connection_id: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// `session:ready`, first frame on a new connection.
pub struct SessionReadyEvent {
    pub connection_id: String,
    pub user_id: String,
    pub room_code: Option<String>,
}
