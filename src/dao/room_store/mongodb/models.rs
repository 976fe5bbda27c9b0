use mongodb::bson::DateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dao::models::{
    PlayerEntity, RoomEntity, RoomStatus, ScoreEntity, TeamsEntity, WordEntity,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoRoomDocument {
    #[serde(rename = "_id")]
    code: String,
    room_id: Uuid,
    host_id: String,
    players: Vec<PlayerEntity>,
    teams: TeamsEntity,
    global_score: ScoreEntity,
    #[serde(default)]
    games: Vec<ScoreEntity>,
    status: RoomStatus,
    created_at: DateTime,
    updated_at: DateTime,
}

impl From<RoomEntity> for MongoRoomDocument {
    fn from(value: RoomEntity) -> Self {
        Self {
            code: value.code,
            room_id: value.id,
            host_id: value.host_id,
            players: value.players,
            teams: value.teams,
            global_score: value.global_score,
            games: value.games,
            status: value.status,
            created_at: DateTime::from_millis(value.created_at),
            updated_at: DateTime::from_millis(value.updated_at),
        }
    }
}

impl From<MongoRoomDocument> for RoomEntity {
    fn from(value: MongoRoomDocument) -> Self {
        Self {
            id: value.room_id,
            code: value.code,
            host_id: value.host_id,
            players: value.players,
            teams: value.teams,
            global_score: value.global_score,
            games: value.games,
            status: value.status,
            created_at: value.created_at.timestamp_millis(),
            updated_at: value.updated_at.timestamp_millis(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoWordDocument {
    #[serde(rename = "_id")]
    id: mongodb::bson::Bson,
    word: String,
    #[serde(default)]
    taboo_words: Vec<String>,
    #[serde(default)]
    similar_words: Vec<String>,
}

impl From<MongoWordDocument> for WordEntity {
    fn from(value: MongoWordDocument) -> Self {
        let id = match value.id {
            mongodb::bson::Bson::ObjectId(oid) => oid.to_hex(),
            mongodb::bson::Bson::String(id) => id,
            other => other.to_string(),
        };
        Self {
            id,
            word: value.word,
            taboo_words: value.taboo_words,
            similar_words: value.similar_words,
        }
    }
}
