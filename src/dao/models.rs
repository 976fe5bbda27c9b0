use std::fmt;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// One of the two sides a room is split into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum TeamSide {
    /// First team; the host starts here.
    A,
    /// Second team.
    B,
}

impl TeamSide {
    /// The opposing side.
    pub fn other(self) -> Self {
        match self {
            TeamSide::A => TeamSide::B,
            TeamSide::B => TeamSide::A,
        }
    }
}

impl fmt::Display for TeamSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TeamSide::A => f.write_str("A"),
            TeamSide::B => f.write_str("B"),
        }
    }
}

/// Lifecycle status of a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum RoomStatus {
    /// Lobby open, no game running.
    Waiting,
    /// A game is being played.
    InGame,
    /// Terminal; the room no longer accepts mutations.
    Finished,
}

impl RoomStatus {
    /// Stable wire/storage name.
    pub fn as_str(self) -> &'static str {
        match self {
            RoomStatus::Waiting => "waiting",
            RoomStatus::InGame => "in-game",
            RoomStatus::Finished => "finished",
        }
    }
}

/// Membership record for a player; never removed, only flipped inactive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PlayerEntity {
    /// User identity supplied by the gateway.
    pub id: String,
    /// Whether the player is currently in the room.
    pub active: bool,
}

/// Team rosters of a room, by user id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TeamsEntity {
    /// Members of team A.
    #[serde(rename = "A")]
    pub a: Vec<String>,
    /// Members of team B.
    #[serde(rename = "B")]
    pub b: Vec<String>,
}

impl TeamsEntity {
    /// Roster of the given side.
    pub fn side(&self, side: TeamSide) -> &Vec<String> {
        match side {
            TeamSide::A => &self.a,
            TeamSide::B => &self.b,
        }
    }

    /// Mutable roster of the given side.
    pub fn side_mut(&mut self, side: TeamSide) -> &mut Vec<String> {
        match side {
            TeamSide::A => &mut self.a,
            TeamSide::B => &mut self.b,
        }
    }

    /// Side the user currently belongs to, if any.
    pub fn side_of(&self, user_id: &str) -> Option<TeamSide> {
        if self.a.iter().any(|id| id == user_id) {
            Some(TeamSide::A)
        } else if self.b.iter().any(|id| id == user_id) {
            Some(TeamSide::B)
        } else {
            None
        }
    }

    /// Total number of assigned players.
    pub fn len(&self) -> usize {
        self.a.len() + self.b.len()
    }

    /// Whether both rosters are empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Per-team score pair, used for cumulative scores and game results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ScoreEntity {
    /// Score of team A.
    #[serde(rename = "A")]
    pub a: u32,
    /// Score of team B.
    #[serde(rename = "B")]
    pub b: u32,
}

impl ScoreEntity {
    /// Winning side, `None` on a tie.
    pub fn winner(&self) -> Option<TeamSide> {
        match self.a.cmp(&self.b) {
            std::cmp::Ordering::Greater => Some(TeamSide::A),
            std::cmp::Ordering::Less => Some(TeamSide::B),
            std::cmp::Ordering::Equal => None,
        }
    }

    /// Mutable score of a side.
    pub fn side_mut(&mut self, side: TeamSide) -> &mut u32 {
        match side {
            TeamSide::A => &mut self.a,
            TeamSide::B => &mut self.b,
        }
    }
}

/// Room record as held in both the ephemeral and the durable store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoomEntity {
    /// Durable identity.
    pub id: Uuid,
    /// Short shareable code, unique and immutable.
    pub code: String,
    /// User that created the room.
    pub host_id: String,
    /// Append-only membership list.
    pub players: Vec<PlayerEntity>,
    /// Current team split.
    pub teams: TeamsEntity,
    /// Games won per team across this room's lifetime.
    pub global_score: ScoreEntity,
    /// Result of every finished game, oldest first.
    pub games: Vec<ScoreEntity>,
    /// Lifecycle status.
    pub status: RoomStatus,
    /// Creation time in unix milliseconds.
    pub created_at: i64,
    /// Last mutation time in unix milliseconds.
    pub updated_at: i64,
}

/// Lexicon entry: a secret word with its banned words.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WordEntity {
    /// Stable lexicon identifier.
    pub id: String,
    /// Word to be guessed.
    pub word: String,
    /// Words the describer may not say.
    pub taboo_words: Vec<String>,
    /// Near misses: a guess naming one is flagged as close.
    #[serde(default)]
    pub similar_words: Vec<String>,
}
