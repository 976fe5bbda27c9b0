use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::dao::models::TeamSide;

use super::{format_now, validation::validate_not_blank};

/// Descriptive category of an outbound envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeStatus {
    /// Neutral state change.
    Info,
    /// Positive outcome.
    Success,
    /// Rejected request or failure.
    Error,
    /// Lifecycle notice from the server.
    System,
    /// Relayed player text.
    Chat,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
/// Uniform frame for every server to client message.
pub struct Envelope {
    /// Event name, e.g. `team-state`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Descriptive status.
    pub status: EnvelopeStatus,
    /// Event payload.
    pub data: Value,
    /// Optional human readable text.
    pub message: Option<String>,
    /// RFC 3339 emission time.
    pub timestamp: String,
}

impl Envelope {
    /// Build an envelope around a serialisable payload.
    pub fn new<T: Serialize>(
        kind: &str,
        status: EnvelopeStatus,
        payload: &T,
        message: Option<String>,
    ) -> serde_json::Result<Self> {
        Ok(Self {
            kind: kind.to_owned(),
            status,
            data: serde_json::to_value(payload)?,
            message,
            timestamp: format_now(),
        })
    }

    /// Text frame body.
    pub fn to_text(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
/// Free text sent by a player.
pub struct TextPayload {
    /// Message body.
    #[validate(length(min = 1, max = 300), custom(function = "validate_not_blank"))]
    pub text: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
/// Requested team switch.
pub struct JoinTeamPayload {
    /// Destination side.
    pub team: TeamSide,
}

#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Manual end of turn.
pub struct PassTurnPayload {
    /// Turn the describer believes is running; stale requests are refused.
    #[serde(default)]
    pub expected_turn: Option<u32>,
}

#[derive(Debug, Deserialize)]
/// Frames accepted from player WebSocket clients, shaped `{action, payload}`.
#[serde(tag = "action", content = "payload")]
pub enum ClientAction {
    /// Lobby chat.
    #[serde(rename = "chat:message")]
    ChatMessage(TextPayload),
    /// Guess or clue during a game.
    #[serde(rename = "game:message")]
    GameMessage(TextPayload),
    /// Ask for another word.
    #[serde(rename = "game:skip-word")]
    SkipWord,
    /// End the current turn early; the payload may be `{}`.
    #[serde(rename = "game:pass-turn")]
    PassTurn(PassTurnPayload),
    /// Move to the other team.
    #[serde(rename = "join-team")]
    JoinTeam(JoinTeamPayload),
}

impl ClientAction {
    /// Parse and validate a text frame.
    pub fn from_json_str(raw: &str) -> Result<Self, InboundError> {
        let action: ClientAction = serde_json::from_str(raw)?;
        match &action {
            ClientAction::ChatMessage(payload) | ClientAction::GameMessage(payload) => {
                payload.validate()?
            }
            ClientAction::PassTurn(payload) => payload.validate()?,
            ClientAction::JoinTeam(payload) => payload.validate()?,
            ClientAction::SkipWord => {}
        }
        Ok(action)
    }

    /// Action name as sent by the client.
    pub fn name(&self) -> &'static str {
        match self {
            ClientAction::ChatMessage(_) => "chat:message",
            ClientAction::GameMessage(_) => "game:message",
            ClientAction::SkipWord => "game:skip-word",
            ClientAction::PassTurn(_) => "game:pass-turn",
            ClientAction::JoinTeam(_) => "join-team",
        }
    }
}

/// Reasons an inbound frame is refused before reaching the services.
#[derive(Debug, thiserror::Error)]
pub enum InboundError {
    /// Not a known `{action, payload}` frame.
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
    /// Payload failed validation.
    #[error("invalid payload: {0}")]
    Invalid(#[from] validator::ValidationErrors),
}

#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
/// Query string accepted on `/ws`; gateway headers take precedence for identity.
pub struct ConnectParams {
    /// Caller id when no gateway header is present.
    pub user_id: Option<String>,
    /// Caller display name when no gateway header is present.
    pub user_name: Option<String>,
    /// Caller role when no gateway header is present.
    pub role: Option<String>,
    /// Replace an existing live connection of the same user.
    #[serde(default, rename = "override")]
    pub force: bool,
    /// Room to subscribe to right away, for reconnecting players.
    pub room: Option<String>,
}
