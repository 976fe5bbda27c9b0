use serde::Serialize;
use utoipa::ToSchema;

/// Simple health response returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Health status ("ok" or "degraded").
    pub status: String,
    /// Whether the ephemeral store answered a ping.
    pub cache: bool,
    /// Open WebSocket connections.
    pub connections: usize,
}

impl HealthResponse {
    /// Create a health response indicating the system is operational.
    pub fn ok(cache: bool, connections: usize) -> Self {
        Self {
            status: "ok".to_string(),
            cache,
            connections,
        }
    }

    /// Create a health response indicating the system is in degraded mode.
    pub fn degraded(cache: bool, connections: usize) -> Self {
        Self {
            status: "degraded".to_string(),
            cache,
            connections,
        }
    }
}
