/// Live connections and room broadcast groups.
pub mod broadcaster;
/// OpenAPI documentation generation.
pub mod documentation;
/// Game session state machine: turns, answers and word draws.
pub mod game_service;
/// Health check service.
pub mod health_service;
/// Single live connection per user.
pub mod presence;
/// Fixed-window admission control.
pub mod rate_limiter;
/// Startup repair of cached rooms.
pub mod reconcile;
/// Outbound event names and their payload builders.
pub mod room_events;
/// Room lifecycle: membership, teams, results and closing.
pub mod room_service;
/// Durable store supervision and degraded mode.
pub mod storage_supervisor;
/// Per-room turn timers.
pub mod turn_timer;
/// WebSocket connection and message handling service.
pub mod websocket_service;
