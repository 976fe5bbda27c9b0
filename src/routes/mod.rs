use axum::{Router, middleware};

use crate::state::SharedState;

pub mod docs;
pub mod health;
pub mod rate_limit;
pub mod rooms;
pub mod websocket;

/// Compose all route trees, wiring in shared state, admission control and documentation routes.
pub fn router(state: SharedState) -> Router<()> {
    let api_router = health::router()
        .merge(rooms::router())
        .merge(websocket::router())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::limit_http,
        ));

    let docs_router = docs::router(state.clone());

    api_router.merge(docs_router).with_state(state)
}
