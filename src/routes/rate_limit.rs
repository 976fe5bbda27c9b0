use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::{error::AppError, services::rate_limiter::RateBucket, state::SharedState};

const FORWARDED_FOR: &str = "x-forwarded-for";

/// Best-effort client address: first `x-forwarded-for` hop, then the peer address.
pub fn client_ip(headers: &HeaderMap, peer: Option<&ConnectInfo<SocketAddr>>) -> String {
    headers
        .get(FORWARDED_FOR)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_owned)
        .or_else(|| peer.map(|ConnectInfo(addr)| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".into())
}

/// Admit HTTP requests per client address, with a tighter budget on room routes.
pub async fn limit_http(State(state): State<SharedState>, request: Request, next: Next) -> Response {
    let ip = client_ip(
        request.headers(),
        request.extensions().get::<ConnectInfo<SocketAddr>>(),
    );
    if let Err(err) = state.rate_limiter().admit(RateBucket::HttpGlobal, &ip).await {
        return AppError::from(err).into_response();
    }

    let path = request.uri().path();
    if path.starts_with("/rooms") {
        let key = format!("{path}:{ip}");
        if let Err(err) = state.rate_limiter().admit(RateBucket::HttpRooms, &key).await {
            return AppError::from(err).into_response();
        }
    }
    next.run(request).await
}
