use axum::{
    Json,
    http::{HeaderValue, StatusCode, header::RETRY_AFTER},
    response::IntoResponse,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, warn};
use validator::ValidationErrors;

use crate::{
    dao::{cache::CacheError, storage::StorageError},
    state::state_machine::InvalidTransition,
};

/// Errors that can occur in service layer operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Room (or its game) exists in neither store.
    #[error("not found: {0}")]
    NotFound(String),
    /// Room exists but is finished and cannot be joined or mutated.
    #[error("room inactive: {0}")]
    RoomInactive(String),
    /// Operation clashes with the current room, game or session state.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Caller lacks the role the operation needs, e.g. not the host.
    #[error("forbidden: {0}")]
    Forbidden(String),
    /// Admission bucket exhausted.
    #[error("too many requests, retry in {retry_after_ms} ms")]
    RateLimited {
        /// Time until the bucket window resets.
        retry_after_ms: u64,
    },
    /// Malformed input.
    #[error("invalid input: {0}")]
    Validation(String),
    /// Word skip requested before the cooldown elapsed.
    #[error("skip available in {remaining_secs} s")]
    Cooldown {
        /// Whole seconds left.
        remaining_secs: u64,
    },
    /// No durable store is installed.
    #[error("storage unavailable (degraded mode)")]
    Degraded,
    /// A storage backend failed.
    #[error("storage unavailable")]
    Unavailable(#[source] StorageError),
    /// Unexpected failure; details stay in the logs.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Whether this is a user-facing outcome rather than a fault.
    pub fn is_expected(&self) -> bool {
        !matches!(
            self,
            ServiceError::Degraded | ServiceError::Unavailable(_) | ServiceError::Internal(_)
        )
    }

    /// Stable machine-readable identifier, used in socket error envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::NotFound(_) => "not-found",
            ServiceError::RoomInactive(_) => "room-inactive",
            ServiceError::Conflict(_) => "conflict",
            ServiceError::Forbidden(_) => "forbidden",
            ServiceError::RateLimited { .. } => "rate-limited",
            ServiceError::Validation(_) => "validation",
            ServiceError::Cooldown { .. } => "cooldown",
            ServiceError::Degraded => "degraded",
            ServiceError::Unavailable(_) => "unavailable",
            ServiceError::Internal(_) => "internal",
        }
    }

    /// Message safe to show to a client.
    pub fn public_message(&self) -> String {
        match self {
            ServiceError::Unavailable(_) => "storage unavailable".into(),
            ServiceError::Internal(_) => "internal error".into(),
            other => other.to_string(),
        }
    }

    /// Log at the level matching the error class.
    pub fn log(&self, operation: &str) {
        match self {
            ServiceError::Internal(detail) => {
                error!(operation, error = %detail, "operation failed")
            }
            ServiceError::Unavailable(source) => {
                warn!(operation, error = %source, "storage failure")
            }
            ServiceError::Degraded => warn!(operation, "rejected while degraded"),
            expected => debug!(operation, outcome = %expected, "operation rejected"),
        }
    }
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        ServiceError::Unavailable(err)
    }
}

impl From<CacheError> for ServiceError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::Storage(source) => ServiceError::Unavailable(source),
            CacheError::Codec(codec) => ServiceError::Internal(codec.to_string()),
        }
    }
}

impl From<InvalidTransition> for ServiceError {
    fn from(err: InvalidTransition) -> Self {
        ServiceError::Conflict(err.to_string())
    }
}

impl From<ValidationErrors> for ServiceError {
    fn from(err: ValidationErrors) -> Self {
        ServiceError::Validation(err.to_string())
    }
}

impl From<ValidationErrors> for AppError {
    fn from(err: ValidationErrors) -> Self {
        AppError::BadRequest(format!("validation failed: {}", err))
    }
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request with invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Missing caller identity.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Caller is not allowed to perform the action.
    #[error("forbidden: {0}")]
    Forbidden(String),
    /// Requested resource not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Resource existed but is closed for good.
    #[error("gone: {0}")]
    Gone(String),
    /// Conflict with current state.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Rate limit hit.
    #[error("too many requests")]
    TooManyRequests {
        /// Milliseconds until the client may retry.
        retry_after_ms: u64,
    },
    /// Service unavailable or degraded.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        let message = err.public_message();
        match err {
            ServiceError::NotFound(_) => AppError::NotFound(message),
            ServiceError::RoomInactive(_) => AppError::Gone(message),
            ServiceError::Conflict(_) | ServiceError::Cooldown { .. } => AppError::Conflict(message),
            ServiceError::Forbidden(_) => AppError::Forbidden(message),
            ServiceError::RateLimited { retry_after_ms } => {
                AppError::TooManyRequests { retry_after_ms }
            }
            ServiceError::Validation(_) => AppError::BadRequest(message),
            ServiceError::Degraded | ServiceError::Unavailable(_) => {
                AppError::ServiceUnavailable(message)
            }
            ServiceError::Internal(_) => AppError::Internal(message),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Gone(_) => StatusCode::GONE,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::TooManyRequests { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let retry_after = match &self {
            AppError::TooManyRequests { retry_after_ms } => {
                Some(retry_after_ms.div_ceil(1_000).max(1))
            }
            _ => None,
        };

        let payload = Json(ErrorBody {
            message: self.to_string(),
        });

        let mut response = (status, payload).into_response();
        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_errors_map_to_http_statuses() {
        let cases = [
            (ServiceError::NotFound("room".into()), StatusCode::NOT_FOUND),
            (ServiceError::RoomInactive("room".into()), StatusCode::GONE),
            (ServiceError::Conflict("dup".into()), StatusCode::CONFLICT),
            (ServiceError::Forbidden("host only".into()), StatusCode::FORBIDDEN),
            (ServiceError::Cooldown { remaining_secs: 3 }, StatusCode::CONFLICT),
            (ServiceError::Validation("bad".into()), StatusCode::BAD_REQUEST),
            (ServiceError::Degraded, StatusCode::SERVICE_UNAVAILABLE),
            (ServiceError::Internal("boom".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            let response = AppError::from(err).into_response();
            assert_eq!(response.status(), status);
        }
    }

    #[test]
    fn rate_limited_sets_retry_after_in_seconds() {
        let response = AppError::from(ServiceError::RateLimited {
            retry_after_ms: 2_300,
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[RETRY_AFTER], "3");
    }

    #[test]
    fn internal_details_are_not_exposed() {
        let err = ServiceError::Internal("codec failed on teams".into());
        assert!(!err.is_expected());
        assert_eq!(err.public_message(), "internal error");
        assert!(ServiceError::Conflict("x".into()).is_expected());
    }
}
