//! Fixed-window admission control backed by the ephemeral store, so every
//! coordinator sharing the store sees the same counters.

use std::{fmt, sync::Arc};

use tracing::{debug, warn};

use crate::{
    config::{BucketLimit, RateLimitConfig},
    dao::{cache::EphemeralStore, storage::StorageResult},
    error::ServiceError,
};

const KEY_PREFIX: &str = "alias-game:rl:";

/// Action classes with their own budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateBucket {
    /// Any HTTP request.
    HttpGlobal,
    /// Room endpoints.
    HttpRooms,
    /// WebSocket handshakes.
    SocketConnect,
    /// `chat:message` frames.
    ChatMessage,
    /// `game:message` frames.
    GameMessage,
    /// `join-team` frames.
    JoinTeam,
    /// `game:skip-word` frames.
    SkipWord,
}

impl RateBucket {
    /// Name used in counter keys and logs.
    pub fn name(self) -> &'static str {
        match self {
            RateBucket::HttpGlobal => "http-global",
            RateBucket::HttpRooms => "http-rooms",
            RateBucket::SocketConnect => "socket-connect",
            RateBucket::ChatMessage => "chat-message",
            RateBucket::GameMessage => "game-message",
            RateBucket::JoinTeam => "join-team",
            RateBucket::SkipWord => "skip-word",
        }
    }

    fn limit(self, limits: &RateLimitConfig) -> BucketLimit {
        match self {
            RateBucket::HttpGlobal => limits.http_global,
            RateBucket::HttpRooms => limits.http_rooms,
            RateBucket::SocketConnect => limits.socket_connect,
            RateBucket::ChatMessage => limits.chat_message,
            RateBucket::GameMessage => limits.game_message,
            RateBucket::JoinTeam => limits.join_team,
            RateBucket::SkipWord => limits.skip_word,
        }
    }
}

impl fmt::Display for RateBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome of a consume attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    /// Whether the action may proceed.
    pub allowed: bool,
    /// Time until the window resets; only meaningful when refused.
    pub retry_after_ms: u64,
}

/// Shared fixed-window limiter.
pub struct RateLimiter {
    store: Arc<dyn EphemeralStore>,
    limits: RateLimitConfig,
}

impl RateLimiter {
    /// Limiter writing its counters to `store`.
    pub fn new(store: Arc<dyn EphemeralStore>, limits: RateLimitConfig) -> Self {
        Self { store, limits }
    }

    /// Take one point from `bucket` for `identity`.
    ///
    /// Store failures are returned to the caller, which must refuse the action.
    pub async fn try_consume(&self, bucket: RateBucket, identity: &str) -> StorageResult<RateDecision> {
        let limit = bucket.limit(&self.limits);
        let key = format!("{KEY_PREFIX}{}:{identity}", bucket.name());
        let (count, remaining) = self.store.incr_window(key, limit.window).await?;
        if count <= limit.points {
            return Ok(RateDecision {
                allowed: true,
                retry_after_ms: 0,
            });
        }
        let retry_after_ms = (remaining.as_millis() as u64).max(1);
        debug!(bucket = %bucket, identity, count, retry_after_ms, "rate limit exceeded");
        Ok(RateDecision {
            allowed: false,
            retry_after_ms,
        })
    }

    /// [`Self::try_consume`] folded into the service error taxonomy, failing closed.
    pub async fn admit(&self, bucket: RateBucket, identity: &str) -> Result<(), ServiceError> {
        match self.try_consume(bucket, identity).await {
            Ok(RateDecision { allowed: true, .. }) => Ok(()),
            Ok(RateDecision { retry_after_ms, .. }) => {
                Err(ServiceError::RateLimited { retry_after_ms })
            }
            Err(err) => {
                warn!(bucket = %bucket, identity, error = %err, "rate limiter store failure; refusing");
                Err(ServiceError::Unavailable(err))
            }
        }
    }
}
