use std::{error::Error, future::Future, time::Duration};

use thiserror::Error;
use tokio::time::timeout;

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error raised by storage backends regardless of the underlying database.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend could not serve the request.
    #[error("storage unavailable: {message}")]
    Unavailable {
        /// Human readable context for the failure.
        message: String,
        /// Backend specific cause.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// Connecting to the backend did not complete within the allotted time.
    #[error("storage connection timed out after {0:?}")]
    ConnectTimeout(Duration),
}

impl StorageError {
    /// Construct an unavailable error from any backend failure.
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        StorageError::Unavailable {
            message,
            source: Box::new(source),
        }
    }
}

/// Run a backend connection attempt, failing fast once `limit` elapses.
pub async fn bounded_connect<T, Fut>(limit: Duration, connect: Fut) -> StorageResult<T>
where
    Fut: Future<Output = StorageResult<T>>,
{
    match timeout(limit, connect).await {
        Ok(result) => result,
        Err(_) => Err(StorageError::ConnectTimeout(limit)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn bounded_connect_times_out_on_hanging_backend() {
        let result: StorageResult<()> =
            bounded_connect(Duration::from_millis(500), std::future::pending()).await;
        assert!(matches!(result, Err(StorageError::ConnectTimeout(_))));
    }

    #[tokio::test]
    async fn bounded_connect_passes_through_success() {
        let result = bounded_connect(Duration::from_secs(1), async { Ok::<_, StorageError>(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }
}
