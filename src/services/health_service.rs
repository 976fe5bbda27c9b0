use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Probe both stores and report whether the service runs degraded.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    let cache = match state.cache().ping().await {
        Ok(()) => true,
        Err(err) => {
            warn!(error = %err, "ephemeral store ping failed");
            false
        }
    };

    match state.room_store().await {
        Some(store) => {
            if let Err(err) = store.health_check().await {
                warn!(error = %err, "durable store health check failed");
            }
        }
        None => warn!("durable store unavailable (degraded mode)"),
    }

    let connections = state.broadcaster().connection_count();
    if cache && !state.is_degraded().await {
        HealthResponse::ok(cache, connections)
    } else {
        HealthResponse::degraded(cache, connections)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{
            cache::MemoryCache,
            room_store::{DurableBackend, MemoryRoomStore, StaticLexicon},
        },
        state::AppState,
    };

    #[tokio::test]
    async fn reports_degraded_until_durable_store_installed() {
        let cache = MemoryCache::new();
        let state = AppState::new(AppConfig::default(), Arc::new(cache.clone()));
        assert_eq!(health_status(&state).await.status, "degraded");

        state
            .install_durable(DurableBackend {
                rooms: Arc::new(MemoryRoomStore::new()),
                lexicon: Arc::new(StaticLexicon::new(Vec::new())),
            })
            .await;
        let healthy = health_status(&state).await;
        assert_eq!(healthy.status, "ok");
        assert!(healthy.cache);

        cache.set_unavailable(true);
        let broken = health_status(&state).await;
        assert_eq!(broken.status, "degraded");
        assert!(!broken.cache);
    }
}
