//! Keeps the durable backend connected and drives the degraded flag.

use std::{future::Future, time::Duration};

use tokio::time::sleep;
use tracing::{info, warn};

use crate::{
    dao::{room_store::DurableBackend, storage::StorageResult},
    state::SharedState,
};

const INITIAL_DELAY: Duration = Duration::from_millis(1_000);
const MAX_DELAY: Duration = Duration::from_secs(10);
const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(5);
const MAX_RECONNECT_ATTEMPTS: u32 = 3;

/// Connect, watch and reconnect the durable backend forever.
///
/// Until a backend is installed the service runs degraded: rooms cannot be
/// created and cache misses cannot be served.
pub async fn run<F, Fut>(state: SharedState, mut connect: F)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = StorageResult<DurableBackend>> + Send,
{
    let mut delay = INITIAL_DELAY;

    loop {
        let backend = match state.room_store().await {
            Some(store) => store,
            None => match connect().await {
                Ok(backend) => {
                    let store = backend.rooms.clone();
                    state.install_durable(backend).await;
                    info!("durable store connected; leaving degraded mode");
                    delay = INITIAL_DELAY;
                    store
                }
                Err(err) => {
                    warn!(error = %err, "durable store connection attempt failed");
                    sleep(delay).await;
                    delay = (delay * 2).min(MAX_DELAY);
                    continue;
                }
            },
        };

        match backend.health_check().await {
            Ok(()) => {
                if state.is_degraded().await {
                    info!("durable store healthy again; leaving degraded mode");
                    state.update_degraded(false).await;
                }
                sleep(HEALTH_POLL_INTERVAL).await;
            }
            Err(err) => {
                warn!(error = %err, "durable store health check failed");
                let mut reconnect_delay = INITIAL_DELAY;
                let mut reconnected = false;

                for attempt in 0..MAX_RECONNECT_ATTEMPTS {
                    match backend.try_reconnect().await {
                        Ok(()) => {
                            info!(attempt, "durable store reconnected");
                            reconnected = true;
                            break;
                        }
                        Err(reconnect_err) => {
                            if attempt == 0 {
                                warn!(
                                    attempt, error = %reconnect_err,
                                    "durable store reconnect failed; entering degraded mode"
                                );
                                state.update_degraded(true).await;
                            } else {
                                warn!(attempt, error = %reconnect_err, "durable store reconnect attempt failed");
                            }
                            sleep(reconnect_delay).await;
                            reconnect_delay = (reconnect_delay * 2).min(MAX_DELAY);
                        }
                    }
                }

                if reconnected {
                    state.update_degraded(false).await;
                    sleep(HEALTH_POLL_INTERVAL).await;
                } else {
                    warn!("exhausted reconnect attempts; dropping durable store");
                    state.clear_durable().await;
                    sleep(delay).await;
                    delay = (delay * 2).min(MAX_DELAY);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{
            cache::MemoryCache,
            room_store::{MemoryRoomStore, StaticLexicon},
            storage::StorageError,
        },
        state::AppState,
    };

    #[tokio::test(start_paused = true)]
    async fn retries_until_backend_connects() {
        let state = AppState::new(AppConfig::default(), Arc::new(MemoryCache::new()));
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();

        let supervisor = tokio::spawn(run(state.clone(), move || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    return Err(StorageError::ConnectTimeout(Duration::from_millis(5)));
                }
                Ok(DurableBackend {
                    rooms: Arc::new(MemoryRoomStore::new()),
                    lexicon: Arc::new(StaticLexicon::new(Vec::new())),
                })
            }
        }));

        assert!(state.is_degraded().await);
        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert!(!state.is_degraded().await);
        supervisor.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn failing_health_check_enters_degraded_mode() {
        let state = AppState::new(AppConfig::default(), Arc::new(MemoryCache::new()));
        let rooms = Arc::new(MemoryRoomStore::new());
        let handle = rooms.clone();

        let supervisor = tokio::spawn(run(state.clone(), move || {
            let rooms = rooms.clone();
            async move {
                Ok::<_, StorageError>(DurableBackend {
                    rooms,
                    lexicon: Arc::new(StaticLexicon::new(Vec::new())),
                })
            }
        }));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!state.is_degraded().await);

        handle.set_offline(true);
        tokio::time::sleep(HEALTH_POLL_INTERVAL + Duration::from_millis(10)).await;
        assert!(state.is_degraded().await);
        supervisor.abort();
    }
}
