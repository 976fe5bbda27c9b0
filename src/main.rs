//! Alias game back binary entrypoint wiring the stores, startup repair and the HTTP/WebSocket layers.

use std::{env, net::SocketAddr, sync::Arc, time::Duration};

use alias_game_back::{
    config::AppConfig,
    dao::{
        cache::{EphemeralStore, MemoryCache},
        room_store::{DurableBackend, MemoryRoomStore, StaticLexicon},
        storage::{StorageResult, bounded_connect},
    },
    routes,
    services::{reconcile, storage_supervisor},
    state::{AppState, SharedState},
};
use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5_000;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let connect_timeout = env::var("CACHE_CONNECT_TIMEOUT_MS")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS));

    let cache = connect_cache(connect_timeout)
        .await
        .context("connecting ephemeral store")?;
    let fallback_words = config.words.0.clone();
    let app_state = AppState::new(config, cache);

    // One bounded attempt so reconciliation can mark rooms finished durably;
    // the supervisor keeps retrying afterwards.
    match bounded_connect(connect_timeout, connect_durable(fallback_words.clone())).await {
        Ok(backend) => app_state.install_durable(backend).await,
        Err(err) => warn!(error = %err, "durable store unavailable at startup; starting degraded"),
    }

    let report = reconcile::reconcile(&app_state)
        .await
        .context("reconciling cached rooms")?;
    info!(?report, "cached state repaired");

    tokio::spawn(storage_supervisor::run(app_state.clone(), move || {
        connect_durable(fallback_words.clone())
    }));

    let app = build_router(app_state);

    let port = env::var("PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("serving axum")?;

    Ok(())
}

fn default_backend() -> &'static str {
    if cfg!(feature = "mongo-store") {
        "mongo"
    } else {
        "memory"
    }
}

/// Connect the ephemeral store selected by `CACHE_BACKEND`, failing fast.
async fn connect_cache(limit: Duration) -> anyhow::Result<Arc<dyn EphemeralStore>> {
    let backend = env::var("CACHE_BACKEND").unwrap_or_else(|_| default_backend().into());
    match backend.as_str() {
        "memory" => {
            warn!("using the in-process ephemeral store; state is lost on restart");
            Ok(Arc::new(MemoryCache::new()))
        }
        #[cfg(feature = "mongo-store")]
        "mongo" => {
            use alias_game_back::dao::{cache::mongodb::MongoCache, mongodb::MongoConfig};

            let cache = bounded_connect(limit, async {
                let config = MongoConfig::from_env().await?;
                Ok::<_, alias_game_back::dao::storage::StorageError>(
                    MongoCache::connect(config).await?,
                )
            })
            .await?;
            info!("connected to the MongoDB ephemeral store");
            Ok(Arc::new(cache))
        }
        other => {
            let _ = limit;
            anyhow::bail!("unsupported CACHE_BACKEND `{other}`")
        }
    }
}

/// Connect the durable store selected by `DURABLE_BACKEND`.
async fn connect_durable(fallback_words: Vec<alias_game_back::dao::models::WordEntity>) -> StorageResult<DurableBackend> {
    let backend = env::var("DURABLE_BACKEND").unwrap_or_else(|_| default_backend().into());
    if backend == "memory" {
        return Ok(DurableBackend {
            rooms: Arc::new(MemoryRoomStore::new()),
            lexicon: Arc::new(StaticLexicon::new(fallback_words)),
        });
    }

    #[cfg(feature = "mongo-store")]
    {
        use alias_game_back::dao::{mongodb::MongoConfig, room_store::mongodb::connect_backend};

        let config = MongoConfig::from_env().await?;
        Ok(connect_backend(config).await?)
    }

    #[cfg(not(feature = "mongo-store"))]
    {
        Err(alias_game_back::dao::storage::StorageError::unavailable(
            format!("DURABLE_BACKEND `{backend}` needs the mongo-store feature"),
            std::io::Error::new(std::io::ErrorKind::Unsupported, "feature disabled"),
        ))
    }
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                warn!(error = %err, "cannot listen for SIGTERM; waiting for Ctrl+C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
