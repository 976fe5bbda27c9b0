pub mod game;
pub mod locks;
pub mod state_machine;
pub mod text;

use std::sync::Arc;

use tokio::sync::{RwLock, watch};

use crate::{
    config::AppConfig,
    dao::{
        cache::{CacheNamespace, EphemeralStore},
        room_store::{DurableBackend, Lexicon, RoomStore, StaticLexicon},
    },
    error::ServiceError,
    services::{broadcaster::Broadcaster, presence::Presence, rate_limiter::RateLimiter},
};

use self::locks::RoomLocks;

pub type SharedState = Arc<AppState>;

/// Key prefix of cached rooms.
pub const ROOM_PREFIX: &str = "alias-game:room:";
/// Key prefix of cached games.
pub const GAME_PREFIX: &str = "alias-game:game:";

/// Central application state: store handles, live connections and per-room locks.
pub struct AppState {
    config: AppConfig,
    cache: Arc<dyn EphemeralStore>,
    rooms: CacheNamespace,
    games: CacheNamespace,
    durable: RwLock<Option<DurableBackend>>,
    fallback_lexicon: Arc<dyn Lexicon>,
    presence: Presence,
    rate_limiter: RateLimiter,
    broadcaster: Broadcaster,
    locks: RoomLocks,
    degraded: watch::Sender<bool>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a durable backend is installed.
    pub fn new(config: AppConfig, cache: Arc<dyn EphemeralStore>) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        let ttls = config.cache.clone();
        Arc::new(Self {
            rooms: CacheNamespace::new(cache.clone(), ROOM_PREFIX, ttls.room),
            games: CacheNamespace::new(cache.clone(), GAME_PREFIX, ttls.game),
            presence: Presence::new(cache.clone(), ttls.session),
            rate_limiter: RateLimiter::new(cache.clone(), config.rate_limits.clone()),
            fallback_lexicon: Arc::new(StaticLexicon::new(config.words.0.clone())),
            durable: RwLock::new(None),
            broadcaster: Broadcaster::default(),
            locks: RoomLocks::default(),
            degraded: degraded_tx,
            cache,
            config,
        })
    }

    /// Immutable runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Raw ephemeral store.
    pub fn cache(&self) -> &Arc<dyn EphemeralStore> {
        &self.cache
    }

    /// Cached rooms.
    pub fn rooms(&self) -> &CacheNamespace {
        &self.rooms
    }

    /// Cached games.
    pub fn games(&self) -> &CacheNamespace {
        &self.games
    }

    /// User to connection mapping.
    pub fn presence(&self) -> &Presence {
        &self.presence
    }

    /// Admission control.
    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    /// Live connections and room groups.
    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    /// Per-room critical sections.
    pub fn locks(&self) -> &RoomLocks {
        &self.locks
    }

    /// Obtain the durable room store, if one is installed.
    pub async fn room_store(&self) -> Option<Arc<dyn RoomStore>> {
        let guard = self.durable.read().await;
        guard.as_ref().map(|backend| backend.rooms.clone())
    }

    /// Durable room store or [`ServiceError::Degraded`].
    pub async fn require_room_store(&self) -> Result<Arc<dyn RoomStore>, ServiceError> {
        self.room_store().await.ok_or(ServiceError::Degraded)
    }

    /// Lexicon of the durable backend, or the built-in word list while degraded.
    pub async fn lexicon(&self) -> Arc<dyn Lexicon> {
        let guard = self.durable.read().await;
        match guard.as_ref() {
            Some(backend) => backend.lexicon.clone(),
            None => self.fallback_lexicon.clone(),
        }
    }

    /// Install a durable backend and leave degraded mode.
    pub async fn install_durable(&self, backend: DurableBackend) {
        {
            let mut guard = self.durable.write().await;
            *guard = Some(backend);
        }
        self.update_degraded(false).await;
    }

    /// Remove the durable backend and enter degraded mode.
    pub async fn clear_durable(&self) {
        {
            let mut guard = self.durable.write().await;
            guard.take();
        }
        self.update_degraded(true).await;
    }

    /// Current degraded flag.
    pub async fn is_degraded(&self) -> bool {
        if self.durable.read().await.is_none() {
            return true;
        }
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub async fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                return false;
            }
            *current = value;
            true
        });
    }
}
