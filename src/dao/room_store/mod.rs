pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use std::sync::Arc;

use futures::future::BoxFuture;

use crate::dao::{
    models::{RoomEntity, RoomStatus, WordEntity},
    storage::StorageResult,
};

pub use memory::{MemoryRoomStore, StaticLexicon};

/// Durable persistence for room records.
pub trait RoomStore: Send + Sync {
    /// Insert or replace a room, keyed by its code.
    fn save_room(&self, room: RoomEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Look a room up by code.
    fn find_room(&self, code: String) -> BoxFuture<'static, StorageResult<Option<RoomEntity>>>;
    /// Overwrite the status of a room, returning whether it existed.
    fn update_status(
        &self,
        code: String,
        status: RoomStatus,
    ) -> BoxFuture<'static, StorageResult<bool>>;
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}

/// Source of secret words and their banned words.
pub trait Lexicon: Send + Sync {
    /// Up to `limit` random words whose text is not in `exclude`.
    fn draw_words(
        &self,
        exclude: Vec<String>,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<WordEntity>>>;
}

/// A connected durable backend: room records plus the lexicon living next to them.
#[derive(Clone)]
pub struct DurableBackend {
    pub rooms: Arc<dyn RoomStore>,
    pub lexicon: Arc<dyn Lexicon>,
}
