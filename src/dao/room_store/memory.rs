use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use dashmap::DashMap;
use futures::future::BoxFuture;
use rand::seq::IteratorRandom;

use super::{Lexicon, RoomStore};
use crate::dao::{
    models::{RoomEntity, RoomStatus, WordEntity},
    storage::{StorageError, StorageResult},
};

/// Process-local [`RoomStore`], used in tests and when running without MongoDB.
#[derive(Clone, Default)]
pub struct MemoryRoomStore {
    rooms: Arc<DashMap<String, RoomEntity>>,
    offline: Arc<AtomicBool>,
}

impl MemoryRoomStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the database going away (or coming back).
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn ready(&self) -> StorageResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StorageError::unavailable(
                "in-memory room store offline".into(),
                std::io::Error::new(std::io::ErrorKind::NotConnected, "offline"),
            ));
        }
        Ok(())
    }
}

impl RoomStore for MemoryRoomStore {
    fn save_room(&self, room: RoomEntity) -> BoxFuture<'static, StorageResult<()>> {
        let result = self.ready().map(|()| {
            self.rooms.insert(room.code.clone(), room);
        });
        Box::pin(async move { result })
    }

    fn find_room(&self, code: String) -> BoxFuture<'static, StorageResult<Option<RoomEntity>>> {
        let result = self
            .ready()
            .map(|()| self.rooms.get(&code).map(|room| room.clone()));
        Box::pin(async move { result })
    }

    fn update_status(
        &self,
        code: String,
        status: RoomStatus,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let result = self.ready().map(|()| match self.rooms.get_mut(&code) {
            Some(mut room) => {
                room.status = status;
                true
            }
            None => false,
        });
        Box::pin(async move { result })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let result = self.ready();
        Box::pin(async move { result })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        self.health_check()
    }
}

/// Fixed word list, used as the fallback lexicon and in tests.
#[derive(Debug, Clone, Default)]
pub struct StaticLexicon {
    words: Arc<Vec<WordEntity>>,
}

impl StaticLexicon {
    /// Serve draws from a fixed word list.
    pub fn new(words: Vec<WordEntity>) -> Self {
        Self {
            words: Arc::new(words),
        }
    }
}

impl Lexicon for StaticLexicon {
    fn draw_words(
        &self,
        exclude: Vec<String>,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<WordEntity>>> {
        let words = self.words.clone();
        Box::pin(async move {
            let mut rng = rand::rng();
            Ok(words
                .iter()
                .filter(|entry| !exclude.contains(&entry.word))
                .cloned()
                .choose_multiple(&mut rng, limit))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(id: &str) -> WordEntity {
        WordEntity {
            id: id.into(),
            word: id.into(),
            taboo_words: vec![],
            similar_words: vec![],
        }
    }

    #[tokio::test]
    async fn static_lexicon_skips_excluded_words() {
        let lexicon = StaticLexicon::new(vec![word("apple"), word("pear"), word("plum")]);
        let drawn = lexicon
            .draw_words(vec!["apple".into(), "plum".into()], 10)
            .await
            .unwrap();
        assert_eq!(drawn, vec![word("pear")]);
    }

    #[tokio::test]
    async fn static_lexicon_honours_limit() {
        let lexicon = StaticLexicon::new((0..20).map(|i| word(&format!("w{i}"))).collect());
        assert_eq!(lexicon.draw_words(vec![], 5).await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn offline_store_fails() {
        let store = MemoryRoomStore::new();
        store.set_offline(true);
        assert!(store.find_room("ABCDE".into()).await.is_err());
        store.set_offline(false);
        assert!(store.find_room("ABCDE".into()).await.unwrap().is_none());
    }
}
