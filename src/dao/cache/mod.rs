//! Ephemeral, TTL-bound key-value storage holding live room, game, session and
//! rate-limit state.

pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use std::{collections::HashMap, sync::Arc, time::Duration};

use futures::future::BoxFuture;
use serde::{Serialize, de::DeserializeOwned};

use crate::dao::{
    codec::{self, CodecError, HashFields},
    storage::StorageResult,
};

pub use memory::MemoryCache;

/// Operations the coordinator needs from the ephemeral store.
///
/// Keys are plain strings; namespacing is applied by [`CacheNamespace`].
pub trait EphemeralStore: Send + Sync {
    /// Merge `fields` into the hash at `key` and reset its expiry to `ttl`.
    fn hset(&self, key: String, fields: HashFields, ttl: Duration)
    -> BoxFuture<'static, StorageResult<()>>;
    /// Read every field of a hash; a missing or expired key reads as empty.
    fn hgetall(&self, key: String) -> BoxFuture<'static, StorageResult<HashMap<String, String>>>;
    /// Remove a key of any kind, returning whether something was deleted.
    fn del(&self, key: String) -> BoxFuture<'static, StorageResult<bool>>;
    /// Store a plain value unconditionally.
    fn set(&self, key: String, value: String, ttl: Duration) -> BoxFuture<'static, StorageResult<()>>;
    /// Store a plain value only when the key is absent, returning whether it was written.
    fn set_nx(&self, key: String, value: String, ttl: Duration)
    -> BoxFuture<'static, StorageResult<bool>>;
    /// Read a plain value.
    fn get(&self, key: String) -> BoxFuture<'static, StorageResult<Option<String>>>;
    /// Delete the key only if it still holds `expected`.
    fn del_if_eq(&self, key: String, expected: String) -> BoxFuture<'static, StorageResult<bool>>;
    /// Increment a fixed-window counter, creating it with a `window` expiry on first use.
    ///
    /// Returns the count after the increment and the time left in the window.
    fn incr_window(&self, key: String, window: Duration)
    -> BoxFuture<'static, StorageResult<(u64, Duration)>>;
    /// Add or rescore a member of a sorted index.
    fn zadd(&self, index: String, member: String, score: i64)
    -> BoxFuture<'static, StorageResult<()>>;
    /// Remove a member from a sorted index.
    fn zrem(&self, index: String, member: String) -> BoxFuture<'static, StorageResult<()>>;
    /// Members of an index, highest score first.
    fn zrange_desc(&self, index: String, limit: Option<usize>)
    -> BoxFuture<'static, StorageResult<Vec<String>>>;
    /// Live keys starting with `prefix`.
    fn scan_prefix(&self, prefix: String) -> BoxFuture<'static, StorageResult<Vec<String>>>;
    /// Round-trip to the backend.
    fn ping(&self) -> BoxFuture<'static, StorageResult<()>>;
}

/// Errors surfaced by [`CacheNamespace`] record helpers.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Backend failure.
    #[error(transparent)]
    Storage(#[from] crate::dao::storage::StorageError),
    /// Stored data could not be decoded.
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// A prefixed family of hashes with a default TTL and a recency index,
/// e.g. every room or every game.
#[derive(Clone)]
pub struct CacheNamespace {
    store: Arc<dyn EphemeralStore>,
    prefix: &'static str,
    ttl: Duration,
}

impl CacheNamespace {
    /// Build a namespace over `store`.
    pub fn new(store: Arc<dyn EphemeralStore>, prefix: &'static str, ttl: Duration) -> Self {
        Self { store, prefix, ttl }
    }

    fn key(&self, id: &str) -> String {
        format!("{}{}", self.prefix, id)
    }

    fn index(&self) -> String {
        format!("{}index", self.prefix)
    }

    /// Strip the namespace prefix from a stored key.
    pub fn id_of<'a>(&self, key: &'a str) -> &'a str {
        key.strip_prefix(self.prefix).unwrap_or(key)
    }

    /// Write a record with the namespace TTL.
    pub async fn put<T: Serialize>(&self, id: &str, record: &T) -> Result<(), CacheError> {
        self.put_with_ttl(id, record, self.ttl).await
    }

    /// Write a record with an explicit TTL and bump it in the recency index.
    pub async fn put_with_ttl<T: Serialize>(
        &self,
        id: &str,
        record: &T,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let fields = codec::encode_fields(record)?;
        let key = self.key(id);
        self.store
            .zadd(self.index(), key.clone(), now_millis())
            .await?;
        self.store.hset(key, fields, ttl).await?;
        Ok(())
    }

    /// Read and decode a record.
    pub async fn fetch<T: DeserializeOwned>(&self, id: &str) -> Result<Option<T>, CacheError> {
        let fields = self.store.hgetall(self.key(id)).await?;
        Ok(codec::decode_fields(fields)?)
    }

    /// Delete a record and drop it from the index.
    pub async fn remove(&self, id: &str) -> Result<bool, CacheError> {
        let key = self.key(id);
        self.store.zrem(self.index(), key.clone()).await?;
        Ok(self.store.del(key).await?)
    }

    /// Record ids from the index, most recently written first.
    pub async fn recent_ids(&self, limit: Option<usize>) -> Result<Vec<String>, CacheError> {
        let keys = self.store.zrange_desc(self.index(), limit).await?;
        Ok(keys
            .iter()
            .map(|key| self.id_of(key).to_owned())
            .collect())
    }

    /// Ids of every live record, indexed or not.
    pub async fn scan_ids(&self) -> Result<Vec<String>, CacheError> {
        let index = self.index();
        let keys = self.store.scan_prefix(self.prefix.to_owned()).await?;
        Ok(keys
            .iter()
            .filter(|key| **key != index)
            .map(|key| self.id_of(key).to_owned())
            .collect())
    }

    /// Drop an id from the index without touching the record.
    pub async fn forget(&self, id: &str) -> Result<(), CacheError> {
        Ok(self.store.zrem(self.index(), self.key(id)).await?)
    }
}

/// Wall-clock unix milliseconds.
pub fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or_default()
}
