use std::{
    collections::HashMap,
    io,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use dashmap::{DashMap, mapref::entry::Entry};
use futures::future::BoxFuture;
use tokio::time::Instant;

use super::EphemeralStore;
use crate::dao::{
    codec::HashFields,
    storage::{StorageError, StorageResult},
};

/// In-process [`EphemeralStore`] with lazy expiry.
///
/// Expiry follows tokio's clock so paused-time tests can drive TTLs. The
/// store can be flipped unavailable to exercise fail-closed paths.
#[derive(Clone, Default)]
pub struct MemoryCache {
    inner: Arc<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    entries: DashMap<String, Record>,
    indexes: DashMap<String, HashMap<String, (i64, u64)>>,
    sequence: AtomicU64,
    unavailable: AtomicBool,
}

struct Record {
    value: Value,
    expires_at: Instant,
}

enum Value {
    Text(String),
    Hash(HashMap<String, String>),
    Counter(u64),
}

impl Record {
    fn live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

impl MemoryCache {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail (or succeed again) to simulate an outage.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check(&self) -> StorageResult<()> {
        if self.inner.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::unavailable(
                "in-memory cache switched off".into(),
                io::Error::new(io::ErrorKind::NotConnected, "cache offline"),
            ));
        }
        Ok(())
    }

    fn with<T, F>(&self, op: F) -> BoxFuture<'static, StorageResult<T>>
    where
        T: Send + 'static,
        F: FnOnce(&MemoryInner, Instant) -> T,
    {
        let result = self.check().map(|()| op(self.inner.as_ref(), Instant::now()));
        Box::pin(async move { result })
    }
}

impl MemoryInner {
    fn live_entry(&self, key: &str, now: Instant) -> Option<dashmap::mapref::one::Ref<'_, String, Record>> {
        let entry = self.entries.get(key)?;
        if entry.live(now) {
            Some(entry)
        } else {
            drop(entry);
            self.entries.remove_if(key, |_, entry| !entry.live(now));
            None
        }
    }
}

impl EphemeralStore for MemoryCache {
    fn hset(
        &self,
        key: String,
        fields: HashFields,
        ttl: Duration,
    ) -> BoxFuture<'static, StorageResult<()>> {
        self.with(move |inner, now| {
            let expires_at = now + ttl;
            match inner.entries.entry(key) {
                Entry::Occupied(mut occupied) => {
                    let record = occupied.get_mut();
                    if !(record.live(now) && matches!(record.value, Value::Hash(_))) {
                        record.value = Value::Hash(HashMap::new());
                    }
                    if let Value::Hash(existing) = &mut record.value {
                        existing.extend(fields);
                    }
                    record.expires_at = expires_at;
                }
                Entry::Vacant(vacant) => {
                    vacant.insert(Record {
                        value: Value::Hash(fields.into_iter().collect()),
                        expires_at,
                    });
                }
            }
        })
    }

    fn hgetall(&self, key: String) -> BoxFuture<'static, StorageResult<HashMap<String, String>>> {
        self.with(move |inner, now| match inner.live_entry(&key, now) {
            Some(entry) => match &entry.value {
                Value::Hash(fields) => fields.clone(),
                _ => HashMap::new(),
            },
            None => HashMap::new(),
        })
    }

    fn del(&self, key: String) -> BoxFuture<'static, StorageResult<bool>> {
        self.with(move |inner, now| {
            inner
                .entries
                .remove(&key)
                .is_some_and(|(_, entry)| entry.live(now))
        })
    }

    fn set(&self, key: String, value: String, ttl: Duration) -> BoxFuture<'static, StorageResult<()>> {
        self.with(move |inner, now| {
            inner.entries.insert(
                key,
                Record {
                    value: Value::Text(value),
                    expires_at: now + ttl,
                },
            );
        })
    }

    fn set_nx(
        &self,
        key: String,
        value: String,
        ttl: Duration,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        self.with(move |inner, now| {
            let fresh = Record {
                value: Value::Text(value),
                expires_at: now + ttl,
            };
            match inner.entries.entry(key) {
                Entry::Occupied(mut occupied) => {
                    if occupied.get().live(now) {
                        false
                    } else {
                        occupied.insert(fresh);
                        true
                    }
                }
                Entry::Vacant(vacant) => {
                    vacant.insert(fresh);
                    true
                }
            }
        })
    }

    fn get(&self, key: String) -> BoxFuture<'static, StorageResult<Option<String>>> {
        self.with(move |inner, now| {
            inner
                .live_entry(&key, now)
                .and_then(|entry| match &entry.value {
                    Value::Text(text) => Some(text.clone()),
                    _ => None,
                })
        })
    }

    fn del_if_eq(&self, key: String, expected: String) -> BoxFuture<'static, StorageResult<bool>> {
        self.with(move |inner, now| {
            inner
                .entries
                .remove_if(&key, |_, entry| {
                    entry.live(now) && matches!(&entry.value, Value::Text(text) if *text == expected)
                })
                .is_some()
        })
    }

    fn incr_window(
        &self,
        key: String,
        window: Duration,
    ) -> BoxFuture<'static, StorageResult<(u64, Duration)>> {
        self.with(move |inner, now| {
            let mut entry = inner.entries.entry(key).or_insert_with(|| Record {
                value: Value::Counter(0),
                expires_at: now + window,
            });
            let record = entry.value_mut();
            let live = record.live(now);
            let bumped = match &mut record.value {
                Value::Counter(count) if live => {
                    *count += 1;
                    Some(*count)
                }
                _ => None,
            };
            let count = bumped.unwrap_or_else(|| {
                record.value = Value::Counter(1);
                record.expires_at = now + window;
                1
            });
            (count, record.expires_at.saturating_duration_since(now))
        })
    }

    fn zadd(&self, index: String, member: String, score: i64) -> BoxFuture<'static, StorageResult<()>> {
        self.with(move |inner, _| {
            let sequence = inner.sequence.fetch_add(1, Ordering::Relaxed);
            inner
                .indexes
                .entry(index)
                .or_default()
                .insert(member, (score, sequence));
        })
    }

    fn zrem(&self, index: String, member: String) -> BoxFuture<'static, StorageResult<()>> {
        self.with(move |inner, _| {
            if let Some(mut members) = inner.indexes.get_mut(&index) {
                members.remove(&member);
            }
        })
    }

    fn zrange_desc(
        &self,
        index: String,
        limit: Option<usize>,
    ) -> BoxFuture<'static, StorageResult<Vec<String>>> {
        self.with(move |inner, _| {
            let Some(members) = inner.indexes.get(&index) else {
                return Vec::new();
            };
            let mut ranked: Vec<_> = members
                .iter()
                .map(|(member, rank)| (*rank, member.clone()))
                .collect();
            ranked.sort_by(|left, right| right.0.cmp(&left.0));
            ranked
                .into_iter()
                .map(|(_, member)| member)
                .take(limit.unwrap_or(usize::MAX))
                .collect()
        })
    }

    fn scan_prefix(&self, prefix: String) -> BoxFuture<'static, StorageResult<Vec<String>>> {
        self.with(move |inner, now| {
            inner
                .entries
                .iter()
                .filter(|entry| entry.key().starts_with(&prefix) && entry.value().live(now))
                .map(|entry| entry.key().clone())
                .collect()
        })
    }

    fn ping(&self) -> BoxFuture<'static, StorageResult<()>> {
        self.with(|_, _| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> HashFields {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn hashes_merge_and_expire() {
        let cache = MemoryCache::new();
        cache
            .hset("room:A".into(), fields(&[("status", "\"waiting\"")]), Duration::from_secs(10))
            .await
            .unwrap();
        cache
            .hset("room:A".into(), fields(&[("code", "\"A\"")]), Duration::from_secs(10))
            .await
            .unwrap();
        assert_eq!(cache.hgetall("room:A".into()).await.unwrap().len(), 2);

        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(cache.hgetall("room:A".into()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn set_nx_refuses_live_keys() {
        let cache = MemoryCache::new();
        let ttl = Duration::from_secs(60);
        assert!(cache.set_nx("s:u1".into(), "c1".into(), ttl).await.unwrap());
        assert!(!cache.set_nx("s:u1".into(), "c2".into(), ttl).await.unwrap());
        assert_eq!(cache.get("s:u1".into()).await.unwrap().as_deref(), Some("c1"));
    }

    #[tokio::test]
    async fn del_if_eq_only_removes_matching_value() {
        let cache = MemoryCache::new();
        let ttl = Duration::from_secs(60);
        cache.set("s:u1".into(), "c2".into(), ttl).await.unwrap();
        assert!(!cache.del_if_eq("s:u1".into(), "c1".into()).await.unwrap());
        assert!(cache.del_if_eq("s:u1".into(), "c2".into()).await.unwrap());
        assert!(cache.get("s:u1".into()).await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn counters_reset_after_window() {
        let cache = MemoryCache::new();
        let window = Duration::from_secs(10);
        assert_eq!(cache.incr_window("rl".into(), window).await.unwrap().0, 1);
        tokio::time::advance(Duration::from_secs(4)).await;
        let (count, remaining) = cache.incr_window("rl".into(), window).await.unwrap();
        assert_eq!(count, 2);
        assert_eq!(remaining, Duration::from_secs(6));

        tokio::time::advance(Duration::from_secs(7)).await;
        assert_eq!(cache.incr_window("rl".into(), window).await.unwrap().0, 1);
    }

    #[tokio::test]
    async fn index_orders_by_score_then_recency() {
        let cache = MemoryCache::new();
        cache.zadd("idx".into(), "a".into(), 5).await.unwrap();
        cache.zadd("idx".into(), "b".into(), 9).await.unwrap();
        cache.zadd("idx".into(), "c".into(), 9).await.unwrap();
        assert_eq!(
            cache.zrange_desc("idx".into(), None).await.unwrap(),
            vec!["c", "b", "a"]
        );
        cache.zrem("idx".into(), "b".into()).await.unwrap();
        assert_eq!(
            cache.zrange_desc("idx".into(), Some(1)).await.unwrap(),
            vec!["c"]
        );
    }

    #[tokio::test]
    async fn outage_fails_every_call() {
        let cache = MemoryCache::new();
        cache.set_unavailable(true);
        assert!(cache.ping().await.is_err());
        assert!(cache.incr_window("rl".into(), Duration::from_secs(1)).await.is_err());
        cache.set_unavailable(false);
        assert!(cache.ping().await.is_ok());
    }
}
