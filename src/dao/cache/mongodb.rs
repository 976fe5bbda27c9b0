use std::{collections::HashMap, time::Duration};

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    Collection, IndexModel,
    bson::{DateTime, Document, doc},
    options::{IndexOptions, ReturnDocument},
};
use serde::{Deserialize, Serialize};

use super::{EphemeralStore, now_millis};
use crate::dao::{
    codec::HashFields,
    mongodb::{
        MongoConfig, MongoConnection,
        error::{MongoDaoError, MongoResult, is_duplicate_key},
    },
    storage::StorageResult,
};

const ENTRY_COLLECTION_NAME: &str = "cache_entries";
const INDEX_COLLECTION_NAME: &str = "cache_index";

/// [`EphemeralStore`] backed by MongoDB TTL collections.
///
/// The server's TTL monitor reaps expired documents lazily, so every read
/// also filters on `expires_at`.
#[derive(Clone)]
pub struct MongoCache {
    connection: MongoConnection,
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheEntryDocument {
    #[serde(rename = "_id")]
    key: String,
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    fields: HashMap<String, String>,
    #[serde(default)]
    count: i64,
    expires_at: DateTime,
}

#[derive(Debug, Serialize, Deserialize)]
struct IndexMemberDocument {
    index: String,
    member: String,
    score: i64,
}

fn expiry(ttl: Duration) -> DateTime {
    DateTime::from_millis(now_millis() + ttl.as_millis() as i64)
}

fn live_key(key: &str) -> Document {
    doc! { "_id": key, "expires_at": { "$gt": DateTime::now() } }
}

fn expired_key(key: &str) -> Document {
    doc! { "_id": key, "expires_at": { "$lte": DateTime::now() } }
}

fn escape_regex(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if "\\^$.|?*+()[]{}".contains(ch) {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

impl MongoCache {
    /// Connect and make sure the TTL and lookup indexes exist.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let cache = Self {
            connection: MongoConnection::connect(config).await?,
        };
        cache.ensure_indexes().await?;
        Ok(cache)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let ttl_index = IndexModel::builder()
            .keys(doc! { "expires_at": 1 })
            .options(
                IndexOptions::builder()
                    .name(Some("cache_ttl_idx".to_owned()))
                    .expire_after(Some(Duration::ZERO))
                    .build(),
            )
            .build();
        self.entries()
            .await
            .create_index(ttl_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: ENTRY_COLLECTION_NAME,
                index: "expires_at",
                source,
            })?;

        let member_index = IndexModel::builder()
            .keys(doc! { "index": 1, "member": 1 })
            .options(
                IndexOptions::builder()
                    .name(Some("cache_index_member_idx".to_owned()))
                    .unique(Some(true))
                    .build(),
            )
            .build();
        self.index_members()
            .await
            .create_index(member_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: INDEX_COLLECTION_NAME,
                index: "index,member",
                source,
            })?;

        Ok(())
    }

    async fn entries(&self) -> Collection<CacheEntryDocument> {
        self.connection.collection(ENTRY_COLLECTION_NAME).await
    }

    async fn index_members(&self) -> Collection<IndexMemberDocument> {
        self.connection.collection(INDEX_COLLECTION_NAME).await
    }

    async fn purge_expired(&self, key: &str) -> MongoResult<()> {
        self.entries()
            .await
            .delete_one(expired_key(key))
            .await
            .map_err(|source| MongoDaoError::CacheWrite {
                key: key.to_owned(),
                source,
            })?;
        Ok(())
    }

    async fn read(&self, key: &str) -> MongoResult<Option<CacheEntryDocument>> {
        self.entries()
            .await
            .find_one(live_key(key))
            .await
            .map_err(|source| MongoDaoError::CacheRead {
                key: key.to_owned(),
                source,
            })
    }

    async fn hset(&self, key: String, fields: HashFields, ttl: Duration) -> MongoResult<()> {
        self.purge_expired(&key).await?;
        let mut set = Document::new();
        for (field, value) in fields {
            set.insert(format!("fields.{field}"), value);
        }
        set.insert("expires_at", expiry(ttl));

        self.entries()
            .await
            .update_one(doc! { "_id": key.as_str() }, doc! { "$set": set })
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::CacheWrite { key, source })?;
        Ok(())
    }

    async fn del(&self, key: String) -> MongoResult<bool> {
        let result = self
            .entries()
            .await
            .delete_one(live_key(&key))
            .await
            .map_err(|source| MongoDaoError::CacheWrite {
                key: key.clone(),
                source,
            })?;
        // Expired leftovers go too, but only a live key counts as deleted.
        self.purge_expired(&key).await?;
        Ok(result.deleted_count > 0)
    }

    async fn set(&self, key: String, value: String, ttl: Duration) -> MongoResult<()> {
        let document = CacheEntryDocument {
            key: key.clone(),
            value: Some(value),
            fields: HashMap::new(),
            count: 0,
            expires_at: expiry(ttl),
        };
        self.entries()
            .await
            .replace_one(doc! { "_id": key.as_str() }, &document)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::CacheWrite { key, source })?;
        Ok(())
    }

    async fn set_nx(&self, key: String, value: String, ttl: Duration) -> MongoResult<bool> {
        self.purge_expired(&key).await?;
        let document = CacheEntryDocument {
            key: key.clone(),
            value: Some(value),
            fields: HashMap::new(),
            count: 0,
            expires_at: expiry(ttl),
        };
        match self.entries().await.insert_one(&document).await {
            Ok(_) => Ok(true),
            Err(err) if is_duplicate_key(&err) => Ok(false),
            Err(source) => Err(MongoDaoError::CacheWrite { key, source }),
        }
    }

    async fn del_if_eq(&self, key: String, expected: String) -> MongoResult<bool> {
        let mut filter = live_key(&key);
        filter.insert("value", expected);
        let result = self
            .entries()
            .await
            .delete_one(filter)
            .await
            .map_err(|source| MongoDaoError::CacheWrite { key, source })?;
        Ok(result.deleted_count > 0)
    }

    async fn incr_window(&self, key: String, window: Duration) -> MongoResult<(u64, Duration)> {
        self.purge_expired(&key).await?;
        let update = doc! {
            "$inc": { "count": 1_i64 },
            "$setOnInsert": { "expires_at": expiry(window) },
        };

        let mut attempt = 0;
        let document = loop {
            let result = self
                .entries()
                .await
                .find_one_and_update(doc! { "_id": key.as_str() }, update.clone())
                .upsert(true)
                .return_document(ReturnDocument::After)
                .await;
            match result {
                Ok(document) => break document,
                // Two first hits in the same window race on the upsert; the loser retries as an update.
                Err(err) if is_duplicate_key(&err) && attempt == 0 => attempt += 1,
                Err(source) => return Err(MongoDaoError::CacheWrite { key, source }),
            }
        };

        let Some(document) = document else {
            return Ok((1, window));
        };
        let remaining_ms = (document.expires_at.timestamp_millis() - now_millis()).max(0);
        Ok((
            document.count.max(0) as u64,
            Duration::from_millis(remaining_ms as u64),
        ))
    }

    async fn zadd(&self, index: String, member: String, score: i64) -> MongoResult<()> {
        self.index_members()
            .await
            .update_one(
                doc! { "index": index.as_str(), "member": member.as_str() },
                doc! { "$set": { "score": score } },
            )
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::CacheIndex { index, source })?;
        Ok(())
    }

    async fn zrem(&self, index: String, member: String) -> MongoResult<()> {
        self.index_members()
            .await
            .delete_one(doc! { "index": index.as_str(), "member": member.as_str() })
            .await
            .map_err(|source| MongoDaoError::CacheIndex { index, source })?;
        Ok(())
    }

    async fn zrange_desc(&self, index: String, limit: Option<usize>) -> MongoResult<Vec<String>> {
        let collection = self.index_members().await;
        let mut find = collection
            .find(doc! { "index": index.as_str() })
            .sort(doc! { "score": -1, "_id": -1 });
        if let Some(limit) = limit {
            find = find.limit(limit as i64);
        }
        let members: Vec<IndexMemberDocument> = find
            .await
            .map_err(|source| MongoDaoError::CacheIndex {
                index: index.clone(),
                source,
            })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::CacheIndex { index, source })?;
        Ok(members.into_iter().map(|doc| doc.member).collect())
    }

    async fn scan_prefix(&self, prefix: String) -> MongoResult<Vec<String>> {
        let filter = doc! {
            "_id": { "$regex": format!("^{}", escape_regex(&prefix)) },
            "expires_at": { "$gt": DateTime::now() },
        };
        let entries: Vec<CacheEntryDocument> = self
            .entries()
            .await
            .find(filter)
            .await
            .map_err(|source| MongoDaoError::CacheRead {
                key: prefix.clone(),
                source,
            })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::CacheRead { key: prefix, source })?;
        Ok(entries.into_iter().map(|entry| entry.key).collect())
    }
}

impl EphemeralStore for MongoCache {
    fn hset(
        &self,
        key: String,
        fields: HashFields,
        ttl: Duration,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let cache = self.clone();
        Box::pin(async move { cache.hset(key, fields, ttl).await.map_err(Into::into) })
    }

    fn hgetall(&self, key: String) -> BoxFuture<'static, StorageResult<HashMap<String, String>>> {
        let cache = self.clone();
        Box::pin(async move {
            let entry = cache.read(&key).await?;
            Ok(entry.map(|entry| entry.fields).unwrap_or_default())
        })
    }

    fn del(&self, key: String) -> BoxFuture<'static, StorageResult<bool>> {
        let cache = self.clone();
        Box::pin(async move { cache.del(key).await.map_err(Into::into) })
    }

    fn set(&self, key: String, value: String, ttl: Duration) -> BoxFuture<'static, StorageResult<()>> {
        let cache = self.clone();
        Box::pin(async move { cache.set(key, value, ttl).await.map_err(Into::into) })
    }

    fn set_nx(
        &self,
        key: String,
        value: String,
        ttl: Duration,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let cache = self.clone();
        Box::pin(async move { cache.set_nx(key, value, ttl).await.map_err(Into::into) })
    }

    fn get(&self, key: String) -> BoxFuture<'static, StorageResult<Option<String>>> {
        let cache = self.clone();
        Box::pin(async move {
            let entry = cache.read(&key).await?;
            Ok(entry.and_then(|entry| entry.value))
        })
    }

    fn del_if_eq(&self, key: String, expected: String) -> BoxFuture<'static, StorageResult<bool>> {
        let cache = self.clone();
        Box::pin(async move { cache.del_if_eq(key, expected).await.map_err(Into::into) })
    }

    fn incr_window(
        &self,
        key: String,
        window: Duration,
    ) -> BoxFuture<'static, StorageResult<(u64, Duration)>> {
        let cache = self.clone();
        Box::pin(async move { cache.incr_window(key, window).await.map_err(Into::into) })
    }

    fn zadd(&self, index: String, member: String, score: i64) -> BoxFuture<'static, StorageResult<()>> {
        let cache = self.clone();
        Box::pin(async move { cache.zadd(index, member, score).await.map_err(Into::into) })
    }

    fn zrem(&self, index: String, member: String) -> BoxFuture<'static, StorageResult<()>> {
        let cache = self.clone();
        Box::pin(async move { cache.zrem(index, member).await.map_err(Into::into) })
    }

    fn zrange_desc(
        &self,
        index: String,
        limit: Option<usize>,
    ) -> BoxFuture<'static, StorageResult<Vec<String>>> {
        let cache = self.clone();
        Box::pin(async move { cache.zrange_desc(index, limit).await.map_err(Into::into) })
    }

    fn scan_prefix(&self, prefix: String) -> BoxFuture<'static, StorageResult<Vec<String>>> {
        let cache = self.clone();
        Box::pin(async move { cache.scan_prefix(prefix).await.map_err(Into::into) })
    }

    fn ping(&self) -> BoxFuture<'static, StorageResult<()>> {
        let cache = self.clone();
        Box::pin(async move { cache.connection.ping().await.map_err(Into::into) })
    }
}
