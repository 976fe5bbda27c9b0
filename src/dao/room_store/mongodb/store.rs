use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    Collection,
    bson::{DateTime, doc},
    options::IndexOptions,
};

use super::models::{MongoRoomDocument, MongoWordDocument};
use crate::dao::{
    models::{RoomEntity, RoomStatus, WordEntity},
    mongodb::{
        MongoConfig, MongoConnection,
        error::{MongoDaoError, MongoResult},
    },
    room_store::{Lexicon, RoomStore},
    storage::StorageResult,
};

const ROOM_COLLECTION_NAME: &str = "rooms";
const WORD_COLLECTION_NAME: &str = "words";

/// MongoDB-backed durable room store and lexicon.
#[derive(Clone)]
pub struct MongoRoomStore {
    connection: MongoConnection,
}

impl MongoRoomStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let store = Self {
            connection: MongoConnection::connect(config).await?,
        };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let status_index = mongodb::IndexModel::builder()
            .keys(doc! { "status": 1, "created_at": -1 })
            .options(
                IndexOptions::builder()
                    .name(Some("room_status_idx".to_owned()))
                    .build(),
            )
            .build();
        self.rooms()
            .await
            .create_index(status_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: ROOM_COLLECTION_NAME,
                index: "status,created_at",
                source,
            })?;

        let word_index = mongodb::IndexModel::builder()
            .keys(doc! { "word": 1 })
            .options(
                IndexOptions::builder()
                    .name(Some("word_text_idx".to_owned()))
                    .unique(Some(true))
                    .build(),
            )
            .build();
        self.words()
            .await
            .create_index(word_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: WORD_COLLECTION_NAME,
                index: "word",
                source,
            })?;

        Ok(())
    }

    async fn rooms(&self) -> Collection<MongoRoomDocument> {
        self.connection.collection(ROOM_COLLECTION_NAME).await
    }

    async fn words(&self) -> Collection<MongoWordDocument> {
        self.connection.collection(WORD_COLLECTION_NAME).await
    }

    async fn save_room(&self, room: RoomEntity) -> MongoResult<()> {
        let code = room.code.clone();
        let document: MongoRoomDocument = room.into();
        self.rooms()
            .await
            .replace_one(doc! { "_id": code.as_str() }, &document)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::SaveRoom { code, source })?;
        Ok(())
    }

    async fn find_room(&self, code: String) -> MongoResult<Option<RoomEntity>> {
        let document = self
            .rooms()
            .await
            .find_one(doc! { "_id": code.as_str() })
            .await
            .map_err(|source| MongoDaoError::LoadRoom { code, source })?;
        Ok(document.map(Into::into))
    }

    async fn update_status(&self, code: String, status: RoomStatus) -> MongoResult<bool> {
        let result = self
            .rooms()
            .await
            .update_one(
                doc! { "_id": code.as_str() },
                doc! { "$set": { "status": status.as_str(), "updated_at": DateTime::now() } },
            )
            .await
            .map_err(|source| MongoDaoError::UpdateRoomStatus { code, source })?;
        Ok(result.matched_count > 0)
    }

    async fn draw_words(&self, exclude: Vec<String>, limit: usize) -> MongoResult<Vec<WordEntity>> {
        let pipeline = vec![
            doc! { "$match": { "word": { "$nin": exclude } } },
            doc! { "$sample": { "size": limit as i64 } },
        ];
        let documents: Vec<MongoWordDocument> = self
            .words()
            .await
            .aggregate(pipeline)
            .with_type::<MongoWordDocument>()
            .await
            .map_err(|source| MongoDaoError::SampleWords { source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::SampleWords { source })?;
        Ok(documents.into_iter().map(Into::into).collect())
    }
}

impl RoomStore for MongoRoomStore {
    fn save_room(&self, room: RoomEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.save_room(room).await.map_err(Into::into) })
    }

    fn find_room(&self, code: String) -> BoxFuture<'static, StorageResult<Option<RoomEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_room(code).await.map_err(Into::into) })
    }

    fn update_status(
        &self,
        code: String,
        status: RoomStatus,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.update_status(code, status).await.map_err(Into::into) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.connection.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.connection.reconnect().await.map_err(Into::into) })
    }
}

impl Lexicon for MongoRoomStore {
    fn draw_words(
        &self,
        exclude: Vec<String>,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<WordEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.draw_words(exclude, limit).await.map_err(Into::into) })
    }
}
