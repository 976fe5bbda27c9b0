mod models;
pub mod store;

use std::sync::Arc;

pub use store::MongoRoomStore;

use crate::dao::{
    mongodb::{MongoConfig, error::MongoResult},
    room_store::DurableBackend,
};

/// Connect the Mongo room store and expose it as both store and lexicon.
pub async fn connect_backend(config: MongoConfig) -> MongoResult<DurableBackend> {
    let store = Arc::new(MongoRoomStore::connect(config).await?);
    Ok(DurableBackend {
        rooms: store.clone(),
        lexicon: store,
    })
}
