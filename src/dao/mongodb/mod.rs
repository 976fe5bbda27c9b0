//! MongoDB plumbing shared by the durable room store, the lexicon and the
//! Mongo-backed ephemeral cache.

pub mod config;
pub mod connection;
pub mod error;

pub use config::MongoConfig;
pub use connection::MongoConnection;
pub use error::MongoDaoError;

use crate::dao::storage::StorageError;

impl From<MongoDaoError> for StorageError {
    fn from(err: MongoDaoError) -> Self {
        StorageError::unavailable(err.to_string(), err)
    }
}
