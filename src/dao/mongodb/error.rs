use mongodb::error::{Error as MongoError, ErrorKind, WriteFailure};
use thiserror::Error;

pub type MongoResult<T> = std::result::Result<T, MongoDaoError>;

#[derive(Debug, Error)]
pub enum MongoDaoError {
    #[error("failed to parse MongoDB connection URI `{uri}`")]
    InvalidUri {
        uri: String,
        #[source]
        source: MongoError,
    },
    #[error("missing required environment variable `{var}`")]
    MissingEnvVar { var: &'static str },
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping failed during initial connection after {attempts} attempt(s)")]
    InitialPing {
        attempts: u32,
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping health check failed")]
    HealthPing {
        #[source]
        source: MongoError,
    },
    #[error("failed to ensure index `{index}` on collection `{collection}`")]
    EnsureIndex {
        collection: &'static str,
        index: &'static str,
        #[source]
        source: MongoError,
    },
    #[error("failed to save room `{code}`")]
    SaveRoom {
        code: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to load room `{code}`")]
    LoadRoom {
        code: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to update status of room `{code}`")]
    UpdateRoomStatus {
        code: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to sample words from the lexicon")]
    SampleWords {
        #[source]
        source: MongoError,
    },
    #[error("cache read of `{key}` failed")]
    CacheRead {
        key: String,
        #[source]
        source: MongoError,
    },
    #[error("cache write of `{key}` failed")]
    CacheWrite {
        key: String,
        #[source]
        source: MongoError,
    },
    #[error("cache index `{index}` operation failed")]
    CacheIndex {
        index: String,
        #[source]
        source: MongoError,
    },
}

/// Whether a driver error is a unique index violation (code 11000).
pub fn is_duplicate_key(err: &MongoError) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(write)) if write.code == 11000
    )
}
