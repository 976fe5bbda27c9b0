/// Ephemeral TTL-bound state (rooms, games, sessions, rate buckets).
pub mod cache;
/// Hash-field serialization adapter.
pub mod codec;
/// Database model definitions.
pub mod models;
#[cfg(feature = "mongo-store")]
pub mod mongodb;
/// Durable room records and the lexicon.
pub mod room_store;
/// Storage abstraction layer for database operations.
pub mod storage;
