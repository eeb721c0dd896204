//! SurrealDB persistence for the queue broker.
//!
//! Stores job records and the global pause flag so a restarted broker
//! keeps the queue's state.
//!
//! # Features
//!
//! - `memory` (default): in-memory storage
//! - `rocksdb`: RocksDB file-based storage

mod connection;
mod schema;
pub mod repositories;

pub use connection::{Database, DbConfig, DbError, get_db, init_db};
pub use schema::init_schema;

/// Initialize the database with the given configuration.
///
/// This should be called once at application startup.
pub async fn init(config: DbConfig) -> Result<(), DbError> {
    init_db(config).await?;
    init_schema().await?;
    Ok(())
}
