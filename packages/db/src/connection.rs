//! Database connection management with lazy initialization.

use std::sync::LazyLock;
use surrealdb::Surreal;
use surrealdb::engine::any::{Any, connect};
use thiserror::Error;
use tokio::sync::OnceCell;

/// Process-wide connection, set once by `init_db`.
static DB: LazyLock<OnceCell<Surreal<Any>>> = LazyLock::new(OnceCell::new);

/// Database connection wrapper.
pub type Database = Surreal<Any>;

/// Database configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Engine endpoint: `mem://`, `file://path` or `rocksdb://path`.
    pub endpoint: String,
    pub namespace: String,
    pub database: String,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            endpoint: "mem://".to_string(),
            namespace: "jobs".to_string(),
            database: "queue".to_string(),
        }
    }
}

impl DbConfig {
    /// In-memory storage, used by tests and single-process runs.
    pub fn memory() -> Self {
        Self::default()
    }

    /// Connect to an arbitrary endpoint.
    pub fn endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }
}

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("Database not initialized - call init_db first")]
    NotInitialized,
    #[error("Connection error: {0}")]
    Connection(#[from] surrealdb::Error),
    #[error("Query error: {0}")]
    Query(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Initialize the database connection.
///
/// Later calls return the existing connection and ignore `config`.
pub async fn init_db(config: DbConfig) -> Result<&'static Database, DbError> {
    DB.get_or_try_init(|| async {
        tracing::info!("Connecting to database: {}", config.endpoint);

        let db = connect(&config.endpoint).await?;

        db.use_ns(&config.namespace).use_db(&config.database).await?;

        tracing::info!(
            "Connected to database: {}/{}",
            config.namespace,
            config.database
        );

        Ok(db)
    })
    .await
}

/// Get the database connection.
pub fn get_db() -> Result<&'static Database, DbError> {
    DB.get().ok_or(DbError::NotInitialized)
}
