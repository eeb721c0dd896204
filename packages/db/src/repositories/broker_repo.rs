//! Broker repository for queue-wide flags.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::{DbError, get_db};

/// Repository for the global pause flag of a named queue.
pub struct BrokerRepository;

#[derive(Debug, Serialize, Deserialize)]
struct BrokerRow {
    paused: bool,
    updated_at: String,
}

impl BrokerRepository {
    /// Load the global pause flag. A queue with no stored record is running.
    pub async fn load_paused(queue: &str) -> Result<bool, DbError> {
        let db = get_db()?;

        let record: Option<BrokerRow> = db.select(("broker", queue.to_string())).await?;

        Ok(record.is_some_and(|r| r.paused))
    }

    /// Store the global pause flag.
    pub async fn save_paused(queue: &str, paused: bool) -> Result<(), DbError> {
        let db = get_db()?;
        let row = BrokerRow {
            paused,
            updated_at: Utc::now().to_rfc3339(),
        };

        let _: Option<BrokerRow> = db.upsert(("broker", queue.to_string())).content(row).await?;

        tracing::debug!("Stored pause flag for queue {}: {}", queue, paused);
        Ok(())
    }
}
