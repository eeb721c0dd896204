//! Database schema definitions using SurrealQL.

use crate::{DbError, get_db};

/// Initialize the database schema.
pub async fn init_schema() -> Result<(), DbError> {
    let db = get_db()?;

    tracing::info!("Initializing database schema...");

    db.query(JOB_SCHEMA).await?;
    db.query(BROKER_SCHEMA).await?;

    tracing::info!("Database schema initialized");

    Ok(())
}

/// Job table. The full job is stored as a JSON document in `data`; `status`
/// and `job_id` are lifted out for filtering and ordering.
const JOB_SCHEMA: &str = r#"
DEFINE TABLE IF NOT EXISTS job SCHEMAFULL;

DEFINE FIELD IF NOT EXISTS job_id ON job TYPE string;
DEFINE FIELD IF NOT EXISTS status ON job TYPE string;
DEFINE FIELD IF NOT EXISTS data ON job TYPE string;

DEFINE INDEX IF NOT EXISTS job_status ON job FIELDS status;
DEFINE INDEX IF NOT EXISTS job_order ON job FIELDS job_id UNIQUE;
"#;

/// Broker table holding queue-wide flags, one record per queue name.
const BROKER_SCHEMA: &str = r#"
DEFINE TABLE IF NOT EXISTS broker SCHEMAFULL;

DEFINE FIELD IF NOT EXISTS paused ON broker TYPE bool DEFAULT false;
DEFINE FIELD IF NOT EXISTS updated_at ON broker TYPE string;
"#;
