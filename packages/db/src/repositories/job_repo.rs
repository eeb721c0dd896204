//! Job repository for write-through persistence of queue jobs.

use queue_core::{Job, JobId, JobStatus};
use serde::{Deserialize, Serialize};

use crate::{DbError, get_db};

/// Repository for job persistence operations.
pub struct JobRepository;

/// Row layout in the `job` table.
#[derive(Debug, Serialize, Deserialize)]
struct JobRow {
    job_id: String,
    status: String,
    data: String,
}

impl JobRow {
    fn from_job(job: &Job) -> Result<Self, DbError> {
        Ok(Self {
            job_id: job.id.to_string(),
            status: job.status.as_str().to_string(),
            data: serde_json::to_string(job)?,
        })
    }

    fn into_job(self) -> Result<Job, DbError> {
        Ok(serde_json::from_str(&self.data)?)
    }
}

impl JobRepository {
    /// Create a new job in the database.
    pub async fn create(job: &Job) -> Result<Job, DbError> {
        let db = get_db()?;
        let row = JobRow::from_job(job)?;

        let record: Option<JobRow> = db.create(("job", job.id.to_string())).content(row).await?;

        record
            .ok_or_else(|| DbError::Query(format!("Failed to create job {}", job.id)))?
            .into_job()
    }

    /// Get a job by ID.
    pub async fn get(id: JobId) -> Result<Job, DbError> {
        Self::find(id)
            .await?
            .ok_or_else(|| DbError::NotFound(format!("Job not found: {}", id)))
    }

    /// Get a job by ID, `None` if it was never stored or has been pruned.
    pub async fn find(id: JobId) -> Result<Option<Job>, DbError> {
        let db = get_db()?;

        let record: Option<JobRow> = db.select(("job", id.to_string())).await?;

        record.map(JobRow::into_job).transpose()
    }

    /// Replace a stored job with its current state.
    pub async fn update(job: &Job) -> Result<Job, DbError> {
        let db = get_db()?;
        let row = JobRow::from_job(job)?;

        let record: Option<JobRow> = db.update(("job", job.id.to_string())).content(row).await?;

        record
            .ok_or_else(|| DbError::NotFound(format!("Job not found: {}", job.id)))?
            .into_job()
    }

    /// Delete a job.
    pub async fn delete(id: JobId) -> Result<(), DbError> {
        let db = get_db()?;

        let _: Option<JobRow> = db.delete(("job", id.to_string())).await?;

        Ok(())
    }

    /// List jobs in any of `statuses`, in enqueue order.
    pub async fn list_by_statuses(statuses: &[JobStatus]) -> Result<Vec<Job>, DbError> {
        let db = get_db()?;
        let statuses: Vec<String> = statuses.iter().map(|s| s.as_str().to_string()).collect();

        let mut response = db
            .query("SELECT * FROM job WHERE status INSIDE $statuses ORDER BY job_id ASC")
            .bind(("statuses", statuses))
            .await?;

        let rows: Vec<JobRow> = response.take(0)?;

        rows.into_iter().map(JobRow::into_job).collect()
    }

    /// List every stored job in enqueue order.
    pub async fn list_all() -> Result<Vec<Job>, DbError> {
        let db = get_db()?;

        let mut response = db.query("SELECT * FROM job ORDER BY job_id ASC").await?;
        let rows: Vec<JobRow> = response.take(0)?;

        rows.into_iter().map(JobRow::into_job).collect()
    }
}
