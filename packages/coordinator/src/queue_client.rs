//! Contract of the durable queue as seen by one process.

use std::future::Future;
use std::time::Duration;

use queue_core::{Job, JobId, JobPayload, JobStatus};

use crate::error::QueueError;

/// Durable queue client.
///
/// Local pause/resume affects only the process owning this client; global
/// pause/resume affects every consumer of the queue. Pausing or resuming
/// into the current state must succeed without effect.
pub trait QueueClient: Send + Sync + 'static {
    /// Add a job. With a `delay` the job starts out `delayed`.
    fn enqueue(
        &self,
        name: &str,
        payload: JobPayload,
        delay: Option<Duration>,
    ) -> impl Future<Output = Result<Job, QueueError>> + Send;

    /// Look a job up, `None` if the queue has no record of it.
    fn get_job(&self, job_id: JobId)
    -> impl Future<Output = Result<Option<Job>, QueueError>> + Send;

    /// Jobs in any of `statuses`, in the queue's default order.
    fn list_jobs(
        &self,
        statuses: &[JobStatus],
    ) -> impl Future<Output = Result<Vec<Job>, QueueError>> + Send;

    fn pause_local(&self) -> impl Future<Output = Result<(), QueueError>> + Send;

    fn resume_local(&self) -> impl Future<Output = Result<(), QueueError>> + Send;

    fn is_paused_local(&self) -> impl Future<Output = Result<bool, QueueError>> + Send;

    fn pause_global(&self) -> impl Future<Output = Result<(), QueueError>> + Send;

    fn resume_global(&self) -> impl Future<Output = Result<(), QueueError>> + Send;
}
