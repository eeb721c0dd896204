//! Local queue controller: the coordinator's only path to the queue client.

use std::future::Future;
use std::time::Duration;

use queue_core::{Job, JobId, JobPayload, JobStatus};

use crate::error::{CoordinatorError, CoordinatorResult, QueueError};
use crate::queue_client::QueueClient;

/// Wraps a queue client with an explicit per-call timeout.
///
/// A call that exceeds the timeout fails with
/// [`CoordinatorError::QueueUnavailable`] instead of blocking the caller.
pub struct LocalQueueController<Q> {
    client: Q,
    timeout: Duration,
}

impl<Q: QueueClient> LocalQueueController<Q> {
    pub fn new(client: Q, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    pub fn client(&self) -> &Q {
        &self.client
    }

    async fn bounded<T, F>(&self, operation: &'static str, call: F) -> CoordinatorResult<T>
    where
        F: Future<Output = Result<T, QueueError>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(QueueError::Timeout)) | Err(_) => Err(CoordinatorError::QueueUnavailable {
                operation,
                timeout: self.timeout,
            }),
            Ok(Err(e)) => Err(e.into()),
        }
    }

    pub async fn enqueue(
        &self,
        name: &str,
        payload: JobPayload,
        delay: Option<Duration>,
    ) -> CoordinatorResult<Job> {
        self.bounded("enqueue", self.client.enqueue(name, payload, delay)).await
    }

    pub async fn get_job(&self, job_id: JobId) -> CoordinatorResult<Option<Job>> {
        self.bounded("get_job", self.client.get_job(job_id)).await
    }

    pub async fn list_jobs(&self, statuses: &[JobStatus]) -> CoordinatorResult<Vec<Job>> {
        self.bounded("list_jobs", self.client.list_jobs(statuses)).await
    }

    /// Stop this process pulling jobs. No-op when already paused.
    pub async fn pause_local(&self) -> CoordinatorResult<()> {
        self.bounded("pause_local", self.client.pause_local()).await
    }

    /// Let this process pull jobs again. No-op when already consuming.
    pub async fn resume_local(&self) -> CoordinatorResult<()> {
        self.bounded("resume_local", self.client.resume_local()).await
    }

    pub async fn is_paused_local(&self) -> CoordinatorResult<bool> {
        self.bounded("is_paused_local", self.client.is_paused_local()).await
    }

    pub async fn pause_global(&self) -> CoordinatorResult<()> {
        self.bounded("pause_global", self.client.pause_global()).await
    }

    pub async fn resume_global(&self) -> CoordinatorResult<()> {
        self.bounded("resume_global", self.client.resume_global()).await
    }
}
