#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock, Mutex};
use std::time::Duration;

use coordinator::{
    InstanceCoordinator, LocalChannel, LocalQueueController, PresenceError, PresenceRegistry,
    QueueClient, QueueError,
};
use db::{DbConfig, DbError};
use queue_core::{Job, JobId, JobPayload, JobStatus, RoleConfig};
use serde_json::Value;

/// No command arguments.
pub const NO_ARGS: [&str; 0] = [];

/// Build a payload from a JSON object literal.
pub fn payload(value: Value) -> JobPayload {
    match value {
        Value::Object(map) => map,
        other => panic!("payload must be an object, got {other}"),
    }
}

/// Queue client recording every pause/resume call.
#[derive(Clone, Default)]
pub struct FakeQueue {
    inner: Arc<FakeQueueState>,
}

#[derive(Default)]
struct FakeQueueState {
    paused: AtomicBool,
    global_paused: AtomicBool,
    pause_calls: AtomicUsize,
    resume_calls: AtomicUsize,
    unresponsive: AtomicBool,
    jobs: Mutex<Vec<Job>>,
}

impl FakeQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start out locally paused, like a freshly started primary.
    pub fn paused() -> Self {
        let queue = Self::default();
        queue.inner.paused.store(true, Ordering::SeqCst);
        queue
    }

    pub fn is_paused(&self) -> bool {
        self.inner.paused.load(Ordering::SeqCst)
    }

    pub fn is_global_paused(&self) -> bool {
        self.inner.global_paused.load(Ordering::SeqCst)
    }

    pub fn pause_calls(&self) -> usize {
        self.inner.pause_calls.load(Ordering::SeqCst)
    }

    pub fn resume_calls(&self) -> usize {
        self.inner.resume_calls.load(Ordering::SeqCst)
    }

    /// Make every call hang until the caller gives up.
    pub fn set_unresponsive(&self, unresponsive: bool) {
        self.inner.unresponsive.store(unresponsive, Ordering::SeqCst);
    }

    async fn stall(&self) {
        if self.inner.unresponsive.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
    }
}

impl QueueClient for FakeQueue {
    async fn enqueue(
        &self,
        name: &str,
        payload: JobPayload,
        delay: Option<Duration>,
    ) -> Result<Job, QueueError> {
        self.stall().await;
        let mut job = Job::new(JobId::new(), name, payload);
        if let Some(delay) = delay {
            let run_at = job.enqueued_at + chrono::Duration::from_std(delay).unwrap();
            job = job.delayed_until(run_at);
        } else if self.is_global_paused() {
            job.status = JobStatus::Paused;
        }
        self.inner.jobs.lock().unwrap().push(job.clone());
        Ok(job)
    }

    async fn get_job(&self, job_id: JobId) -> Result<Option<Job>, QueueError> {
        self.stall().await;
        let jobs = self.inner.jobs.lock().unwrap();
        Ok(jobs.iter().find(|j| j.id == job_id).cloned())
    }

    async fn list_jobs(&self, statuses: &[JobStatus]) -> Result<Vec<Job>, QueueError> {
        self.stall().await;
        let jobs = self.inner.jobs.lock().unwrap();
        Ok(jobs
            .iter()
            .filter(|j| statuses.contains(&j.status))
            .cloned()
            .collect())
    }

    async fn pause_local(&self) -> Result<(), QueueError> {
        self.stall().await;
        self.inner.pause_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.paused.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn resume_local(&self) -> Result<(), QueueError> {
        self.stall().await;
        self.inner.resume_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.paused.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn is_paused_local(&self) -> Result<bool, QueueError> {
        self.stall().await;
        Ok(self.is_paused())
    }

    async fn pause_global(&self) -> Result<(), QueueError> {
        self.stall().await;
        self.inner.global_paused.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn resume_global(&self) -> Result<(), QueueError> {
        self.stall().await;
        self.inner.global_paused.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// Presence registry with a settable worker count.
#[derive(Clone, Default)]
pub struct FakePresence {
    inner: Arc<FakePresenceState>,
}

#[derive(Default)]
struct FakePresenceState {
    workers: AtomicUsize,
    failing: AtomicBool,
}

impl FakePresence {
    pub fn with_workers(workers: usize) -> Self {
        let presence = Self::default();
        presence.set_workers(workers);
        presence
    }

    pub fn set_workers(&self, workers: usize) {
        self.inner.workers.store(workers, Ordering::SeqCst);
    }

    pub fn set_failing(&self, failing: bool) {
        self.inner.failing.store(failing, Ordering::SeqCst);
    }
}

impl PresenceRegistry for FakePresence {
    async fn live_worker_count(&self) -> Result<usize, PresenceError> {
        if self.inner.failing.load(Ordering::SeqCst) {
            return Err(PresenceError::Unavailable("registry offline".into()));
        }
        Ok(self.inner.workers.load(Ordering::SeqCst))
    }
}

pub type TestCoordinator = InstanceCoordinator<FakeQueue, LocalChannel, FakePresence>;

pub fn build_coordinator(
    role: RoleConfig,
    queue: &FakeQueue,
    channel: &LocalChannel,
    presence: &FakePresence,
) -> TestCoordinator {
    InstanceCoordinator::new(
        role,
        LocalQueueController::new(queue.clone(), Duration::from_millis(200)),
        channel.clone(),
        presence.clone(),
    )
}

/// Poll `check` until it holds or two seconds pass.
pub async fn wait_until<F>(check: F) -> bool
where
    F: Fn() -> bool,
{
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}

static DB_LOCK: LazyLock<tokio::sync::Mutex<()>> = LazyLock::new(|| tokio::sync::Mutex::new(()));

/// Serialize tests over the shared in-memory database and start from empty tables.
pub async fn setup_db() -> Result<tokio::sync::MutexGuard<'static, ()>, DbError> {
    let guard = DB_LOCK.lock().await;
    db::init(DbConfig::memory()).await?;
    db::get_db()?.query("DELETE job; DELETE broker;").await?;
    Ok(guard)
}
