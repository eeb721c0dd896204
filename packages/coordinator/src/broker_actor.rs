//! Broker actor holding the shared job queue.

use std::collections::{BTreeMap, HashSet};

use chrono::Utc;
use db::DbError;
use db::repositories::{BrokerRepository, JobRepository};
use queue_core::{Job, JobEvent, JobId, JobStatus};
use ractor::{Actor, ActorProcessingErr, ActorRef};
use tokio::sync::broadcast;

use crate::error::QueueError;
use crate::messages::BrokerMessage;

/// Configuration for a broker.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Queue name, also the key of the persisted pause flag.
    pub name: String,
    /// Number of completed/failed jobs kept for status queries.
    pub retain_finished: usize,
    /// Write jobs and the pause flag through to the database.
    pub persistent: bool,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            name: "jobs".to_string(),
            retain_finished: 1000,
            persistent: false,
        }
    }
}

impl BrokerConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_retain_finished(mut self, retain_finished: usize) -> Self {
        self.retain_finished = retain_finished;
        self
    }

    /// Persist through the `db` crate. The database must be initialized first.
    pub fn persistent(mut self) -> Self {
        self.persistent = true;
        self
    }
}

/// State for the broker actor.
pub struct BrokerState {
    config: BrokerConfig,
    /// All retained jobs, in enqueue order.
    jobs: BTreeMap<JobId, Job>,
    /// Global pause flag.
    paused: bool,
    /// Consumers that paused locally.
    paused_consumers: HashSet<String>,
    ids: ulid::Generator,
    event_tx: broadcast::Sender<JobEvent>,
}

impl BrokerState {
    /// Create a new, empty broker state.
    pub fn new(config: BrokerConfig, event_tx: broadcast::Sender<JobEvent>) -> Self {
        Self {
            config,
            jobs: BTreeMap::new(),
            paused: false,
            paused_consumers: HashSet::new(),
            ids: ulid::Generator::new(),
            event_tx,
        }
    }

    fn broadcast(&self, event: JobEvent) {
        tracing::debug!("{}", event.description());
        let _ = self.event_tx.send(event);
    }

    async fn store(&self, job: &Job) -> Result<(), DbError> {
        if self.config.persistent {
            JobRepository::update(job).await?;
        }
        Ok(())
    }

    /// Restore jobs and the pause flag from the database.
    async fn restore(&mut self) -> Result<(), DbError> {
        self.paused = BrokerRepository::load_paused(&self.config.name).await?;

        for mut job in JobRepository::list_all().await? {
            if job.status == JobStatus::Active {
                // Nobody owns this job any more.
                job.failed_reason = Some("stalled: broker restarted".to_string());
                if job.transition(JobStatus::Failed).is_ok() {
                    JobRepository::update(&job).await?;
                }
            }
            self.jobs.insert(job.id, job);
        }

        // The flag and the job records are written separately; bring parked
        // jobs in line with the flag that survived.
        if self.paused {
            self.park_jobs(JobStatus::Waiting, JobStatus::Paused).await;
        } else {
            self.park_jobs(JobStatus::Paused, JobStatus::Waiting).await;
        }

        tracing::info!(
            "Restored {} jobs for queue {} (paused: {})",
            self.jobs.len(),
            self.config.name,
            self.paused
        );
        Ok(())
    }

    fn is_serving(&self, consumer_id: &str) -> bool {
        !self.paused && !self.paused_consumers.contains(consumer_id)
    }

    fn next_runnable(&self) -> Option<JobId> {
        let now = Utc::now();
        self.jobs
            .values()
            .find(|job| match job.status {
                JobStatus::Waiting => true,
                JobStatus::Delayed => job.is_due(now),
                _ => false,
            })
            .map(|job| job.id)
    }

    /// Mark an active job finished and return it with its run time.
    fn finish(
        &mut self,
        job_id: JobId,
        status: JobStatus,
        record: impl FnOnce(&mut Job),
    ) -> Option<(Job, u64)> {
        let job = self.jobs.get_mut(&job_id)?;
        let started_at = job.updated_at;
        if let Err(e) = job.transition(status) {
            tracing::warn!("Ignoring report for job {}: {}", job_id, e);
            return None;
        }
        record(job);
        let duration_ms = (job.updated_at - started_at).num_milliseconds().max(0) as u64;
        Some((job.clone(), duration_ms))
    }

    /// Drop the oldest finished jobs beyond the retention limit.
    async fn prune_finished(&mut self) {
        let finished: Vec<JobId> = self
            .jobs
            .values()
            .filter(|j| j.status.is_terminal())
            .map(|j| j.id)
            .collect();

        let excess = finished.len().saturating_sub(self.config.retain_finished);
        for job_id in finished.into_iter().take(excess) {
            self.jobs.remove(&job_id);
            if self.config.persistent
                && let Err(e) = JobRepository::delete(job_id).await
            {
                tracing::warn!("Failed to prune job {}: {}", job_id, e);
            }
        }
    }

    /// Move every job in `from` to `to`, used by global pause/resume.
    async fn park_jobs(&mut self, from: JobStatus, to: JobStatus) {
        let ids: Vec<JobId> = self
            .jobs
            .values()
            .filter(|j| j.status == from)
            .map(|j| j.id)
            .collect();

        for job_id in ids {
            let Some(job) = self.jobs.get_mut(&job_id) else {
                continue;
            };
            if job.transition(to).is_err() {
                continue;
            }
            let job = job.clone();
            if let Err(e) = self.store(&job).await {
                tracing::warn!("Failed to persist job {} as {}: {}", job_id, to, e);
            }
        }
    }

    async fn set_global_pause(&mut self, paused: bool) -> Result<(), QueueError> {
        if self.paused == paused {
            return Ok(());
        }

        if self.config.persistent {
            BrokerRepository::save_paused(&self.config.name, paused)
                .await
                .map_err(|e| QueueError::Storage(e.to_string()))?;
        }
        self.paused = paused;

        let timestamp = Utc::now();
        if paused {
            self.park_jobs(JobStatus::Waiting, JobStatus::Paused).await;
            self.broadcast(JobEvent::QueuePaused { timestamp });
        } else {
            self.park_jobs(JobStatus::Paused, JobStatus::Waiting).await;
            self.broadcast(JobEvent::QueueResumed { timestamp });
        }

        tracing::info!(
            "Queue {} {} globally",
            self.config.name,
            if paused { "paused" } else { "resumed" }
        );
        Ok(())
    }
}

/// Broker actor that owns the queue's jobs and pause flags.
pub struct BrokerActor;

impl Actor for BrokerActor {
    type Msg = BrokerMessage;
    type State = BrokerState;
    type Arguments = BrokerState;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        mut args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!("Starting queue broker: {}", args.config.name);

        if args.config.persistent {
            args.restore().await.map_err(|e| {
                ActorProcessingErr::from(format!("Failed to restore queue: {}", e))
            })?;
        }

        Ok(args)
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            BrokerMessage::Enqueue {
                name,
                payload,
                delay,
                reply,
            } => {
                let id = match state.ids.generate() {
                    Ok(id) => JobId(id),
                    Err(e) => {
                        let _ = reply.send(Err(QueueError::Rejected(e.to_string())));
                        return Ok(());
                    }
                };

                let mut job = Job::new(id, name, payload);
                if let Some(delay) = delay {
                    let Ok(delay) = chrono::Duration::from_std(delay) else {
                        let _ = reply.send(Err(QueueError::Rejected("delay out of range".into())));
                        return Ok(());
                    };
                    let run_at = job.enqueued_at + delay;
                    job = job.delayed_until(run_at);
                } else if state.paused {
                    job.status = JobStatus::Paused;
                }

                if state.config.persistent
                    && let Err(e) = JobRepository::create(&job).await
                {
                    let _ = reply.send(Err(QueueError::Storage(e.to_string())));
                    return Ok(());
                }

                state.jobs.insert(job.id, job.clone());
                state.broadcast(JobEvent::JobEnqueued {
                    job: job.clone(),
                    timestamp: Utc::now(),
                });

                let _ = reply.send(Ok(job));
            }

            BrokerMessage::RequestJob { consumer_id, reply } => {
                if !state.is_serving(&consumer_id) {
                    let _ = reply.send(None);
                    return Ok(());
                }

                let Some(job_id) = state.next_runnable() else {
                    let _ = reply.send(None);
                    return Ok(());
                };
                let Some(previous) = state.jobs.get(&job_id).cloned() else {
                    let _ = reply.send(None);
                    return Ok(());
                };

                let mut job = previous.clone();
                if job.transition(JobStatus::Active).is_err() {
                    let _ = reply.send(None);
                    return Ok(());
                }
                job.attempts = job.attempts.saturating_add(1);

                if let Err(e) = state.store(&job).await {
                    tracing::warn!("Failed to mark job {} active: {}", job.id, e);
                    let _ = reply.send(None);
                    return Ok(());
                }

                state.jobs.insert(job.id, job.clone());
                state.broadcast(JobEvent::JobStarted {
                    job_id: job.id,
                    consumer_id,
                    timestamp: job.updated_at,
                });

                let _ = reply.send(Some(job));
            }

            BrokerMessage::JobCompleted { job_id, result } => {
                let finished =
                    state.finish(job_id, JobStatus::Completed, |job| job.result = result);
                if let Some((job, duration_ms)) = finished {
                    if let Err(e) = state.store(&job).await {
                        tracing::warn!("Failed to update job {} status: {}", job_id, e);
                    }
                    state.broadcast(JobEvent::JobCompleted {
                        job_id,
                        duration_ms,
                        timestamp: job.updated_at,
                    });
                    state.prune_finished().await;
                }
            }

            BrokerMessage::JobFailed { job_id, error } => {
                let reason = error.clone();
                let finished =
                    state.finish(job_id, JobStatus::Failed, |job| job.failed_reason = Some(reason));
                if let Some((job, _)) = finished {
                    if let Err(e) = state.store(&job).await {
                        tracing::warn!("Failed to update job {} status: {}", job_id, e);
                    }
                    state.broadcast(JobEvent::JobFailed {
                        job_id,
                        error,
                        timestamp: job.updated_at,
                    });
                    state.prune_finished().await;
                }
            }

            BrokerMessage::GetJob { job_id, reply } => {
                let _ = reply.send(state.jobs.get(&job_id).cloned());
            }

            BrokerMessage::ListJobs { statuses, reply } => {
                let jobs: Vec<Job> = state
                    .jobs
                    .values()
                    .filter(|j| statuses.contains(&j.status))
                    .cloned()
                    .collect();
                let _ = reply.send(jobs);
            }

            BrokerMessage::PauseLocal { consumer_id, reply } => {
                if state.paused_consumers.insert(consumer_id.clone()) {
                    state.broadcast(JobEvent::ConsumerPaused {
                        consumer_id,
                        timestamp: Utc::now(),
                    });
                }
                let _ = reply.send(Ok(()));
            }

            BrokerMessage::ResumeLocal { consumer_id, reply } => {
                if state.paused_consumers.remove(&consumer_id) {
                    state.broadcast(JobEvent::ConsumerResumed {
                        consumer_id,
                        timestamp: Utc::now(),
                    });
                }
                let _ = reply.send(Ok(()));
            }

            BrokerMessage::IsPausedLocal { consumer_id, reply } => {
                let _ = reply.send(state.paused_consumers.contains(&consumer_id));
            }

            BrokerMessage::PauseGlobal { reply } => {
                let _ = reply.send(state.set_global_pause(true).await);
            }

            BrokerMessage::ResumeGlobal { reply } => {
                let _ = reply.send(state.set_global_pause(false).await);
            }

            BrokerMessage::IsPausedGlobal { reply } => {
                let _ = reply.send(state.paused);
            }

            BrokerMessage::Subscribe { reply } => {
                let _ = reply.send(state.event_tx.subscribe());
            }

            BrokerMessage::Shutdown => {
                tracing::info!("Shutting down queue broker: {}", state.config.name);
                myself.stop(None);
            }
        }

        Ok(())
    }
}
