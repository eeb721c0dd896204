//! Instance coordinator: decides whether this process consumes the queue.

use std::sync::Arc;
use std::time::Duration;

use queue_core::{
    Command, CommandKind, InstanceRole, Job, JobId, JobPayload, JobStatus, RoleConfig, Topic,
};
use ractor::ActorRef;
use tokio::sync::{Mutex, OnceCell, broadcast};

use crate::channel::CommandChannel;
use crate::controller::LocalQueueController;
use crate::dispatcher::{CommandFuture, CommandHandlerRegistry, spawn_dispatcher};
use crate::error::{CoordinatorError, CoordinatorResult};
use crate::messages::DispatcherMessage;
use crate::presence::{PresenceEvent, PresenceRegistry};
use crate::queue_client::QueueClient;

/// Outcome of one toggle evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleAction {
    /// Local consumption already matches the policy.
    None,
    PauseLocal,
    ResumeLocal,
}

/// Toggle policy.
///
/// `worker_count` is `None` when the presence registry could not be read;
/// an unknown count never resumes consumption.
pub fn decide_toggle(
    role: RoleConfig,
    worker_count: Option<usize>,
    local_paused: bool,
) -> ToggleAction {
    match role.role {
        InstanceRole::Worker => ToggleAction::None,
        InstanceRole::Primary if !role.fallback => {
            if local_paused {
                ToggleAction::None
            } else {
                ToggleAction::PauseLocal
            }
        }
        InstanceRole::Primary => match (worker_count, local_paused) {
            (Some(0), true) => ToggleAction::ResumeLocal,
            (Some(count), false) if count > 0 => ToggleAction::PauseLocal,
            _ => ToggleAction::None,
        },
    }
}

/// Per-process coordinator over the queue, command channel and presence
/// registry.
pub struct InstanceCoordinator<Q, C, P> {
    role: RoleConfig,
    queue: Arc<LocalQueueController<Q>>,
    channel: C,
    presence: P,
    /// Serializes toggle evaluations within this process.
    toggle_lock: Mutex<()>,
    dispatcher: OnceCell<ActorRef<DispatcherMessage>>,
}

impl<Q, C, P> InstanceCoordinator<Q, C, P>
where
    Q: QueueClient,
    C: CommandChannel,
    P: PresenceRegistry,
{
    pub fn new(role: RoleConfig, queue: LocalQueueController<Q>, channel: C, presence: P) -> Self {
        Self {
            role,
            queue: Arc::new(queue),
            channel,
            presence,
            toggle_lock: Mutex::new(()),
            dispatcher: OnceCell::new(),
        }
    }

    pub fn role(&self) -> RoleConfig {
        self.role
    }

    pub fn queue(&self) -> &LocalQueueController<Q> {
        &self.queue
    }

    /// Register the remote pause/resume handlers, start listening on this
    /// role's topic and run the first toggle evaluation.
    pub async fn initialize(&self) -> CoordinatorResult<()> {
        if self.dispatcher.initialized() {
            return Err(CoordinatorError::AlreadyInitialized);
        }

        let handlers = Arc::new(self.command_handlers());
        let dispatcher = spawn_dispatcher(&self.channel, self.role.role.topic(), handlers).await?;
        if self.dispatcher.set(dispatcher.clone()).is_err() {
            dispatcher.stop(None);
            return Err(CoordinatorError::AlreadyInitialized);
        }

        tracing::info!(
            "Coordinator started as {} (fallback: {})",
            self.role.role,
            self.role.fallback
        );

        if let Err(e) = self.evaluate_toggle().await {
            tracing::warn!("Initial queue toggle failed: {}", e);
        }
        Ok(())
    }

    fn command_handlers(&self) -> CommandHandlerRegistry {
        let mut handlers = CommandHandlerRegistry::new();

        let queue = self.queue.clone();
        handlers.register(CommandKind::PauseLocal, move || -> CommandFuture {
            let queue = queue.clone();
            Box::pin(async move {
                tracing::info!("Pausing local queue");
                queue.pause_local().await
            })
        });

        let queue = self.queue.clone();
        handlers.register(CommandKind::ResumeLocal, move || -> CommandFuture {
            let queue = queue.clone();
            Box::pin(async move {
                tracing::info!("Resuming local queue");
                queue.resume_local().await
            })
        });

        handlers
    }

    /// Bring local consumption in line with the toggle policy.
    ///
    /// Reads the worker count and the local pause flag fresh each time and
    /// only calls the queue when they disagree, so repeated calls converge.
    pub async fn evaluate_toggle(&self) -> CoordinatorResult<ToggleAction> {
        if self.role.is_worker() {
            return Ok(ToggleAction::None);
        }

        let _guard = self.toggle_lock.lock().await;

        let worker_count = if self.role.fallback {
            match self.presence.live_worker_count().await {
                Ok(count) => Some(count),
                Err(e) => {
                    tracing::warn!("Worker count unknown, leaving local queue as is: {}", e);
                    None
                }
            }
        } else {
            None
        };
        let local_paused = self.queue.is_paused_local().await?;

        let action = decide_toggle(self.role, worker_count, local_paused);
        match action {
            ToggleAction::PauseLocal => {
                tracing::info!("Pausing local queue (workers: {:?})", worker_count);
                self.queue.pause_local().await?;
            }
            ToggleAction::ResumeLocal => {
                tracing::info!("Resuming local queue, no workers alive");
                self.queue.resume_local().await?;
            }
            ToggleAction::None => {
                tracing::debug!(
                    "Local queue unchanged (workers: {:?}, paused: {})",
                    worker_count,
                    local_paused
                );
            }
        }

        Ok(action)
    }

    /// Add a job to the queue.
    pub async fn submit(&self, name: &str, payload: JobPayload) -> CoordinatorResult<Job> {
        self.enqueue(name, payload, None).await
    }

    /// Add a job that becomes runnable after `delay`.
    pub async fn submit_delayed(
        &self,
        name: &str,
        payload: JobPayload,
        delay: Duration,
    ) -> CoordinatorResult<Job> {
        self.enqueue(name, payload, Some(delay)).await
    }

    async fn enqueue(
        &self,
        name: &str,
        payload: JobPayload,
        delay: Option<Duration>,
    ) -> CoordinatorResult<Job> {
        // Keeps a primary with no workers from holding jobs nobody consumes.
        if let Err(e) = self.evaluate_toggle().await {
            tracing::warn!("Queue toggle before submit failed: {}", e);
        }

        let job = self.queue.enqueue(name, payload, delay).await?;
        tracing::info!("Enqueued job {} ({}) as {}", job.id, job.name, job.status);
        Ok(job)
    }

    /// Current status of a job, `None` if the queue has no record of it.
    pub async fn get_status(&self, job_id: JobId) -> CoordinatorResult<Option<JobStatus>> {
        Ok(self.queue.get_job(job_id).await?.map(|job| job.status))
    }

    /// Jobs that are active, waiting, delayed or paused, in queue order.
    pub async fn list_active(&self) -> CoordinatorResult<Vec<Job>> {
        self.queue.list_jobs(&JobStatus::LIVE).await
    }

    /// First live job whose payload contains every entry of `partial`.
    pub async fn find_by_payload(&self, partial: &JobPayload) -> CoordinatorResult<Option<Job>> {
        let jobs = self.list_active().await?;
        Ok(jobs.into_iter().find(|job| job.matches_payload(partial)))
    }

    /// Publish a command to every worker instance.
    pub async fn broadcast_to_workers<I, S>(
        &self,
        kind: CommandKind,
        args: I,
    ) -> CoordinatorResult<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let command = Command::new(kind).with_args(args);
        self.broadcast(Topic::Worker, command).await
    }

    /// Publish a command to every primary instance.
    pub async fn broadcast_to_primary<I, S>(
        &self,
        kind: CommandKind,
        args: I,
    ) -> CoordinatorResult<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let command = Command::new(kind).with_args(args);
        self.broadcast(Topic::Primary, command).await
    }

    async fn broadcast(&self, topic: Topic, command: Command) -> CoordinatorResult<()> {
        let message = command.encode()?;

        if let Err(e) = self.channel.publish(topic, message).await {
            tracing::warn!("Failed to send {} to {}: {}", command.kind, topic, e);
            return Err(e.into());
        }

        tracing::info!("Sent {} to {}", command.kind, topic);
        Ok(())
    }

    /// Pause the queue for every consumer.
    pub async fn global_pause(&self) -> CoordinatorResult<()> {
        tracing::info!("Pausing global queue");
        self.queue.pause_global().await
    }

    /// Resume the queue for every consumer.
    pub async fn global_resume(&self) -> CoordinatorResult<()> {
        tracing::info!("Resuming global queue");
        self.queue.resume_global().await
    }

    /// Re-evaluate the toggle every `every` and on each presence change.
    pub fn spawn_monitor(
        self: Arc<Self>,
        every: Duration,
        mut presence_events: Option<broadcast::Receiver<PresenceEvent>>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                let closed = tokio::select! {
                    _ = ticker.tick() => false,
                    open = next_presence_event(&mut presence_events) => !open,
                };
                if closed {
                    presence_events = None;
                    continue;
                }

                if let Err(e) = self.evaluate_toggle().await {
                    tracing::warn!("Queue toggle failed, retrying on next check: {}", e);
                }
            }
        })
    }

    /// Stop listening for remote commands.
    pub fn shutdown(&self) {
        if let Some(dispatcher) = self.dispatcher.get() {
            dispatcher.stop(None);
        }
    }
}

/// Wait for the next presence change. Returns `false` once the stream is
/// closed; never returns without a stream.
async fn next_presence_event(events: &mut Option<broadcast::Receiver<PresenceEvent>>) -> bool {
    match events {
        Some(rx) => match rx.recv().await {
            Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => true,
            Err(broadcast::error::RecvError::Closed) => false,
        },
        None => std::future::pending().await,
    }
}
