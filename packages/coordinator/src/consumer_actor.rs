//! Consumer actor pulling jobs from the broker for one instance.

use std::sync::Arc;
use std::time::Duration;

use queue_core::Job;
use ractor::{Actor, ActorProcessingErr, ActorRef};

use crate::messages::{BrokerMessage, ConsumerMessage};
use crate::processor::JobProcessorRegistry;

/// Consumer actor arguments.
#[derive(Clone)]
pub struct ConsumerArgs {
    /// Instance identity; local pause applies to every consumer sharing it.
    pub consumer_id: String,
    pub broker: ActorRef<BrokerMessage>,
    pub processors: Arc<JobProcessorRegistry>,
    /// Upper bound on one job's run time.
    pub job_timeout: Duration,
    /// How often an idle consumer asks for work.
    pub poll_interval: Duration,
}

/// State for the consumer actor.
pub struct ConsumerState {
    args: ConsumerArgs,
    /// Current job being processed.
    current_job: Option<Job>,
}

impl ConsumerState {
    pub fn is_idle(&self) -> bool {
        self.current_job.is_none()
    }

    async fn run(&self, job: &Job) -> Result<Option<serde_json::Value>, String> {
        let Some(processor) = self.args.processors.get(&job.name) else {
            return Err(format!("No processor for job: {}", job.name));
        };

        match tokio::time::timeout(self.args.job_timeout, processor.process(job)).await {
            Ok(result) => result,
            Err(_) => Err("Job timed out".into()),
        }
    }
}

/// Consumer actor that executes jobs.
pub struct ConsumerActor;

impl Actor for ConsumerActor {
    type Msg = ConsumerMessage;
    type State = ConsumerState;
    type Arguments = ConsumerArgs;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::debug!("Starting consumer for {}", args.consumer_id);

        let poll_interval = args.poll_interval;
        let myself_clone = myself.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(poll_interval).await;
                if myself_clone.send_message(ConsumerMessage::Heartbeat).is_err() {
                    break;
                }
            }
        });

        Ok(ConsumerState {
            args,
            current_job: None,
        })
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            ConsumerMessage::ProcessJob { job } => {
                let job_id = job.id;
                match state.run(&job).await {
                    Ok(result) => {
                        state
                            .args
                            .broker
                            .send_message(BrokerMessage::JobCompleted { job_id, result })?;
                    }
                    Err(error) => {
                        tracing::warn!("Job {} ({}) failed: {}", job_id, job.name, error);
                        state
                            .args
                            .broker
                            .send_message(BrokerMessage::JobFailed { job_id, error })?;
                    }
                }
                state.current_job = None;
            }

            ConsumerMessage::Shutdown => {
                myself.stop(None);
            }

            ConsumerMessage::Heartbeat => {
                if !state.is_idle() {
                    return Ok(());
                }

                let result = ractor::rpc::call(
                    &state.args.broker,
                    |reply| BrokerMessage::RequestJob {
                        consumer_id: state.args.consumer_id.clone(),
                        reply,
                    },
                    Some(Duration::from_secs(5)),
                )
                .await;

                if let Ok(ractor::rpc::CallResult::Success(Some(job))) = result {
                    // Claim the slot before the job message is processed so
                    // queued heartbeats do not request a second job.
                    state.current_job = Some(job.clone());
                    myself.send_message(ConsumerMessage::ProcessJob { job: Box::new(job) })?;
                }
            }
        }

        Ok(())
    }
}

/// Spawn `concurrency` consumers sharing one consumer id.
pub async fn spawn_consumers(
    args: ConsumerArgs,
    concurrency: usize,
) -> Result<Vec<ActorRef<ConsumerMessage>>, ractor::SpawnErr> {
    let mut consumers = Vec::with_capacity(concurrency);
    for _ in 0..concurrency {
        let (actor, _handle) = Actor::spawn(None, ConsumerActor, args.clone()).await?;
        consumers.push(actor);
    }
    Ok(consumers)
}
