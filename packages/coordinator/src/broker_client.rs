//! Queue client backed by the in-process broker actor.

use std::time::Duration;

use queue_core::{Job, JobEvent, JobId, JobPayload, JobStatus};
use ractor::rpc::CallResult;
use ractor::{Actor, ActorRef, RpcReplyPort};
use tokio::sync::broadcast;

use crate::broker_actor::{BrokerActor, BrokerConfig, BrokerState};
use crate::error::QueueError;
use crate::messages::BrokerMessage;
use crate::queue_client::QueueClient;

/// Default bound on a single broker round trip.
const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle to a broker, bound to one consumer id.
#[derive(Clone)]
pub struct BrokerClient {
    broker: ActorRef<BrokerMessage>,
    consumer_id: String,
    call_timeout: Duration,
}

impl BrokerClient {
    pub fn new(broker: ActorRef<BrokerMessage>, consumer_id: impl Into<String>) -> Self {
        Self {
            broker,
            consumer_id: consumer_id.into(),
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    /// Same broker, different consumer identity.
    pub fn for_consumer(&self, consumer_id: impl Into<String>) -> Self {
        Self {
            broker: self.broker.clone(),
            consumer_id: consumer_id.into(),
            call_timeout: self.call_timeout,
        }
    }

    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    pub fn consumer_id(&self) -> &str {
        &self.consumer_id
    }

    pub fn broker(&self) -> &ActorRef<BrokerMessage> {
        &self.broker
    }

    /// Receive the broker's events from now on.
    pub async fn subscribe_events(&self) -> Result<broadcast::Receiver<JobEvent>, QueueError> {
        self.call(|reply| BrokerMessage::Subscribe { reply }).await
    }

    /// Whether the queue is paused for every consumer.
    pub async fn is_paused_global(&self) -> Result<bool, QueueError> {
        self.call(|reply| BrokerMessage::IsPausedGlobal { reply }).await
    }

    async fn call<T, F>(&self, build: F) -> Result<T, QueueError>
    where
        T: Send + 'static,
        F: FnOnce(RpcReplyPort<T>) -> BrokerMessage,
    {
        match ractor::rpc::call(&self.broker, build, Some(self.call_timeout)).await {
            Ok(CallResult::Success(value)) => Ok(value),
            Ok(CallResult::Timeout) => Err(QueueError::Timeout),
            Ok(CallResult::SenderError) => {
                Err(QueueError::Unavailable("broker dropped the reply".into()))
            }
            Err(_) => Err(QueueError::Unavailable("broker is not running".into())),
        }
    }
}

impl QueueClient for BrokerClient {
    async fn enqueue(
        &self,
        name: &str,
        payload: JobPayload,
        delay: Option<Duration>,
    ) -> Result<Job, QueueError> {
        let name = name.to_string();
        self.call(|reply| BrokerMessage::Enqueue {
            name,
            payload,
            delay,
            reply,
        })
        .await?
    }

    async fn get_job(&self, job_id: JobId) -> Result<Option<Job>, QueueError> {
        self.call(|reply| BrokerMessage::GetJob { job_id, reply })
            .await
    }

    async fn list_jobs(&self, statuses: &[JobStatus]) -> Result<Vec<Job>, QueueError> {
        let statuses = statuses.to_vec();
        self.call(|reply| BrokerMessage::ListJobs { statuses, reply })
            .await
    }

    async fn pause_local(&self) -> Result<(), QueueError> {
        let consumer_id = self.consumer_id.clone();
        self.call(|reply| BrokerMessage::PauseLocal { consumer_id, reply })
            .await?
    }

    async fn resume_local(&self) -> Result<(), QueueError> {
        let consumer_id = self.consumer_id.clone();
        self.call(|reply| BrokerMessage::ResumeLocal { consumer_id, reply })
            .await?
    }

    async fn is_paused_local(&self) -> Result<bool, QueueError> {
        let consumer_id = self.consumer_id.clone();
        self.call(|reply| BrokerMessage::IsPausedLocal { consumer_id, reply })
            .await
    }

    async fn pause_global(&self) -> Result<(), QueueError> {
        self.call(|reply| BrokerMessage::PauseGlobal { reply }).await?
    }

    async fn resume_global(&self) -> Result<(), QueueError> {
        self.call(|reply| BrokerMessage::ResumeGlobal { reply }).await?
    }
}

/// Start a broker and return a client bound to `consumer_id`.
pub async fn spawn_broker(
    config: BrokerConfig,
    consumer_id: impl Into<String>,
) -> Result<(BrokerClient, tokio::task::JoinHandle<()>), ractor::SpawnErr> {
    let (event_tx, _) = broadcast::channel(1024);
    let state = BrokerState::new(config, event_tx);

    let (actor, handle) = Actor::spawn(None, BrokerActor, state).await?;

    Ok((BrokerClient::new(actor, consumer_id), handle))
}
