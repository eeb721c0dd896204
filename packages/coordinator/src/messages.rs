//! Message types for actor communication.

use std::time::Duration;

use queue_core::{Job, JobEvent, JobId, JobPayload, JobStatus};
use ractor::RpcReplyPort;
use tokio::sync::broadcast;

use crate::error::QueueError;

/// Messages for the BrokerActor.
#[derive(Debug)]
pub enum BrokerMessage {
    /// Enqueue a new job.
    Enqueue {
        name: String,
        payload: JobPayload,
        delay: Option<Duration>,
        reply: RpcReplyPort<Result<Job, QueueError>>,
    },

    /// Request the next runnable job for a consumer.
    RequestJob {
        consumer_id: String,
        reply: RpcReplyPort<Option<Job>>,
    },

    /// Report job completion.
    JobCompleted {
        job_id: JobId,
        result: Option<serde_json::Value>,
    },

    /// Report job failure.
    JobFailed { job_id: JobId, error: String },

    /// Get a job by ID.
    GetJob {
        job_id: JobId,
        reply: RpcReplyPort<Option<Job>>,
    },

    /// List jobs in any of the given statuses.
    ListJobs {
        statuses: Vec<JobStatus>,
        reply: RpcReplyPort<Vec<Job>>,
    },

    /// Stop handing jobs to one consumer.
    PauseLocal {
        consumer_id: String,
        reply: RpcReplyPort<Result<(), QueueError>>,
    },

    /// Hand jobs to one consumer again.
    ResumeLocal {
        consumer_id: String,
        reply: RpcReplyPort<Result<(), QueueError>>,
    },

    /// Whether one consumer is paused.
    IsPausedLocal {
        consumer_id: String,
        reply: RpcReplyPort<bool>,
    },

    /// Stop handing jobs to every consumer.
    PauseGlobal {
        reply: RpcReplyPort<Result<(), QueueError>>,
    },

    /// Hand jobs to every consumer again.
    ResumeGlobal {
        reply: RpcReplyPort<Result<(), QueueError>>,
    },

    /// Whether the queue is paused for everyone.
    IsPausedGlobal { reply: RpcReplyPort<bool> },

    /// Get a receiver for queue events.
    Subscribe {
        reply: RpcReplyPort<broadcast::Receiver<JobEvent>>,
    },

    /// Shutdown the broker.
    Shutdown,
}

/// Messages for the ConsumerActor.
#[derive(Debug)]
pub enum ConsumerMessage {
    /// Execute a job handed out by the broker.
    ProcessJob { job: Box<Job> },

    /// Shutdown the consumer.
    Shutdown,

    /// Poll tick.
    Heartbeat,
}

/// Messages for the CommandDispatcher.
#[derive(Debug)]
pub enum DispatcherMessage {
    /// A raw command received from the channel.
    Deliver { raw: String },

    /// Shutdown the dispatcher.
    Shutdown,
}
