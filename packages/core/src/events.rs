//! Event types emitted by the queue broker.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Job, JobId};

/// Events emitted by the queue for observers and tests.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JobEvent {
    // Job events
    /// A new job was enqueued.
    JobEnqueued { job: Job, timestamp: DateTime<Utc> },
    /// A consumer picked a job up.
    JobStarted {
        job_id: JobId,
        consumer_id: String,
        timestamp: DateTime<Utc>,
    },
    /// A job completed successfully.
    JobCompleted {
        job_id: JobId,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    /// A job failed.
    JobFailed {
        job_id: JobId,
        error: String,
        timestamp: DateTime<Utc>,
    },

    // Queue events
    /// The queue was paused for every consumer.
    QueuePaused { timestamp: DateTime<Utc> },
    /// The queue was resumed for every consumer.
    QueueResumed { timestamp: DateTime<Utc> },
    /// One consumer stopped pulling jobs.
    ConsumerPaused {
        consumer_id: String,
        timestamp: DateTime<Utc>,
    },
    /// One consumer started pulling jobs again.
    ConsumerResumed {
        consumer_id: String,
        timestamp: DateTime<Utc>,
    },
}

impl JobEvent {
    /// Get the timestamp of the event.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            JobEvent::JobEnqueued { timestamp, .. } => *timestamp,
            JobEvent::JobStarted { timestamp, .. } => *timestamp,
            JobEvent::JobCompleted { timestamp, .. } => *timestamp,
            JobEvent::JobFailed { timestamp, .. } => *timestamp,
            JobEvent::QueuePaused { timestamp } => *timestamp,
            JobEvent::QueueResumed { timestamp } => *timestamp,
            JobEvent::ConsumerPaused { timestamp, .. } => *timestamp,
            JobEvent::ConsumerResumed { timestamp, .. } => *timestamp,
        }
    }

    /// Get the job ID associated with this event, if any.
    pub fn job_id(&self) -> Option<JobId> {
        match self {
            JobEvent::JobEnqueued { job, .. } => Some(job.id),
            JobEvent::JobStarted { job_id, .. } => Some(*job_id),
            JobEvent::JobCompleted { job_id, .. } => Some(*job_id),
            JobEvent::JobFailed { job_id, .. } => Some(*job_id),
            _ => None,
        }
    }

    /// Get a short description of this event for logging.
    pub fn description(&self) -> String {
        match self {
            JobEvent::JobEnqueued { job, .. } => format!("Job {} ({}) enqueued", job.id, job.name),
            JobEvent::JobStarted {
                job_id,
                consumer_id,
                ..
            } => format!("Job {} started by {}", job_id, consumer_id),
            JobEvent::JobCompleted {
                job_id,
                duration_ms,
                ..
            } => format!("Job {} completed in {}ms", job_id, duration_ms),
            JobEvent::JobFailed { job_id, error, .. } => {
                format!("Job {} failed: {}", job_id, error)
            }
            JobEvent::QueuePaused { .. } => "Queue paused globally".to_string(),
            JobEvent::QueueResumed { .. } => "Queue resumed globally".to_string(),
            JobEvent::ConsumerPaused { consumer_id, .. } => {
                format!("Consumer {} paused", consumer_id)
            }
            JobEvent::ConsumerResumed { consumer_id, .. } => {
                format!("Consumer {} resumed", consumer_id)
            }
        }
    }
}
