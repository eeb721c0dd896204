//! Job domain types for work items in the shared queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Job payload: string keys mapped to arbitrary JSON values.
pub type JobPayload = serde_json::Map<String, serde_json::Value>;

/// Unique identifier for a job.
///
/// Brokers generate these monotonically, so ordering by id is ordering by
/// enqueue time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Ulid);

impl JobId {
    /// Create a new unique job ID.
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Current status of a job in its lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Job is queued and can be picked up by a consumer.
    #[default]
    Waiting,
    /// Job is being executed by a consumer.
    Active,
    /// Job is scheduled to become runnable later.
    Delayed,
    /// Job is parked because the queue is globally paused.
    Paused,
    /// Job finished successfully.
    Completed,
    /// Job finished with an error.
    Failed,
}

impl JobStatus {
    /// Statuses that make up the queue's live working set.
    pub const LIVE: [JobStatus; 4] = [
        JobStatus::Active,
        JobStatus::Waiting,
        JobStatus::Delayed,
        JobStatus::Paused,
    ];

    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Whether a job may move from this status to `next`.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Waiting, Active)
                | (Waiting, Delayed)
                | (Waiting, Paused)
                | (Paused, Waiting)
                | (Delayed, Active)
                | (Active, Completed)
                | (Active, Failed)
        )
    }

    /// Get a simple status string for display.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Waiting => "waiting",
            JobStatus::Active => "active",
            JobStatus::Delayed => "delayed",
            JobStatus::Paused => "paused",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Parse a status from its display string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "waiting" => Some(JobStatus::Waiting),
            "active" => Some(JobStatus::Active),
            "delayed" => Some(JobStatus::Delayed),
            "paused" => Some(JobStatus::Paused),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A job represents a unit of work held by the durable queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Unique identifier for this job.
    pub id: JobId,
    /// Job type, used to route the job to a processor.
    pub name: String,
    /// Job payload.
    #[serde(default)]
    pub payload: JobPayload,
    /// Current status.
    pub status: JobStatus,
    /// When the job was enqueued.
    pub enqueued_at: DateTime<Utc>,
    /// When a delayed job becomes runnable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_at: Option<DateTime<Utc>>,
    /// Number of times a consumer picked this job up.
    #[serde(default)]
    pub attempts: u32,
    /// When the job was last updated.
    pub updated_at: DateTime<Utc>,
    /// Error reported by the processor when the job failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_reason: Option<String>,
    /// Output reported by the processor when the job completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
}

impl Job {
    /// Create a new waiting job.
    pub fn new(id: JobId, name: impl Into<String>, payload: JobPayload) -> Self {
        let now = Utc::now();
        Self {
            id,
            name: name.into(),
            payload,
            status: JobStatus::Waiting,
            enqueued_at: now,
            run_at: None,
            attempts: 0,
            updated_at: now,
            failed_reason: None,
            result: None,
        }
    }

    /// Schedule this job to run no earlier than `run_at`.
    pub fn delayed_until(mut self, run_at: DateTime<Utc>) -> Self {
        self.status = JobStatus::Delayed;
        self.run_at = Some(run_at);
        self
    }

    /// Check whether a delayed job is due at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.run_at.is_none_or(|at| at <= now)
    }

    /// Move the job to `next`, rejecting transitions the lifecycle forbids.
    pub fn transition(&mut self, next: JobStatus) -> Result<(), InvalidTransition> {
        if !self.status.can_transition_to(next) {
            return Err(InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Check whether this job's payload is a superset of `partial`.
    pub fn matches_payload(&self, partial: &JobPayload) -> bool {
        payload_contains(&self.payload, partial)
    }
}

/// A lifecycle transition that is not allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid job transition {from} -> {to}")]
pub struct InvalidTransition {
    pub from: JobStatus,
    pub to: JobStatus,
}

/// Every key of `partial` must exist in `payload` with an equal value.
/// Extra keys in `payload` are ignored.
pub fn payload_contains(payload: &JobPayload, partial: &JobPayload) -> bool {
    partial
        .iter()
        .all(|(key, expected)| payload.get(key) == Some(expected))
}
