//! Error types for the coordinator and its collaborators.

use std::time::Duration;

use queue_core::{CommandParseError, RoleFlagError};

/// Result type for coordinator operations.
pub type CoordinatorResult<T> = Result<T, CoordinatorError>;

/// Failures reported by a queue client.
#[derive(Debug, Clone, thiserror::Error)]
pub enum QueueError {
    #[error("Queue unavailable: {0}")]
    Unavailable(String),

    #[error("Queue call timed out")]
    Timeout,

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Queue rejected the request: {0}")]
    Rejected(String),
}

/// Failures reported by the command channel transport.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ChannelError {
    #[error("Publish to {topic} failed: {reason}")]
    Publish { topic: String, reason: String },

    #[error("Subscribe to {topic} failed: {reason}")]
    Subscribe { topic: String, reason: String },
}

/// Failures reported by the presence registry.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PresenceError {
    #[error("Presence registry unavailable: {0}")]
    Unavailable(String),
}

/// Invalid process configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(transparent)]
    Role(#[from] RoleFlagError),

    #[error("Invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

/// Error type for coordinator operations.
#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    #[error("Queue unavailable: {operation} did not finish within {timeout:?}")]
    QueueUnavailable {
        operation: &'static str,
        timeout: Duration,
    },

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error(transparent)]
    Presence(#[from] PresenceError),

    #[error("Invalid command: {0}")]
    InvalidCommand(#[from] CommandParseError),

    #[error("Coordinator already initialized")]
    AlreadyInitialized,

    #[error("Actor error: {0}")]
    Actor(String),
}

impl From<ractor::SpawnErr> for CoordinatorError {
    fn from(err: ractor::SpawnErr) -> Self {
        CoordinatorError::Actor(err.to_string())
    }
}
