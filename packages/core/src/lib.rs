//! Core domain types for the role-aware job queue.
//!
//! This crate contains shared types used across all packages:
//! - Job and JobStatus for work items
//! - Command and Topic for instance-to-instance directives
//! - InstanceRole and RoleConfig for process roles
//! - Events for queue observers

mod command;
mod events;
mod job;
mod role;

pub use command::{COMMAND_DELIMITER, Command, CommandKind, CommandParseError, Topic};
pub use events::JobEvent;
pub use job::{InvalidTransition, Job, JobId, JobPayload, JobStatus, payload_contains};
pub use role::{InstanceRole, RoleConfig, RoleFlagError};
