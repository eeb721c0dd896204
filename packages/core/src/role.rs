//! Process role configuration.

use serde::{Deserialize, Serialize};

use crate::Topic;

/// Role of this process in the fleet, fixed for its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceRole {
    /// Serves requests and consumes jobs when no dedicated workers exist.
    Primary,
    /// Dedicated job consumer.
    Worker,
}

impl InstanceRole {
    /// Topic this role subscribes to for remote commands.
    pub fn topic(&self) -> Topic {
        match self {
            InstanceRole::Primary => Topic::Primary,
            InstanceRole::Worker => Topic::Worker,
        }
    }
}

impl std::fmt::Display for InstanceRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InstanceRole::Primary => write!(f, "primary"),
            InstanceRole::Worker => write!(f, "worker"),
        }
    }
}

/// Role plus the primary's consumption stance.
///
/// Built from the three-valued worker-container flag:
/// unset means primary with fallback, `"true"` means worker, `"false"`
/// means primary that never consumes locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleConfig {
    pub role: InstanceRole,
    /// Whether a primary consumes jobs itself when no worker is alive.
    pub fallback: bool,
}

impl RoleConfig {
    /// Primary that takes over consumption when no workers are alive.
    pub fn primary() -> Self {
        Self {
            role: InstanceRole::Primary,
            fallback: true,
        }
    }

    /// Primary that never consumes jobs locally.
    pub fn primary_without_fallback() -> Self {
        Self {
            role: InstanceRole::Primary,
            fallback: false,
        }
    }

    /// Dedicated worker.
    pub fn worker() -> Self {
        Self {
            role: InstanceRole::Worker,
            fallback: false,
        }
    }

    /// Interpret the worker-container flag.
    pub fn from_flag(flag: Option<&str>) -> Result<Self, RoleFlagError> {
        match flag.map(str::trim) {
            None | Some("") => Ok(Self::primary()),
            Some(v) if v.eq_ignore_ascii_case("true") => Ok(Self::worker()),
            Some(v) if v.eq_ignore_ascii_case("false") => Ok(Self::primary_without_fallback()),
            Some(other) => Err(RoleFlagError(other.to_string())),
        }
    }

    pub fn is_worker(&self) -> bool {
        self.role == InstanceRole::Worker
    }
}

impl Default for RoleConfig {
    fn default() -> Self {
        Self::primary()
    }
}

/// The worker-container flag held something other than unset/true/false.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid worker container flag: {0:?} (expected unset, \"true\" or \"false\")")]
pub struct RoleFlagError(pub String);
