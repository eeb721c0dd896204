//! Process configuration read from the environment.

use std::str::FromStr;
use std::time::Duration;

use queue_core::RoleConfig;

use crate::error::ConfigError;

pub const ENV_WORKER_CONTAINER: &str = "QUEUE_WORKER_CONTAINER";
pub const ENV_INSTANCE_ID: &str = "QUEUE_INSTANCE_ID";
pub const ENV_CALL_TIMEOUT_MS: &str = "QUEUE_CALL_TIMEOUT_MS";
pub const ENV_EVALUATE_INTERVAL_SECS: &str = "QUEUE_EVALUATE_INTERVAL_SECS";
pub const ENV_HEARTBEAT_TTL_SECS: &str = "WORKER_HEARTBEAT_TTL_SECS";
pub const ENV_CONCURRENCY: &str = "QUEUE_CONCURRENCY";
pub const ENV_LOCAL_WORKERS: &str = "QUEUE_LOCAL_WORKERS";
pub const ENV_PERSIST: &str = "QUEUE_PERSIST";
pub const ENV_DB_ENDPOINT: &str = "QUEUE_DB_ENDPOINT";

/// Settings for one queue node.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub role: RoleConfig,
    /// Consumer and presence identity of this process.
    pub instance_id: String,
    /// Bound on every queue call made by the coordinator.
    pub call_timeout: Duration,
    /// Period of the background toggle evaluation.
    pub evaluate_interval: Duration,
    pub heartbeat_ttl: Duration,
    /// Consumers started by this process.
    pub concurrency: usize,
    /// Embedded worker instances, for single-process deployments.
    pub local_workers: usize,
    /// Persist jobs and the pause flag to the database.
    pub persist: bool,
    pub db_endpoint: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            role: RoleConfig::default(),
            instance_id: generate_instance_id(),
            call_timeout: Duration::from_millis(5000),
            evaluate_interval: Duration::from_secs(10),
            heartbeat_ttl: Duration::from_secs(30),
            concurrency: 4,
            local_workers: 0,
            persist: false,
            db_endpoint: "mem://".to_string(),
        }
    }
}

impl NodeConfig {
    /// Read the configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the configuration through `lookup`, falling back to defaults
    /// for missing keys.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let role = RoleConfig::from_flag(lookup(ENV_WORKER_CONTAINER).as_deref())?;
        let instance_id = lookup(ENV_INSTANCE_ID)
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .unwrap_or(defaults.instance_id);

        let call_timeout_ms: u64 = parse_var(&lookup, ENV_CALL_TIMEOUT_MS, 5000)?;
        let evaluate_secs: u64 = parse_var(&lookup, ENV_EVALUATE_INTERVAL_SECS, 10)?;
        let ttl_secs: u64 = parse_var(&lookup, ENV_HEARTBEAT_TTL_SECS, 30)?;

        Ok(Self {
            role,
            instance_id,
            call_timeout: Duration::from_millis(call_timeout_ms),
            evaluate_interval: Duration::from_secs(evaluate_secs),
            heartbeat_ttl: Duration::from_secs(ttl_secs),
            concurrency: parse_var(&lookup, ENV_CONCURRENCY, defaults.concurrency)?,
            local_workers: parse_var(&lookup, ENV_LOCAL_WORKERS, defaults.local_workers)?,
            persist: parse_var(&lookup, ENV_PERSIST, defaults.persist)?,
            db_endpoint: lookup(ENV_DB_ENDPOINT).unwrap_or(defaults.db_endpoint),
        })
    }

    pub fn with_role(mut self, role: RoleConfig) -> Self {
        self.role = role;
        self
    }

    pub fn with_instance_id(mut self, instance_id: impl Into<String>) -> Self {
        self.instance_id = instance_id.into();
        self
    }

    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    pub fn with_evaluate_interval(mut self, evaluate_interval: Duration) -> Self {
        self.evaluate_interval = evaluate_interval;
        self
    }

    pub fn with_heartbeat_ttl(mut self, heartbeat_ttl: Duration) -> Self {
        self.heartbeat_ttl = heartbeat_ttl;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_local_workers(mut self, local_workers: usize) -> Self {
        self.local_workers = local_workers;
        self
    }

    pub fn with_persistence(mut self, db_endpoint: impl Into<String>) -> Self {
        self.persist = true;
        self.db_endpoint = db_endpoint.into();
        self
    }

    /// Broker, channel and presence registry live inside one process, so
    /// some role settings leave jobs without a consumer or a producer.
    pub fn isolation_warning(&self) -> Option<&'static str> {
        if self.role.is_worker() {
            Some("dedicated worker has a private broker; only jobs enqueued in-process reach it")
        } else if !self.role.fallback && self.local_workers == 0 {
            Some("primary without fallback and no embedded workers; jobs are never consumed")
        } else {
            None
        }
    }
}

fn generate_instance_id() -> String {
    format!("instance-{}", ulid::Ulid::new().to_string().to_lowercase())
}

fn parse_var<T, F>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => {
            let value = raw.trim();
            if value.is_empty() {
                return Ok(default);
            }
            value
                .to_ascii_lowercase()
                .parse()
                .map_err(|_| ConfigError::Invalid {
                    key,
                    value: raw.clone(),
                })
        }
    }
}
