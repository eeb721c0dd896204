//! Worker presence: who is alive, tracked by heartbeats with expiry.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, broadcast};
use tokio::time::Instant;

use crate::error::PresenceError;

/// Answers how many worker instances are alive right now.
pub trait PresenceRegistry: Send + Sync + 'static {
    fn live_worker_count(&self) -> impl Future<Output = Result<usize, PresenceError>> + Send;
}

/// Changes in the set of live workers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PresenceEvent {
    /// A worker registered for the first time or after expiring.
    WorkerRegistered {
        worker_id: String,
        timestamp: DateTime<Utc>,
    },
    /// A worker left on purpose.
    WorkerDeregistered {
        worker_id: String,
        timestamp: DateTime<Utc>,
    },
    /// A worker stopped sending heartbeats.
    WorkerExpired {
        worker_id: String,
        timestamp: DateTime<Utc>,
    },
}

impl PresenceEvent {
    pub fn worker_id(&self) -> &str {
        match self {
            PresenceEvent::WorkerRegistered { worker_id, .. } => worker_id,
            PresenceEvent::WorkerDeregistered { worker_id, .. } => worker_id,
            PresenceEvent::WorkerExpired { worker_id, .. } => worker_id,
        }
    }
}

/// In-process registry of worker heartbeats.
///
/// A worker counts as alive until `ttl` passes without a heartbeat.
#[derive(Clone)]
pub struct HeartbeatRegistry {
    inner: Arc<Inner>,
}

struct Inner {
    ttl: Duration,
    last_seen: RwLock<HashMap<String, Instant>>,
    event_tx: broadcast::Sender<PresenceEvent>,
}

impl HeartbeatRegistry {
    pub fn new(ttl: Duration) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            inner: Arc::new(Inner {
                ttl,
                last_seen: RwLock::new(HashMap::new()),
                event_tx,
            }),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.inner.ttl
    }

    /// Record a heartbeat; registers the worker if it was not alive.
    pub async fn heartbeat(&self, worker_id: &str) {
        let now = Instant::now();
        let mut last_seen = self.inner.last_seen.write().await;
        let was_alive = last_seen
            .get(worker_id)
            .is_some_and(|seen| now.duration_since(*seen) < self.inner.ttl);
        last_seen.insert(worker_id.to_string(), now);
        drop(last_seen);

        if !was_alive {
            tracing::info!("Worker {} registered", worker_id);
            let _ = self.inner.event_tx.send(PresenceEvent::WorkerRegistered {
                worker_id: worker_id.to_string(),
                timestamp: Utc::now(),
            });
        }
    }

    /// Remove a worker immediately.
    pub async fn deregister(&self, worker_id: &str) {
        let removed = self.inner.last_seen.write().await.remove(worker_id);
        if removed.is_some() {
            tracing::info!("Worker {} deregistered", worker_id);
            let _ = self.inner.event_tx.send(PresenceEvent::WorkerDeregistered {
                worker_id: worker_id.to_string(),
                timestamp: Utc::now(),
            });
        }
    }

    /// Receive presence changes from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<PresenceEvent> {
        self.inner.event_tx.subscribe()
    }

    /// Drop expired workers and return how many remain.
    pub async fn prune(&self) -> usize {
        let now = Instant::now();
        let mut last_seen = self.inner.last_seen.write().await;

        let expired: Vec<String> = last_seen
            .iter()
            .filter(|(_, seen)| now.duration_since(**seen) >= self.inner.ttl)
            .map(|(id, _)| id.clone())
            .collect();
        for worker_id in &expired {
            last_seen.remove(worker_id);
        }
        let alive = last_seen.len();
        drop(last_seen);

        for worker_id in expired {
            tracing::info!("Worker {} expired", worker_id);
            let _ = self.inner.event_tx.send(PresenceEvent::WorkerExpired {
                worker_id,
                timestamp: Utc::now(),
            });
        }

        alive
    }
}

impl PresenceRegistry for HeartbeatRegistry {
    async fn live_worker_count(&self) -> Result<usize, PresenceError> {
        Ok(self.prune().await)
    }
}

/// Keep `worker_id` registered by sending a heartbeat every `ttl / 3`.
///
/// Aborting the task lets the worker expire after the TTL; call
/// [`HeartbeatRegistry::deregister`] to remove it at once.
pub fn spawn_heartbeat(
    registry: HeartbeatRegistry,
    worker_id: String,
) -> tokio::task::JoinHandle<()> {
    let period = (registry.ttl() / 3).max(Duration::from_millis(10));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            registry.heartbeat(&worker_id).await;
        }
    })
}
