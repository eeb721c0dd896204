use std::sync::Arc;
use std::time::Duration;

use coordinator::{
    ActorRef, BrokerClient, BrokerConfig, ConsumerArgs, ConsumerMessage, HeartbeatRegistry,
    InstanceCoordinator, LocalChannel, LocalQueueController, NodeConfig, spawn_broker,
    spawn_consumers, spawn_heartbeat,
};
use db::DbConfig;
use queue_core::RoleConfig;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod jobs;

type Coordinator = InstanceCoordinator<BrokerClient, LocalChannel, HeartbeatRegistry>;

/// Upper bound on a single job's run time.
const JOB_TIMEOUT: Duration = Duration::from_secs(300);
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// One consuming identity: its coordinator and consumer actors.
struct Instance {
    coordinator: Arc<Coordinator>,
    consumers: Vec<ActorRef<ConsumerMessage>>,
    heartbeat: Option<tokio::task::JoinHandle<()>>,
}

impl Instance {
    async fn start(
        role: RoleConfig,
        client: BrokerClient,
        config: &NodeConfig,
        channel: &LocalChannel,
        registry: &HeartbeatRegistry,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let consumer_id = client.consumer_id().to_string();
        let coordinator = Arc::new(InstanceCoordinator::new(
            role,
            LocalQueueController::new(client.clone(), config.call_timeout),
            channel.clone(),
            registry.clone(),
        ));
        coordinator.initialize().await?;

        let heartbeat = role
            .is_worker()
            .then(|| spawn_heartbeat(registry.clone(), consumer_id.clone()));

        let args = ConsumerArgs {
            consumer_id,
            broker: client.broker().clone(),
            processors: Arc::new(jobs::processors()),
            job_timeout: JOB_TIMEOUT,
            poll_interval: POLL_INTERVAL,
        };
        let consumers = spawn_consumers(args, config.concurrency).await?;

        Ok(Self {
            coordinator,
            consumers,
            heartbeat,
        })
    }

    async fn stop(self, registry: &HeartbeatRegistry) {
        self.coordinator.shutdown();
        if let Some(heartbeat) = self.heartbeat {
            heartbeat.abort();
        }
        for consumer in self.consumers {
            consumer.stop(None);
        }
        registry
            .deregister(self.coordinator.queue().client().consumer_id())
            .await;
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,coordinator=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = NodeConfig::from_env()?;
    tracing::info!(
        "Starting queue node {} as {} (fallback: {})",
        config.instance_id,
        config.role.role,
        config.role.fallback
    );
    if let Some(warning) = config.isolation_warning() {
        tracing::warn!("{}", warning);
    }

    let mut broker_config = BrokerConfig::new("jobs");
    if config.persist {
        db::init(DbConfig::endpoint(&config.db_endpoint)).await?;
        broker_config = broker_config.persistent();
    }

    let (client, broker_handle) = spawn_broker(broker_config, config.instance_id.clone()).await?;
    let client = client.with_call_timeout(config.call_timeout);

    let mut events = client.subscribe_events().await?;
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => tracing::debug!("{}", event.description()),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Event log skipped {} events", skipped)
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let channel = LocalChannel::default();
    let registry = HeartbeatRegistry::new(config.heartbeat_ttl);

    let mut instances = Vec::with_capacity(config.local_workers + 1);
    for n in 0..config.local_workers {
        let worker_client = client.for_consumer(format!("{}-worker-{}", config.instance_id, n));
        let worker =
            Instance::start(RoleConfig::worker(), worker_client, &config, &channel, &registry)
                .await?;
        instances.push(worker);
    }

    let node = Instance::start(config.role, client.clone(), &config, &channel, &registry).await?;
    let monitor = node
        .coordinator
        .clone()
        .spawn_monitor(config.evaluate_interval, Some(registry.subscribe()));
    instances.push(node);

    tracing::info!(
        "Queue node ready with {} consuming instance(s)",
        instances.len()
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");

    monitor.abort();
    for instance in instances {
        instance.stop(&registry).await;
    }
    client.broker().stop(None);
    broker_handle.await?;

    Ok(())
}
