#![allow(clippy::disallowed_methods)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{NO_ARGS, payload};
use coordinator::{
    BrokerClient, BrokerConfig, BrokerMessage, HeartbeatRegistry, InstanceCoordinator,
    LocalChannel, LocalQueueController, QueueClient, ToggleAction, spawn_broker,
};
use queue_core::{CommandKind, JobStatus, RoleConfig};
use serde_json::json;

type NodeCoordinator = InstanceCoordinator<BrokerClient, LocalChannel, HeartbeatRegistry>;

fn node(role: RoleConfig, client: &BrokerClient, registry: &HeartbeatRegistry) -> NodeCoordinator {
    InstanceCoordinator::new(
        role,
        LocalQueueController::new(client.clone(), Duration::from_secs(1)),
        LocalChannel::default(),
        registry.clone(),
    )
}

#[tokio::test]
async fn primary_hands_over_to_workers_and_back() {
    let (client, _handle) = spawn_broker(BrokerConfig::new("handover"), "primary")
        .await
        .unwrap();
    let registry = HeartbeatRegistry::new(Duration::from_secs(30));
    let primary = node(RoleConfig::primary(), &client, &registry);

    primary.initialize().await.unwrap();
    assert!(!client.is_paused_local().await.unwrap());

    registry.heartbeat("worker-1").await;
    assert_eq!(primary.evaluate_toggle().await.unwrap(), ToggleAction::PauseLocal);
    assert!(client.is_paused_local().await.unwrap());

    // Enqueueing does not depend on local consumption.
    let job = primary
        .submit("echo", payload(json!({"doc": 42})))
        .await
        .unwrap();
    assert_eq!(primary.get_status(job.id).await.unwrap(), Some(JobStatus::Waiting));
    assert!(client.is_paused_local().await.unwrap());

    registry.deregister("worker-1").await;
    assert_eq!(primary.evaluate_toggle().await.unwrap(), ToggleAction::ResumeLocal);
    assert!(!client.is_paused_local().await.unwrap());

    primary.shutdown();
    client.broker().stop(None);
}

#[tokio::test]
async fn monitor_follows_presence_events() {
    let (client, _handle) = spawn_broker(BrokerConfig::new("monitor"), "primary")
        .await
        .unwrap();
    let registry = HeartbeatRegistry::new(Duration::from_secs(30));
    let primary = Arc::new(node(RoleConfig::primary(), &client, &registry));
    primary.initialize().await.unwrap();

    // A long tick leaves presence events as the only trigger.
    let monitor = primary
        .clone()
        .spawn_monitor(Duration::from_secs(3600), Some(registry.subscribe()));
    tokio::time::sleep(Duration::from_millis(20)).await;

    registry.heartbeat("worker-1").await;
    let paused = wait_until_paused(&client, true).await;
    assert!(paused);

    registry.deregister("worker-1").await;
    let resumed = wait_until_paused(&client, false).await;
    assert!(resumed);

    monitor.abort();
    primary.shutdown();
    client.broker().stop(None);
}

async fn wait_until_paused(client: &BrokerClient, expected: bool) -> bool {
    for _ in 0..100 {
        if client.is_paused_local().await.unwrap() == expected {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

#[tokio::test]
async fn global_pause_keeps_job_records() {
    let (client, _handle) = spawn_broker(BrokerConfig::new("records"), "primary")
        .await
        .unwrap();
    let registry = HeartbeatRegistry::new(Duration::from_secs(30));
    let primary = node(RoleConfig::primary(), &client, &registry);

    let in_flight = primary.submit("echo", payload(json!({"n": 1}))).await.unwrap();
    let queued = primary.submit("echo", payload(json!({"n": 2}))).await.unwrap();

    let claimed = ractor::rpc::call(
        client.broker(),
        |reply| BrokerMessage::RequestJob {
            consumer_id: "primary".to_string(),
            reply,
        },
        Some(Duration::from_secs(1)),
    )
    .await
    .unwrap();
    assert!(matches!(claimed, ractor::rpc::CallResult::Success(Some(_))));

    primary.global_pause().await.unwrap();

    assert_eq!(primary.get_status(in_flight.id).await.unwrap(), Some(JobStatus::Active));
    assert_eq!(primary.get_status(queued.id).await.unwrap(), Some(JobStatus::Paused));
    assert_eq!(primary.list_active().await.unwrap().len(), 2);

    primary.global_resume().await.unwrap();
    assert_eq!(primary.get_status(queued.id).await.unwrap(), Some(JobStatus::Waiting));

    client.broker().stop(None);
}

#[tokio::test]
async fn embedded_worker_obeys_remote_pause() {
    let (client, _handle) = spawn_broker(BrokerConfig::new("remote"), "primary")
        .await
        .unwrap();
    let registry = HeartbeatRegistry::new(Duration::from_secs(30));
    let channel = LocalChannel::default();

    let worker_client = client.for_consumer("worker-1");
    let worker = InstanceCoordinator::new(
        RoleConfig::worker(),
        LocalQueueController::new(worker_client.clone(), Duration::from_secs(1)),
        channel.clone(),
        registry.clone(),
    );
    worker.initialize().await.unwrap();

    let primary = InstanceCoordinator::new(
        RoleConfig::primary(),
        LocalQueueController::new(client.clone(), Duration::from_secs(1)),
        channel,
        registry,
    );

    primary
        .broadcast_to_workers(CommandKind::PauseLocal, NO_ARGS)
        .await
        .unwrap();
    assert!(wait_until_paused(&worker_client, true).await);
    assert!(!client.is_paused_local().await.unwrap());

    primary
        .broadcast_to_workers(CommandKind::ResumeLocal, NO_ARGS)
        .await
        .unwrap();
    assert!(wait_until_paused(&worker_client, false).await);

    worker.shutdown();
    client.broker().stop(None);
}
