#![allow(clippy::disallowed_methods)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::payload;
use coordinator::{
    BrokerClient, BrokerConfig, BrokerMessage, ConsumerArgs, ConsumerMessage, FnProcessor,
    JobProcessorRegistry, ProcessorFuture, QueueClient, spawn_broker, spawn_consumers,
};
use db::repositories::JobRepository;
use queue_core::{Job, JobEvent, JobId, JobStatus};
use ractor::ActorRef;
use serde_json::{Value, json};

fn processors() -> JobProcessorRegistry {
    let mut processors = JobProcessorRegistry::new();
    processors.register(FnProcessor::new("echo", |job: &Job| -> ProcessorFuture {
        let payload = Value::Object(job.payload.clone());
        Box::pin(async move { Ok(Some(payload)) })
    }));
    processors.register(FnProcessor::new("explode", |_job: &Job| -> ProcessorFuture {
        Box::pin(async { Err("boom".to_string()) })
    }));
    processors.register(FnProcessor::new("slow", |_job: &Job| -> ProcessorFuture {
        Box::pin(async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(None)
        })
    }));
    processors
}

async fn start_consumers(
    client: &BrokerClient,
    concurrency: usize,
) -> Vec<ActorRef<ConsumerMessage>> {
    let args = ConsumerArgs {
        consumer_id: client.consumer_id().to_string(),
        broker: client.broker().clone(),
        processors: Arc::new(processors()),
        job_timeout: Duration::from_millis(200),
        poll_interval: Duration::from_millis(10),
    };
    spawn_consumers(args, concurrency).await.unwrap()
}

fn stop_all(client: &BrokerClient, consumers: Vec<ActorRef<ConsumerMessage>>) {
    for consumer in consumers {
        consumer.stop(None);
    }
    client.broker().stop(None);
}

async fn status(client: &BrokerClient, job_id: JobId) -> Option<JobStatus> {
    client.get_job(job_id).await.unwrap().map(|job| job.status)
}

async fn wait_for_status(client: &BrokerClient, job_id: JobId, expected: JobStatus) -> bool {
    for _ in 0..100 {
        if status(client, job_id).await == Some(expected) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

#[tokio::test]
async fn job_runs_to_completion() {
    let (client, _handle) = spawn_broker(BrokerConfig::new("lifecycle"), "node-a")
        .await
        .unwrap();
    let consumers = start_consumers(&client, 2).await;

    let job = client
        .enqueue("echo", payload(json!({"greeting": "hi"})), None)
        .await
        .unwrap();
    assert!(wait_for_status(&client, job.id, JobStatus::Completed).await);

    let done = client.get_job(job.id).await.unwrap().unwrap();
    assert_eq!(done.result, Some(json!({"greeting": "hi"})));
    assert_eq!(done.attempts, 1);

    stop_all(&client, consumers);
}

#[tokio::test]
async fn failures_are_recorded() {
    let (client, _handle) = spawn_broker(BrokerConfig::new("failures"), "node-a")
        .await
        .unwrap();
    let consumers = start_consumers(&client, 1).await;

    let exploded = client.enqueue("explode", payload(json!({})), None).await.unwrap();
    let unknown = client.enqueue("teleport", payload(json!({})), None).await.unwrap();
    let slow = client.enqueue("slow", payload(json!({})), None).await.unwrap();

    assert!(wait_for_status(&client, exploded.id, JobStatus::Failed).await);
    assert!(wait_for_status(&client, unknown.id, JobStatus::Failed).await);
    assert!(wait_for_status(&client, slow.id, JobStatus::Failed).await);

    let exploded = client.get_job(exploded.id).await.unwrap().unwrap();
    assert_eq!(exploded.failed_reason.as_deref(), Some("boom"));
    let unknown = client.get_job(unknown.id).await.unwrap().unwrap();
    assert!(unknown.failed_reason.unwrap().contains("teleport"));
    let slow = client.get_job(slow.id).await.unwrap().unwrap();
    assert_eq!(slow.failed_reason.as_deref(), Some("Job timed out"));

    stop_all(&client, consumers);
}

#[tokio::test]
async fn local_pause_only_stops_one_consumer() {
    let (primary, _handle) = spawn_broker(BrokerConfig::new("local-pause"), "primary")
        .await
        .unwrap();
    primary.pause_local().await.unwrap();
    primary.pause_local().await.unwrap();
    assert!(primary.is_paused_local().await.unwrap());

    let primary_consumers = start_consumers(&primary, 1).await;
    let job = primary.enqueue("echo", payload(json!({})), None).await.unwrap();

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(status(&primary, job.id).await, Some(JobStatus::Waiting));

    // Another instance on the same queue is unaffected.
    let worker = primary.for_consumer("worker");
    assert!(!worker.is_paused_local().await.unwrap());
    let worker_consumers = start_consumers(&worker, 1).await;
    assert!(wait_for_status(&primary, job.id, JobStatus::Completed).await);

    primary.resume_local().await.unwrap();
    primary.resume_local().await.unwrap();
    assert!(!primary.is_paused_local().await.unwrap());

    for consumer in worker_consumers {
        consumer.stop(None);
    }
    stop_all(&primary, primary_consumers);
}

#[tokio::test]
async fn global_pause_parks_waiting_jobs() {
    let (client, _handle) = spawn_broker(BrokerConfig::new("global-pause"), "node-a")
        .await
        .unwrap();

    let before = client.enqueue("echo", payload(json!({"n": 1})), None).await.unwrap();
    client.pause_global().await.unwrap();
    client.pause_global().await.unwrap();
    assert!(client.is_paused_global().await.unwrap());
    assert_eq!(status(&client, before.id).await, Some(JobStatus::Paused));

    let during = client.enqueue("echo", payload(json!({"n": 2})), None).await.unwrap();
    assert_eq!(during.status, JobStatus::Paused);

    let consumers = start_consumers(&client, 1).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(status(&client, before.id).await, Some(JobStatus::Paused));

    let live = client.list_jobs(&JobStatus::LIVE).await.unwrap();
    assert_eq!(
        live.iter().map(|j| j.id).collect::<Vec<_>>(),
        vec![before.id, during.id]
    );

    client.resume_global().await.unwrap();
    assert!(wait_for_status(&client, before.id, JobStatus::Completed).await);
    assert!(wait_for_status(&client, during.id, JobStatus::Completed).await);

    stop_all(&client, consumers);
}

#[tokio::test]
async fn delayed_jobs_wait_for_their_time() {
    let (client, _handle) = spawn_broker(BrokerConfig::new("delayed"), "node-a")
        .await
        .unwrap();
    let consumers = start_consumers(&client, 1).await;

    let job = client
        .enqueue("echo", payload(json!({})), Some(Duration::from_millis(300)))
        .await
        .unwrap();
    assert_eq!(job.status, JobStatus::Delayed);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(status(&client, job.id).await, Some(JobStatus::Delayed));

    assert!(wait_for_status(&client, job.id, JobStatus::Completed).await);

    stop_all(&client, consumers);
}

#[tokio::test]
async fn finished_jobs_are_pruned() {
    let config = BrokerConfig::new("pruning").with_retain_finished(2);
    let (client, _handle) = spawn_broker(config, "node-a").await.unwrap();

    let mut ids = Vec::new();
    for n in 0..4 {
        let job = client.enqueue("echo", payload(json!({"n": n})), None).await.unwrap();
        ids.push(job.id);
    }
    let consumers = start_consumers(&client, 1).await;

    assert!(wait_for_status(&client, ids[3], JobStatus::Completed).await);

    assert_eq!(status(&client, ids[0]).await, None);
    assert_eq!(status(&client, ids[1]).await, None);
    assert_eq!(status(&client, ids[2]).await, Some(JobStatus::Completed));

    stop_all(&client, consumers);
}

#[tokio::test]
async fn events_are_broadcast() {
    let (client, _handle) = spawn_broker(BrokerConfig::new("events"), "node-a")
        .await
        .unwrap();
    let mut events = client.subscribe_events().await.unwrap();

    let job = client.enqueue("echo", payload(json!({})), None).await.unwrap();
    client.pause_local().await.unwrap();

    match events.recv().await.unwrap() {
        JobEvent::JobEnqueued { job: enqueued, .. } => assert_eq!(enqueued.id, job.id),
        other => panic!("unexpected event: {other:?}"),
    }
    let paused = events.recv().await.unwrap();
    assert!(matches!(
        paused,
        JobEvent::ConsumerPaused { ref consumer_id, .. } if consumer_id == "node-a"
    ));

    client.broker().stop(None);
}

#[tokio::test]
async fn restart_restores_persisted_state() {
    let _guard = common::setup_db().await.unwrap();
    let config = BrokerConfig::new("restore").persistent();

    let (client, handle) = spawn_broker(config.clone(), "node-a").await.unwrap();
    let running = client.enqueue("echo", payload(json!({"n": 1})), None).await.unwrap();
    let queued = client.enqueue("echo", payload(json!({"n": 2})), None).await.unwrap();

    let claimed = ractor::rpc::call(
        client.broker(),
        |reply| BrokerMessage::RequestJob {
            consumer_id: "node-a".to_string(),
            reply,
        },
        Some(Duration::from_secs(1)),
    )
    .await
    .unwrap();
    assert!(matches!(
        claimed,
        ractor::rpc::CallResult::Success(Some(ref job)) if job.id == running.id
    ));

    client.pause_global().await.unwrap();
    client.broker().stop(None);
    handle.await.unwrap();

    let (client, handle) = spawn_broker(config.clone(), "node-a").await.unwrap();
    assert!(client.is_paused_global().await.unwrap());
    assert_eq!(status(&client, queued.id).await, Some(JobStatus::Paused));

    let stalled = client.get_job(running.id).await.unwrap().unwrap();
    assert_eq!(stalled.status, JobStatus::Failed);
    assert!(stalled.failed_reason.unwrap().contains("stalled"));

    client.resume_global().await.unwrap();
    assert_eq!(status(&client, queued.id).await, Some(JobStatus::Waiting));
    client.broker().stop(None);
    handle.await.unwrap();

    // A parked job left behind by an interrupted resume runs again.
    let mut stranded = Job::new(JobId::new(), "echo", payload(json!({"n": 3})));
    stranded.status = JobStatus::Paused;
    JobRepository::create(&stranded).await.unwrap();

    let (client, handle) = spawn_broker(config, "node-a").await.unwrap();
    assert!(!client.is_paused_global().await.unwrap());
    assert_eq!(status(&client, stranded.id).await, Some(JobStatus::Waiting));

    let stored = JobRepository::get(stranded.id).await.unwrap();
    assert_eq!(stored.status, JobStatus::Waiting);

    let consumers = start_consumers(&client, 1).await;
    assert!(wait_for_status(&client, stranded.id, JobStatus::Completed).await);

    stop_all(&client, consumers);
    handle.await.unwrap();
}
