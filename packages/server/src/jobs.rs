//! Built-in job processors.

use std::time::Duration;

use coordinator::{FnProcessor, JobProcessorRegistry, ProcessorFuture};
use queue_core::Job;
use serde_json::Value;

/// Longest pause accepted by the `sleep` job.
const MAX_SLEEP_MS: u64 = 60_000;

pub fn processors() -> JobProcessorRegistry {
    let mut processors = JobProcessorRegistry::new();

    // Returns its payload.
    processors.register(FnProcessor::new("echo", |job: &Job| -> ProcessorFuture {
        let payload = Value::Object(job.payload.clone());
        Box::pin(async move { Ok(Some(payload)) })
    }));

    processors.register(FnProcessor::new("sleep", |job: &Job| -> ProcessorFuture {
        let ms = job.payload.get("ms").and_then(Value::as_u64);
        Box::pin(async move {
            let Some(ms) = ms else {
                return Err("sleep requires a numeric `ms` field".to_string());
            };
            let ms = ms.min(MAX_SLEEP_MS);
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Ok(Some(serde_json::json!({ "slept_ms": ms })))
        })
    }));

    processors
}
