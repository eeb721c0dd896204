//! Job processor trait and registry.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use queue_core::Job;

/// Result type for job processors: output value or error message.
pub type ProcessorResult = Result<Option<serde_json::Value>, String>;

/// Future type for async job processors.
pub type ProcessorFuture = BoxFuture<'static, ProcessorResult>;

/// Executes jobs of one name.
pub trait JobProcessor: Send + Sync + 'static {
    /// The job name this processor handles.
    fn job_name(&self) -> &str;

    /// Process a job and return its output.
    fn process(&self, job: &Job) -> ProcessorFuture;
}

/// Maps job names to their processors.
#[derive(Default)]
pub struct JobProcessorRegistry {
    processors: HashMap<String, Arc<dyn JobProcessor>>,
}

impl JobProcessorRegistry {
    pub fn new() -> Self {
        Self {
            processors: HashMap::new(),
        }
    }

    /// Register a processor; a later one for the same name replaces it.
    pub fn register<P: JobProcessor>(&mut self, processor: P) {
        let name = processor.job_name().to_string();
        self.processors.insert(name, Arc::new(processor));
    }

    pub fn get(&self, job_name: &str) -> Option<Arc<dyn JobProcessor>> {
        self.processors.get(job_name).cloned()
    }
}

/// A closure-based job processor.
pub struct FnProcessor<F>
where
    F: Fn(&Job) -> ProcessorFuture + Send + Sync + 'static,
{
    job_name: String,
    process: F,
}

impl<F> FnProcessor<F>
where
    F: Fn(&Job) -> ProcessorFuture + Send + Sync + 'static,
{
    pub fn new(job_name: impl Into<String>, process: F) -> Self {
        Self {
            job_name: job_name.into(),
            process,
        }
    }
}

impl<F> JobProcessor for FnProcessor<F>
where
    F: Fn(&Job) -> ProcessorFuture + Send + Sync + 'static,
{
    fn job_name(&self) -> &str {
        &self.job_name
    }

    fn process(&self, job: &Job) -> ProcessorFuture {
        (self.process)(job)
    }
}
