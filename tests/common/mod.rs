//! Shared fixtures for integration tests: an in-memory pipeline harness, task
//! builders and proptest strategies.

#![allow(dead_code)] // each test binary uses a different subset

pub mod builders;
pub mod strategies;

pub use builders::*;

use parking_lot::Mutex;
use std::sync::Arc;
use task_pipeline::config::PipelineConfig;
use task_pipeline::error::PipelineResult;
use task_pipeline::messaging::{InMemoryJobQueue, Job, JobQueue, JobRequest, RetryPolicy};
use task_pipeline::store::{InMemoryTaskStore, TaskStore};
use task_pipeline::system::TaskPipeline;
use task_pipeline::worker::Notifier;
use task_pipeline::{CommandBus, QueryBus};
use uuid::Uuid;

/// Notifier that remembers which tasks it was asked about
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    notified: Mutex<Vec<Uuid>>,
}

impl RecordingNotifier {
    pub fn notified(&self) -> Vec<Uuid> {
        self.notified.lock().clone()
    }
}

#[async_trait::async_trait]
impl Notifier for RecordingNotifier {
    async fn notify_overdue(&self, task_id: Uuid) -> PipelineResult<()> {
        self.notified.lock().push(task_id);
        Ok(())
    }
}

/// A pipeline over in-memory backends, with typed handles to the backends so
/// tests can inspect staged jobs and inject failures.
pub struct TestHarness {
    pub store: Arc<InMemoryTaskStore>,
    pub queue: Arc<InMemoryJobQueue>,
    pub notifier: Arc<RecordingNotifier>,
    pub pipeline: TaskPipeline,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: PipelineConfig) -> Self {
        let store = Arc::new(InMemoryTaskStore::with_outbox_history());
        let queue = Arc::new(InMemoryJobQueue::new(RetryPolicy::from(&config.queue)));
        let notifier = Arc::new(RecordingNotifier::default());

        let pipeline = TaskPipeline::builder()
            .config(config)
            .store(store.clone() as Arc<dyn TaskStore>)
            .queue(queue.clone() as Arc<dyn JobQueue>)
            .notifier(notifier.clone())
            .build()
            .expect("harness pipeline builds");

        Self {
            store,
            queue,
            notifier,
            pipeline,
        }
    }

    pub fn commands(&self) -> &CommandBus {
        self.pipeline.commands()
    }

    pub fn queries(&self) -> &QueryBus {
        self.pipeline.queries()
    }

    /// Jobs staged in the outbox by committed transactions, in staging order
    pub async fn staged_jobs(&self) -> Vec<JobRequest> {
        self.store
            .outbox_entries()
            .await
            .into_iter()
            .map(|entry| entry.job)
            .collect()
    }

    /// Staged jobs for one task id
    pub async fn staged_jobs_for(&self, task_id: Uuid) -> Vec<JobRequest> {
        self.staged_jobs()
            .await
            .into_iter()
            .filter(|job| job.payload["taskId"] == task_id.to_string())
            .collect()
    }

    /// Relay the whole outbox into the queue
    pub async fn relay(&self) -> usize {
        self.pipeline.relay().drain().await.expect("relay succeeds")
    }

    pub fn queued_jobs(&self) -> Vec<Job> {
        self.queue.snapshot()
    }
}

/// Defaults with short intervals so background loops react quickly in tests
pub fn test_config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.worker.poll_interval_ms = 10;
    config.outbox.poll_interval_ms = 10;
    config.queue.backoff_base_ms = 10;
    config.queue.backoff_max_ms = 50;
    config.scanner.enabled = false;
    config
}
