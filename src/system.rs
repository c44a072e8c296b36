//! # Pipeline Bootstrap
//!
//! Wires a task store and a job queue into the command and query buses, the task
//! processor consumer, the outbox relay and the overdue scanner.
//!
//! - [`TaskPipeline::in_memory`]: single-process store and queue (tests, demos)
//! - [`TaskPipeline::connect`]: PostgreSQL store and queue sharing one pool
//! - [`TaskPipeline::builder`]: bring your own store, queue or notifier
//!
//! ```rust,no_run
//! use task_pipeline::config::PipelineConfig;
//! use task_pipeline::models::{Actor, NewTask};
//! use task_pipeline::system::TaskPipeline;
//! use uuid::Uuid;
//!
//! # async fn example() -> task_pipeline::error::PipelineResult<()> {
//! let pipeline = TaskPipeline::in_memory(PipelineConfig::default())?;
//! pipeline.start()?;
//!
//! let actor = Actor::user(Uuid::new_v4());
//! let task = pipeline.commands().create(NewTask::titled("Write report"), actor).await?;
//! println!("created {}", task.id);
//!
//! pipeline.shutdown().await;
//! # Ok(())
//! # }
//! ```

use crate::commands::CommandBus;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::messaging::{
    ConsumerConfig, ConsumerStatsSnapshot, InMemoryJobQueue, JobConsumer, JobQueue, PgJobQueue,
    QueueMetrics, RetryPolicy,
};
use crate::queries::QueryBus;
use crate::scheduling::{OutboxRelay, OverdueScanner};
use crate::store::{InMemoryTaskStore, PgTaskStore, TaskStore};
use crate::worker::{LogNotifier, Notifier, TaskProcessor};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

#[derive(Debug)]
pub struct TaskPipeline {
    config: PipelineConfig,
    store: Arc<dyn TaskStore>,
    queue: Arc<dyn JobQueue>,
    commands: CommandBus,
    queries: QueryBus,
    consumer: JobConsumer<TaskProcessor>,
    relay: Arc<OutboxRelay>,
    scanner: Arc<OverdueScanner>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStatus {
    pub consumer_running: bool,
    pub relay_running: bool,
    pub scanner_running: bool,
    pub in_flight_jobs: usize,
    pub consumer: ConsumerStatsSnapshot,
    pub queue: QueueMetrics,
}

#[derive(Debug, Default)]
pub struct TaskPipelineBuilder {
    config: PipelineConfig,
    store: Option<Arc<dyn TaskStore>>,
    queue: Option<Arc<dyn JobQueue>>,
    notifier: Option<Arc<dyn Notifier>>,
}

impl TaskPipelineBuilder {
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn store(mut self, store: Arc<dyn TaskStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn queue(mut self, queue: Arc<dyn JobQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn build(self) -> PipelineResult<TaskPipeline> {
        self.config.validate()?;
        let store = self
            .store
            .ok_or_else(|| PipelineError::Configuration("a task store is required".to_string()))?;
        let queue = self
            .queue
            .ok_or_else(|| PipelineError::Configuration("a job queue is required".to_string()))?;
        let notifier = self.notifier.unwrap_or_else(|| Arc::new(LogNotifier));

        let commands = CommandBus::new(Arc::clone(&store));
        let queries = QueryBus::new(Arc::clone(&store), self.config.pagination.clone());
        let processor = Arc::new(TaskProcessor::new(commands.clone(), notifier));
        let consumer = JobConsumer::new(
            Arc::clone(&queue),
            processor,
            ConsumerConfig::from(&self.config),
        );
        let relay = Arc::new(OutboxRelay::new(
            Arc::clone(&store),
            Arc::clone(&queue),
            &self.config.outbox,
        ));
        let scanner = Arc::new(OverdueScanner::new(
            queries.clone(),
            Arc::clone(&queue),
            &self.config.scanner,
        ));

        Ok(TaskPipeline {
            config: self.config,
            store,
            queue,
            commands,
            queries,
            consumer,
            relay,
            scanner,
        })
    }
}

impl TaskPipeline {
    pub fn builder() -> TaskPipelineBuilder {
        TaskPipelineBuilder::default()
    }

    pub fn in_memory(config: PipelineConfig) -> PipelineResult<Self> {
        let queue = InMemoryJobQueue::new(RetryPolicy::from(&config.queue));
        Self::builder()
            .store(Arc::new(InMemoryTaskStore::new()))
            .queue(Arc::new(queue))
            .config(config)
            .build()
    }

    /// Connect to PostgreSQL, run embedded migrations when enabled, and share one
    /// pool between the store and the queue
    pub async fn connect(config: PipelineConfig) -> PipelineResult<Self> {
        let store = PgTaskStore::connect(&config.database.url, config.database.max_connections).await?;
        if config.database.run_migrations {
            store.run_migrations().await?;
        }
        let queue = PgJobQueue::new(store.pool().clone(), RetryPolicy::from(&config.queue));

        Self::builder()
            .store(Arc::new(store))
            .queue(Arc::new(queue))
            .config(config)
            .build()
    }

    /// Spawn the relay, the consumer and (when enabled) the scanner
    pub fn start(&self) -> PipelineResult<()> {
        self.relay.start()?;
        self.consumer.start()?;
        if self.config.scanner.enabled {
            self.scanner.start()?;
        }
        info!(
            scanner_enabled = self.config.scanner.enabled,
            "✅ Task pipeline started"
        );
        Ok(())
    }

    /// Stop producers before the consumer so in-flight work drains last
    pub async fn shutdown(&self) {
        self.scanner.stop().await;
        self.relay.stop().await;
        self.consumer.stop().await;
        info!("Task pipeline shut down");
    }

    pub async fn status(&self) -> PipelineResult<PipelineStatus> {
        Ok(PipelineStatus {
            consumer_running: self.consumer.is_running(),
            relay_running: self.relay.is_running(),
            scanner_running: self.scanner.is_running(),
            in_flight_jobs: self.consumer.in_flight(),
            consumer: self.consumer.stats().snapshot(),
            queue: self.queue.metrics().await?,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn commands(&self) -> &CommandBus {
        &self.commands
    }

    pub fn queries(&self) -> &QueryBus {
        &self.queries
    }

    pub fn store(&self) -> &Arc<dyn TaskStore> {
        &self.store
    }

    pub fn queue(&self) -> &Arc<dyn JobQueue> {
        &self.queue
    }

    pub fn consumer(&self) -> &JobConsumer<TaskProcessor> {
        &self.consumer
    }

    pub fn relay(&self) -> &OutboxRelay {
        &self.relay
    }

    pub fn scanner(&self) -> &OverdueScanner {
        &self.scanner
    }
}
