//! # Messaging
//!
//! The job queue contract, its two implementations, and the consumer runtime that
//! enforces concurrency and start-rate bounds around a [`JobHandler`].
//!
//! Producers never block on consumption: `enqueue` returns as soon as the job is
//! durable. Delivery is at-least-once. A claimed job stays hidden for the
//! visibility timeout and reappears if it is neither acked nor failed.

pub mod consumer;
pub mod job;
pub mod memory;
pub mod postgres;
pub mod rate_limiter;
pub mod retry;

pub use consumer::{ConsumerConfig, ConsumerStats, ConsumerStatsSnapshot, JobConsumer, JobHandler};
pub use job::{DeadJob, FailureDisposition, Job, JobRequest, QueueMetrics};
pub use memory::InMemoryJobQueue;
pub use postgres::PgJobQueue;
pub use rate_limiter::FixedWindowRateLimiter;
pub use retry::RetryPolicy;

use crate::error::PipelineResult;
use async_trait::async_trait;
use std::fmt::Debug;
use std::time::Duration;

#[async_trait]
pub trait JobQueue: Send + Sync + Debug {
    /// Make a job durable and visible to consumers, returning its queue id
    async fn enqueue(&self, job: &JobRequest) -> PipelineResult<i64>;

    /// Claim up to `limit` visible jobs in id order, hiding them for `visibility_timeout`
    async fn read(&self, limit: usize, visibility_timeout: Duration) -> PipelineResult<Vec<Job>>;

    /// Remove a successfully processed job
    async fn ack(&self, job_id: i64) -> PipelineResult<()>;

    /// Record a failed attempt; the queue's retry policy decides what happens next
    async fn fail(&self, job_id: i64, error: &str) -> PipelineResult<FailureDisposition>;

    async fn dead_letters(&self, limit: usize) -> PipelineResult<Vec<DeadJob>>;

    async fn metrics(&self) -> PipelineResult<QueueMetrics>;
}
