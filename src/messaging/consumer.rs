//! # Job Consumer
//!
//! Polls a [`JobQueue`] and runs each claimed job through a [`JobHandler`] on its own
//! tokio task. The consumer, not the handler, owns both load bounds:
//!
//! - **Concurrency**: a semaphore with `concurrency` permits; a job holds one permit
//!   from start to ack/fail.
//! - **Start rate**: a [`FixedWindowRateLimiter`] admitting at most `rate_limit_max`
//!   job starts per window.
//!
//! Outcome mapping:
//! - `Ok(output)` acks the job, whether the output reports success or a structured
//!   failure (a malformed payload will not improve on retry).
//! - `Err(_)`, a timeout or a panic records a failed attempt and the queue's retry
//!   policy takes over.

use super::{FailureDisposition, FixedWindowRateLimiter, Job, JobQueue};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use async_trait::async_trait;
use futures::FutureExt;
use serde::Serialize;
use std::fmt::Debug;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

#[async_trait]
pub trait JobHandler: Send + Sync + 'static {
    type Output: Send + Debug + 'static;

    fn name(&self) -> &'static str;

    /// Process one job. Return `Err` only for failures a retry could fix.
    async fn handle(&self, job: &Job) -> PipelineResult<Self::Output>;

    /// Whether an `Ok` output represents success rather than a structured failure
    fn succeeded(output: &Self::Output) -> bool;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerConfig {
    pub concurrency: usize,
    pub rate_limit_max: u32,
    pub rate_limit_window: Duration,
    pub poll_interval: Duration,
    pub batch_size: usize,
    pub handler_timeout: Duration,
    pub visibility_timeout: Duration,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self::from(&PipelineConfig::default())
    }
}

impl From<&PipelineConfig> for ConsumerConfig {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            concurrency: config.worker.concurrency.max(1),
            rate_limit_max: config.worker.rate_limit_max,
            rate_limit_window: Duration::from_millis(config.worker.rate_limit_window_ms),
            poll_interval: Duration::from_millis(config.worker.poll_interval_ms),
            batch_size: config.worker.batch_size.max(1),
            handler_timeout: Duration::from_millis(config.worker.handler_timeout_ms),
            visibility_timeout: config.queue.visibility_timeout(),
        }
    }
}

#[derive(Debug, Default)]
pub struct ConsumerStats {
    started: AtomicU64,
    succeeded: AtomicU64,
    structured_failures: AtomicU64,
    retried: AtomicU64,
    dead_lettered: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerStatsSnapshot {
    pub started: u64,
    pub succeeded: u64,
    pub structured_failures: u64,
    pub retried: u64,
    pub dead_lettered: u64,
}

impl ConsumerStats {
    pub fn snapshot(&self) -> ConsumerStatsSnapshot {
        ConsumerStatsSnapshot {
            started: self.started.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            structured_failures: self.structured_failures.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            dead_lettered: self.dead_lettered.load(Ordering::Relaxed),
        }
    }

    /// Jobs that reached a final outcome or a recorded failure
    pub fn finished(&self) -> u64 {
        let snapshot = self.snapshot();
        snapshot.succeeded + snapshot.structured_failures + snapshot.retried + snapshot.dead_lettered
    }
}

struct ConsumerInner<H: JobHandler> {
    queue: Arc<dyn JobQueue>,
    handler: Arc<H>,
    config: ConsumerConfig,
    semaphore: Arc<Semaphore>,
    limiter: FixedWindowRateLimiter,
    stats: Arc<ConsumerStats>,
    running: AtomicBool,
    wake: Notify,
}

pub struct JobConsumer<H: JobHandler> {
    inner: Arc<ConsumerInner<H>>,
    poll_loop: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl<H: JobHandler> Debug for JobConsumer<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobConsumer")
            .field("handler", &self.inner.handler.name())
            .field("config", &self.inner.config)
            .field("running", &self.is_running())
            .finish()
    }
}

impl<H: JobHandler> JobConsumer<H> {
    pub fn new(queue: Arc<dyn JobQueue>, handler: Arc<H>, config: ConsumerConfig) -> Self {
        let limiter = FixedWindowRateLimiter::new(config.rate_limit_max, config.rate_limit_window);
        Self {
            inner: Arc::new(ConsumerInner {
                queue,
                handler,
                semaphore: Arc::new(Semaphore::new(config.concurrency)),
                limiter,
                config,
                stats: Arc::new(ConsumerStats::default()),
                running: AtomicBool::new(false),
                wake: Notify::new(),
            }),
            poll_loop: parking_lot::Mutex::new(None),
        }
    }

    pub fn stats(&self) -> Arc<ConsumerStats> {
        Arc::clone(&self.inner.stats)
    }

    pub fn config(&self) -> &ConsumerConfig {
        &self.inner.config
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Jobs currently holding a concurrency permit
    pub fn in_flight(&self) -> usize {
        self.inner
            .config
            .concurrency
            .saturating_sub(self.inner.semaphore.available_permits())
    }

    /// Spawn the polling loop
    pub fn start(&self) -> PipelineResult<()> {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            return Err(PipelineError::Internal(format!(
                "Consumer for {} is already running",
                self.inner.handler.name()
            )));
        }

        info!(
            handler = self.inner.handler.name(),
            concurrency = self.inner.config.concurrency,
            rate_limit_max = self.inner.config.rate_limit_max,
            rate_limit_window_ms = self.inner.config.rate_limit_window.as_millis() as u64,
            "🚀 Job consumer starting"
        );

        let inner = Arc::clone(&self.inner);
        *self.poll_loop.lock() = Some(tokio::spawn(async move { inner.poll_loop().await }));
        Ok(())
    }

    /// Stop claiming new jobs and wait for in-flight jobs to finish
    pub async fn stop(&self) {
        if !self.inner.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.inner.wake.notify_one();

        let handle = self.poll_loop.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(error = %e, "Job consumer poll loop terminated abnormally");
            }
        }

        self.inner.drain().await;
        info!(
            handler = self.inner.handler.name(),
            stats = ?self.inner.stats.snapshot(),
            "🛑 Job consumer stopped"
        );
    }

    /// Claim one batch, run it under the same bounds as the loop, and wait for it.
    /// Returns the number of jobs processed.
    pub async fn poll_once(&self) -> PipelineResult<usize> {
        let capacity = self.inner.config.batch_size;
        let jobs = self
            .inner
            .queue
            .read(capacity, self.inner.config.visibility_timeout)
            .await?;
        let count = jobs.len();
        let handles = self.inner.dispatch(jobs).await;
        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Job task terminated abnormally");
            }
        }
        Ok(count)
    }
}

impl<H: JobHandler> ConsumerInner<H> {
    async fn poll_loop(self: Arc<Self>) {
        while self.running.load(Ordering::SeqCst) {
            let capacity = self
                .semaphore
                .available_permits()
                .min(self.config.batch_size);

            let claimed = if capacity == 0 {
                Vec::new()
            } else {
                match self.queue.read(capacity, self.config.visibility_timeout).await {
                    Ok(jobs) => jobs,
                    Err(e) => {
                        error!(
                            handler = self.handler.name(),
                            error = %e,
                            "Failed to claim jobs from queue"
                        );
                        Vec::new()
                    }
                }
            };

            if claimed.is_empty() {
                tokio::select! {
                    _ = tokio::time::sleep(self.config.poll_interval) => {}
                    _ = self.wake.notified() => {}
                }
                continue;
            }

            debug!(handler = self.handler.name(), claimed = claimed.len(), "📥 Claimed jobs");
            // spawned jobs run detached; stop() drains them through the semaphore
            drop(self.dispatch(claimed).await);
        }
    }

    /// Start each job on its own task once the rate limiter and a permit allow it
    async fn dispatch(self: &Arc<Self>, jobs: Vec<Job>) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::with_capacity(jobs.len());
        for job in jobs {
            self.limiter.acquire().await;
            let permit = match Arc::clone(&self.semaphore).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    error!(job_id = job.id, "Concurrency semaphore closed, leaving job for redelivery");
                    break;
                }
            };

            let inner = Arc::clone(self);
            handles.push(tokio::spawn(async move {
                inner.process(job).await;
                drop(permit);
            }));
        }
        handles
    }

    #[instrument(skip(self, job), fields(job_id = job.id, job_name = %job.job_name, attempt = job.attempts + 1))]
    async fn process(&self, job: Job) {
        self.stats.started.fetch_add(1, Ordering::Relaxed);
        let started = tokio::time::Instant::now();

        let outcome = tokio::time::timeout(
            self.config.handler_timeout,
            AssertUnwindSafe(self.handler.handle(&job)).catch_unwind(),
        )
        .await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(Ok(Ok(output))) => {
                if H::succeeded(&output) {
                    self.stats.succeeded.fetch_add(1, Ordering::Relaxed);
                    debug!(elapsed_ms, "✅ Job succeeded");
                } else {
                    self.stats.structured_failures.fetch_add(1, Ordering::Relaxed);
                    warn!(elapsed_ms, output = ?output, "Job finished with a structured failure");
                }
                if let Err(e) = self.queue.ack(job.id).await {
                    error!(error = %e, "Failed to ack job, it will be redelivered");
                }
            }
            Ok(Ok(Err(handler_error))) => {
                warn!(elapsed_ms, error = %handler_error, "Job handler returned an error");
                self.record_failure(&job, &handler_error.to_string()).await;
            }
            Ok(Err(panic)) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "Unknown panic".to_string());
                error!(elapsed_ms, panic_msg = %message, "Job handler panicked");
                self.record_failure(&job, &format!("Handler panicked: {message}"))
                    .await;
            }
            Err(_) => {
                error!(
                    timeout_ms = self.config.handler_timeout.as_millis() as u64,
                    "Job handler timed out"
                );
                self.record_failure(
                    &job,
                    &format!(
                        "Handler timed out after {}ms",
                        self.config.handler_timeout.as_millis()
                    ),
                )
                .await;
            }
        }
    }

    async fn record_failure(&self, job: &Job, reason: &str) {
        match self.queue.fail(job.id, reason).await {
            Ok(FailureDisposition::Retrying { attempt, retry_at }) => {
                self.stats.retried.fetch_add(1, Ordering::Relaxed);
                warn!(job_id = job.id, attempt, retry_at = %retry_at, "🔄 Job scheduled for retry");
            }
            Ok(FailureDisposition::DeadLettered { .. }) => {
                self.stats.dead_lettered.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                error!(
                    job_id = job.id,
                    error = %e,
                    "Failed to record job failure, it will reappear after its visibility timeout"
                );
            }
        }
    }

    async fn drain(&self) {
        let permits = u32::try_from(self.config.concurrency).unwrap_or(u32::MAX);
        match self.semaphore.acquire_many(permits).await {
            Ok(all) => drop(all),
            Err(_) => warn!("Concurrency semaphore closed while draining"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::{InMemoryJobQueue, JobRequest, RetryPolicy};
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    #[derive(Debug, Default)]
    struct ScriptedHandler {
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl JobHandler for ScriptedHandler {
        type Output = bool;

        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn handle(&self, job: &Job) -> PipelineResult<bool> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);

            match job.payload["mode"].as_str() {
                Some("ok") => Ok(true),
                Some("structured") => Ok(false),
                Some("error") => Err(PipelineError::Database("store offline".into())),
                Some("panic") => panic!("handler exploded"),
                Some("slow") => {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok(true)
                }
                _ => Ok(false),
            }
        }

        fn succeeded(output: &bool) -> bool {
            *output
        }
    }

    fn consumer_config() -> ConsumerConfig {
        ConsumerConfig {
            concurrency: 2,
            rate_limit_max: 100,
            rate_limit_window: Duration::from_secs(1),
            poll_interval: Duration::from_millis(10),
            batch_size: 10,
            handler_timeout: Duration::from_secs(5),
            visibility_timeout: Duration::from_secs(30),
        }
    }

    async fn enqueue_modes(queue: &InMemoryJobQueue, modes: &[&str]) {
        for mode in modes {
            queue
                .enqueue(&JobRequest::new("scripted", json!({ "mode": mode })))
                .await
                .unwrap();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_outcomes_map_to_ack_or_fail() {
        let queue = Arc::new(InMemoryJobQueue::new(RetryPolicy {
            max_attempts: 1,
            ..RetryPolicy::default()
        }));
        enqueue_modes(&queue, &["ok", "structured", "error", "panic"]).await;

        let consumer = JobConsumer::new(
            queue.clone(),
            Arc::new(ScriptedHandler::default()),
            consumer_config(),
        );
        assert_eq!(consumer.poll_once().await.unwrap(), 4);

        let stats = consumer.stats().snapshot();
        assert_eq!(stats.started, 4);
        assert_eq!(stats.succeeded, 1);
        assert_eq!(stats.structured_failures, 1);
        assert_eq!(stats.dead_lettered, 2);
        assert!(queue.is_empty());

        let dead = queue.dead_letters(10).await.unwrap();
        assert!(dead.iter().any(|d| d.last_error.contains("Handler panicked")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_handler_error_is_retried() {
        let queue = Arc::new(InMemoryJobQueue::default());
        enqueue_modes(&queue, &["error"]).await;

        let consumer = JobConsumer::new(
            queue.clone(),
            Arc::new(ScriptedHandler::default()),
            consumer_config(),
        );
        consumer.poll_once().await.unwrap();

        assert_eq!(consumer.stats().snapshot().retried, 1);
        assert_eq!(queue.snapshot()[0].attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_records_failure() {
        let queue = Arc::new(InMemoryJobQueue::default());
        enqueue_modes(&queue, &["slow"]).await;

        let consumer = JobConsumer::new(
            queue.clone(),
            Arc::new(ScriptedHandler::default()),
            consumer_config(),
        );
        consumer.poll_once().await.unwrap();

        assert_eq!(consumer.stats().snapshot().retried, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_never_exceeds_permits() {
        let queue = Arc::new(InMemoryJobQueue::default());
        enqueue_modes(&queue, &["ok"; 8]).await;
        let handler = Arc::new(ScriptedHandler::default());

        let consumer = JobConsumer::new(queue.clone(), handler.clone(), consumer_config());
        consumer.poll_once().await.unwrap();

        assert_eq!(consumer.stats().snapshot().succeeded, 8);
        assert_eq!(handler.peak.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_spreads_starts_across_windows() {
        let queue = Arc::new(InMemoryJobQueue::default());
        enqueue_modes(&queue, &["ok"; 6]).await;

        let config = ConsumerConfig {
            concurrency: 10,
            rate_limit_max: 2,
            ..consumer_config()
        };
        let consumer = JobConsumer::new(queue.clone(), Arc::new(ScriptedHandler::default()), config);

        let start = tokio::time::Instant::now();
        consumer.poll_once().await.unwrap();

        // six starts at two per second need three windows
        assert!(start.elapsed() >= Duration::from_secs(2));
        assert_eq!(consumer.stats().snapshot().succeeded, 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_and_stop_drains_in_flight_jobs() {
        let queue = Arc::new(InMemoryJobQueue::default());
        enqueue_modes(&queue, &["ok", "ok", "ok"]).await;

        let consumer = JobConsumer::new(
            queue.clone(),
            Arc::new(ScriptedHandler::default()),
            consumer_config(),
        );
        consumer.start().unwrap();
        assert!(consumer.start().is_err());

        while consumer.stats().finished() < 3 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        consumer.stop().await;

        assert!(!consumer.is_running());
        assert_eq!(consumer.in_flight(), 0);
        assert!(queue.is_empty());
    }
}
