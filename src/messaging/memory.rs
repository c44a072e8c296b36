//! In-process job queue with the same visibility, retry and dead-letter semantics
//! as the Postgres queue. Time is measured on the tokio clock so paused-time tests
//! can step through backoff delays.

use super::{DeadJob, FailureDisposition, Job, JobQueue, JobRequest, QueueMetrics, RetryPolicy};
use crate::error::{PipelineError, PipelineResult};
use crate::logging::log_job_operation;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, warn};

#[derive(Debug, Clone)]
struct QueuedJob {
    job: Job,
    visible_at: Instant,
    claimed: bool,
}

#[derive(Debug, Default)]
struct QueueState {
    next_id: i64,
    jobs: BTreeMap<i64, QueuedJob>,
    dead: Vec<DeadJob>,
}

#[derive(Debug, Clone)]
pub struct InMemoryJobQueue {
    state: Arc<Mutex<QueueState>>,
    policy: RetryPolicy,
    unavailable: Arc<AtomicBool>,
}

impl Default for InMemoryJobQueue {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

impl InMemoryJobQueue {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            state: Arc::new(Mutex::new(QueueState::default())),
            policy,
            unavailable: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Simulate a broker outage: every operation fails while set
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// All live jobs (visible, delayed or claimed) in id order
    pub fn snapshot(&self) -> Vec<Job> {
        self.state
            .lock()
            .jobs
            .values()
            .map(|queued| queued.job.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.state.lock().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_available(&self) -> PipelineResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(PipelineError::Messaging("job queue unavailable".to_string()));
        }
        Ok(())
    }
}

fn wall_clock_after(delay: Duration) -> DateTime<Utc> {
    Utc::now() + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero())
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(&self, request: &JobRequest) -> PipelineResult<i64> {
        self.check_available()?;
        let mut state = self.state.lock();
        state.next_id += 1;
        let id = state.next_id;
        state.jobs.insert(
            id,
            QueuedJob {
                job: Job {
                    id,
                    job_name: request.job_name.clone(),
                    payload: request.payload.clone(),
                    attempts: 0,
                    enqueued_at: Utc::now(),
                },
                visible_at: Instant::now(),
                claimed: false,
            },
        );
        debug!(job_id = id, job_name = %request.job_name, "📤 Job enqueued");
        Ok(id)
    }

    async fn read(&self, limit: usize, visibility_timeout: Duration) -> PipelineResult<Vec<Job>> {
        self.check_available()?;
        let now = Instant::now();
        let mut state = self.state.lock();
        let claimed: Vec<Job> = state
            .jobs
            .values_mut()
            .filter(|queued| queued.visible_at <= now)
            .take(limit)
            .map(|queued| {
                if queued.claimed {
                    warn!(
                        job_id = queued.job.id,
                        "Visibility timeout elapsed without ack, redelivering job"
                    );
                }
                queued.claimed = true;
                queued.visible_at = now + visibility_timeout;
                queued.job.clone()
            })
            .collect();
        Ok(claimed)
    }

    async fn ack(&self, job_id: i64) -> PipelineResult<()> {
        self.check_available()?;
        match self.state.lock().jobs.remove(&job_id) {
            Some(_) => Ok(()),
            None => Err(PipelineError::NotFound(format!("Job {job_id} not found"))),
        }
    }

    async fn fail(&self, job_id: i64, error_message: &str) -> PipelineResult<FailureDisposition> {
        self.check_available()?;
        let mut state = self.state.lock();
        let queued = state
            .jobs
            .get_mut(&job_id)
            .ok_or_else(|| PipelineError::NotFound(format!("Job {job_id} not found")))?;

        queued.job.attempts += 1;
        let attempts = queued.job.attempts;

        if !self.policy.is_exhausted(attempts) {
            let delay = self.policy.backoff_for(attempts);
            queued.claimed = false;
            queued.visible_at = Instant::now() + delay;
            return Ok(FailureDisposition::Retrying {
                attempt: attempts,
                retry_at: wall_clock_after(delay),
            });
        }

        if let Some(queued) = state.jobs.remove(&job_id) {
            error!(
                job_id,
                job_name = %queued.job.job_name,
                attempts,
                error = %error_message,
                "💀 Job exhausted its retry budget and was dead-lettered"
            );
            log_job_operation(
                "dead_letter",
                Some(job_id),
                &queued.job.job_name,
                "dead_lettered",
                Some(error_message),
            );
            state.dead.push(DeadJob {
                id: job_id,
                job_name: queued.job.job_name,
                payload: queued.job.payload,
                attempts,
                last_error: error_message.to_string(),
                enqueued_at: queued.job.enqueued_at,
                dead_at: Utc::now(),
            });
        }
        Ok(FailureDisposition::DeadLettered { attempts })
    }

    async fn dead_letters(&self, limit: usize) -> PipelineResult<Vec<DeadJob>> {
        self.check_available()?;
        Ok(self.state.lock().dead.iter().take(limit).cloned().collect())
    }

    async fn metrics(&self) -> PipelineResult<QueueMetrics> {
        self.check_available()?;
        let now = Instant::now();
        let state = self.state.lock();
        let in_flight = state
            .jobs
            .values()
            .filter(|queued| queued.claimed && queued.visible_at > now)
            .count() as u64;
        Ok(QueueMetrics {
            pending: state.jobs.len() as u64 - in_flight,
            in_flight,
            dead_lettered: state.dead.len() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn quick_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            backoff_base: Duration::from_millis(100),
            backoff_max: Duration::from_secs(1),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_claimed_job_is_hidden_until_visibility_timeout() {
        let queue = InMemoryJobQueue::new(quick_policy());
        let id = queue
            .enqueue(&JobRequest::new("a", json!({"n": 1})))
            .await
            .unwrap();

        let first = queue.read(10, Duration::from_secs(5)).await.unwrap();
        assert_eq!(first.len(), 1);
        assert!(queue.read(10, Duration::from_secs(5)).await.unwrap().is_empty());
        assert_eq!(queue.metrics().await.unwrap().in_flight, 1);

        tokio::time::advance(Duration::from_secs(6)).await;
        let redelivered = queue.read(10, Duration::from_secs(5)).await.unwrap();
        assert_eq!(redelivered[0].id, id);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_back_off_then_dead_letter() {
        let queue = InMemoryJobQueue::new(quick_policy());
        let id = queue.enqueue(&JobRequest::new("a", json!({}))).await.unwrap();
        let vt = Duration::from_secs(30);

        queue.read(1, vt).await.unwrap();
        let first = queue.fail(id, "boom").await.unwrap();
        assert!(matches!(first, FailureDisposition::Retrying { attempt: 1, .. }));

        // not visible before the 100ms backoff
        assert!(queue.read(1, vt).await.unwrap().is_empty());
        tokio::time::advance(Duration::from_millis(100)).await;
        let retried = queue.read(1, vt).await.unwrap();
        assert_eq!(retried[0].attempts, 1);

        queue.fail(id, "boom").await.unwrap();
        tokio::time::advance(Duration::from_millis(200)).await;
        queue.read(1, vt).await.unwrap();
        let last = queue.fail(id, "still broken").await.unwrap();
        assert_eq!(last, FailureDisposition::DeadLettered { attempts: 3 });

        assert!(queue.is_empty());
        let dead = queue.dead_letters(10).await.unwrap();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].last_error, "still broken");
        assert_eq!(queue.metrics().await.unwrap().dead_lettered, 1);
    }

    #[tokio::test]
    async fn test_unavailable_queue_rejects_enqueue() {
        let queue = InMemoryJobQueue::default();
        queue.set_unavailable(true);
        let result = queue.enqueue(&JobRequest::new("a", json!({}))).await;
        assert!(matches!(result, Err(PipelineError::Messaging(_))));
    }

    #[tokio::test]
    async fn test_ack_removes_job() {
        let queue = InMemoryJobQueue::default();
        let id = queue.enqueue(&JobRequest::new("a", json!({}))).await.unwrap();
        queue.read(1, Duration::from_secs(1)).await.unwrap();
        queue.ack(id).await.unwrap();
        assert!(queue.is_empty());
        assert!(queue.ack(id).await.is_err());
    }
}
