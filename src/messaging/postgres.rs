//! Postgres-backed job queue.
//!
//! Consumers claim rows with `FOR UPDATE SKIP LOCKED`, so any number of worker
//! processes can poll the same table without double-claiming a visible job.

use super::{DeadJob, FailureDisposition, Job, JobQueue, JobRequest, QueueMetrics, RetryPolicy};
use crate::error::{PipelineError, PipelineResult};
use crate::logging::log_job_operation;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use std::time::Duration;
use tracing::{debug, error};

#[derive(Debug, FromRow)]
struct JobRow {
    id: i64,
    job_name: String,
    payload: serde_json::Value,
    attempts: i32,
    enqueued_at: DateTime<Utc>,
}

impl From<JobRow> for Job {
    fn from(row: JobRow) -> Self {
        Job {
            id: row.id,
            job_name: row.job_name,
            payload: row.payload,
            attempts: u32::try_from(row.attempts).unwrap_or(0),
            enqueued_at: row.enqueued_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct DeadJobRow {
    id: i64,
    job_name: String,
    payload: serde_json::Value,
    attempts: i32,
    last_error: String,
    enqueued_at: DateTime<Utc>,
    dead_at: DateTime<Utc>,
}

impl From<DeadJobRow> for DeadJob {
    fn from(row: DeadJobRow) -> Self {
        DeadJob {
            id: row.id,
            job_name: row.job_name,
            payload: row.payload,
            attempts: u32::try_from(row.attempts).unwrap_or(0),
            last_error: row.last_error,
            enqueued_at: row.enqueued_at,
            dead_at: row.dead_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PgJobQueue {
    pool: PgPool,
    policy: RetryPolicy,
}

impl PgJobQueue {
    pub fn new(pool: PgPool, policy: RetryPolicy) -> Self {
        Self { pool, policy }
    }
}

fn limit_param(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

#[async_trait]
impl JobQueue for PgJobQueue {
    async fn enqueue(&self, job: &JobRequest) -> PipelineResult<i64> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO task_jobs (job_name, payload) VALUES ($1, $2) RETURNING id",
        )
        .bind(&job.job_name)
        .bind(&job.payload)
        .fetch_one(&self.pool)
        .await
        .map_err(messaging_error)?;
        debug!(job_id = id, job_name = %job.job_name, "📤 Job enqueued");
        Ok(id)
    }

    async fn read(&self, limit: usize, visibility_timeout: Duration) -> PipelineResult<Vec<Job>> {
        let mut rows = sqlx::query_as::<_, JobRow>(
            "UPDATE task_jobs \
             SET visible_at = NOW() + make_interval(secs => $2), claimed_at = NOW() \
             WHERE id IN ( \
                 SELECT id FROM task_jobs WHERE visible_at <= NOW() \
                 ORDER BY id LIMIT $1 FOR UPDATE SKIP LOCKED \
             ) \
             RETURNING id, job_name, payload, attempts, enqueued_at",
        )
        .bind(limit_param(limit))
        .bind(visibility_timeout.as_secs_f64())
        .fetch_all(&self.pool)
        .await
        .map_err(messaging_error)?;
        rows.sort_by_key(|row| row.id);
        Ok(rows.into_iter().map(Job::from).collect())
    }

    async fn ack(&self, job_id: i64) -> PipelineResult<()> {
        let result = sqlx::query("DELETE FROM task_jobs WHERE id = $1")
            .bind(job_id)
            .execute(&self.pool)
            .await
            .map_err(messaging_error)?;
        if result.rows_affected() == 0 {
            return Err(PipelineError::NotFound(format!("Job {job_id} not found")));
        }
        Ok(())
    }

    async fn fail(&self, job_id: i64, error_message: &str) -> PipelineResult<FailureDisposition> {
        let mut tx = self.pool.begin().await.map_err(messaging_error)?;

        let row = sqlx::query_as::<_, JobRow>(
            "UPDATE task_jobs SET attempts = attempts + 1, last_error = $2, claimed_at = NULL \
             WHERE id = $1 \
             RETURNING id, job_name, payload, attempts, enqueued_at",
        )
        .bind(job_id)
        .bind(error_message)
        .fetch_optional(&mut *tx)
        .await
        .map_err(messaging_error)?
        .ok_or_else(|| PipelineError::NotFound(format!("Job {job_id} not found")))?;

        let job = Job::from(row);
        let disposition = if self.policy.is_exhausted(job.attempts) {
            sqlx::query(
                "INSERT INTO task_jobs_dead (id, job_name, payload, attempts, last_error, enqueued_at) \
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(job.id)
            .bind(&job.job_name)
            .bind(&job.payload)
            .bind(i32::try_from(job.attempts).unwrap_or(i32::MAX))
            .bind(error_message)
            .bind(job.enqueued_at)
            .execute(&mut *tx)
            .await
            .map_err(messaging_error)?;
            sqlx::query("DELETE FROM task_jobs WHERE id = $1")
                .bind(job.id)
                .execute(&mut *tx)
                .await
                .map_err(messaging_error)?;
            FailureDisposition::DeadLettered {
                attempts: job.attempts,
            }
        } else {
            let retry_at = self.policy.retry_at(job.attempts, Utc::now());
            sqlx::query("UPDATE task_jobs SET visible_at = $2 WHERE id = $1")
                .bind(job.id)
                .bind(retry_at)
                .execute(&mut *tx)
                .await
                .map_err(messaging_error)?;
            FailureDisposition::Retrying {
                attempt: job.attempts,
                retry_at,
            }
        };

        tx.commit().await.map_err(messaging_error)?;

        if let FailureDisposition::DeadLettered { attempts } = disposition {
            error!(
                job_id,
                job_name = %job.job_name,
                attempts,
                error = %error_message,
                "💀 Job exhausted its retry budget and was dead-lettered"
            );
            log_job_operation(
                "dead_letter",
                Some(job_id),
                &job.job_name,
                "dead_lettered",
                Some(error_message),
            );
        }
        Ok(disposition)
    }

    async fn dead_letters(&self, limit: usize) -> PipelineResult<Vec<DeadJob>> {
        let rows = sqlx::query_as::<_, DeadJobRow>(
            "SELECT id, job_name, payload, attempts, last_error, enqueued_at, dead_at \
             FROM task_jobs_dead ORDER BY dead_at, id LIMIT $1",
        )
        .bind(limit_param(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(messaging_error)?;
        Ok(rows.into_iter().map(DeadJob::from).collect())
    }

    async fn metrics(&self) -> PipelineResult<QueueMetrics> {
        let (pending, in_flight, dead): (i64, i64, i64) = sqlx::query_as(
            "SELECT \
                 COUNT(*) FILTER (WHERE claimed_at IS NULL OR visible_at <= NOW()), \
                 COUNT(*) FILTER (WHERE claimed_at IS NOT NULL AND visible_at > NOW()), \
                 (SELECT COUNT(*) FROM task_jobs_dead) \
             FROM task_jobs",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(messaging_error)?;
        Ok(QueueMetrics {
            pending: u64::try_from(pending).unwrap_or(0),
            in_flight: u64::try_from(in_flight).unwrap_or(0),
            dead_lettered: u64::try_from(dead).unwrap_or(0),
        })
    }
}

/// Queue I/O failures classify as messaging errors, not store errors
fn messaging_error(err: sqlx::Error) -> PipelineError {
    PipelineError::Messaging(err.to_string())
}
