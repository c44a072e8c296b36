//! Queue message value types shared by producers, the queue implementations and
//! the consumer runtime.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A job to be enqueued: a type name plus an opaque JSON payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRequest {
    pub job_name: String,
    pub payload: serde_json::Value,
}

impl JobRequest {
    pub fn new(job_name: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            job_name: job_name.into(),
            payload,
        }
    }
}

/// A claimed job as handed to a consumer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: i64,
    pub job_name: String,
    pub payload: serde_json::Value,
    /// Number of failed attempts recorded before this delivery
    pub attempts: u32,
    pub enqueued_at: DateTime<Utc>,
}

/// A job that exhausted its retry budget
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadJob {
    pub id: i64,
    pub job_name: String,
    pub payload: serde_json::Value,
    pub attempts: u32,
    pub last_error: String,
    pub enqueued_at: DateTime<Utc>,
    pub dead_at: DateTime<Utc>,
}

/// What the queue did with a job after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureDisposition {
    Retrying {
        attempt: u32,
        retry_at: DateTime<Utc>,
    },
    DeadLettered {
        attempts: u32,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueMetrics {
    /// Jobs visible now or waiting out a retry delay
    pub pending: u64,
    /// Jobs claimed and still inside their visibility timeout
    pub in_flight: u64,
    pub dead_lettered: u64,
}
