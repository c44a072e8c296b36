//! Job payload schema for the task topic.
//!
//! Producers build jobs through [`TaskJob`] so the payload shape lives in one
//! place; the worker parses claimed jobs back into the same union.

use crate::constants::jobs;
use crate::messaging::{Job, JobRequest};
use crate::models::TaskStatus;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskJob {
    StatusUpdate { task_id: Uuid, status: TaskStatus },
    OverdueNotification { task_id: Uuid },
    /// A job name this worker does not recognize
    Unknown(String),
}

/// Why a recognized job's payload could not be used
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedPayload {
    pub job_name: String,
    pub reason: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTaskPayload {
    #[serde(default)]
    task_id: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

impl TaskJob {
    pub fn status_update(task_id: Uuid, status: TaskStatus) -> Self {
        TaskJob::StatusUpdate { task_id, status }
    }

    pub fn overdue_notification(task_id: Uuid) -> Self {
        TaskJob::OverdueNotification { task_id }
    }

    pub fn job_name(&self) -> &str {
        match self {
            TaskJob::StatusUpdate { .. } => jobs::TASK_STATUS_UPDATE,
            TaskJob::OverdueNotification { .. } => jobs::OVERDUE_TASKS_NOTIFICATION,
            TaskJob::Unknown(name) => name,
        }
    }

    pub fn to_request(&self) -> JobRequest {
        let payload = match self {
            TaskJob::StatusUpdate { task_id, status } => {
                json!({ "taskId": task_id, "status": status })
            }
            TaskJob::OverdueNotification { task_id } => json!({ "taskId": task_id }),
            TaskJob::Unknown(_) => json!({}),
        };
        JobRequest::new(self.job_name(), payload)
    }

    /// Parse a claimed job. Unknown names parse successfully as [`TaskJob::Unknown`];
    /// known names with unusable payloads are [`MalformedPayload`].
    pub fn from_job(job: &Job) -> Result<Self, MalformedPayload> {
        let malformed = |reason: String| MalformedPayload {
            job_name: job.job_name.clone(),
            reason,
        };

        match job.job_name.as_str() {
            jobs::TASK_STATUS_UPDATE => {
                let raw = parse_raw(&job.payload).map_err(malformed)?;
                let task_id = require_task_id(&raw).map_err(malformed)?;
                let status = raw
                    .status
                    .as_deref()
                    .ok_or_else(|| malformed("Missing required field: status".to_string()))?
                    .parse::<TaskStatus>()
                    .map_err(|e| malformed(e.to_string()))?;
                Ok(TaskJob::StatusUpdate { task_id, status })
            }
            jobs::OVERDUE_TASKS_NOTIFICATION => {
                let raw = parse_raw(&job.payload).map_err(malformed)?;
                let task_id = require_task_id(&raw).map_err(malformed)?;
                Ok(TaskJob::OverdueNotification { task_id })
            }
            other => Ok(TaskJob::Unknown(other.to_string())),
        }
    }
}

fn parse_raw(payload: &serde_json::Value) -> Result<RawTaskPayload, String> {
    RawTaskPayload::deserialize(payload).map_err(|e| format!("Invalid payload: {e}"))
}

fn require_task_id(raw: &RawTaskPayload) -> Result<Uuid, String> {
    let task_id = raw
        .task_id
        .as_deref()
        .ok_or_else(|| "Missing required field: taskId".to_string())?;
    Uuid::parse_str(task_id).map_err(|e| format!("Invalid taskId {task_id}: {e}"))
}

/// Serialized outcome of one job, returned to the consumer runtime
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_status: Option<TaskStatus>,
}

impl JobResult {
    pub fn status_updated(task_id: Uuid, new_status: TaskStatus) -> Self {
        Self {
            success: true,
            task_id: Some(task_id),
            new_status: Some(new_status),
            ..Self::default()
        }
    }

    pub fn notified(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }
}
