//! # Task Processor
//!
//! The job handler for the task topic. It parses each claimed job into a
//! [`TaskJob`] and dispatches it:
//!
//! - `task-status-update` re-enters the command bus with `ApplyStatus`, which
//!   writes the carried status without staging another job
//! - `overdue-tasks-notification` hands the task id to the [`Notifier`]
//! - anything else is answered with a structured failure
//!
//! Problems that cannot fix themselves (malformed payload, unknown job type, task
//! deleted since the job was queued) become `JobResult { success: false }` and the
//! job is acked. Infrastructure errors propagate so the queue retries the job.

use super::job::{JobResult, TaskJob};
use super::notifier::Notifier;
use crate::commands::CommandBus;
use crate::error::PipelineResult;
use crate::logging::log_job_operation;
use crate::messaging::{Job, JobHandler};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct TaskProcessor {
    commands: CommandBus,
    notifier: Arc<dyn Notifier>,
}

impl TaskProcessor {
    pub fn new(commands: CommandBus, notifier: Arc<dyn Notifier>) -> Self {
        Self { commands, notifier }
    }

    pub async fn process(&self, job: &Job) -> PipelineResult<JobResult> {
        let task_job = match TaskJob::from_job(job) {
            Ok(task_job) => task_job,
            Err(malformed) => {
                warn!(
                    job_id = job.id,
                    job_name = %malformed.job_name,
                    reason = %malformed.reason,
                    "Malformed job payload, not retrying"
                );
                return Ok(JobResult::failure(malformed.reason));
            }
        };

        let result = match task_job {
            TaskJob::StatusUpdate { task_id, status } => {
                match self.commands.apply_status(task_id, status).await {
                    Ok(task) => JobResult::status_updated(task.id, status),
                    Err(e) if e.is_retryable() => return Err(e),
                    Err(e) => {
                        warn!(
                            job_id = job.id,
                            task_id = %task_id,
                            error = %e,
                            "Status update cannot be applied, not retrying"
                        );
                        JobResult::failure(e.to_string())
                    }
                }
            }
            TaskJob::OverdueNotification { task_id } => {
                self.notifier.notify_overdue(task_id).await?;
                JobResult::notified(format!("Overdue notification sent for task {task_id}"))
            }
            TaskJob::Unknown(name) => {
                warn!(job_id = job.id, job_name = %name, "Unknown job type");
                JobResult::failure(format!("Unknown job type: {name}"))
            }
        };

        debug!(job_id = job.id, success = result.success, "Job processed");
        log_job_operation(
            "process",
            Some(job.id),
            &job.job_name,
            if result.success { "succeeded" } else { "failed" },
            result.error.as_deref(),
        );
        Ok(result)
    }
}

#[async_trait]
impl JobHandler for TaskProcessor {
    type Output = JobResult;

    fn name(&self) -> &'static str {
        "task_processor"
    }

    async fn handle(&self, job: &Job) -> PipelineResult<JobResult> {
        self.process(job).await
    }

    fn succeeded(output: &JobResult) -> bool {
        output.success
    }
}
