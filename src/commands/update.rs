//! Update: merge partial fields into a task. A status change stages exactly one
//! status-update job carrying the new status; no change stages nothing.
//!
//! [`UpdateTaskHandler::apply_status`] is the worker's re-entry point. It writes
//! the status carried by a status-update job and never stages another one, so
//! consuming a job cannot produce more jobs.

use crate::error::{PipelineError, PipelineResult};
use crate::logging::log_task_operation;
use crate::models::{Task, TaskChanges, TaskStatus};
use crate::store::TaskStore;
use crate::worker::TaskJob;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct UpdateTaskHandler {
    store: Arc<dyn TaskStore>,
}

impl UpdateTaskHandler {
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self { store }
    }

    pub async fn handle(&self, id: Uuid, changes: TaskChanges) -> PipelineResult<Task> {
        self.run(id, changes, true).await
    }

    /// Write `status` without staging a follow-up job
    pub async fn apply_status(&self, id: Uuid, status: TaskStatus) -> PipelineResult<Task> {
        self.run(id, TaskChanges::status(status), false).await
    }

    async fn run(&self, id: Uuid, changes: TaskChanges, propagate: bool) -> PipelineResult<Task> {
        changes.validate()?;

        let mut tx = self.store.begin().await?;
        let mut task = tx
            .find_by_id(id)
            .await?
            .ok_or_else(|| PipelineError::task_not_found(id))?;

        let status_change = changes.apply(&mut task);
        if tx.update(&task).await? == 0 {
            return Err(PipelineError::task_not_found(id));
        }

        if let Some(change) = status_change.filter(|_| propagate) {
            tx.stage_job(&TaskJob::status_update(task.id, change.to).to_request())
                .await?;
            debug!(
                task_id = %task.id,
                from = %change.from,
                to = %change.to,
                "Status changed, status-update job staged"
            );
        }
        tx.commit().await?;

        log_task_operation(
            if propagate { "update" } else { "apply_status" },
            Some(task.id),
            Some(task.user_id),
            task.status.as_str(),
            status_change.map(|_| "status changed"),
        );
        Ok(task)
    }
}
