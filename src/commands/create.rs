//! Create: insert a task owned by the acting user and stage its initial
//! status-update job in the same transaction.

use crate::error::PipelineResult;
use crate::logging::log_task_operation;
use crate::models::{Actor, NewTask, Task};
use crate::store::TaskStore;
use crate::worker::TaskJob;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct CreateTaskHandler {
    store: Arc<dyn TaskStore>,
}

impl CreateTaskHandler {
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self { store }
    }

    pub async fn handle(&self, new_task: NewTask, actor: &Actor) -> PipelineResult<Task> {
        let task = Task::from_new(new_task, actor.id)?;

        let mut tx = self.store.begin().await?;
        let created = tx.insert(&task).await?;
        let outbox_id = tx
            .stage_job(&TaskJob::status_update(created.id, created.status).to_request())
            .await?;
        tx.commit().await?;

        debug!(task_id = %created.id, outbox_id, "Initial status-update job staged");
        log_task_operation(
            "create",
            Some(created.id),
            Some(actor.id),
            created.status.as_str(),
            None,
        );
        Ok(created)
    }
}
