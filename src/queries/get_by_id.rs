use crate::error::{PipelineError, PipelineResult};
use crate::models::Task;
use crate::store::TaskStore;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct GetTaskByIdHandler {
    store: Arc<dyn TaskStore>,
}

impl GetTaskByIdHandler {
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self { store }
    }

    pub async fn handle(&self, id: Uuid) -> PipelineResult<Task> {
        self.store
            .find_by_id(id)
            .await?
            .ok_or_else(|| PipelineError::task_not_found(id))
    }
}
