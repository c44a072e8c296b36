//! Delete: physical removal. Zero affected rows is the only not-found signal.

use crate::error::{PipelineError, PipelineResult};
use crate::logging::log_task_operation;
use crate::store::TaskStore;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct DeleteTaskHandler {
    store: Arc<dyn TaskStore>,
}

impl DeleteTaskHandler {
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self { store }
    }

    pub async fn handle(&self, id: Uuid) -> PipelineResult<()> {
        if self.store.delete(id).await? == 0 {
            return Err(PipelineError::task_not_found(id));
        }
        log_task_operation("delete", Some(id), None, "deleted", None);
        Ok(())
    }
}
