//! Pending tasks past their due date. Internal use: feeds the overdue scanner.

use crate::error::PipelineResult;
use crate::models::Task;
use crate::store::TaskStore;
use chrono::Utc;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct GetOverdueTasksHandler {
    store: Arc<dyn TaskStore>,
}

impl GetOverdueTasksHandler {
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self { store }
    }

    pub async fn handle(&self) -> PipelineResult<Vec<Task>> {
        self.store.find_overdue(Utc::now()).await
    }
}
