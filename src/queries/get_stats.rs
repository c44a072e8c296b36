//! Counts by status and by priority, computed from one grouped read so a task is
//! attributed once to each dimension and once to the total.

use crate::error::PipelineResult;
use crate::models::TaskStats;
use crate::store::TaskStore;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct GetTaskStatsHandler {
    store: Arc<dyn TaskStore>,
}

impl GetTaskStatsHandler {
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self { store }
    }

    pub async fn handle(&self) -> PipelineResult<TaskStats> {
        let rows = self.store.aggregate_counts().await?;
        Ok(TaskStats::from_grouped_counts(&rows))
    }
}
