//! Filtered, paginated listing. Non-elevated actors only ever see their own tasks.

use crate::config::PaginationConfig;
use crate::error::PipelineResult;
use crate::models::{Actor, PageMeta, PageRequest, Paginated, Task, TaskFilter, TaskPredicate};
use crate::store::TaskStore;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct GetAllTasksHandler {
    store: Arc<dyn TaskStore>,
    pagination: PaginationConfig,
}

impl GetAllTasksHandler {
    pub fn new(store: Arc<dyn TaskStore>, pagination: PaginationConfig) -> Self {
        Self { store, pagination }
    }

    pub async fn handle(&self, filter: &TaskFilter, actor: &Actor) -> PipelineResult<Paginated<Task>> {
        let predicate = TaskPredicate {
            owner: (!actor.is_elevated()).then_some(actor.id),
            status: filter.status,
            priority: filter.priority,
        };
        let page = PageRequest::resolve(filter.page, filter.limit, &self.pagination);

        let (data, total) = self
            .store
            .query_filtered(&predicate, page.skip(), page.take())
            .await?;

        debug!(
            user_id = %actor.id,
            scoped = predicate.owner.is_some(),
            total,
            page = page.page,
            limit = page.limit,
            "Task listing resolved"
        );
        Ok(Paginated {
            data,
            meta: PageMeta::new(total, page),
        })
    }
}
