//! # Queries
//!
//! Read intents as [`TaskQuery`] values routed by [`QueryBus::execute`]. Queries
//! never write and never stage jobs.

pub mod get_all;
pub mod get_by_id;
pub mod get_overdue;
pub mod get_stats;

pub use get_all::GetAllTasksHandler;
pub use get_by_id::GetTaskByIdHandler;
pub use get_overdue::GetOverdueTasksHandler;
pub use get_stats::GetTaskStatsHandler;

use crate::config::PaginationConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::models::{Actor, Paginated, Task, TaskFilter, TaskStats};
use crate::store::TaskStore;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub enum TaskQuery {
    GetById { id: Uuid },
    GetAll { filter: TaskFilter, actor: Actor },
    GetOverdue,
    GetStats,
}

impl TaskQuery {
    pub fn name(&self) -> &'static str {
        match self {
            TaskQuery::GetById { .. } => "get_task_by_id",
            TaskQuery::GetAll { .. } => "get_all_tasks",
            TaskQuery::GetOverdue => "get_overdue_tasks",
            TaskQuery::GetStats => "get_task_stats",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    Task(Task),
    Page(Paginated<Task>),
    Tasks(Vec<Task>),
    Stats(TaskStats),
}

fn unexpected(expected: &str, outcome: &QueryOutcome) -> PipelineError {
    PipelineError::Internal(format!("Expected {expected} outcome, got {outcome:?}"))
}

#[derive(Debug, Clone)]
pub struct QueryBus {
    get_by_id: GetTaskByIdHandler,
    get_all: GetAllTasksHandler,
    get_overdue: GetOverdueTasksHandler,
    get_stats: GetTaskStatsHandler,
}

impl QueryBus {
    pub fn new(store: Arc<dyn TaskStore>, pagination: PaginationConfig) -> Self {
        Self {
            get_by_id: GetTaskByIdHandler::new(Arc::clone(&store)),
            get_all: GetAllTasksHandler::new(Arc::clone(&store), pagination),
            get_overdue: GetOverdueTasksHandler::new(Arc::clone(&store)),
            get_stats: GetTaskStatsHandler::new(store),
        }
    }

    #[instrument(skip(self, query), fields(query = query.name()))]
    pub async fn execute(&self, query: TaskQuery) -> PipelineResult<QueryOutcome> {
        let query_name = query.name();
        let started = Instant::now();

        let outcome = match query {
            TaskQuery::GetById { id } => self.get_by_id.handle(id).await.map(QueryOutcome::Task),
            TaskQuery::GetAll { filter, actor } => self
                .get_all
                .handle(&filter, &actor)
                .await
                .map(QueryOutcome::Page),
            TaskQuery::GetOverdue => self.get_overdue.handle().await.map(QueryOutcome::Tasks),
            TaskQuery::GetStats => self.get_stats.handle().await.map(QueryOutcome::Stats),
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &outcome {
            Ok(_) => debug!(query = query_name, elapsed_ms, "Query completed"),
            Err(e) => warn!(query = query_name, elapsed_ms, error = %e, "Query failed"),
        }
        outcome
    }

    pub async fn get_by_id(&self, id: Uuid) -> PipelineResult<Task> {
        match self.execute(TaskQuery::GetById { id }).await? {
            QueryOutcome::Task(task) => Ok(task),
            other => Err(unexpected("task", &other)),
        }
    }

    pub async fn get_all(&self, filter: TaskFilter, actor: Actor) -> PipelineResult<Paginated<Task>> {
        match self.execute(TaskQuery::GetAll { filter, actor }).await? {
            QueryOutcome::Page(page) => Ok(page),
            other => Err(unexpected("page", &other)),
        }
    }

    pub async fn get_overdue(&self) -> PipelineResult<Vec<Task>> {
        match self.execute(TaskQuery::GetOverdue).await? {
            QueryOutcome::Tasks(tasks) => Ok(tasks),
            other => Err(unexpected("task list", &other)),
        }
    }

    pub async fn get_stats(&self) -> PipelineResult<TaskStats> {
        match self.execute(TaskQuery::GetStats).await? {
            QueryOutcome::Stats(stats) => Ok(stats),
            other => Err(unexpected("stats", &other)),
        }
    }
}
