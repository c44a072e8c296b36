//! # Task Store
//!
//! Durable storage for task rows and the job outbox.
//!
//! Handlers mutate through a [`TaskTransaction`] so that a row change and the
//! follow-up job it stages commit or roll back together. Plain reads go straight
//! through [`TaskStore`].
//!
//! Two implementations ship with the crate:
//! - [`PgTaskStore`]: PostgreSQL via `sqlx`
//! - [`InMemoryTaskStore`]: a single-process store used by tests and embedded runs

pub mod memory;
pub mod postgres;

pub use memory::InMemoryTaskStore;
pub use postgres::PgTaskStore;

use crate::error::PipelineResult;
use crate::messaging::JobRequest;
use crate::models::{StatusPriorityCount, Task, TaskPredicate};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt::Debug;
use uuid::Uuid;

/// A job staged alongside a task mutation, waiting for the relay to enqueue it
#[derive(Debug, Clone, PartialEq)]
pub struct OutboxEntry {
    pub id: i64,
    pub job: JobRequest,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait TaskStore: Send + Sync + Debug {
    /// Open a unit of work. Dropping the transaction without committing discards it.
    async fn begin(&self) -> PipelineResult<Box<dyn TaskTransaction>>;

    async fn find_by_id(&self, id: Uuid) -> PipelineResult<Option<Task>>;

    /// Rows for every id that exists; callers compare counts to detect missing ids
    async fn find_by_ids(&self, ids: &[Uuid]) -> PipelineResult<Vec<Task>>;

    /// Physically remove a row, returning the affected count
    async fn delete(&self, id: Uuid) -> PipelineResult<u64>;

    /// One page of matching tasks ordered by `created_at, id`, plus the total match count
    async fn query_filtered(
        &self,
        predicate: &TaskPredicate,
        skip: u64,
        take: u64,
    ) -> PipelineResult<(Vec<Task>, u64)>;

    /// Pending tasks whose due date is strictly before `now`
    async fn find_overdue(&self, now: DateTime<Utc>) -> PipelineResult<Vec<Task>>;

    /// Row counts grouped by (status, priority)
    async fn aggregate_counts(&self) -> PipelineResult<Vec<StatusPriorityCount>>;

    /// Outbox entries still waiting for the relay, in staging order
    async fn pending_outbox(&self, limit: usize) -> PipelineResult<Vec<OutboxEntry>>;

    /// Delete entries the relay has enqueued so the outbox only holds pending work
    async fn remove_relayed_outbox(&self, ids: &[i64]) -> PipelineResult<()>;
}

/// Writes scoped to one store transaction.
///
/// Savepoint names must be plain identifiers (`[A-Za-z_][A-Za-z0-9_]*`).
#[async_trait]
pub trait TaskTransaction: Send {
    /// Insert a new row. An existing id is a `Conflict`.
    async fn insert(&mut self, task: &Task) -> PipelineResult<Task>;

    /// Read a row and hold it for the rest of the transaction
    async fn find_by_id(&mut self, id: Uuid) -> PipelineResult<Option<Task>>;

    async fn find_by_ids(&mut self, ids: &[Uuid]) -> PipelineResult<Vec<Task>>;

    /// Write every mutable column of `task`, returning the affected count.
    /// The owning user is never rewritten.
    async fn update(&mut self, task: &Task) -> PipelineResult<u64>;

    async fn delete(&mut self, id: Uuid) -> PipelineResult<u64>;

    /// Record a follow-up job that becomes visible to the relay only on commit
    async fn stage_job(&mut self, job: &JobRequest) -> PipelineResult<i64>;

    async fn savepoint(&mut self, name: &str) -> PipelineResult<()>;

    async fn rollback_to_savepoint(&mut self, name: &str) -> PipelineResult<()>;

    async fn release_savepoint(&mut self, name: &str) -> PipelineResult<()>;

    async fn commit(self: Box<Self>) -> PipelineResult<()>;

    async fn rollback(self: Box<Self>) -> PipelineResult<()>;
}

pub(crate) fn validate_savepoint_name(name: &str) -> PipelineResult<()> {
    let mut chars = name.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(crate::error::PipelineError::Internal(format!(
            "Invalid savepoint name: {name}"
        )))
    }
}
