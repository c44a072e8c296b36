//! In-process task store.
//!
//! A transaction takes the table lock for its whole lifetime and works on a copy of
//! the state; commit swaps the copy in. Writes are therefore fully serialized, which
//! matches the isolation the handlers expect from Postgres for conflicting rows.
//!
//! Relayed outbox entries are removed, so the state copied per transaction only
//! carries jobs still waiting for the relay. [`InMemoryTaskStore::with_outbox_history`]
//! additionally records every committed entry for inspection.
//!
//! Fault injection hooks let tests make individual row writes fail or take the
//! whole store offline.

use super::{validate_savepoint_name, OutboxEntry, TaskStore, TaskTransaction};
use crate::error::{PipelineError, PipelineResult};
use crate::messaging::JobRequest;
use crate::models::{StatusPriorityCount, Task, TaskPredicate};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashSet;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
struct MemoryState {
    tasks: HashMap<Uuid, Task>,
    outbox: BTreeMap<i64, OutboxEntry>,
    next_outbox_id: i64,
}

type OutboxHistory = Arc<parking_lot::Mutex<Vec<OutboxEntry>>>;

#[derive(Debug, Default)]
struct FaultInjection {
    failing_writes: DashSet<Uuid>,
    unavailable: AtomicBool,
}

impl FaultInjection {
    fn check_available(&self) -> PipelineResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(PipelineError::Database("task store unavailable".to_string()));
        }
        Ok(())
    }

    fn check_write(&self, id: Uuid) -> PipelineResult<()> {
        self.check_available()?;
        if self.failing_writes.contains(&id) {
            return Err(PipelineError::Database(format!(
                "injected write failure for task {id}"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryTaskStore {
    state: Arc<Mutex<MemoryState>>,
    faults: Arc<FaultInjection>,
    history: Option<OutboxHistory>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that also keeps every committed outbox entry, relayed or not
    pub fn with_outbox_history() -> Self {
        Self {
            history: Some(OutboxHistory::default()),
            ..Self::default()
        }
    }

    /// Make every subsequent write (update/delete) to `id` fail with a database error
    pub fn inject_write_failure(&self, id: Uuid) {
        self.faults.failing_writes.insert(id);
    }

    pub fn clear_write_failure(&self, id: Uuid) {
        self.faults.failing_writes.remove(&id);
    }

    /// Simulate an outage: every operation fails with a database error while set
    pub fn set_unavailable(&self, unavailable: bool) {
        self.faults.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.tasks.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Committed outbox entries in staging order. With history enabled this
    /// includes relayed entries; otherwise only those still pending.
    pub async fn outbox_entries(&self) -> Vec<OutboxEntry> {
        match &self.history {
            Some(history) => history.lock().clone(),
            None => self.state.lock().await.outbox.values().cloned().collect(),
        }
    }
}

fn sorted_by_creation(mut tasks: Vec<Task>) -> Vec<Task> {
    tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
    tasks
}

fn collect_ids(tasks: &HashMap<Uuid, Task>, ids: &[Uuid]) -> Vec<Task> {
    let mut seen = std::collections::HashSet::new();
    ids.iter()
        .filter(|id| seen.insert(**id))
        .filter_map(|id| tasks.get(id).cloned())
        .collect()
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn begin(&self) -> PipelineResult<Box<dyn TaskTransaction>> {
        self.faults.check_available()?;
        let guard = Arc::clone(&self.state).lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(InMemoryTransaction {
            guard,
            working,
            savepoints: Vec::new(),
            faults: Arc::clone(&self.faults),
            history: self.history.clone(),
        }))
    }

    async fn find_by_id(&self, id: Uuid) -> PipelineResult<Option<Task>> {
        self.faults.check_available()?;
        Ok(self.state.lock().await.tasks.get(&id).cloned())
    }

    async fn find_by_ids(&self, ids: &[Uuid]) -> PipelineResult<Vec<Task>> {
        self.faults.check_available()?;
        Ok(collect_ids(&self.state.lock().await.tasks, ids))
    }

    async fn delete(&self, id: Uuid) -> PipelineResult<u64> {
        self.faults.check_write(id)?;
        let removed = self.state.lock().await.tasks.remove(&id);
        Ok(u64::from(removed.is_some()))
    }

    async fn query_filtered(
        &self,
        predicate: &TaskPredicate,
        skip: u64,
        take: u64,
    ) -> PipelineResult<(Vec<Task>, u64)> {
        self.faults.check_available()?;
        let state = self.state.lock().await;
        let matching = sorted_by_creation(
            state
                .tasks
                .values()
                .filter(|task| predicate.matches(task))
                .cloned()
                .collect(),
        );
        let total = matching.len() as u64;
        let page = matching
            .into_iter()
            .skip(usize::try_from(skip).unwrap_or(usize::MAX))
            .take(usize::try_from(take).unwrap_or(usize::MAX))
            .collect();
        Ok((page, total))
    }

    async fn find_overdue(&self, now: DateTime<Utc>) -> PipelineResult<Vec<Task>> {
        self.faults.check_available()?;
        let state = self.state.lock().await;
        let mut overdue: Vec<Task> = state
            .tasks
            .values()
            .filter(|task| task.is_overdue(now))
            .cloned()
            .collect();
        overdue.sort_by(|a, b| a.due_date.cmp(&b.due_date).then(a.id.cmp(&b.id)));
        Ok(overdue)
    }

    async fn aggregate_counts(&self) -> PipelineResult<Vec<StatusPriorityCount>> {
        self.faults.check_available()?;
        let state = self.state.lock().await;
        let mut groups: BTreeMap<_, u64> = BTreeMap::new();
        for task in state.tasks.values() {
            *groups.entry((task.status, task.priority)).or_insert(0) += 1;
        }
        Ok(groups
            .into_iter()
            .map(|((status, priority), count)| StatusPriorityCount {
                status,
                priority,
                count,
            })
            .collect())
    }

    async fn pending_outbox(&self, limit: usize) -> PipelineResult<Vec<OutboxEntry>> {
        self.faults.check_available()?;
        let state = self.state.lock().await;
        Ok(state
            .outbox
            .values()
            .take(limit)
            .cloned()
            .collect())
    }

    async fn remove_relayed_outbox(&self, ids: &[i64]) -> PipelineResult<()> {
        self.faults.check_available()?;
        let mut state = self.state.lock().await;
        for id in ids {
            state.outbox.remove(id);
        }
        Ok(())
    }
}

struct InMemoryTransaction {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
    savepoints: Vec<(String, MemoryState)>,
    faults: Arc<FaultInjection>,
    history: Option<OutboxHistory>,
}

#[async_trait]
impl TaskTransaction for InMemoryTransaction {
    async fn insert(&mut self, task: &Task) -> PipelineResult<Task> {
        self.faults.check_available()?;
        if self.working.tasks.contains_key(&task.id) {
            return Err(PipelineError::Conflict(format!(
                "Task with ID {} already exists",
                task.id
            )));
        }
        self.working.tasks.insert(task.id, task.clone());
        Ok(task.clone())
    }

    async fn find_by_id(&mut self, id: Uuid) -> PipelineResult<Option<Task>> {
        self.faults.check_available()?;
        Ok(self.working.tasks.get(&id).cloned())
    }

    async fn find_by_ids(&mut self, ids: &[Uuid]) -> PipelineResult<Vec<Task>> {
        self.faults.check_available()?;
        Ok(collect_ids(&self.working.tasks, ids))
    }

    async fn update(&mut self, task: &Task) -> PipelineResult<u64> {
        self.faults.check_write(task.id)?;
        match self.working.tasks.get_mut(&task.id) {
            Some(existing) => {
                let owner = existing.user_id;
                *existing = Task {
                    user_id: owner,
                    ..task.clone()
                };
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn delete(&mut self, id: Uuid) -> PipelineResult<u64> {
        self.faults.check_write(id)?;
        Ok(u64::from(self.working.tasks.remove(&id).is_some()))
    }

    async fn stage_job(&mut self, job: &JobRequest) -> PipelineResult<i64> {
        self.faults.check_available()?;
        self.working.next_outbox_id += 1;
        let id = self.working.next_outbox_id;
        self.working.outbox.insert(
            id,
            OutboxEntry {
                id,
                job: job.clone(),
                created_at: Utc::now(),
            },
        );
        Ok(id)
    }

    async fn savepoint(&mut self, name: &str) -> PipelineResult<()> {
        validate_savepoint_name(name)?;
        self.savepoints
            .push((name.to_string(), self.working.clone()));
        Ok(())
    }

    async fn rollback_to_savepoint(&mut self, name: &str) -> PipelineResult<()> {
        let position = self.savepoint_position(name)?;
        // the savepoint itself survives a rollback to it
        self.savepoints.truncate(position + 1);
        self.working = self.savepoints[position].1.clone();
        Ok(())
    }

    async fn release_savepoint(&mut self, name: &str) -> PipelineResult<()> {
        let position = self.savepoint_position(name)?;
        self.savepoints.truncate(position);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> PipelineResult<()> {
        self.faults.check_available()?;
        let InMemoryTransaction {
            mut guard,
            working,
            history,
            ..
        } = *self;
        if let Some(history) = history {
            let first_new = guard.next_outbox_id;
            history.lock().extend(
                working
                    .outbox
                    .range(first_new + 1..)
                    .map(|(_, entry)| entry.clone()),
            );
        }
        *guard = working;
        debug!("In-memory transaction committed");
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> PipelineResult<()> {
        debug!("In-memory transaction rolled back");
        Ok(())
    }
}

impl InMemoryTransaction {
    fn savepoint_position(&self, name: &str) -> PipelineResult<usize> {
        self.savepoints
            .iter()
            .rposition(|(existing, _)| existing == name)
            .ok_or_else(|| PipelineError::Internal(format!("Unknown savepoint: {name}")))
    }
}
