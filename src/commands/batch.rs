//! # Batch Processing
//!
//! Applies one action to a set of tasks inside a single transaction.
//!
//! Pre-execution checks are all-or-nothing and raise:
//! 1. the action must be `update`, `delete` or `complete` (`BadRequest`)
//! 2. every referenced id must exist (`NotFound`)
//! 3. the actor must be elevated or own every referenced task (`Forbidden`)
//!
//! After that, each item runs inside its own savepoint. An item that fails is
//! rolled back alone and reported in `failed`; the rest of the batch carries on.

use crate::error::{PipelineError, PipelineResult};
use crate::logging::log_task_operation;
use crate::models::{Actor, Task, TaskChanges, TaskStatus};
use crate::store::{TaskStore, TaskTransaction};
use crate::worker::TaskJob;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchAction {
    Update,
    Delete,
    Complete,
}

impl BatchAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchAction::Update => "update",
            BatchAction::Delete => "delete",
            BatchAction::Complete => "complete",
        }
    }
}

impl fmt::Display for BatchAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BatchAction {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "update" => Ok(BatchAction::Update),
            "delete" => Ok(BatchAction::Delete),
            "complete" => Ok(BatchAction::Complete),
            other => Err(PipelineError::BadRequest(format!(
                "Unknown batch action: {other}"
            ))),
        }
    }
}

/// One task reference in a batch; `changes` is required for `update`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOperation {
    pub id: Uuid,
    #[serde(default)]
    pub changes: Option<TaskChanges>,
}

impl BatchOperation {
    pub fn id(id: Uuid) -> Self {
        Self { id, changes: None }
    }

    pub fn update(id: Uuid, changes: TaskChanges) -> Self {
        Self {
            id,
            changes: Some(changes),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResult {
    pub success: Vec<Uuid>,
    pub failed: Vec<Uuid>,
}

#[derive(Debug, Clone)]
pub struct BatchProcessHandler {
    store: Arc<dyn TaskStore>,
}

impl BatchProcessHandler {
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self { store }
    }

    pub async fn handle(
        &self,
        operations: Vec<BatchOperation>,
        action: &str,
        actor: &Actor,
    ) -> PipelineResult<BatchResult> {
        let action: BatchAction = action.trim().parse()?;
        let operations = collapse_duplicates(operations)?;
        validate_operations(&operations, action)?;

        let ids: Vec<Uuid> = operations.iter().map(|op| op.id).collect();

        let mut tx = self.store.begin().await?;
        let rows: HashMap<Uuid, Task> = tx
            .find_by_ids(&ids)
            .await?
            .into_iter()
            .map(|task| (task.id, task))
            .collect();

        let missing: Vec<String> = ids
            .iter()
            .filter(|id| !rows.contains_key(id))
            .map(Uuid::to_string)
            .collect();
        if !missing.is_empty() {
            return Err(PipelineError::NotFound(format!(
                "Tasks not found: {}",
                missing.join(", ")
            )));
        }

        if !actor.is_elevated() && rows.values().any(|task| !task.is_owned_by(actor.id)) {
            warn!(
                user_id = %actor.id,
                action = %action,
                "Batch rejected, actor does not own every referenced task"
            );
            return Err(PipelineError::Forbidden(
                "You can only modify your own tasks".to_string(),
            ));
        }

        let mut result = BatchResult::default();
        for (index, operation) in operations.iter().enumerate() {
            let savepoint = format!("batch_item_{index}");
            tx.savepoint(&savepoint).await?;

            let current = rows[&operation.id].clone();
            match apply_item(tx.as_mut(), action, operation, current).await {
                Ok(()) => {
                    tx.release_savepoint(&savepoint).await?;
                    result.success.push(operation.id);
                }
                Err(e) => {
                    tx.rollback_to_savepoint(&savepoint).await?;
                    tx.release_savepoint(&savepoint).await?;
                    warn!(
                        task_id = %operation.id,
                        action = %action,
                        error = %e,
                        "Batch item failed, continuing with remaining items"
                    );
                    result.failed.push(operation.id);
                }
            }
        }
        tx.commit().await?;

        info!(
            user_id = %actor.id,
            action = %action,
            succeeded = result.success.len(),
            failed = result.failed.len(),
            "Batch processed"
        );
        log_task_operation(
            "batch_process",
            None,
            Some(actor.id),
            action.as_str(),
            Some(&format!(
                "{} succeeded, {} failed",
                result.success.len(),
                result.failed.len()
            )),
        );
        Ok(result)
    }
}

/// Keep the first operation for each id, preserving request order
fn collapse_duplicates(operations: Vec<BatchOperation>) -> PipelineResult<Vec<BatchOperation>> {
    if operations.is_empty() {
        return Err(PipelineError::BadRequest(
            "Batch must reference at least one task".to_string(),
        ));
    }
    let mut seen = HashSet::new();
    Ok(operations
        .into_iter()
        .filter(|op| seen.insert(op.id))
        .collect())
}

fn validate_operations(operations: &[BatchOperation], action: BatchAction) -> PipelineResult<()> {
    if action != BatchAction::Update {
        return Ok(());
    }
    for operation in operations {
        match &operation.changes {
            Some(changes) if !changes.is_empty() => changes.validate()?,
            _ => {
                return Err(PipelineError::BadRequest(format!(
                    "Update for task {} carries no changes",
                    operation.id
                )))
            }
        }
    }
    Ok(())
}

async fn apply_item(
    tx: &mut dyn TaskTransaction,
    action: BatchAction,
    operation: &BatchOperation,
    mut task: Task,
) -> PipelineResult<()> {
    let changes = match action {
        BatchAction::Delete => {
            if tx.delete(task.id).await? == 0 {
                return Err(PipelineError::task_not_found(task.id));
            }
            return Ok(());
        }
        BatchAction::Complete => TaskChanges::status(TaskStatus::Completed),
        BatchAction::Update => operation.changes.clone().unwrap_or_default(),
    };

    let status_change = changes.apply(&mut task);
    if tx.update(&task).await? == 0 {
        return Err(PipelineError::task_not_found(task.id));
    }
    if let Some(change) = status_change {
        tx.stage_job(&TaskJob::status_update(task.id, change.to).to_request())
            .await?;
        debug!(task_id = %task.id, to = %change.to, "Batch item staged status-update job");
    }
    Ok(())
}
