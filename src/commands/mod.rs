//! # Commands
//!
//! Every mutation is a [`TaskCommand`] value routed by [`CommandBus::execute`] to
//! exactly one handler. Handlers that need ownership data receive the acting user
//! explicitly inside the command.
//!
//! Follow-up jobs are never enqueued directly: handlers stage them in the store
//! transaction that performs the mutation, and the outbox relay delivers them
//! after commit.

pub mod batch;
pub mod create;
pub mod delete;
pub mod update;

pub use batch::{BatchAction, BatchOperation, BatchProcessHandler, BatchResult};
pub use create::CreateTaskHandler;
pub use delete::DeleteTaskHandler;
pub use update::UpdateTaskHandler;

use crate::error::{PipelineError, PipelineResult};
use crate::models::{Actor, NewTask, Task, TaskChanges, TaskStatus};
use crate::store::TaskStore;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub enum TaskCommand {
    Create {
        task: NewTask,
        actor: Actor,
    },
    Update {
        id: Uuid,
        changes: TaskChanges,
    },
    /// Status write from a consumed status-update job; stages nothing
    ApplyStatus {
        id: Uuid,
        status: TaskStatus,
    },
    Delete {
        id: Uuid,
    },
    BatchProcess {
        operations: Vec<BatchOperation>,
        /// Raw action name; parsed by the handler so an unknown value is a `BadRequest`
        action: String,
        actor: Actor,
    },
}

impl TaskCommand {
    pub fn name(&self) -> &'static str {
        match self {
            TaskCommand::Create { .. } => "create_task",
            TaskCommand::Update { .. } => "update_task",
            TaskCommand::ApplyStatus { .. } => "apply_task_status",
            TaskCommand::Delete { .. } => "delete_task",
            TaskCommand::BatchProcess { .. } => "batch_process",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    Created(Task),
    Updated(Task),
    Deleted(Uuid),
    Batch(BatchResult),
}

impl CommandOutcome {
    pub fn into_task(self) -> PipelineResult<Task> {
        match self {
            CommandOutcome::Created(task) | CommandOutcome::Updated(task) => Ok(task),
            other => Err(PipelineError::Internal(format!(
                "Expected a task outcome, got {other:?}"
            ))),
        }
    }

    pub fn into_batch(self) -> PipelineResult<BatchResult> {
        match self {
            CommandOutcome::Batch(result) => Ok(result),
            other => Err(PipelineError::Internal(format!(
                "Expected a batch outcome, got {other:?}"
            ))),
        }
    }
}

/// Routes commands to their handlers
#[derive(Debug, Clone)]
pub struct CommandBus {
    create: CreateTaskHandler,
    update: UpdateTaskHandler,
    delete: DeleteTaskHandler,
    batch: BatchProcessHandler,
}

impl CommandBus {
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self {
            create: CreateTaskHandler::new(Arc::clone(&store)),
            update: UpdateTaskHandler::new(Arc::clone(&store)),
            delete: DeleteTaskHandler::new(Arc::clone(&store)),
            batch: BatchProcessHandler::new(store),
        }
    }

    #[instrument(skip(self, command), fields(command = command.name()))]
    pub async fn execute(&self, command: TaskCommand) -> PipelineResult<CommandOutcome> {
        let command_name = command.name();
        let started = Instant::now();
        debug!("Dispatching command");

        let outcome = match command {
            TaskCommand::Create { task, actor } => self
                .create
                .handle(task, &actor)
                .await
                .map(CommandOutcome::Created),
            TaskCommand::Update { id, changes } => self
                .update
                .handle(id, changes)
                .await
                .map(CommandOutcome::Updated),
            TaskCommand::ApplyStatus { id, status } => self
                .update
                .apply_status(id, status)
                .await
                .map(CommandOutcome::Updated),
            TaskCommand::Delete { id } => self
                .delete
                .handle(id)
                .await
                .map(|()| CommandOutcome::Deleted(id)),
            TaskCommand::BatchProcess {
                operations,
                action,
                actor,
            } => self
                .batch
                .handle(operations, &action, &actor)
                .await
                .map(CommandOutcome::Batch),
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &outcome {
            Ok(_) => info!(command = command_name, elapsed_ms, "Command completed"),
            Err(e) => warn!(
                command = command_name,
                elapsed_ms,
                error_kind = e.kind(),
                error = %e,
                "Command failed"
            ),
        }
        outcome
    }

    pub async fn create(&self, task: NewTask, actor: Actor) -> PipelineResult<Task> {
        self.execute(TaskCommand::Create { task, actor })
            .await?
            .into_task()
    }

    pub async fn update(&self, id: Uuid, changes: TaskChanges) -> PipelineResult<Task> {
        self.execute(TaskCommand::Update { id, changes })
            .await?
            .into_task()
    }

    pub async fn apply_status(&self, id: Uuid, status: TaskStatus) -> PipelineResult<Task> {
        self.execute(TaskCommand::ApplyStatus { id, status })
            .await?
            .into_task()
    }

    pub async fn delete(&self, id: Uuid) -> PipelineResult<()> {
        self.execute(TaskCommand::Delete { id }).await.map(|_| ())
    }

    pub async fn batch_process(
        &self,
        operations: Vec<BatchOperation>,
        action: impl Into<String>,
        actor: Actor,
    ) -> PipelineResult<BatchResult> {
        self.execute(TaskCommand::BatchProcess {
            operations,
            action: action.into(),
            actor,
        })
        .await?
        .into_batch()
    }
}
