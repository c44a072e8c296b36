//! # Error Types
//!
//! Typed errors raised by command/query handlers, the task store and the job queue.
//!
//! Callers see five classes: `NotFound`, `Forbidden`, `BadRequest`, `Conflict` and
//! `Internal`. Store and queue failures carry their own variants so logs keep the
//! origin, but they classify as internal (and retryable) for everything downstream.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Internal error: {0}")]
    Internal(String),
    #[error("Database error: {0}")]
    Database(String),
    #[error("Messaging error: {0}")]
    Messaging(String),
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl PipelineError {
    pub fn task_not_found(id: Uuid) -> Self {
        PipelineError::NotFound(format!("Task with ID {id} not found"))
    }

    /// Whether the failure may go away on its own (store or queue outage).
    ///
    /// Permanent failures (missing rows, ownership, malformed input, constraint
    /// collisions) will fail identically on every retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PipelineError::Internal(_) | PipelineError::Database(_) | PipelineError::Messaging(_)
        )
    }

    /// Stable label used in structured logs and job results
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::NotFound(_) => "not_found",
            PipelineError::Forbidden(_) => "forbidden",
            PipelineError::BadRequest(_) => "bad_request",
            PipelineError::Conflict(_) => "conflict",
            PipelineError::Internal(_) => "internal",
            PipelineError::Database(_) => "database",
            PipelineError::Messaging(_) => "messaging",
            PipelineError::Configuration(_) => "configuration",
        }
    }
}

impl From<sqlx::Error> for PipelineError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => PipelineError::NotFound(err.to_string()),
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                PipelineError::Conflict(db_err.message().to_string())
            }
            _ => PipelineError::Database(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for PipelineError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        PipelineError::Database(format!("Migration failed: {err}"))
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(error: serde_json::Error) -> Self {
        PipelineError::BadRequest(format!("JSON serialization error: {error}"))
    }
}

impl From<::config::ConfigError> for PipelineError {
    fn from(error: ::config::ConfigError) -> Self {
        PipelineError::Configuration(error.to_string())
    }
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
