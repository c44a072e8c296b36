#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Task Pipeline
//!
//! Task mutation and propagation: command and query handlers over a transactional
//! task store, a job outbox relayed into a durable queue, a bounded worker that
//! consumes those jobs, and a periodic overdue scan that feeds it.
//!
//! ## Architecture
//!
//! ```text
//! caller ─▶ CommandBus ─▶ TaskStore tx ─┬─ task row
//!                                       └─ outbox entry ─▶ OutboxRelay ─▶ JobQueue
//!                                                                          │
//! OverdueScanner ─▶ QueryBus (overdue) ─▶ JobQueue ◀───────────────────────┘
//!                                           │
//!                     JobConsumer (concurrency + rate limit) ─▶ TaskProcessor ─▶ CommandBus
//! ```
//!
//! ## Module Organization
//!
//! - [`models`] - Task, status/priority enums, actor, pagination and stats values
//! - [`store`] - Task store traits with PostgreSQL and in-memory implementations
//! - [`messaging`] - Job queue contract, queue implementations and consumer runtime
//! - [`commands`] - Create, Update, Delete and BatchProcess handlers behind [`CommandBus`]
//! - [`queries`] - GetById, GetAll, GetOverdue and GetStats handlers behind [`QueryBus`]
//! - [`worker`] - Job payload schema and the [`TaskProcessor`] job handler
//! - [`scheduling`] - Overdue scanner and outbox relay background services
//! - [`system`] - [`TaskPipeline`] bootstrap
//! - [`config`] - Layered configuration
//! - [`error`] - Structured error handling
//! - [`logging`] - Structured logging setup
//!
//! ## Testing
//!
//! ```bash
//! cargo test                      # unit and integration tests, in-memory backends
//! cargo test -- --ignored         # PostgreSQL tests, requires DATABASE_URL
//! ```

pub mod commands;
pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod messaging;
pub mod models;
pub mod queries;
pub mod scheduling;
pub mod store;
pub mod system;
pub mod worker;

pub use commands::{BatchAction, BatchOperation, BatchResult, CommandBus, CommandOutcome, TaskCommand};
pub use config::PipelineConfig;
pub use error::{PipelineError, PipelineResult};
pub use messaging::{InMemoryJobQueue, Job, JobQueue, JobRequest, PgJobQueue};
pub use models::{Actor, NewTask, Role, Task, TaskChanges, TaskFilter, TaskPriority, TaskStats, TaskStatus};
pub use queries::{QueryBus, QueryOutcome, TaskQuery};
pub use store::{InMemoryTaskStore, PgTaskStore, TaskStore, TaskTransaction};
pub use system::TaskPipeline;
pub use worker::{JobResult, TaskJob, TaskProcessor};
