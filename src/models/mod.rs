//! # Models
//!
//! Domain value types shared by the store, handlers and worker.

pub mod actor;
pub mod pagination;
pub mod stats;
pub mod task;

pub use actor::{Actor, Role};
pub use pagination::{PageMeta, PageRequest, Paginated, TaskFilter, TaskPredicate};
pub use stats::{StatusPriorityCount, TaskStats};
pub use task::{NewTask, StatusChange, Task, TaskChanges, TaskPriority, TaskStatus};
