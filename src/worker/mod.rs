//! # Worker
//!
//! Consumer-side logic for the task job topic: the payload schema, the processor
//! that dispatches jobs back into the command bus, and the notification seam.

pub mod job;
pub mod notifier;
pub mod task_processor;

pub use job::{JobResult, MalformedPayload, TaskJob};
pub use notifier::{LogNotifier, Notifier};
pub use task_processor::TaskProcessor;
