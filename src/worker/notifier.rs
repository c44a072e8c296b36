//! Delivery seam for overdue notifications.

use crate::error::PipelineResult;
use async_trait::async_trait;
use std::fmt::Debug;
use tracing::warn;
use uuid::Uuid;

#[async_trait]
pub trait Notifier: Send + Sync + Debug {
    async fn notify_overdue(&self, task_id: Uuid) -> PipelineResult<()>;
}

/// Default notifier: records the overdue task in the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify_overdue(&self, task_id: Uuid) -> PipelineResult<()> {
        warn!(task_id = %task_id, "⏰ Task is overdue");
        Ok(())
    }
}
