//! # Overdue Scanner
//!
//! On every interval (hourly by default) runs the overdue query and enqueues one
//! `overdue-tasks-notification` job per result. Tasks that stay pending and
//! overdue are notified again on every scan.

use super::{FirstTick, ServiceLoop};
use crate::config::ScannerConfig;
use crate::error::PipelineResult;
use crate::logging::log_error;
use crate::messaging::JobQueue;
use crate::queries::QueryBus;
use crate::worker::TaskJob;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    pub found: usize,
    pub enqueued: usize,
    pub failed: usize,
}

#[derive(Debug)]
pub struct OverdueScanner {
    queries: QueryBus,
    queue: Arc<dyn JobQueue>,
    interval: Duration,
    service: ServiceLoop,
}

impl OverdueScanner {
    pub fn new(queries: QueryBus, queue: Arc<dyn JobQueue>, config: &ScannerConfig) -> Self {
        Self {
            queries,
            queue,
            interval: Duration::from_secs(config.interval_seconds),
            service: ServiceLoop::new("overdue_scanner"),
        }
    }

    #[instrument(skip(self))]
    pub async fn scan_once(&self) -> PipelineResult<ScanReport> {
        let overdue = self.queries.get_overdue().await?;
        let mut report = ScanReport {
            found: overdue.len(),
            ..ScanReport::default()
        };

        for task in &overdue {
            let request = TaskJob::overdue_notification(task.id).to_request();
            match self.queue.enqueue(&request).await {
                Ok(_) => report.enqueued += 1,
                Err(e) => {
                    warn!(task_id = %task.id, error = %e, "Failed to enqueue overdue notification");
                    report.failed += 1;
                }
            }
        }

        info!(
            found = report.found,
            enqueued = report.enqueued,
            failed = report.failed,
            "Overdue scan complete"
        );
        Ok(report)
    }

    pub fn start(self: &Arc<Self>) -> PipelineResult<()> {
        let scanner = Arc::clone(self);
        self.service
            .start(self.interval, FirstTick::AfterPeriod, move || {
                let scanner = Arc::clone(&scanner);
                async move {
                    if let Err(e) = scanner.scan_once().await {
                        log_error("overdue_scanner", "scan", &e.to_string(), None);
                    }
                }
            })
    }

    pub async fn stop(&self) {
        self.service.stop().await;
    }

    pub fn is_running(&self) -> bool {
        self.service.is_running()
    }
}
