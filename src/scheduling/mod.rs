//! # Scheduling
//!
//! Periodic background services: the overdue scanner and the outbox relay. Both
//! run their cycle on a tokio interval inside a [`ServiceLoop`] that can be
//! stopped cleanly between cycles.

pub mod outbox_relay;
pub mod overdue_scanner;

pub use outbox_relay::OutboxRelay;
pub use overdue_scanner::{OverdueScanner, ScanReport};

use crate::error::{PipelineError, PipelineResult};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{error, info};

/// When the first cycle runs after `start`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirstTick {
    Immediate,
    AfterPeriod,
}

#[derive(Debug)]
pub struct ServiceLoop {
    name: &'static str,
    shutdown: Arc<Notify>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ServiceLoop {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            shutdown: Arc::new(Notify::new()),
            handle: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.lock().is_some()
    }

    pub fn start<F, Fut>(&self, period: Duration, first_tick: FirstTick, cycle: F) -> PipelineResult<()>
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut handle = self.handle.lock();
        if handle.is_some() {
            return Err(PipelineError::Internal(format!(
                "{} is already running",
                self.name
            )));
        }

        let name = self.name;
        let shutdown = Arc::clone(&self.shutdown);
        info!(service = name, period_ms = period.as_millis() as u64, "🚀 Background service starting");

        *handle = Some(tokio::spawn(async move {
            let mut ticker = match first_tick {
                FirstTick::Immediate => tokio::time::interval(period),
                FirstTick::AfterPeriod => tokio::time::interval_at(Instant::now() + period, period),
            };
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.notified() => break,
                    _ = ticker.tick() => cycle().await,
                }
            }
            info!(service = name, "🛑 Background service stopped");
        }));
        Ok(())
    }

    /// Signal the loop and wait for the current cycle, if any, to finish
    pub async fn stop(&self) {
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            self.shutdown.notify_one();
            if let Err(e) = handle.await {
                error!(service = self.name, error = %e, "Background service terminated abnormally");
            }
        }
    }
}
