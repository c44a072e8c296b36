//! # Outbox Relay
//!
//! Moves staged jobs from the store's outbox into the job queue. Entries are
//! relayed in staging order; the first enqueue failure ends the cycle so the
//! same entry is retried first next time. An entry may be enqueued twice if
//! marking it relayed fails, so delivery is at-least-once.

use super::{FirstTick, ServiceLoop};
use crate::config::OutboxConfig;
use crate::error::PipelineResult;
use crate::logging::log_error;
use crate::messaging::JobQueue;
use crate::store::TaskStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug)]
pub struct OutboxRelay {
    store: Arc<dyn TaskStore>,
    queue: Arc<dyn JobQueue>,
    batch_size: usize,
    poll_interval: Duration,
    service: ServiceLoop,
}

impl OutboxRelay {
    pub fn new(store: Arc<dyn TaskStore>, queue: Arc<dyn JobQueue>, config: &OutboxConfig) -> Self {
        Self {
            store,
            queue,
            batch_size: config.batch_size.max(1),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            service: ServiceLoop::new("outbox_relay"),
        }
    }

    /// Relay one batch of pending entries, returning how many reached the queue
    pub async fn relay_once(&self) -> PipelineResult<usize> {
        let pending = self.store.pending_outbox(self.batch_size).await?;
        if pending.is_empty() {
            return Ok(0);
        }

        let mut relayed = Vec::with_capacity(pending.len());
        let mut enqueue_error = None;
        for entry in &pending {
            match self.queue.enqueue(&entry.job).await {
                Ok(job_id) => {
                    debug!(outbox_id = entry.id, job_id, job_name = %entry.job.job_name, "Outbox entry relayed");
                    relayed.push(entry.id);
                }
                Err(e) => {
                    warn!(
                        outbox_id = entry.id,
                        error = %e,
                        "Enqueue failed, stopping relay cycle"
                    );
                    enqueue_error = Some(e);
                    break;
                }
            }
        }

        if !relayed.is_empty() {
            self.store.remove_relayed_outbox(&relayed).await?;
        }

        match enqueue_error {
            Some(e) if relayed.is_empty() => Err(e),
            _ => Ok(relayed.len()),
        }
    }

    /// Relay until the outbox is empty or a cycle fails
    pub async fn drain(&self) -> PipelineResult<usize> {
        let mut total = 0;
        loop {
            let relayed = self.relay_once().await?;
            if relayed == 0 {
                return Ok(total);
            }
            total += relayed;
        }
    }

    pub fn start(self: &Arc<Self>) -> PipelineResult<()> {
        let relay = Arc::clone(self);
        self.service
            .start(self.poll_interval, FirstTick::Immediate, move || {
                let relay = Arc::clone(&relay);
                async move {
                    if let Err(e) = relay.drain().await {
                        log_error("outbox_relay", "relay", &e.to_string(), None);
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
