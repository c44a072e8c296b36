//! # Constants
//!
//! Job type names and the design defaults the configuration falls back to.

/// Job type names carried on the queue
pub mod jobs {
    pub const TASK_STATUS_UPDATE: &str = "task-status-update";
    pub const OVERDUE_TASKS_NOTIFICATION: &str = "overdue-tasks-notification";
}

/// Design values used when configuration does not override them
pub mod defaults {
    pub const WORKER_CONCURRENCY: usize = 10;
    pub const RATE_LIMIT_MAX: u32 = 100;
    pub const RATE_LIMIT_WINDOW_MS: u64 = 1_000;
    pub const WORKER_POLL_INTERVAL_MS: u64 = 250;
    pub const WORKER_BATCH_SIZE: usize = 10;
    pub const HANDLER_TIMEOUT_MS: u64 = 25_000;

    pub const QUEUE_MAX_ATTEMPTS: u32 = 3;
    pub const QUEUE_BACKOFF_BASE_MS: u64 = 1_000;
    pub const QUEUE_BACKOFF_MAX_MS: u64 = 60_000;
    pub const QUEUE_VISIBILITY_TIMEOUT_MS: u64 = 30_000;

    pub const SCANNER_INTERVAL_SECONDS: u64 = 3_600;

    pub const OUTBOX_POLL_INTERVAL_MS: u64 = 500;
    pub const OUTBOX_BATCH_SIZE: usize = 100;

    pub const PAGE_DEFAULT_LIMIT: u32 = 10;
    pub const PAGE_MAX_LIMIT: u32 = 100;

    pub const DATABASE_MAX_CONNECTIONS: u32 = 10;
}
