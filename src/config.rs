//! # Pipeline Configuration
//!
//! Layered configuration: built-in defaults, then an optional TOML file, then
//! environment variables prefixed with `TASK_PIPELINE` (sections separated by `__`).
//!
//! ```rust,no_run
//! use task_pipeline::config::PipelineConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // TASK_PIPELINE__WORKER__CONCURRENCY=20 overrides worker.concurrency
//! let config = PipelineConfig::load(None)?;
//! println!("worker concurrency: {}", config.worker.concurrency);
//! # Ok(())
//! # }
//! ```

use crate::constants::defaults;
use crate::error::{PipelineError, PipelineResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const ENV_PREFIX: &str = "TASK_PIPELINE";
pub const DEFAULT_CONFIG_FILE: &str = "config/task-pipeline";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub database: DatabaseConfig,
    pub queue: QueueConfig,
    pub worker: WorkerConfig,
    pub scanner: ScannerConfig,
    pub outbox: OutboxConfig,
    pub pagination: PaginationConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub run_migrations: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgresql://localhost/task_pipeline_development".to_string(),
            max_connections: defaults::DATABASE_MAX_CONNECTIONS,
            run_migrations: true,
        }
    }
}

/// Retry behaviour owned by the job queue
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct QueueConfig {
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    pub visibility_timeout_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_attempts: defaults::QUEUE_MAX_ATTEMPTS,
            backoff_base_ms: defaults::QUEUE_BACKOFF_BASE_MS,
            backoff_max_ms: defaults::QUEUE_BACKOFF_MAX_MS,
            visibility_timeout_ms: defaults::QUEUE_VISIBILITY_TIMEOUT_MS,
        }
    }
}

impl QueueConfig {
    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_millis(self.visibility_timeout_ms)
    }
}

/// Consumer-side bounds for the task processor
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub concurrency: usize,
    pub rate_limit_max: u32,
    pub rate_limit_window_ms: u64,
    pub poll_interval_ms: u64,
    pub batch_size: usize,
    pub handler_timeout_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: defaults::WORKER_CONCURRENCY,
            rate_limit_max: defaults::RATE_LIMIT_MAX,
            rate_limit_window_ms: defaults::RATE_LIMIT_WINDOW_MS,
            poll_interval_ms: defaults::WORKER_POLL_INTERVAL_MS,
            batch_size: defaults::WORKER_BATCH_SIZE,
            handler_timeout_ms: defaults::HANDLER_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ScannerConfig {
    pub enabled: bool,
    pub interval_seconds: u64,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_seconds: defaults::SCANNER_INTERVAL_SECONDS,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OutboxConfig {
    pub poll_interval_ms: u64,
    pub batch_size: usize,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: defaults::OUTBOX_POLL_INTERVAL_MS,
            batch_size: defaults::OUTBOX_BATCH_SIZE,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PaginationConfig {
    pub default_limit: u32,
    pub max_limit: u32,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_limit: defaults::PAGE_DEFAULT_LIMIT,
            max_limit: defaults::PAGE_MAX_LIMIT,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from defaults, an optional file and the environment.
    ///
    /// With `path = None` the loader looks for `config/task-pipeline.{toml,yaml,json}`
    /// and silently skips it when absent. An explicit path must exist.
    pub fn load(path: Option<&Path>) -> PipelineResult<Self> {
        let file_source = match path {
            Some(path) => ::config::File::from(path).required(true),
            None => ::config::File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let loaded: PipelineConfig = ::config::Config::builder()
            .add_source(file_source)
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        loaded.validate()?;
        Ok(loaded)
    }

    pub fn validate(&self) -> PipelineResult<()> {
        if self.worker.concurrency == 0 {
            return Err(PipelineError::Configuration(
                "worker.concurrency must be greater than zero".to_string(),
            ));
        }
        if self.worker.rate_limit_max == 0 || self.worker.rate_limit_window_ms == 0 {
            return Err(PipelineError::Configuration(
                "worker rate limit requires a non-zero max and window".to_string(),
            ));
        }
        if self.worker.batch_size == 0 {
            return Err(PipelineError::Configuration(
                "worker.batch_size must be greater than zero".to_string(),
            ));
        }
        // a job must be settled before its claim expires and another consumer picks it up
        if self.worker.handler_timeout_ms >= self.queue.visibility_timeout_ms {
            return Err(PipelineError::Configuration(format!(
                "worker.handler_timeout_ms ({}) must be less than queue.visibility_timeout_ms ({})",
                self.worker.handler_timeout_ms, self.queue.visibility_timeout_ms
            )));
        }
        if self.queue.max_attempts == 0 {
            return Err(PipelineError::Configuration(
                "queue.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.scanner.interval_seconds == 0 {
            return Err(PipelineError::Configuration(
                "scanner.interval_seconds must be greater than zero".to_string(),
            ));
        }
        if self.pagination.default_limit == 0
            || self.pagination.default_limit > self.pagination.max_limit
        {
            return Err(PipelineError::Configuration(format!(
                "pagination.default_limit ({}) must be within 1..={}",
                self.pagination.default_limit, self.pagination.max_limit
            )));
        }
        Ok(())
    }
}
