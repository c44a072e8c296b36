//! # Task Pipeline CLI
//!
//! Operator entry point: run the background services, or trigger a single scan,
//! relay pass or inspection against the configured PostgreSQL database.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use task_pipeline::config::PipelineConfig;
use task_pipeline::logging::init_structured_logging;
use task_pipeline::system::TaskPipeline;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "task-pipeline")]
#[command(about = "Task mutation and propagation pipeline")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Configuration file (default: config/task-pipeline.toml when present)
    #[arg(short, long, env = "TASK_PIPELINE_CONFIG")]
    config: Option<PathBuf>,

    /// Database URL, overriding the configuration file
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the outbox relay, job consumer and overdue scanner until Ctrl-C
    Run,
    /// Run one overdue scan and enqueue notifications
    Scan,
    /// Relay every pending outbox entry into the job queue
    Relay,
    /// List jobs that exhausted their retry budget
    DeadLetters {
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
    /// Print task counts and queue metrics as JSON
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_structured_logging();
    let cli = Cli::parse();

    let mut config =
        PipelineConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(url) = cli.database_url {
        config.database.url = url;
    }

    let pipeline = TaskPipeline::connect(config)
        .await
        .context("Failed to connect to the task store")?;

    match cli.command {
        Commands::Run => {
            pipeline.start()?;
            info!("Task pipeline running, press Ctrl-C to stop");
            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for Ctrl-C")?;
            info!("Shutdown requested");
            pipeline.shutdown().await;
        }
        Commands::Scan => {
            let report = pipeline.scanner().scan_once().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Relay => {
            let relayed = pipeline.relay().drain().await?;
            println!("Relayed {relayed} outbox entries");
        }
        Commands::DeadLetters { limit } => {
            let dead = pipeline.queue().dead_letters(limit).await?;
            println!("{}", serde_json::to_string_pretty(&dead)?);
        }
        Commands::Stats => {
            let stats = pipeline.queries().get_stats().await?;
            let queue = pipeline.queue().metrics().await?;
            let report = serde_json::json!({ "tasks": stats, "queue": queue });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(())
}
