//! Command-line front end for the pipeline.
//!
//! ```bash
//! # Defaults: every tier at localhost:8080/v1, pytest validator
//! task-pipeline "add two integers"
//!
//! # Several objectives run concurrently against one endpoint pool
//! task-pipeline --config pipeline.toml --registry-dir ./artifacts \
//!     "add two integers" "fix the off-by-one in range_sum"
//!
//! # Stream status events to stderr
//! RUST_LOG=task_pipeline=debug task-pipeline --events "write a slugify function"
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::Parser;
use coordination::registry::{DirectoryRegistry, SharedRegistry};
use task_pipeline::{Pipeline, PipelineConfig};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML configuration file (environment variables still override it)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Persist finished runs as JSON files in this directory
    #[arg(long)]
    registry_dir: Option<PathBuf>,

    /// Escalation budget per run (overrides config and PIPELINE_MAX_ATTEMPTS)
    #[arg(long)]
    max_attempts: Option<u32>,

    /// Print status events to stderr as JSON lines
    #[arg(long, default_value_t = false)]
    events: bool,

    /// Objectives to run
    #[arg(required = true)]
    objectives: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config =
        PipelineConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(max) = args.max_attempts {
        config.max_attempts = max;
        config.validate().context("Invalid --max-attempts")?;
    }

    let mut pipeline = Pipeline::from_config(config).context("Failed to build pipeline")?;
    if let Some(dir) = &args.registry_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create registry dir {}", dir.display()))?;
        let registry: SharedRegistry = Arc::new(DirectoryRegistry::new(dir));
        pipeline = pipeline.with_registry(registry);
    }

    if args.events {
        let mut rx = pipeline.events().subscribe();
        tokio::spawn(async move {
            while let Ok(event) = rx.recv().await {
                if let Ok(line) = serde_json::to_string(&event) {
                    eprintln!("{line}");
                }
            }
        });
    }

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupt received, cancelling runs");
                cancel.cancel();
            }
        });
    }

    info!(count = args.objectives.len(), "Starting runs");
    let mut runs = JoinSet::new();
    for objective in args.objectives {
        let pipeline = pipeline.clone();
        let cancel = cancel.child_token();
        runs.spawn(async move {
            let result = pipeline.run_pipeline_with_cancel(&objective, cancel).await;
            (objective, result)
        });
    }

    let mut failures = 0usize;
    while let Some(joined) = runs.join_next().await {
        let (objective, result) = joined.context("Run task panicked")?;
        match result {
            Ok(outcome) => {
                if !outcome.succeeded() {
                    failures += 1;
                }
                println!(
                    "{}",
                    serde_json::to_string_pretty(&outcome).context("Failed to encode outcome")?
                );
            }
            Err(e) => {
                failures += 1;
                error!(%objective, error = %e, retriable = e.is_retriable(), "Run failed");
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{failures} run(s) did not succeed");
    }
    Ok(())
}
