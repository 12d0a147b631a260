//! verify-resources - periodic verification batch job
//!
//! Verifies up to `--limit` due resources one at a time and prints a summary.
//! Exit status is 0 whenever the batch ran, including runs where individual
//! resources failed; only setup failures (configuration, database) exit
//! non-zero.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use rdq_common::config::{load_config, resolve_database_path};
use rdq_common::db::{init_database, open_database_read_only};
use rdq_verify::batch::{run_batch, BatchOptions};
use rdq_verify::checks::HttpBrowserLauncher;
use rdq_verify::{build_pipeline, init_tracing};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "verify-resources")]
#[command(about = "Re-verify resources that are due for a check")]
#[command(version)]
struct Args {
    /// Maximum resources to process (default: [verification] default_batch_limit)
    #[arg(long)]
    limit: Option<usize>,

    /// Run every check and decision but write nothing
    #[arg(long)]
    dry_run: bool,

    /// Path to TOML config file
    #[arg(short, long, env = "RDQ_CONFIG")]
    config: Option<PathBuf>,

    /// Path to SQLite database file
    #[arg(short, long)]
    database: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(args.config.as_deref()).context("Failed to load configuration")?;

    init_tracing(&config.logging.level);
    info!(
        "verify-resources v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    if args.limit == Some(0) {
        anyhow::bail!("--limit must be at least 1");
    }

    let db_path = resolve_database_path(args.database.as_deref(), &config);
    let pool = if args.dry_run {
        open_database_read_only(&db_path).await
    } else {
        init_database(&db_path).await
    }
    .with_context(|| format!("Failed to open database {}", db_path.display()))?;

    let pipeline = Arc::new(build_pipeline(
        pool.clone(),
        &config,
        Arc::new(HttpBrowserLauncher::new()),
    ));
    let options = BatchOptions {
        limit: args.limit.unwrap_or(config.verification.default_batch_limit),
        dry_run: args.dry_run,
    };

    let summary = run_batch(pipeline, options)
        .await
        .context("Failed to select resources due for verification")?;
    println!("{}", summary);

    pool.close().await;
    Ok(())
}
