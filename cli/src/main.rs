//! heightscan CLI: provision, inspect and run height scan tasks.
//!
//! # Commands
//! ```text
//! heightscan init-config [--path heightscan.toml] [--force]
//! heightscan add-task    --title <name> --from <height> --to <height> [--batch-size N] [--concurrency N]
//! heightscan status      [--title <name>] [--json]
//! heightscan run         [--title <name>]...
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;

use heightscan_core::{CancellationToken, CheckpointStore, ScanManager, ScanTask, ScanTaskBuilder};
use heightscan_storage::{HeightLogProvider, SqliteStorage};

mod config;
mod logging;

use config::ConfigFile;

#[derive(Parser)]
#[command(
    name = "heightscan",
    about = "Checkpointed block height scanner",
    long_about = "
heightscan walks block heights in fixed-size batches with a pool of workers.
A batch is committed only when every height in it succeeded and was flushed;
otherwise the batch is redone after a 5 second pause. Progress is stored per
task in SQLite, so interrupted scans resume where they stopped.

ENVIRONMENT VARIABLES:
  RUST_LOG    Overrides the [log] levels from the config file
",
    version
)]
struct Cli {
    /// Path to the config file
    #[arg(short, long, global = true, default_value = "heightscan.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write an example config file
    #[command(name = "init-config")]
    InitConfig {
        /// Where to write it (defaults to --config)
        #[arg(long)]
        path: Option<PathBuf>,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Provision a new scan task
    #[command(name = "add-task")]
    AddTask {
        /// Unique task title
        #[arg(long)]
        title: String,
        /// First height to scan (inclusive)
        #[arg(long)]
        from: u64,
        /// Height to stop at (exclusive)
        #[arg(long)]
        to: u64,
        /// Heights per batch (default: scanner.batch_size)
        #[arg(long)]
        batch_size: Option<u64>,
        /// Worker count (default: scanner.concurrency)
        #[arg(long)]
        concurrency: Option<u64>,
    },

    /// Show task progress
    Status {
        /// Only this task
        #[arg(long)]
        title: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Scan active tasks until they finish or Ctrl-C
    Run {
        /// Only these tasks (default: every active task)
        #[arg(long)]
        title: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dispatch(Cli::parse()).await
}

async fn dispatch(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::InitConfig { path, force } => {
            cmd_init_config(path.unwrap_or(cli.config), force)
        }
        Commands::AddTask {
            title,
            from,
            to,
            batch_size,
            concurrency,
        } => {
            let cfg = ConfigFile::load(&cli.config)?;
            let task = ScanTaskBuilder::new(title)
                .from_height(from)
                .to_height(to)
                .batch_size(batch_size.unwrap_or(cfg.scanner.batch_size))
                .concurrency(concurrency.unwrap_or(cfg.scanner.concurrency))
                .build()?;
            cmd_add_task(&cfg, task).await
        }
        Commands::Status { title, json } => {
            let cfg = ConfigFile::load(&cli.config)?;
            cmd_status(&cfg, title, json).await
        }
        Commands::Run { title } => {
            let cfg = ConfigFile::load(&cli.config)?;
            logging::init_tracing(&cfg.log);
            cmd_run(&cfg, title).await
        }
    }
}

fn cmd_init_config(path: PathBuf, force: bool) -> Result<()> {
    if path.exists() && !force {
        return Err(anyhow!(
            "{} already exists (use --force to overwrite)",
            path.display()
        ));
    }
    std::fs::write(&path, ConfigFile::example().to_toml()?)
        .with_context(|| format!("writing {}", path.display()))?;
    println!("Wrote {}", path.display());
    Ok(())
}

async fn open_storage(cfg: &ConfigFile) -> Result<Arc<SqliteStorage>> {
    let storage = SqliteStorage::open(&cfg.storage.path)
        .await
        .with_context(|| format!("opening {}", cfg.storage.path))?;
    Ok(Arc::new(storage))
}

async fn cmd_add_task(cfg: &ConfigFile, task: ScanTask) -> Result<()> {
    let storage = open_storage(cfg).await?;
    storage.insert_task(&task).await?;
    println!(
        "Added task '{}': heights {}..{} (batch {}, {} workers)",
        task.title, task.current_height, task.end_height, task.batch_size, task.concurrency
    );
    Ok(())
}

/// One row of `status` output.
#[derive(Serialize)]
struct TaskStatus {
    #[serde(flatten)]
    task: ScanTask,
    /// Last checkpoint write, RFC 3339.
    updated_at: Option<String>,
}

async fn cmd_status(cfg: &ConfigFile, title: Option<String>, json: bool) -> Result<()> {
    let storage = open_storage(cfg).await?;
    let tasks = match title {
        Some(title) => vec![storage
            .load_task(&title)
            .await?
            .ok_or_else(|| anyhow!("no task named '{title}'"))?],
        None => storage.all_tasks().await?,
    };

    let mut rows = Vec::with_capacity(tasks.len());
    for task in tasks {
        let updated_at = storage
            .updated_at(&task.title)
            .await?
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
            .map(|t| t.to_rfc3339());
        rows.push(TaskStatus { task, updated_at });
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    if rows.is_empty() {
        println!("No scan tasks. Add one with `heightscan add-task`.");
        return Ok(());
    }
    println!(
        "{:<24} {:>12} {:>12} {:>10} {:>8} {:>8}  {:<25}",
        "TITLE", "CURRENT", "END", "REMAINING", "BATCH", "WORKERS", "UPDATED"
    );
    for TaskStatus { task: t, updated_at } in &rows {
        let state = if t.is_active { "" } else { "  (done)" };
        println!(
            "{:<24} {:>12} {:>12} {:>10} {:>8} {:>8}  {:<25}{}",
            t.title,
            t.current_height,
            t.end_height,
            t.remaining(),
            t.batch_size,
            t.concurrency,
            updated_at.as_deref().unwrap_or("-"),
            state
        );
    }
    Ok(())
}

async fn cmd_run(cfg: &ConfigFile, titles: Vec<String>) -> Result<()> {
    let storage = open_storage(cfg).await?;

    let cancel = CancellationToken::new();
    let signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, stopping scanners");
            signal.cancel();
        }
    });

    let manager = ScanManager::new(
        storage.clone(),
        Arc::new(HeightLogProvider::new(storage.clone())),
    );

    let finished = if titles.is_empty() {
        manager.run_active(&cancel).await?
    } else {
        let mut tasks = Vec::with_capacity(titles.len());
        for title in &titles {
            let task = storage
                .load_task(title)
                .await?
                .ok_or_else(|| anyhow!("no task named '{title}'"))?;
            tasks.push(task);
        }
        manager.run(tasks, &cancel).await?
    };

    if finished.is_empty() {
        info!("No active scan tasks");
    }
    for task in &finished {
        info!(
            task = %task.title,
            height = task.current_height,
            end = task.end_height,
            complete = !task.is_active,
            "Scanner stopped"
        );
    }
    Ok(())
}
