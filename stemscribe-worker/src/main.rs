//! stemscribe - audio-to-notation job runner
//!
//! Submits audio files to the pipeline and reports progress, or inspects jobs
//! recorded in the root folder's database.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use stemscribe_common::config::{default_config_path, RootFolderInitializer, RootFolderResolver};
use stemscribe_common::events::PipelineEvent;
use stemscribe_common::JobStatus;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use uuid::Uuid;

use stemscribe_worker::config::{WorkerConfig, MODULE_NAME};
use stemscribe_worker::{logging, Worker};

#[derive(Debug, Parser)]
#[command(name = "stemscribe", version, about = "Separate, transcribe and notate audio files")]
struct Cli {
    /// Root folder holding uploads, processed output and the job database
    #[arg(long, global = true)]
    root_folder: Option<PathBuf>,

    /// TOML configuration file
    #[arg(long, global = true, env = "STEMSCRIBE_CONFIG")]
    config: Option<PathBuf>,

    /// Jobs processed in parallel
    #[arg(long, global = true)]
    max_concurrent_jobs: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Submit audio files and wait for them to finish
    Process {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Print a job's status as JSON
    Status { job_id: Uuid },
    /// Print the archive path of a completed job
    Fetch { job_id: Uuid },
    /// Write the effective configuration to the config file
    InitConfig {
        /// Replace an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Must precede config loading
    let log_filter = logging::init();

    let config_path = cli
        .config
        .clone()
        .or_else(|| default_config_path(MODULE_NAME))
        .unwrap_or_else(|| PathBuf::from(format!("{}.toml", MODULE_NAME)));
    let mut config = WorkerConfig::load(&config_path)
        .with_context(|| format!("Failed to load config {}", config_path.display()))?;
    if let Some(n) = cli.max_concurrent_jobs {
        config.scheduler.max_concurrent_jobs = n;
        config.validate()?;
    }

    // RUST_LOG wins over the config file
    log_filter.apply_config_level(&config.logging.level);

    if let Command::InitConfig { force } = cli.command {
        if config_path.exists() && !force {
            anyhow::bail!(
                "{} already exists (use --force to replace it)",
                config_path.display()
            );
        }
        config.save(&config_path)?;
        println!("{}", config_path.display());
        return Ok(());
    }

    info!("stemscribe {}", env!("CARGO_PKG_VERSION"));

    let root_folder = RootFolderResolver::new()
        .with_cli_arg(cli.root_folder.clone())
        .with_toml_root(config.root_folder.clone())
        .resolve();
    let initializer = RootFolderInitializer::new(root_folder);
    initializer
        .ensure_directory_exists()
        .context("Failed to initialize root folder")?;
    info!(
        root = %initializer.root_folder().display(),
        database = %initializer.database_path().display(),
        "Root folder ready"
    );

    let worker = Worker::open(initializer.root_folder(), &initializer.database_path(), &config).await?;

    match cli.command {
        Command::Process { files } => process(&worker, files).await,
        Command::Status { job_id } => {
            let view = worker.status(job_id).await?;
            println!("{}", serde_json::to_string_pretty(&view)?);
            Ok(())
        }
        Command::Fetch { job_id } => {
            let path = worker.fetch(job_id).await?;
            println!("{}", path.display());
            Ok(())
        }
        Command::InitConfig { .. } => Ok(()),
    }
}

async fn process(worker: &Worker, files: Vec<PathBuf>) -> Result<()> {
    let mut events = worker.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(PipelineEvent::JobProgress {
                    job_id,
                    progress,
                    message,
                    ..
                }) => println!("[{}] {:>3}% {}", short_id(job_id), progress, message),
                Ok(PipelineEvent::StemFailed {
                    job_id,
                    stem,
                    stage,
                    error,
                    ..
                }) => println!("[{}] stem {} failed {}: {}", short_id(job_id), stem, stage, error),
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Progress display fell behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let mut submitted = Vec::new();
    let mut rejected = 0;
    for file in &files {
        match worker.submit_file(file).await {
            Ok(job_id) => {
                println!("[{}] submitted {} (job {})", short_id(job_id), file.display(), job_id);
                submitted.push((job_id, file));
            }
            Err(e) => {
                eprintln!("{}: {}", file.display(), e);
                rejected += 1;
            }
        }
    }

    worker.wait_idle().await;
    printer.abort();

    let mut failed = 0;
    for (job_id, file) in &submitted {
        let view = worker.status(*job_id).await?;
        match view.status {
            JobStatus::Completed => {
                let archive = worker.fetch(*job_id).await?;
                println!("{}: completed → {}", file.display(), archive.display());
            }
            _ => {
                failed += 1;
                println!(
                    "{}: {} ({})",
                    file.display(),
                    view.status,
                    view.error.unwrap_or_else(|| view.message.clone())
                );
            }
        }
    }

    if failed + rejected > 0 {
        anyhow::bail!("{} of {} files did not complete", failed + rejected, files.len());
    }
    Ok(())
}

fn short_id(id: Uuid) -> String {
    id.simple().to_string()[..8].to_string()
}
