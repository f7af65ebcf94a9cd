//! jx - run container job executions from a run file.
//!
//! Usage:
//!   jx run <FILE>        Seed the jobs of a run file and run them to completion
//!   jx validate <FILE>   Validate a run file without running it

use clap::{Parser, Subcommand};
use jobexec::{
    ChannelHost, GraphStatusTracker, InMemoryExecutionStorage, JobExecutionKind,
    JobExecutionRequest, JobExecutionScheduler, JobExecutionStatusUpdateHandler, JobState,
    RunFile, StatusUpdateEvent, StorageError, StorageTransaction, YamlLoader,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

/// jx - A minimal container job execution scheduler
#[derive(Parser)]
#[command(name = "jx")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every job declared in a run file
    Run {
        /// Path to the run file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Override the workload tick interval in milliseconds
        #[arg(long)]
        tick_interval_ms: Option<u64>,
    },

    /// Validate a run file without running it
    Validate {
        /// Path to the run file
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

/// Status handler that logs every job transition.
struct LoggingHandler;

impl JobExecutionStatusUpdateHandler for LoggingHandler {
    fn handle(
        &self,
        _tx: &mut dyn StorageTransaction,
        events: &[StatusUpdateEvent],
    ) -> Result<(), StorageError> {
        for event in events {
            match &event.new_state {
                JobState::Running => info!("Job {} running", event.job_id()),
                JobState::Finished { exit_code } => {
                    info!("Job {} finished (exit: {})", event.job_id(), exit_code)
                }
                JobState::Failed { reason } => {
                    error!("Job {} failed: {}", event.job_id(), reason)
                }
            }
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            file,
            tick_interval_ms,
        } => {
            let exit_code = run(file, tick_interval_ms).await?;
            if exit_code != 0 {
                std::process::exit(exit_code);
            }
        }
        Commands::Validate { file } => {
            validate(file)?;
        }
    }

    Ok(())
}

/// Number of graphs that can complete: every job in them is a container.
fn completable_graphs(run: &RunFile) -> usize {
    let mut graphs: HashMap<&str, bool> = HashMap::new();
    for job in &run.jobs {
        let runnable = matches!(job.kind, JobExecutionKind::Container(_));
        *graphs.entry(job.graph.as_str()).or_insert(true) &= runnable;
    }
    graphs.values().filter(|runnable| **runnable).count()
}

/// Run every job of a run file and wait for the host signal.
async fn run(
    file: PathBuf,
    tick_interval_ms: Option<u64>,
) -> Result<i32, Box<dyn std::error::Error>> {
    info!("Loading run file: {}", file.display());

    let mut run = YamlLoader::load_run_file(&file)?;
    if let Some(ms) = tick_interval_ms {
        run.scheduler.tick_interval_ms = ms;
        run.scheduler.validate()?;
    }

    // Seed storage
    let storage = InMemoryExecutionStorage::new();
    for job in &run.jobs {
        storage.save_job_execution(job.to_entity()).await?;
    }

    let (host, mut signals) = ChannelHost::new();
    let scheduler = JobExecutionScheduler::new(storage)
        .with_config(&run.scheduler)
        .with_host(Arc::new(host));

    let tracker =
        GraphStatusTracker::new(scheduler.observer()).with_forward(Arc::new(LoggingHandler));
    scheduler.subscribe(Arc::new(tracker));

    let requests: Vec<JobExecutionRequest> = run
        .jobs
        .iter()
        .map(|job| {
            let image = match &job.kind {
                JobExecutionKind::Container(meta) => meta.image.clone(),
                JobExecutionKind::External { provider } => provider.clone(),
            };
            JobExecutionRequest::new(job.id, image)
        })
        .collect();

    info!(
        "Starting {} job(s) (tick interval: {}ms, ticks: {})",
        requests.len(),
        run.scheduler.tick_interval_ms,
        run.scheduler.ticks_to_complete
    );
    scheduler.schedule_execution(requests);

    let expected = completable_graphs(&run);
    if expected == 0 {
        warn!("No graph can complete on its own");
    }
    info!("Press Ctrl+C to stop");

    let mut exit_code = 0;
    let mut completed = 0;
    while completed < expected {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("\nShutting down...");
                break;
            }
            signal = signals.recv() => {
                match signal {
                    Some(code) => {
                        completed += 1;
                        exit_code = code;
                        info!("Graph completed ({}/{})", completed, expected);
                    }
                    None => break,
                }
            }
        }
    }
    if expected == 0 {
        tokio::signal::ctrl_c().await?;
        info!("\nShutting down...");
    }

    let remaining = scheduler.shutdown().await;
    if remaining > 0 {
        warn!("{} task(s) did not finish before shutdown", remaining);
    }

    info!("Goodbye!");
    Ok(exit_code)
}

/// Validate a run file without running it.
fn validate(file: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    info!("Validating run file: {}", file.display());

    match YamlLoader::load_run_file(&file) {
        Ok(run) => {
            info!("All {} job(s) are valid:", run.jobs.len());
            for job in &run.jobs {
                match &job.kind {
                    JobExecutionKind::Container(meta) => {
                        info!("  - {} [{}]: container '{}'", job.id, job.graph, meta.image)
                    }
                    JobExecutionKind::External { provider } => {
                        info!(
                            "  - {} [{}]: external '{}' (not runnable)",
                            job.id, job.graph, provider
                        )
                    }
                }
            }
            Ok(())
        }
        Err(e) => {
            error!("Validation failed: {}", e);
            Err(e.into())
        }
    }
}
