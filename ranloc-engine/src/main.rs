//! ranloc real-time localization engine
//!
//! This is the main binary for the localization engine. It implements:
//! - CLI argument parsing
//! - Configuration loading and validation
//! - Task spawning and lifecycle management
//! - Graceful shutdown handling
//!
//! # Usage
//!
//! ```bash
//! ranloc -c config/ranloc.yaml
//! ```

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

use ranloc_common::{init_logging, EngineConfig, LogLevel};
use ranloc_engine::{
    load_and_validate_engine_config, IngestQueue, IngestTask, Task, TaskError, TaskId,
    TaskManager, TrackerTask, TrajectorySink, DEFAULT_CHANNEL_CAPACITY,
};

/// ranloc - Real-Time Localization Engine
#[derive(Parser, Debug)]
#[command(name = "ranloc")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the engine configuration file (YAML); defaults apply when
    /// omitted
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config_file: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    log_level: LogLevel,
}

/// Application state for the engine
struct EngineApp {
    /// Task manager for lifecycle management
    task_manager: TaskManager,
    /// Shutdown signal receiver
    shutdown_rx: watch::Receiver<bool>,
}

impl EngineApp {
    /// Creates the engine application and spawns its tasks.
    fn new(config: EngineConfig) -> Result<Self> {
        info!(
            "Engine configuration: {:?} estimator, {} anchors, socket {}",
            config.estimator.kind,
            config.anchors.len(),
            config.ingest.socket_path.display()
        );
        info!("Trajectory sink: {}", config.sink.path.display());

        let (mut task_manager, ingest_rx, tracker_rx) =
            TaskManager::new(config, DEFAULT_CHANNEL_CAPACITY);
        let task_base = task_manager.task_base();
        let shutdown_rx = task_manager.shutdown_receiver();

        // The line queue couples the two tasks; the socket and the sink
        // are acquired here so an unusable path fails startup instead of
        // the first report.
        let queue = Arc::new(IngestQueue::new(task_base.config.ingest.queue_capacity));
        let listener = IngestTask::bind(&task_base.config.ingest).with_context(|| {
            format!(
                "Failed to bind ingest socket at {}",
                task_base.config.ingest.socket_path.display()
            )
        })?;
        let sink = TrajectorySink::create(&task_base.config.sink).with_context(|| {
            format!(
                "Failed to create trajectory sink at {}",
                task_base.config.sink.path.display()
            )
        })?;

        let mut ingest_task = IngestTask::new(&task_base, Arc::clone(&queue), listener);
        let ingest_handle = tokio::spawn(async move {
            ingest_task.run(ingest_rx).await;
            Ok::<(), TaskError>(())
        });
        task_manager.register_task_handle(TaskId::Ingest, ingest_handle);
        task_manager.mark_task_started(TaskId::Ingest);
        info!("Ingest task spawned");

        let mut tracker_task =
            TrackerTask::new(&task_base, queue, sink).context("Failed to construct tracker")?;
        let tracker_handle = tokio::spawn(async move {
            tracker_task.run(tracker_rx).await;
            Ok::<(), TaskError>(())
        });
        task_manager.register_task_handle(TaskId::Tracker, tracker_handle);
        task_manager.mark_task_started(TaskId::Tracker);
        info!("Tracker task spawned");

        Ok(Self {
            task_manager,
            shutdown_rx,
        })
    }

    /// Runs the main event loop until shutdown
    async fn run(&mut self) -> Result<()> {
        info!("Engine started, waiting for shutdown signal...");

        // Wait for shutdown signal (Ctrl+C or SIGTERM)
        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("Received Ctrl+C, initiating shutdown...");
            }
            _ = async {
                loop {
                    if *self.shutdown_rx.borrow() {
                        break;
                    }
                    self.shutdown_rx.changed().await.ok();
                }
            } => {
                info!("Received shutdown signal from task manager");
            }
        }

        Ok(())
    }

    /// Performs graceful shutdown of all tasks
    async fn shutdown(mut self) -> Result<()> {
        info!("Initiating graceful shutdown...");

        match self.task_manager.shutdown().await {
            Ok(()) => {
                info!("All tasks shut down successfully");
                Ok(())
            }
            Err(e) => {
                warn!("Some tasks failed during shutdown: {}", e);
                // Still return Ok since we're shutting down anyway
                Ok(())
            }
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.log_level);

    println!("ranloc - Real-Time Localization Engine");
    println!("======================================");

    match run_engine(args).await {
        Ok(()) => {
            info!("Engine exited successfully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Engine failed: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Main engine execution logic
async fn run_engine(args: Args) -> Result<()> {
    let config = match &args.config_file {
        Some(path) => {
            info!("Loading configuration from: {}", path);
            load_and_validate_engine_config(path)
                .with_context(|| format!("Failed to load configuration from {path}"))?
        }
        None => {
            info!("No configuration file given, using defaults");
            EngineConfig::default()
        }
    };

    let mut app = EngineApp::new(config)?;
    app.run().await?;
    app.shutdown().await?;

    Ok(())
}
