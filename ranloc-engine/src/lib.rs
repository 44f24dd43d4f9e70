//! ranloc-engine - Real-Time Localization Engine Library
#![allow(missing_docs)]
//!
//! This crate provides the runtime for the ranloc localization system.
//! It turns a live stream of radio-quality reports into per-entity
//! position trajectories:
//!
//! - Unix-socket ingestion of newline-framed measurement reports
//! - A bounded drop-oldest queue decoupling ingestion from tracking
//! - Wire decoding for both report variants
//! - Position estimation through the `ranloc-position` estimators
//! - Motion-bounded trajectory output to a CSV sink
//!
//! # Architecture
//!
//! The engine uses an actor-based task model where each component runs as
//! an independent async task communicating via typed message channels.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                         Engine                             │
//! │   ┌────────────┐    bounded     ┌─────────────┐            │
//! │   │   Ingest   │────queue──────▶│   Tracker   │            │
//! │   │    Task    │                │    Task     │            │
//! │   └─────┬──────┘                └──────┬──────┘            │
//! └─────────┼──────────────────────────────┼───────────────────┘
//!           │                              │
//!      Unix socket                   trajectory CSV
//! ```
//!
//! # Task Lifecycle
//!
//! Tasks are managed by `TaskManager` which handles:
//! - Task spawning and state tracking
//! - Graceful shutdown coordination
//! - Join-handle collection with a bounded timeout
//!
//! # Configuration Loading
//!
//! The `config_loader` module provides loading and validation:
//!
//! ```rust,ignore
//! use ranloc_engine::config_loader::load_and_validate_engine_config;
//!
//! let config = load_and_validate_engine_config("config/ranloc.yaml")?;
//! ```

pub mod config_loader;
pub mod ingest;
pub mod sink;
pub mod tasks;
pub mod tracker;

// Re-export configuration loading
pub use config_loader::{
    load_and_validate_engine_config, load_engine_config, load_engine_config_from_str,
    validate_engine_config, ConfigError, ConfigValidationError,
};

// Re-export ingestion types
pub use ingest::{IngestQueue, IngestTask, QueueStats};

// Re-export tracking and output types
pub use sink::{TrajectorySink, SINK_HEADER};
pub use tracker::TrackerTask;

// Re-export commonly used task types
pub use tasks::{
    EngineTaskBase, IngestMessage, IngestStats, Task, TaskHandle, TaskMessage, TrackerMessage,
    TrackerStats, DEFAULT_CHANNEL_CAPACITY,
};

// Re-export lifecycle management types
pub use tasks::{
    TaskError, TaskId, TaskInfo, TaskManager, TaskState, DEFAULT_SHUTDOWN_TIMEOUT_MS,
};
