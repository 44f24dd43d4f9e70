//! Common types and utilities for ranloc
//!
//! This crate provides the shared domain types, configuration structures,
//! error taxonomy, and logging setup used across the ranloc workspace.

pub mod config;
pub mod error;
pub mod logging;
pub mod types;

pub use config::{
    EngineConfig, EstimatorConfig, EstimatorKind, IngestConfig, MotionConfig, RadioConfig,
    SinkConfig, SolverConfig, TimestampConfig, TimestampStrategy, WindowConfig,
};
pub use error::Error;
pub use logging::{init_logging, init_logging_with_filter, LogLevel};
pub use types::*;
