//! Error types for ranloc

use thiserror::Error;

/// Error types for the ranloc workspace.
///
/// Per-measurement failures (malformed lines, inversion or solver fallbacks)
/// are handled inline by the pipeline and never surface here; this taxonomy
/// covers the failures that abort startup or the run.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Ingestion channel errors (socket bind/accept). Fatal at startup.
    #[error("Channel error: {0}")]
    Channel(String),

    /// Trajectory sink I/O errors. Fatal.
    #[error("Sink I/O error: {0}")]
    SinkIo(#[from] std::io::Error),

    /// Category mapper file errors.
    #[error("Category mapper error: {0}")]
    CategoryMapper(String),

    /// YAML parsing errors.
    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),
}
