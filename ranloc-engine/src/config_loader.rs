//! Configuration Loading for the Localization Engine
//!
//! This module provides configuration loading and validation for the
//! engine binary. It wraps the `EngineConfig` from `ranloc-common` with
//! additional validation and error handling specific to the runtime.
//!
//! # Example
//!
//! ```rust,ignore
//! use ranloc_engine::config_loader::load_and_validate_engine_config;
//!
//! let config = load_and_validate_engine_config("config/ranloc.yaml")?;
//! ```

use std::path::Path;

use ranloc_common::{EngineConfig, EstimatorKind, TimestampStrategy};
use thiserror::Error;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File I/O error
    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    /// YAML parsing error
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Configuration validation error
    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ConfigValidationError),
}

/// Errors that can occur during configuration validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigValidationError {
    /// Invalid ingestion settings
    #[error("Invalid ingest configuration: {0}")]
    InvalidIngestConfig(String),

    /// Invalid radio constants
    #[error("Invalid radio configuration: {0}")]
    InvalidRadioConfig(String),

    /// Invalid solver settings
    #[error("Invalid solver configuration: {0}")]
    InvalidSolverConfig(String),

    /// Invalid motion bound settings
    #[error("Invalid motion configuration: {0}")]
    InvalidMotionConfig(String),

    /// Invalid estimator settings
    #[error("Invalid estimator configuration: {0}")]
    InvalidEstimatorConfig(String),

    /// Invalid timestamp normalization settings
    #[error("Invalid timestamp configuration: {0}")]
    InvalidTimestampConfig(String),

    /// Invalid trajectory sink settings
    #[error("Invalid sink configuration: {0}")]
    InvalidSinkConfig(String),

    /// Two anchors share one id
    #[error("Duplicate anchor id: {0}")]
    DuplicateAnchor(i32),
}

/// Loads an engine configuration from a YAML file.
///
/// Reads and parses the file; every section is optional and falls back
/// to its default. For comprehensive validation, call
/// `validate_engine_config` after loading.
///
/// # Arguments
///
/// * `path` - Path to the YAML configuration file
///
/// # Returns
///
/// * `Ok(EngineConfig)` - Successfully loaded and parsed configuration
/// * `Err(ConfigError)` - Loading or parsing failed
pub fn load_engine_config<P: AsRef<Path>>(path: P) -> Result<EngineConfig, ConfigError> {
    let path = path.as_ref();

    let contents = std::fs::read_to_string(path)?;

    let config: EngineConfig =
        serde_yaml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

    Ok(config)
}

/// Loads an engine configuration from a YAML string.
pub fn load_engine_config_from_str(yaml: &str) -> Result<EngineConfig, ConfigError> {
    let config: EngineConfig =
        serde_yaml::from_str(yaml).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    Ok(config)
}

/// Validates an engine configuration.
///
/// # Validation Rules
///
/// - Socket path must be non-empty
/// - Queue capacity and read buffer size must be non-zero
/// - Carrier frequency must be positive
/// - Solver iteration limit must be non-zero, tolerance positive
/// - Motion speed bound and cadence must be positive
/// - Sequence-model lookback must be non-zero
/// - Burst-sequence tick period must be positive
/// - Sink path must be non-empty, flush interval non-zero
/// - Anchor ids must be unique
pub fn validate_engine_config(config: &EngineConfig) -> Result<(), ConfigValidationError> {
    if config.ingest.socket_path.as_os_str().is_empty() {
        return Err(ConfigValidationError::InvalidIngestConfig(
            "socket_path must not be empty".to_string(),
        ));
    }
    if config.ingest.queue_capacity == 0 {
        return Err(ConfigValidationError::InvalidIngestConfig(
            "queue_capacity must be non-zero".to_string(),
        ));
    }
    if config.ingest.read_buffer_size == 0 {
        return Err(ConfigValidationError::InvalidIngestConfig(
            "read_buffer_size must be non-zero".to_string(),
        ));
    }

    if config.radio.frequency_hz <= 0.0 {
        return Err(ConfigValidationError::InvalidRadioConfig(format!(
            "frequency_hz {} must be positive",
            config.radio.frequency_hz
        )));
    }

    if config.solver.max_iterations == 0 {
        return Err(ConfigValidationError::InvalidSolverConfig(
            "max_iterations must be non-zero".to_string(),
        ));
    }
    if config.solver.tolerance <= 0.0 {
        return Err(ConfigValidationError::InvalidSolverConfig(format!(
            "tolerance {} must be positive",
            config.solver.tolerance
        )));
    }

    if config.motion.max_speed_mps <= 0.0 {
        return Err(ConfigValidationError::InvalidMotionConfig(format!(
            "max_speed_mps {} must be positive",
            config.motion.max_speed_mps
        )));
    }
    if config.motion.cadence_s <= 0.0 {
        return Err(ConfigValidationError::InvalidMotionConfig(format!(
            "cadence_s {} must be positive",
            config.motion.cadence_s
        )));
    }

    if config.estimator.kind == EstimatorKind::SequenceModel && config.estimator.window.lookback == 0
    {
        return Err(ConfigValidationError::InvalidEstimatorConfig(
            "window lookback must be non-zero".to_string(),
        ));
    }

    if config.timestamps.strategy == TimestampStrategy::BurstSequence
        && config.timestamps.period_ms <= 0.0
    {
        return Err(ConfigValidationError::InvalidTimestampConfig(format!(
            "period_ms {} must be positive",
            config.timestamps.period_ms
        )));
    }

    if config.sink.path.as_os_str().is_empty() {
        return Err(ConfigValidationError::InvalidSinkConfig(
            "path must not be empty".to_string(),
        ));
    }
    if config.sink.flush_interval == 0 {
        return Err(ConfigValidationError::InvalidSinkConfig(
            "flush_interval must be non-zero".to_string(),
        ));
    }

    let mut seen = std::collections::HashSet::new();
    for anchor in &config.anchors {
        if !seen.insert(anchor.id) {
            return Err(ConfigValidationError::DuplicateAnchor(anchor.id));
        }
    }

    Ok(())
}

/// Loads and validates an engine configuration in one step.
///
/// This is a convenience function that combines `load_engine_config` and
/// `validate_engine_config`.
pub fn load_and_validate_engine_config<P: AsRef<Path>>(
    path: P,
) -> Result<EngineConfig, ConfigError> {
    let config = load_engine_config(path)?;
    validate_engine_config(&config)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_validate_default_config() {
        let config = EngineConfig::default();
        assert!(validate_engine_config(&config).is_ok());
    }

    #[test]
    fn test_validate_empty_socket_path() {
        let mut config = EngineConfig::default();
        config.ingest.socket_path = std::path::PathBuf::new();
        let result = validate_engine_config(&config);
        assert!(matches!(
            result,
            Err(ConfigValidationError::InvalidIngestConfig(_))
        ));
    }

    #[test]
    fn test_validate_zero_queue_capacity() {
        let mut config = EngineConfig::default();
        config.ingest.queue_capacity = 0;
        let result = validate_engine_config(&config);
        assert!(matches!(
            result,
            Err(ConfigValidationError::InvalidIngestConfig(_))
        ));
    }

    #[test]
    fn test_validate_nonpositive_frequency() {
        let mut config = EngineConfig::default();
        config.radio.frequency_hz = 0.0;
        let result = validate_engine_config(&config);
        assert!(matches!(
            result,
            Err(ConfigValidationError::InvalidRadioConfig(_))
        ));
    }

    #[test]
    fn test_validate_zero_solver_iterations() {
        let mut config = EngineConfig::default();
        config.solver.max_iterations = 0;
        let result = validate_engine_config(&config);
        assert!(matches!(
            result,
            Err(ConfigValidationError::InvalidSolverConfig(_))
        ));
    }

    #[test]
    fn test_validate_nonpositive_solver_tolerance() {
        let mut config = EngineConfig::default();
        config.solver.tolerance = -1.0;
        let result = validate_engine_config(&config);
        assert!(matches!(
            result,
            Err(ConfigValidationError::InvalidSolverConfig(_))
        ));
    }

    #[test]
    fn test_validate_nonpositive_motion_bound() {
        let mut config = EngineConfig::default();
        config.motion.max_speed_mps = 0.0;
        let result = validate_engine_config(&config);
        assert!(matches!(
            result,
            Err(ConfigValidationError::InvalidMotionConfig(_))
        ));

        let mut config = EngineConfig::default();
        config.motion.cadence_s = -0.1;
        let result = validate_engine_config(&config);
        assert!(matches!(
            result,
            Err(ConfigValidationError::InvalidMotionConfig(_))
        ));
    }

    #[test]
    fn test_validate_zero_lookback_only_for_sequence_model() {
        let mut config = EngineConfig::default();
        config.estimator.window.lookback = 0;
        // Trilateration ignores the window entirely.
        assert!(validate_engine_config(&config).is_ok());

        config.estimator.kind = ranloc_common::EstimatorKind::SequenceModel;
        let result = validate_engine_config(&config);
        assert!(matches!(
            result,
            Err(ConfigValidationError::InvalidEstimatorConfig(_))
        ));
    }

    #[test]
    fn test_validate_zero_period_only_for_burst_sequence() {
        let mut config = EngineConfig::default();
        config.timestamps.period_ms = 0.0;
        assert!(validate_engine_config(&config).is_ok());

        config.timestamps.strategy = TimestampStrategy::BurstSequence;
        let result = validate_engine_config(&config);
        assert!(matches!(
            result,
            Err(ConfigValidationError::InvalidTimestampConfig(_))
        ));
    }

    #[test]
    fn test_validate_zero_flush_interval() {
        let mut config = EngineConfig::default();
        config.sink.flush_interval = 0;
        let result = validate_engine_config(&config);
        assert!(matches!(
            result,
            Err(ConfigValidationError::InvalidSinkConfig(_))
        ));
    }

    #[test]
    fn test_validate_duplicate_anchor_ids() {
        let mut config = EngineConfig::default();
        config.anchors = vec![
            ranloc_common::Anchor::new(2, 800.0, 800.0),
            ranloc_common::Anchor::new(3, 1300.0, 800.0),
            ranloc_common::Anchor::new(2, 550.0, 366.0),
        ];
        let result = validate_engine_config(&config);
        assert_eq!(result, Err(ConfigValidationError::DuplicateAnchor(2)));
    }

    #[test]
    fn test_load_config_from_str() {
        let yaml = r#"
ingest:
  socket_path: /tmp/ranloc.sock
  queue_capacity: 500
radio:
  frequency_hz: 2.6e9
estimator:
  kind: sequence-model
  window:
    lookback: 20
anchors:
  - { id: 2, x: 800.0, y: 800.0 }
  - { id: 3, x: 1300.0, y: 800.0 }
"#;
        let config = load_engine_config_from_str(yaml).unwrap();
        assert_eq!(
            config.ingest.socket_path,
            std::path::PathBuf::from("/tmp/ranloc.sock")
        );
        assert_eq!(config.ingest.queue_capacity, 500);
        assert_eq!(config.radio.frequency_hz, 2.6e9);
        assert_eq!(config.estimator.kind, EstimatorKind::SequenceModel);
        assert_eq!(config.estimator.window.lookback, 20);
        assert_eq!(config.anchors.len(), 2);
        // Untouched sections keep their defaults.
        assert_eq!(config.solver.max_iterations, 50);
        assert!(validate_engine_config(&config).is_ok());
    }

    #[test]
    fn test_load_config_from_str_invalid_yaml() {
        let yaml = "invalid: yaml: content: [";
        let result = load_engine_config_from_str(yaml);
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_engine_config("/nonexistent/path/config.yaml");
        assert!(matches!(result, Err(ConfigError::IoError(_))));
    }

    #[test]
    fn test_load_and_validate_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ranloc.yaml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "ingest:\n  queue_capacity: 0").unwrap();

        let result = load_and_validate_engine_config(&path);
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));

        std::fs::write(&path, "motion:\n  max_speed_mps: 2.0\n").unwrap();
        let config = load_and_validate_engine_config(&path).unwrap();
        assert_eq!(config.motion.max_speed_mps, 2.0);
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::ParseError("test error".to_string());
        assert!(err.to_string().contains("test error"));

        let err = ConfigValidationError::DuplicateAnchor(7);
        assert!(err.to_string().contains("Duplicate anchor id: 7"));
    }
}
