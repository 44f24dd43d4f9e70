//! Configuration structures for the localization engine
//!
//! All sections deserialize from YAML with sensible defaults matching the
//! calibrated testbed deployment, so a minimal config file only needs to
//! name what it overrides.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::types::Anchor;

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Ingestion channel and queue settings
    #[serde(default)]
    pub ingest: IngestConfig,
    /// Radio propagation constants (already calibrated, never trained here)
    #[serde(default)]
    pub radio: RadioConfig,
    /// Multilateration solver settings
    #[serde(default)]
    pub solver: SolverConfig,
    /// Motion-constrained smoother settings
    #[serde(default)]
    pub motion: MotionConfig,
    /// Estimator selection and settings
    #[serde(default)]
    pub estimator: EstimatorConfig,
    /// Timestamp normalization strategy
    #[serde(default)]
    pub timestamps: TimestampConfig,
    /// Trajectory sink settings
    #[serde(default)]
    pub sink: SinkConfig,
    /// Known anchor deployment (empty disables registry checks)
    #[serde(default)]
    pub anchors: Vec<Anchor>,
}

/// Ingestion channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Well-known local socket path, recreated on start, removed on stop
    #[serde(default = "default_socket_path")]
    pub socket_path: PathBuf,
    /// Bounded queue capacity; overflow evicts the oldest line
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Socket read buffer size in bytes
    #[serde(default = "default_read_buffer_size")]
    pub read_buffer_size: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            queue_capacity: default_queue_capacity(),
            read_buffer_size: default_read_buffer_size(),
        }
    }
}

fn default_socket_path() -> PathBuf {
    PathBuf::from("/tmp/sinr_localization.sock")
}

fn default_queue_capacity() -> usize {
    1000
}

fn default_read_buffer_size() -> usize {
    4096
}

/// Radio propagation constants.
///
/// Values mirror the simulated deployment the SINR encoding comes from:
/// 30 dBm transmit power, 3.5 GHz carrier, -96 dBm noise floor, 3 m
/// anchors, ground-level entities, 1 m effective environment height.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RadioConfig {
    /// Anchor transmit power (dBm)
    #[serde(default = "default_tx_power_dbm")]
    pub tx_power_dbm: f64,
    /// Carrier frequency (Hz)
    #[serde(default = "default_frequency_hz")]
    pub frequency_hz: f64,
    /// Receiver noise floor (dBm)
    #[serde(default = "default_noise_floor_dbm")]
    pub noise_floor_dbm: f64,
    /// Anchor deployment height h_bs (meters)
    #[serde(default = "default_anchor_height_m")]
    pub anchor_height_m: f64,
    /// Entity height h_ut (meters)
    #[serde(default)]
    pub entity_height_m: f64,
    /// Effective environment height h_e (meters)
    #[serde(default = "default_env_height_m")]
    pub env_height_m: f64,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            tx_power_dbm: default_tx_power_dbm(),
            frequency_hz: default_frequency_hz(),
            noise_floor_dbm: default_noise_floor_dbm(),
            anchor_height_m: default_anchor_height_m(),
            entity_height_m: 0.0,
            env_height_m: default_env_height_m(),
        }
    }
}

fn default_tx_power_dbm() -> f64 {
    30.0
}

fn default_frequency_hz() -> f64 {
    3.5e9
}

fn default_noise_floor_dbm() -> f64 {
    -96.0
}

fn default_anchor_height_m() -> f64 {
    3.0
}

fn default_env_height_m() -> f64 {
    1.0
}

/// Multilateration solver configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SolverConfig {
    /// Maximum damped least-squares iterations per solve
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    /// Convergence tolerance on the position update norm (meters)
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            tolerance: default_tolerance(),
        }
    }
}

fn default_max_iterations() -> usize {
    50
}

fn default_tolerance() -> f64 {
    1e-6
}

/// Motion-constrained smoother configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MotionConfig {
    /// Maximum plausible entity speed (meters/second)
    #[serde(default = "default_max_speed_mps")]
    pub max_speed_mps: f64,
    /// Report cadence between consecutive estimates (seconds)
    #[serde(default = "default_cadence_s")]
    pub cadence_s: f64,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            max_speed_mps: default_max_speed_mps(),
            cadence_s: default_cadence_s(),
        }
    }
}

fn default_max_speed_mps() -> f64 {
    5.0
}

fn default_cadence_s() -> f64 {
    0.1
}

/// Which estimator the tracker runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EstimatorKind {
    /// Per-anchor SINR inversion plus 4-point multilateration
    #[default]
    Trilateration,
    /// Windowed feature sequences fed to an opaque predictor
    SequenceModel,
}

/// Estimator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstimatorConfig {
    /// Selected estimator
    #[serde(default)]
    pub kind: EstimatorKind,
    /// Window settings (sequence-model estimator only)
    #[serde(default)]
    pub window: WindowConfig,
    /// Optional category-mapper file translating categorical ids to
    /// training-consistent codes (absent: pass-through)
    #[serde(default)]
    pub category_map: Option<PathBuf>,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            kind: EstimatorKind::default(),
            window: WindowConfig::default(),
            category_map: None,
        }
    }
}

/// Per-entity window buffer configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WindowConfig {
    /// Fixed window length; prediction starts once the window is full
    #[serde(default = "default_lookback")]
    pub lookback: usize,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            lookback: default_lookback(),
        }
    }
}

fn default_lookback() -> usize {
    10
}

/// Timestamp normalization strategy selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TimestampStrategy {
    /// Use the measurement timestamp as-is
    #[default]
    Raw,
    /// Bucket by the leading ten decimal digits of the timestamp and
    /// assign each new bucket the next synthetic cadence tick
    BurstSequence,
}

/// Timestamp normalization configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TimestampConfig {
    /// Selected strategy
    #[serde(default)]
    pub strategy: TimestampStrategy,
    /// Synthetic tick period for the burst-sequence strategy (ms)
    #[serde(default = "default_period_ms")]
    pub period_ms: f64,
}

impl Default for TimestampConfig {
    fn default() -> Self {
        Self {
            strategy: TimestampStrategy::default(),
            period_ms: default_period_ms(),
        }
    }
}

fn default_period_ms() -> f64 {
    100.0
}

/// Trajectory sink configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Output file path (truncated per run)
    #[serde(default = "default_sink_path")]
    pub path: PathBuf,
    /// Explicit flush cadence in rows (bounds unflushed loss on crash)
    #[serde(default = "default_flush_interval")]
    pub flush_interval: usize,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            path: default_sink_path(),
            flush_interval: default_flush_interval(),
        }
    }
}

fn default_sink_path() -> PathBuf {
    PathBuf::from("trajectory.txt")
}

fn default_flush_interval() -> usize {
    50
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(
            config.ingest.socket_path,
            PathBuf::from("/tmp/sinr_localization.sock")
        );
        assert_eq!(config.ingest.queue_capacity, 1000);
        assert_eq!(config.radio.tx_power_dbm, 30.0);
        assert_eq!(config.radio.frequency_hz, 3.5e9);
        assert_eq!(config.radio.noise_floor_dbm, -96.0);
        assert_eq!(config.radio.anchor_height_m, 3.0);
        assert_eq!(config.radio.entity_height_m, 0.0);
        assert_eq!(config.radio.env_height_m, 1.0);
        assert_eq!(config.solver.max_iterations, 50);
        assert_eq!(config.motion.max_speed_mps, 5.0);
        assert_eq!(config.motion.cadence_s, 0.1);
        assert_eq!(config.estimator.kind, EstimatorKind::Trilateration);
        assert_eq!(config.estimator.window.lookback, 10);
        assert_eq!(config.timestamps.strategy, TimestampStrategy::Raw);
        assert_eq!(config.sink.flush_interval, 50);
        assert!(config.anchors.is_empty());
    }

    #[test]
    fn test_partial_yaml_overrides() {
        let yaml = r#"
ingest:
  queue_capacity: 64
estimator:
  kind: sequence-model
  window:
    lookback: 5
timestamps:
  strategy: burst-sequence
anchors:
  - { id: 2, x: 800.0, y: 800.0 }
  - { id: 3, x: 1300.0, y: 800.0 }
"#;
        let config: EngineConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.ingest.queue_capacity, 64);
        // Untouched sections keep their defaults
        assert_eq!(
            config.ingest.socket_path,
            PathBuf::from("/tmp/sinr_localization.sock")
        );
        assert_eq!(config.estimator.kind, EstimatorKind::SequenceModel);
        assert_eq!(config.estimator.window.lookback, 5);
        assert_eq!(config.timestamps.strategy, TimestampStrategy::BurstSequence);
        assert_eq!(config.anchors.len(), 2);
        assert_eq!(config.anchors[1].id, 3);
    }
}
