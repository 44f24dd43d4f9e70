//! Tracker-side state: per-entity records, timestamp normalization, and
//! estimator construction from configuration.

use std::collections::HashMap;

use ranloc_common::{
    EngineConfig, EstimatorKind, Point2, TimestampConfig, TimestampStrategy,
};
use ranloc_position::{
    CategoryMapper, EntityContext, LinearMotionPredictor, PositionEstimator,
    SequenceModelEstimator, TrilaterationEstimator,
};

/// Per-entity tracking record, owned exclusively by the tracker task.
#[derive(Debug, Default)]
pub struct EntityState {
    /// Last persisted position; reference point for the motion limiter
    pub last_position: Option<Point2>,
    /// Estimator scratch state (window buffer for sequence estimators)
    pub context: EntityContext,
    /// Number of estimates persisted for this entity
    pub estimates: u64,
}

/// Timestamp normalization applied before feature extraction.
///
/// Sequence models are trained on synthetic cadence ticks rather than
/// wall-clock timestamps. `BurstSequence` reproduces that convention:
/// measurements sharing the leading ten decimal digits of their
/// millisecond timestamp (one wall-clock second) form a bucket, and each
/// new bucket is assigned the next tick, globally across entities. Sink
/// rows always keep the raw measurement timestamp.
#[derive(Debug)]
pub enum TimestampNormalizer {
    Raw,
    BurstSequence {
        period_ms: f64,
        next_tick: f64,
        buckets: HashMap<String, f64>,
    },
}

impl TimestampNormalizer {
    pub fn new(config: &TimestampConfig) -> Self {
        match config.strategy {
            TimestampStrategy::Raw => TimestampNormalizer::Raw,
            TimestampStrategy::BurstSequence => TimestampNormalizer::BurstSequence {
                period_ms: config.period_ms,
                next_tick: 0.0,
                buckets: HashMap::new(),
            },
        }
    }

    /// Maps a raw millisecond timestamp onto the estimator's time axis.
    pub fn normalize(&mut self, timestamp_ms: i64) -> f64 {
        match self {
            TimestampNormalizer::Raw => timestamp_ms as f64,
            TimestampNormalizer::BurstSequence {
                period_ms,
                next_tick,
                buckets,
            } => {
                // Millisecond epoch timestamps are 13 digits; the first
                // ten cover everything up to the seconds place.
                let digits = timestamp_ms.to_string();
                let cut = digits.len().min(10);
                let bucket = &digits[..cut];
                if let Some(&tick) = buckets.get(bucket) {
                    return tick;
                }
                let tick = *next_tick;
                buckets.insert(bucket.to_string(), tick);
                *next_tick += *period_ms;
                tick
            }
        }
    }
}

/// Instantiates the estimator selected in the configuration.
pub fn build_estimator(
    config: &EngineConfig,
) -> Result<Box<dyn PositionEstimator>, ranloc_common::Error> {
    match config.estimator.kind {
        EstimatorKind::Trilateration => Ok(Box::new(TrilaterationEstimator::new(
            config.radio,
            config.solver,
        ))),
        EstimatorKind::SequenceModel => {
            let mapper = match &config.estimator.category_map {
                Some(path) => CategoryMapper::load(path)?,
                None => CategoryMapper::passthrough(),
            };
            Ok(Box::new(SequenceModelEstimator::new(
                config.estimator.window.lookback,
                mapper,
                Box::new(LinearMotionPredictor),
            )))
        }
    }
}
