//! Measurement tracking: decoding, estimation, motion bounding, output.

pub mod state;
pub mod task;

pub use state::{build_estimator, EntityState, TimestampNormalizer};
pub use task::TrackerTask;
