//! Positioning algorithms for the localization engine
//!
//! Everything in this crate is a pure computation over decoded
//! measurements; no I/O, no tasks. The runtime crate wires these pieces
//! into its processing loop.
//!
//! # Pipeline
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Measurement (decoded radio-quality report)                   │
//! │   ┌──────────────────────────────────────────────────────┐   │
//! │   │ PositionEstimator                                    │   │
//! │   │  • Trilateration: SINR ─► path loss ─► distance      │   │
//! │   │    (propagation), then 4-anchor least squares        │   │
//! │   │    (multilateration)                                 │   │
//! │   │  • SequenceModel: feature rows ─► per-entity window  │   │
//! │   │    ─► opaque SequencePredictor                       │   │
//! │   └──────────────────────────────────────────────────────┘   │
//! │   ┌──────────────────────────────────────────────────────┐   │
//! │   │ MotionLimiter (max-speed displacement clamp)         │   │
//! │   └──────────────────────────────────────────────────────┘   │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod category;
pub mod estimator;
pub mod motion;
pub mod multilateration;
pub mod propagation;
pub mod window;

pub use category::CategoryMapper;
pub use estimator::{
    EntityContext, EstimatorOutput, FeatureLayout, Features, LinearMotionPredictor,
    PositionEstimator, SequenceModelEstimator, SequencePredictor, TrilaterationEstimator,
};
pub use motion::MotionLimiter;
pub use multilateration::{solve, SolveResult};
pub use propagation::{Inversion, PropagationModel};
pub use window::{FeatureRow, WindowBuffer};
