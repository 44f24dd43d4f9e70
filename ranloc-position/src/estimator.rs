//! Position estimators
//!
//! The tracker drives exactly one estimator chosen at startup. An
//! estimator first distills a measurement into features, then turns
//! features into a position. The two calls fail differently by intent:
//! extraction declines measurements it cannot use yet (wrong wire
//! variant, window still filling), prediction reports degraded inputs
//! through the estimate quality tag instead of failing.

use ranloc_common::{
    DistanceEstimate, EstimateQuality, Measurement, Point2, Point3, RadioConfig, SolverConfig,
    WireVariant,
};

use crate::category::{
    CategoryMapper, CATEGORY_ENTITY, CATEGORY_NEIGHBOR1, CATEGORY_NEIGHBOR2, CATEGORY_NEIGHBOR3,
    CATEGORY_SERVING,
};
use crate::multilateration;
use crate::propagation::PropagationModel;
use crate::window::{FeatureRow, WindowBuffer};

/// Number of anchors a geometric fix needs.
pub const ANCHOR_COUNT: usize = 4;

/// Per-entity scratch state owned by the tracker and threaded through
/// feature extraction.
#[derive(Debug, Default)]
pub struct EntityContext {
    window: Option<WindowBuffer>,
}

impl EntityContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Window fill level; 0 when the estimator keeps no window.
    pub fn window_len(&self) -> usize {
        self.window.as_ref().map_or(0, WindowBuffer::len)
    }

    pub fn window_ready(&self) -> bool {
        self.window.as_ref().is_some_and(WindowBuffer::is_ready)
    }
}

/// Features distilled from one measurement.
#[derive(Debug, Clone)]
pub enum Features {
    /// Four anchor positions and the ranges inverted from their SINRs.
    AnchorRanges {
        anchors: [Point3; ANCHOR_COUNT],
        ranges: [DistanceEstimate; ANCHOR_COUNT],
    },
    /// A full per-entity window of feature rows, oldest first.
    Window(Vec<FeatureRow>),
}

/// A predicted position and its quality tag.
#[derive(Debug, Clone, Copy)]
pub struct EstimatorOutput {
    pub position: Point2,
    pub quality: EstimateQuality,
}

/// A position estimator: measurement to features to position.
pub trait PositionEstimator: Send {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Distills a measurement into features, updating per-entity state.
    /// `None` means this measurement cannot produce an estimate yet.
    fn extract_features(
        &self,
        measurement: &Measurement,
        normalized_ts: f64,
        ctx: &mut EntityContext,
    ) -> Option<Features>;

    /// Turns features into a position. `None` means the backing
    /// predictor declined.
    fn predict(&self, features: &Features) -> Option<EstimatorOutput>;
}

// ============================================================================
// Trilateration Estimator
// ============================================================================

/// Physics-based estimator: SINR to path loss to a distance per anchor,
/// then a four-anchor least-squares fix. Needs the full wire variant
/// and keeps no per-entity window.
pub struct TrilaterationEstimator {
    propagation: PropagationModel,
    solver: SolverConfig,
    anchor_height_m: f64,
    entity_height_m: f64,
}

impl TrilaterationEstimator {
    pub fn new(radio: RadioConfig, solver: SolverConfig) -> Self {
        Self {
            propagation: PropagationModel::new(radio),
            solver,
            anchor_height_m: radio.anchor_height_m,
            entity_height_m: radio.entity_height_m,
        }
    }
}

impl PositionEstimator for TrilaterationEstimator {
    fn name(&self) -> &'static str {
        "trilateration"
    }

    fn extract_features(
        &self,
        measurement: &Measurement,
        _normalized_ts: f64,
        _ctx: &mut EntityContext,
    ) -> Option<Features> {
        if !measurement.has_full_geometry() || measurement.neighbors.len() != ANCHOR_COUNT - 1 {
            return None;
        }

        let mut anchors = [Point3::new(0.0, 0.0, 0.0); ANCHOR_COUNT];
        let mut ranges = [DistanceEstimate {
            anchor_id: 0,
            distance_3d: 0.0,
            regime: None,
            fallback: false,
        }; ANCHOR_COUNT];

        for (i, obs) in measurement.observations().enumerate() {
            let (Some(anchor_id), Some(x), Some(y)) = (obs.anchor_id, obs.x, obs.y) else {
                return None;
            };
            let inversion = self.propagation.distance_from_sinr(obs.sinr_raw);
            anchors[i] = Point3::new(x, y, self.anchor_height_m);
            ranges[i] = DistanceEstimate {
                anchor_id,
                distance_3d: inversion.distance_3d,
                regime: inversion.regime,
                fallback: inversion.fallback,
            };
        }

        Some(Features::AnchorRanges { anchors, ranges })
    }

    fn predict(&self, features: &Features) -> Option<EstimatorOutput> {
        let Features::AnchorRanges { anchors, ranges } = features else {
            return None;
        };

        let distances: Vec<f64> = ranges.iter().map(|r| r.distance_3d).collect();
        let solved =
            multilateration::solve(anchors, &distances, self.entity_height_m, &self.solver)?;

        let mut quality = if solved.converged {
            EstimateQuality::Converged
        } else {
            EstimateQuality::SolverFallback
        };
        if ranges.iter().any(|r| r.fallback) {
            quality = quality.max(EstimateQuality::DistanceFallback);
        }

        Some(EstimatorOutput {
            position: solved.position.xy(),
            quality,
        })
    }
}

// ============================================================================
// Sequence Model Estimator
// ============================================================================

/// Feature layouts a window row can use, distinguished by width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureLayout {
    /// 7 columns: timestamp, serving x/y, serving + 3 neighbor SINRs
    Reduced,
    /// 12 columns: timestamp, entity id, serving id + SINR, 3 neighbor
    /// id + SINR pairs, serving x/y
    Full,
}

impl FeatureLayout {
    pub const fn width(self) -> usize {
        match self {
            FeatureLayout::Reduced => 7,
            FeatureLayout::Full => 12,
        }
    }

    pub fn from_width(width: usize) -> Option<FeatureLayout> {
        match width {
            7 => Some(FeatureLayout::Reduced),
            12 => Some(FeatureLayout::Full),
            _ => None,
        }
    }

    /// Column carrying the normalized timestamp.
    pub const fn timestamp_col(self) -> usize {
        0
    }

    /// Column carrying the serving anchor X coordinate.
    pub const fn serving_x_col(self) -> usize {
        match self {
            FeatureLayout::Reduced => 1,
            FeatureLayout::Full => 10,
        }
    }

    /// Column carrying the serving anchor Y coordinate.
    pub const fn serving_y_col(self) -> usize {
        match self {
            FeatureLayout::Reduced => 2,
            FeatureLayout::Full => 11,
        }
    }
}

/// An opaque pretrained sequence predictor: a full window of ordered
/// feature rows in, a ground position out. Model internals stay behind
/// this seam.
pub trait SequencePredictor: Send {
    fn name(&self) -> &'static str;

    /// Predicts a position from `lookback` ordered feature rows.
    /// `None` when the window does not carry enough signal.
    fn predict(&self, layout: FeatureLayout, window: &[FeatureRow]) -> Option<Point2>;
}

/// Extrapolates along the serving-anchor track in the window.
///
/// Stand-in for deployments without a trained model artifact: the
/// serving anchor's coordinates are the coarsest available position
/// proxy, and two distinct track points give a velocity. Extrapolates
/// one mean row interval past the newest track point.
pub struct LinearMotionPredictor;

impl SequencePredictor for LinearMotionPredictor {
    fn name(&self) -> &'static str {
        "linear-motion"
    }

    fn predict(&self, layout: FeatureLayout, window: &[FeatureRow]) -> Option<Point2> {
        let track: Vec<(f64, f64, f64)> = window
            .iter()
            .map(|row| {
                Some((
                    *row.get(layout.timestamp_col())?,
                    *row.get(layout.serving_x_col())?,
                    *row.get(layout.serving_y_col())?,
                ))
            })
            .collect::<Option<Vec<_>>>()?;

        let &(last_ts, last_x, last_y) = track.last()?;

        // Newest row whose track point differs from the final one
        let prior = track
            .iter()
            .rev()
            .find(|&&(_, x, y)| x != last_x || y != last_y);
        let Some(&(prior_ts, prior_x, prior_y)) = prior else {
            return Some(Point2::new(last_x, last_y));
        };

        let dt = last_ts - prior_ts;
        if dt <= 0.0 {
            return Some(Point2::new(last_x, last_y));
        }

        // Mean row spacing stands in for the next report's horizon
        let step = (last_ts - track[0].0) / (track.len() - 1).max(1) as f64;
        let vx = (last_x - prior_x) / dt;
        let vy = (last_y - prior_y) / dt;
        Some(Point2::new(last_x + vx * step, last_y + vy * step))
    }
}

/// Sequence-model estimator: builds training-layout feature rows,
/// windows them per entity, and defers prediction to an opaque
/// `SequencePredictor`.
pub struct SequenceModelEstimator {
    lookback: usize,
    mapper: CategoryMapper,
    predictor: Box<dyn SequencePredictor>,
}

impl SequenceModelEstimator {
    pub fn new(
        lookback: usize,
        mapper: CategoryMapper,
        predictor: Box<dyn SequencePredictor>,
    ) -> Self {
        Self {
            lookback,
            mapper,
            predictor,
        }
    }

    /// Builds one feature row in the layout matching the wire variant.
    fn feature_row(&self, measurement: &Measurement, normalized_ts: f64) -> FeatureRow {
        let serving = &measurement.serving;
        let neighbor_sinr =
            |i: usize| measurement.neighbors.get(i).map_or(0.0, |o| o.sinr_raw);

        match measurement.variant {
            WireVariant::Reduced => vec![
                normalized_ts,
                serving.x.unwrap_or(0.0),
                serving.y.unwrap_or(0.0),
                serving.sinr_raw,
                neighbor_sinr(0),
                neighbor_sinr(1),
                neighbor_sinr(2),
            ],
            WireVariant::Full => {
                let neighbor_id = |i: usize| -> i64 {
                    measurement
                        .neighbors
                        .get(i)
                        .and_then(|o| o.anchor_id)
                        .map_or(0, i64::from)
                };
                vec![
                    normalized_ts,
                    self.mapper
                        .map(CATEGORY_ENTITY, measurement.entity_id as i64)
                        as f64,
                    self.mapper
                        .map(CATEGORY_SERVING, serving.anchor_id.map_or(0, i64::from))
                        as f64,
                    serving.sinr_raw,
                    self.mapper.map(CATEGORY_NEIGHBOR1, neighbor_id(0)) as f64,
                    neighbor_sinr(0),
                    self.mapper.map(CATEGORY_NEIGHBOR2, neighbor_id(1)) as f64,
                    neighbor_sinr(1),
                    self.mapper.map(CATEGORY_NEIGHBOR3, neighbor_id(2)) as f64,
                    neighbor_sinr(2),
                    serving.x.unwrap_or(0.0),
                    serving.y.unwrap_or(0.0),
                ]
            }
        }
    }
}

impl PositionEstimator for SequenceModelEstimator {
    fn name(&self) -> &'static str {
        "sequence-model"
    }

    fn extract_features(
        &self,
        measurement: &Measurement,
        normalized_ts: f64,
        ctx: &mut EntityContext,
    ) -> Option<Features> {
        let row = self.feature_row(measurement, normalized_ts);
        let window = ctx
            .window
            .get_or_insert_with(|| WindowBuffer::new(self.lookback));
        window.push(row);

        if !window.is_ready() {
            return None;
        }
        Some(Features::Window(window.snapshot()))
    }

    fn predict(&self, features: &Features) -> Option<EstimatorOutput> {
        let Features::Window(rows) = features else {
            return None;
        };
        let layout = FeatureLayout::from_width(rows.first()?.len())?;
        let position = self.predictor.predict(layout, rows)?;
        Some(EstimatorOutput {
            position,
            quality: EstimateQuality::Converged,
        })
    }
}
