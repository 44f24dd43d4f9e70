//! Core domain types for the ranloc workspace
//!
//! These types form the vocabulary shared by the wire codec, the
//! positioning algorithms, and the engine runtime: anchors, measurements,
//! per-cycle distance estimates, and position estimates.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A 2D point or displacement in meters.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point2 {
    /// X coordinate (meters)
    pub x: f64,
    /// Y coordinate (meters)
    pub y: f64,
}

impl Point2 {
    /// Creates a new 2D point.
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point.
    pub fn distance_to(&self, other: &Point2) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

impl fmt::Display for Point2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.3}, {:.3})", self.x, self.y)
    }
}

/// A 3D point in meters. Anchors sit at a fixed deployment height; the
/// solver refines a free (x, y, z) and reports only (x, y).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point3 {
    /// X coordinate (meters)
    pub x: f64,
    /// Y coordinate (meters)
    pub y: f64,
    /// Z coordinate / height (meters)
    pub z: f64,
}

impl Point3 {
    /// Creates a new 3D point.
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Euclidean distance to another point.
    pub fn distance_to(&self, other: &Point3) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    /// Drops the height component.
    pub fn xy(&self) -> Point2 {
        Point2::new(self.x, self.y)
    }
}

/// Propagation regime tag for a path-loss evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Regime {
    /// Line of sight
    Los,
    /// Non line of sight
    Nlos,
}

impl fmt::Display for Regime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Regime::Los => write!(f, "LOS"),
            Regime::Nlos => write!(f, "NLOS"),
        }
    }
}

/// Quality tag attached to every position estimate.
///
/// Fallbacks substitute plausible-looking values (default distance,
/// anchor centroid); the tag makes that substitution observable instead
/// of silent. Ordering: `DistanceFallback` dominates `SolverFallback`
/// which dominates `Converged` when a cycle hits several of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EstimateQuality {
    /// All inputs inverted self-consistently and the solver converged.
    Converged,
    /// The solver did not converge; the estimate is the anchor centroid.
    SolverFallback,
    /// At least one distance came from the default-distance fallback.
    DistanceFallback,
}

impl fmt::Display for EstimateQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EstimateQuality::Converged => write!(f, "converged"),
            EstimateQuality::SolverFallback => write!(f, "solver-fallback"),
            EstimateQuality::DistanceFallback => write!(f, "distance-fallback"),
        }
    }
}

/// A fixed-position radio station with known coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Anchor {
    /// Anchor (cell) identifier
    pub id: i32,
    /// X coordinate (meters)
    pub x: f64,
    /// Y coordinate (meters)
    pub y: f64,
}

impl Anchor {
    /// Creates a new anchor descriptor.
    pub fn new(id: i32, x: f64, y: f64) -> Self {
        Self { id, x, y }
    }

    /// Ground-plane position of this anchor.
    pub fn position(&self) -> Point2 {
        Point2::new(self.x, self.y)
    }
}

/// The known anchor deployment, fixed at start and referenced by id.
///
/// Wire coordinates remain authoritative when present; the registry is
/// used to flag observations of anchors outside the configured set.
#[derive(Debug, Clone, Default)]
pub struct AnchorRegistry {
    anchors: HashMap<i32, Anchor>,
}

impl AnchorRegistry {
    /// Builds a registry from a list of anchors. Later duplicates of an
    /// id replace earlier ones.
    pub fn from_anchors(anchors: &[Anchor]) -> Self {
        Self {
            anchors: anchors.iter().map(|a| (a.id, *a)).collect(),
        }
    }

    /// Looks up an anchor by id.
    pub fn get(&self, id: i32) -> Option<&Anchor> {
        self.anchors.get(&id)
    }

    /// Returns true if the id belongs to the configured deployment.
    pub fn contains(&self, id: i32) -> bool {
        self.anchors.contains_key(&id)
    }

    /// Number of configured anchors.
    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    /// Returns true if no anchors are configured.
    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }
}

/// Which wire schema a measurement was decoded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireVariant {
    /// 8-field variant: serving coordinates only, four SINR values.
    Reduced,
    /// 18-field variant: id, coordinates, and SINR for all four anchors.
    Full,
}

impl fmt::Display for WireVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireVariant::Reduced => write!(f, "reduced"),
            WireVariant::Full => write!(f, "full"),
        }
    }
}

/// One anchor's contribution to a measurement.
///
/// In the reduced wire variant only the serving anchor carries
/// coordinates and no observation carries an id; absent fields are
/// `None`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnchorObservation {
    /// Anchor id, when the wire variant carries one
    pub anchor_id: Option<i32>,
    /// Anchor X coordinate (meters), when carried
    pub x: Option<f64>,
    /// Anchor Y coordinate (meters), when carried
    pub y: Option<f64>,
    /// SINR in the encoded 0-127 scale (negative raw values occur)
    pub sinr_raw: f64,
}

impl AnchorObservation {
    /// Observation with full geometry (id + coordinates), wire variant B.
    pub fn full(anchor_id: i32, x: f64, y: f64, sinr_raw: f64) -> Self {
        Self {
            anchor_id: Some(anchor_id),
            x: Some(x),
            y: Some(y),
            sinr_raw,
        }
    }

    /// Observation carrying only a SINR value, wire variant A neighbors.
    pub fn sinr_only(sinr_raw: f64) -> Self {
        Self {
            anchor_id: None,
            x: None,
            y: None,
            sinr_raw,
        }
    }

    /// Returns the (x, y) position when both coordinates are present.
    pub fn position(&self) -> Option<Point2> {
        match (self.x, self.y) {
            (Some(x), Some(y)) => Some(Point2::new(x, y)),
            _ => None,
        }
    }
}

/// One decoded radio-quality report: a single entity seen by its serving
/// anchor and up to three neighbors at one instant.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    /// Report timestamp, coerced to integer milliseconds
    pub timestamp_ms: i64,
    /// Identifier of the entity being localized (IMSI in the sink header)
    pub entity_id: u64,
    /// Serving anchor observation
    pub serving: AnchorObservation,
    /// Neighbor observations, strongest first as sent (at most 3)
    pub neighbors: Vec<AnchorObservation>,
    /// Wire schema this measurement was decoded from
    pub variant: WireVariant,
}

impl Measurement {
    /// Iterates the serving observation followed by the neighbors.
    pub fn observations(&self) -> impl Iterator<Item = &AnchorObservation> {
        std::iter::once(&self.serving).chain(self.neighbors.iter())
    }

    /// True when every observation carries an id and coordinates, i.e.
    /// the measurement can feed geometry-based estimation.
    pub fn has_full_geometry(&self) -> bool {
        self.observations()
            .all(|o| o.anchor_id.is_some() && o.x.is_some() && o.y.is_some())
    }
}

/// An ephemeral per-anchor range produced by the propagation inversion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceEstimate {
    /// Anchor the range refers to
    pub anchor_id: i32,
    /// Inverted 3D distance (meters), clamped to [1, 5000]
    pub distance_3d: f64,
    /// Regime the accepted inversion used, `None` on fallback
    pub regime: Option<Regime>,
    /// True when no regime was self-consistent and the default applied
    pub fallback: bool,
}

/// One estimated position for one entity at one instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionEstimate {
    /// Timestamp carried over from the measurement (milliseconds)
    pub timestamp_ms: i64,
    /// Entity the estimate belongs to
    pub entity_id: u64,
    /// Estimated X coordinate (meters)
    pub x: f64,
    /// Estimated Y coordinate (meters)
    pub y: f64,
    /// Quality tag (fallback substitutions are observable, never silent)
    pub quality: EstimateQuality,
}

impl PositionEstimate {
    /// Ground-plane position of this estimate.
    pub fn position(&self) -> Point2 {
        Point2::new(self.x, self.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_distances() {
        let a = Point2::new(0.0, 0.0);
        let b = Point2::new(3.0, 4.0);
        assert!((a.distance_to(&b) - 5.0).abs() < 1e-12);

        let p = Point3::new(1.0, 2.0, 2.0);
        let q = Point3::new(1.0, 2.0, 5.0);
        assert!((p.distance_to(&q) - 3.0).abs() < 1e-12);
        assert_eq!(p.xy(), Point2::new(1.0, 2.0));
    }

    #[test]
    fn test_anchor_registry() {
        let anchors = [
            Anchor::new(2, 800.0, 800.0),
            Anchor::new(3, 1300.0, 800.0),
            Anchor::new(4, 1050.0, 1233.0),
        ];
        let registry = AnchorRegistry::from_anchors(&anchors);

        assert_eq!(registry.len(), 3);
        assert!(registry.contains(2));
        assert!(!registry.contains(99));
        assert_eq!(registry.get(3).map(|a| a.x), Some(1300.0));
    }

    #[test]
    fn test_measurement_geometry_flags() {
        let full = Measurement {
            timestamp_ms: 0,
            entity_id: 1,
            serving: AnchorObservation::full(10, 0.0, 0.0, -85.0),
            neighbors: vec![
                AnchorObservation::full(11, 100.0, 0.0, -70.0),
                AnchorObservation::full(12, 0.0, 100.0, -70.0),
                AnchorObservation::full(13, 100.0, 100.0, -90.0),
            ],
            variant: WireVariant::Full,
        };
        assert!(full.has_full_geometry());
        assert_eq!(full.observations().count(), 4);

        let reduced = Measurement {
            timestamp_ms: 0,
            entity_id: 1,
            serving: AnchorObservation {
                anchor_id: None,
                x: Some(10.0),
                y: Some(0.0),
                sinr_raw: 0.0,
            },
            neighbors: vec![
                AnchorObservation::sinr_only(-85.0),
                AnchorObservation::sinr_only(11.0),
                AnchorObservation::sinr_only(100.0),
            ],
            variant: WireVariant::Reduced,
        };
        assert!(!reduced.has_full_geometry());
    }

    #[test]
    fn test_quality_ordering() {
        assert!(EstimateQuality::DistanceFallback > EstimateQuality::SolverFallback);
        assert!(EstimateQuality::SolverFallback > EstimateQuality::Converged);
    }
}
