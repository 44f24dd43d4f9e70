//! Motion-constrained smoothing

use ranloc_common::{MotionConfig, Point2};

/// Clamps per-cycle displacement to the maximum plausible entity speed.
///
/// Raw estimates jitter; bounding `|estimate - previous|` by
/// `max_speed * cadence` keeps every persisted step physically
/// reachable within one report interval while preserving the direction
/// of the jump.
#[derive(Debug, Clone, Copy)]
pub struct MotionLimiter {
    max_displacement_m: f64,
}

impl MotionLimiter {
    pub fn new(config: &MotionConfig) -> Self {
        Self {
            max_displacement_m: config.max_speed_mps * config.cadence_s,
        }
    }

    /// Maximum displacement admitted between consecutive estimates.
    pub fn max_displacement_m(&self) -> f64 {
        self.max_displacement_m
    }

    /// Applies the displacement clamp against the previously persisted
    /// position. The first estimate passes through unmodified. Returns
    /// the position to persist and whether it was clamped.
    pub fn limit(&self, raw: Point2, previous: Option<Point2>) -> (Point2, bool) {
        let Some(prev) = previous else {
            return (raw, false);
        };

        let dx = raw.x - prev.x;
        let dy = raw.y - prev.y;
        let displacement = (dx * dx + dy * dy).sqrt();
        if displacement <= self.max_displacement_m {
            return (raw, false);
        }

        let scale = self.max_displacement_m / displacement;
        (Point2::new(prev.x + dx * scale, prev.y + dy * scale), true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter() -> MotionLimiter {
        // 5 m/s at 0.1 s cadence: 0.5 m per step
        MotionLimiter::new(&MotionConfig::default())
    }

    #[test]
    fn test_first_estimate_passes_through() {
        let (out, clamped) = limiter().limit(Point2::new(123.0, -45.0), None);
        assert_eq!(out, Point2::new(123.0, -45.0));
        assert!(!clamped);
    }

    #[test]
    fn test_within_bound_passes_through() {
        let prev = Point2::new(10.0, 10.0);
        let raw = Point2::new(10.3, 10.2);
        let (out, clamped) = limiter().limit(raw, Some(prev));
        assert_eq!(out, raw);
        assert!(!clamped);
    }

    #[test]
    fn test_exactly_at_bound_passes_through() {
        let prev = Point2::new(0.0, 0.0);
        let raw = Point2::new(0.5, 0.0);
        let (out, clamped) = limiter().limit(raw, Some(prev));
        assert_eq!(out, raw);
        assert!(!clamped);
    }

    #[test]
    fn test_beyond_bound_clamps_magnitude_keeps_direction() {
        let lim = limiter();
        let prev = Point2::new(0.0, 0.0);
        let raw = Point2::new(3.0, 4.0);
        let (out, clamped) = lim.limit(raw, Some(prev));
        assert!(clamped);
        assert!((out.distance_to(&prev) - lim.max_displacement_m()).abs() < 1e-9);
        // Direction preserved: output is collinear with the raw jump
        assert!((out.x * raw.y - out.y * raw.x).abs() < 1e-9);
        assert!((out.x - 0.3).abs() < 1e-9);
        assert!((out.y - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_zero_displacement() {
        let prev = Point2::new(7.0, 7.0);
        let (out, clamped) = limiter().limit(prev, Some(prev));
        assert_eq!(out, prev);
        assert!(!clamped);
    }
}
