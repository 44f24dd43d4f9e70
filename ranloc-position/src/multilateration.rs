//! Range-based multilateration
//!
//! Solves `||p - a_i|| = d_i` for an entity position given four anchor
//! positions and the ranges inverted from their SINR observations. The
//! residuals are nonlinear in the position, so the solve iterates
//! damped Gauss-Newton steps on the normal equations.

use ndarray::{Array1, Array2};
use ranloc_common::{Point3, SolverConfig};

/// Result of one multilateration solve.
#[derive(Debug, Clone, Copy)]
pub struct SolveResult {
    /// Estimated position; z is solved but not persisted downstream
    pub position: Point3,
    /// Sum of squared range residuals at the returned position
    pub residual_norm: f64,
    /// Iterations consumed
    pub iterations: usize,
    /// False when the iteration budget ran out or a singular system
    /// stopped the iteration; the position is then the anchor centroid
    pub converged: bool,
}

/// Solves for a position by damped iterative least squares.
///
/// The initial guess is the anchor centroid in the ground plane with z
/// at `initial_height_m` (the nominal entity height; the anchors all
/// sit above it). Non-convergence never leaves the caller empty-handed:
/// the centroid comes back tagged `converged: false` so a raw estimate
/// always exists for smoothing.
///
/// Returns `None` when fewer than 3 anchor/range pairs are supplied or
/// the slice lengths differ.
pub fn solve(
    anchors: &[Point3],
    ranges: &[f64],
    initial_height_m: f64,
    config: &SolverConfig,
) -> Option<SolveResult> {
    let n = anchors.len();
    if n < 3 || ranges.len() != n {
        return None;
    }

    let centroid_x = anchors.iter().map(|a| a.x).sum::<f64>() / n as f64;
    let centroid_y = anchors.iter().map(|a| a.y).sum::<f64>() / n as f64;

    let mut x = [centroid_x, centroid_y, initial_height_m];
    let mut iterations = 0;
    let mut converged = false;

    for iter in 0..config.max_iterations {
        iterations = iter + 1;

        let mut jacobian = Array2::<f64>::zeros((n, 3));
        let mut residuals = Array1::<f64>::zeros(n);
        for (i, anchor) in anchors.iter().enumerate() {
            let dx = x[0] - anchor.x;
            let dy = x[1] - anchor.y;
            let dz = x[2] - anchor.z;
            let dist = (dx * dx + dy * dy + dz * dz).sqrt().max(1e-12);

            jacobian[[i, 0]] = dx / dist;
            jacobian[[i, 1]] = dy / dist;
            jacobian[[i, 2]] = dz / dist;
            residuals[i] = dist - ranges[i];
        }

        // Normal equations with Levenberg-Marquardt damping; with all
        // anchors at one height the z column goes near-degenerate as
        // the estimate approaches the anchor plane
        let jt = jacobian.t();
        let mut normal = jt.dot(&jacobian);
        let gradient = jt.dot(&residuals);

        let diag_avg = (normal[[0, 0]] + normal[[1, 1]] + normal[[2, 2]]) / 3.0;
        let lambda = (diag_avg * 1e-6).max(1e-10);
        for k in 0..3 {
            normal[[k, k]] += lambda;
        }

        let Some(delta) = solve_3x3(&normal, &(-&gradient)) else {
            break;
        };

        for k in 0..3 {
            x[k] += delta[k];
        }

        let step_norm = (delta[0] * delta[0] + delta[1] * delta[1] + delta[2] * delta[2]).sqrt();
        if step_norm < config.tolerance {
            converged = true;
            break;
        }
    }

    if !converged {
        x = [centroid_x, centroid_y, initial_height_m];
    }

    let position = Point3::new(x[0], x[1], x[2]);
    let residual_norm = anchors
        .iter()
        .zip(ranges.iter())
        .map(|(anchor, &range)| (position.distance_to(anchor) - range).powi(2))
        .sum();

    Some(SolveResult {
        position,
        residual_norm,
        iterations,
        converged,
    })
}

/// Solves a 3x3 linear system `A * x = b` by Cramer's rule.
/// Returns `None` when the determinant is near zero.
fn solve_3x3(a: &Array2<f64>, b: &Array1<f64>) -> Option<[f64; 3]> {
    let det = a[[0, 0]] * (a[[1, 1]] * a[[2, 2]] - a[[1, 2]] * a[[2, 1]])
        - a[[0, 1]] * (a[[1, 0]] * a[[2, 2]] - a[[1, 2]] * a[[2, 0]])
        + a[[0, 2]] * (a[[1, 0]] * a[[2, 1]] - a[[1, 1]] * a[[2, 0]]);

    if det.abs() < 1e-30 {
        return None;
    }
    let inv_det = 1.0 / det;

    let adj00 = (a[[1, 1]] * a[[2, 2]] - a[[1, 2]] * a[[2, 1]]) * inv_det;
    let adj01 = (a[[0, 2]] * a[[2, 1]] - a[[0, 1]] * a[[2, 2]]) * inv_det;
    let adj02 = (a[[0, 1]] * a[[1, 2]] - a[[0, 2]] * a[[1, 1]]) * inv_det;
    let adj10 = (a[[1, 2]] * a[[2, 0]] - a[[1, 0]] * a[[2, 2]]) * inv_det;
    let adj11 = (a[[0, 0]] * a[[2, 2]] - a[[0, 2]] * a[[2, 0]]) * inv_det;
    let adj12 = (a[[0, 2]] * a[[1, 0]] - a[[0, 0]] * a[[1, 2]]) * inv_det;
    let adj20 = (a[[1, 0]] * a[[2, 1]] - a[[1, 1]] * a[[2, 0]]) * inv_det;
    let adj21 = (a[[0, 1]] * a[[2, 0]] - a[[0, 0]] * a[[2, 1]]) * inv_det;
    let adj22 = (a[[0, 0]] * a[[1, 1]] - a[[0, 1]] * a[[1, 0]]) * inv_det;

    Some([
        adj00 * b[0] + adj01 * b[1] + adj02 * b[2],
        adj10 * b[0] + adj11 * b[1] + adj12 * b[2],
        adj20 * b[0] + adj21 * b[1] + adj22 * b[2],
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_anchors(height: f64) -> Vec<Point3> {
        vec![
            Point3::new(0.0, 0.0, height),
            Point3::new(100.0, 0.0, height),
            Point3::new(0.0, 100.0, height),
            Point3::new(100.0, 100.0, height),
        ]
    }

    fn ranges_from(anchors: &[Point3], truth: &Point3) -> Vec<f64> {
        anchors.iter().map(|a| truth.distance_to(a)).collect()
    }

    #[test]
    fn test_recovers_known_ground_position() {
        let anchors = square_anchors(3.0);
        let truth = Point3::new(30.0, 40.0, 0.0);
        let ranges = ranges_from(&anchors, &truth);

        let result = solve(&anchors, &ranges, 0.0, &SolverConfig::default()).unwrap();
        assert!(result.converged);
        // Coplanar anchors leave the z sign ambiguous; x/y are unique
        assert!((result.position.x - truth.x).abs() < 1e-3);
        assert!((result.position.y - truth.y).abs() < 1e-3);
        assert!(result.residual_norm < 1e-6);
    }

    #[test]
    fn test_recovers_3d_position_with_varied_heights() {
        let anchors = vec![
            Point3::new(0.0, 0.0, 3.0),
            Point3::new(100.0, 0.0, 5.0),
            Point3::new(0.0, 100.0, 8.0),
            Point3::new(100.0, 100.0, 2.0),
        ];
        let truth = Point3::new(42.0, 31.0, 1.5);
        let ranges = ranges_from(&anchors, &truth);

        let result = solve(&anchors, &ranges, 0.0, &SolverConfig::default()).unwrap();
        assert!(result.converged);
        assert!((result.position.x - truth.x).abs() < 1e-3);
        assert!((result.position.y - truth.y).abs() < 1e-3);
        assert!((result.position.z - truth.z).abs() < 1e-2);
    }

    #[test]
    fn test_equal_ranges_land_on_center() {
        let anchors = square_anchors(3.0);
        let ranges = vec![100.0; 4];

        let result = solve(&anchors, &ranges, 0.0, &SolverConfig::default()).unwrap();
        assert!(result.converged);
        assert!((result.position.x - 50.0).abs() < 1e-6);
        assert!((result.position.y - 50.0).abs() < 1e-6);
        assert!(result.residual_norm < 1e-9);
    }

    #[test]
    fn test_exhausted_budget_returns_centroid() {
        let anchors = square_anchors(3.0);
        let truth = Point3::new(20.0, 70.0, 0.0);
        let ranges = ranges_from(&anchors, &truth);
        let config = SolverConfig {
            max_iterations: 1,
            tolerance: 1e-12,
        };

        let result = solve(&anchors, &ranges, 0.0, &config).unwrap();
        assert!(!result.converged);
        assert_eq!(result.iterations, 1);
        assert!((result.position.x - 50.0).abs() < 1e-9);
        assert!((result.position.y - 50.0).abs() < 1e-9);
        assert_eq!(result.position.z, 0.0);
    }

    #[test]
    fn test_rejects_degenerate_input() {
        let anchors = square_anchors(3.0);
        assert!(solve(&anchors[..2], &[10.0, 20.0], 0.0, &SolverConfig::default()).is_none());
        assert!(solve(&anchors, &[10.0, 20.0], 0.0, &SolverConfig::default()).is_none());
    }

    #[test]
    fn test_solve_3x3_identity() {
        let a = Array2::eye(3);
        let b = Array1::from(vec![1.0, 2.0, 3.0]);
        let x = solve_3x3(&a, &b).unwrap();
        assert!((x[0] - 1.0).abs() < 1e-12);
        assert!((x[1] - 2.0).abs() < 1e-12);
        assert!((x[2] - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_solve_3x3_singular() {
        let a = Array2::zeros((3, 3));
        let b = Array1::from(vec![1.0, 2.0, 3.0]);
        assert!(solve_3x3(&a, &b).is_none());
    }
}
