//! Urban-micro path-loss model and its inversion
//!
//! Turns encoded SINR observations into 3D anchor distances. The
//! forward model evaluates both propagation regimes and the larger loss
//! wins; the inversion tries each regime and keeps the first whose
//! forward re-evaluation is self-consistent. Distances are 3D (slant)
//! throughout, clamped to [1, 5000] m.

use ranloc_common::{RadioConfig, Regime};

/// Encoded-SINR scale: raw values span 0-127 over a 63 dB range.
const SINR_SCALE: f64 = 63.0 / 127.0;
/// Encoded-SINR offset (dB).
const SINR_OFFSET_DB: f64 = -23.0;

/// Lower clamp for inverted distances (meters).
pub const MIN_DISTANCE_M: f64 = 1.0;
/// Upper clamp for inverted distances (meters).
pub const MAX_DISTANCE_M: f64 = 5000.0;
/// Distance substituted when no regime inverts self-consistently.
pub const DEFAULT_DISTANCE_M: f64 = 100.0;

/// Self-consistency acceptance tolerance (dB).
const ACCEPT_TOLERANCE_DB: f64 = 1.0;

/// Search interval for the above-breakpoint bisection (meters).
const BISECT_LOW_M: f64 = 50.0;
const BISECT_HIGH_M: f64 = 2000.0;
/// Bisection iteration cap.
const BISECT_MAX_ITERATIONS: usize = 20;
/// Bisection early-stop tolerance (dB); bounds latency, leaves a small
/// residual bias proportional to the distance.
const BISECT_TOLERANCE_DB: f64 = 0.1;

/// Propagation speed assumed by the breakpoint formula (m/s).
const PROPAGATION_SPEED: f64 = 3.0e8;

/// Result of one SINR-to-distance inversion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Inversion {
    /// Inverted 3D distance (meters), clamped to [1, 5000]
    pub distance_3d: f64,
    /// Regime the accepted inversion used, `None` on fallback
    pub regime: Option<Regime>,
    /// True when the default distance was substituted
    pub fallback: bool,
}

/// Calibrated path-loss model for one deployment.
///
/// The radio constants come from the simulation the SINR encoding
/// originates in; nothing here is trained or updated at runtime.
#[derive(Debug, Clone, Copy)]
pub struct PropagationModel {
    radio: RadioConfig,
    frequency_ghz: f64,
    /// 2D breakpoint distance separating the two line-of-sight
    /// branches; negative for ground-level entities, which parks the
    /// model on the steeper branch permanently
    breakpoint_m: f64,
}

impl PropagationModel {
    pub fn new(radio: RadioConfig) -> Self {
        let breakpoint_m = 4.0
            * (radio.anchor_height_m - radio.env_height_m)
            * (radio.entity_height_m - radio.env_height_m)
            * radio.frequency_hz
            / PROPAGATION_SPEED;
        Self {
            radio,
            frequency_ghz: radio.frequency_hz / 1e9,
            breakpoint_m,
        }
    }

    /// Decodes a raw 0-127 scale SINR value to dB.
    pub fn sinr_db_from_raw(&self, sinr_raw: f64) -> f64 {
        sinr_raw * SINR_SCALE + SINR_OFFSET_DB
    }

    /// Path loss implied by a raw SINR observation (dB).
    pub fn path_loss_from_sinr(&self, sinr_raw: f64) -> f64 {
        let rx_power_dbm = self.sinr_db_from_raw(sinr_raw) + self.radio.noise_floor_dbm;
        self.radio.tx_power_dbm - rx_power_dbm
    }

    /// Re-encodes a path loss onto the raw wire scale. Inverse of
    /// `path_loss_from_sinr`; used by traffic generators and tests.
    pub fn sinr_raw_from_path_loss(&self, path_loss_db: f64) -> f64 {
        let rx_power_dbm = self.radio.tx_power_dbm - path_loss_db;
        let sinr_db = rx_power_dbm - self.radio.noise_floor_dbm;
        (sinr_db - SINR_OFFSET_DB) / SINR_SCALE
    }

    /// Forward model: path loss at a 3D distance, tagged with the
    /// dominant regime. `distance_3d` must be positive.
    pub fn path_loss_at(&self, distance_3d: f64) -> (f64, Regime) {
        let height_delta = self.radio.anchor_height_m - self.radio.entity_height_m;
        let distance_2d = (distance_3d.powi(2) - height_delta.powi(2)).max(0.0).sqrt();

        let pl_los = if distance_2d <= self.breakpoint_m {
            32.4 + 21.0 * distance_3d.log10() + 20.0 * self.frequency_ghz.log10()
        } else {
            32.4 + 40.0 * distance_3d.log10() + 20.0 * self.frequency_ghz.log10()
                - 9.5 * (self.breakpoint_m.powi(2) + height_delta.powi(2)).log10()
        };

        let pl_nlos = 22.4 + 35.3 * distance_3d.log10() + 21.3 * self.frequency_ghz.log10()
            - 0.3 * (self.radio.entity_height_m - 1.5);

        if pl_los >= pl_nlos {
            (pl_los, Regime::Los)
        } else {
            (pl_nlos, Regime::Nlos)
        }
    }

    /// Inverts a path loss under the assumption of one regime.
    ///
    /// NLOS and the below-breakpoint LOS branch invert in closed form;
    /// the above-breakpoint LOS branch falls back to bisection. The
    /// result is clamped to [1, 5000] m before any self-consistency
    /// check the caller performs.
    pub fn invert_regime(&self, path_loss_db: f64, regime: Regime) -> f64 {
        match regime {
            Regime::Los => {
                let exponent =
                    (path_loss_db - 32.4 - 20.0 * self.frequency_ghz.log10()) / 21.0;
                let distance_3d = 10f64.powf(exponent);
                let height_delta = self.radio.anchor_height_m - self.radio.entity_height_m;
                let distance_2d = (distance_3d.powi(2) - height_delta.powi(2)).max(0.0).sqrt();
                if distance_2d <= self.breakpoint_m {
                    distance_3d.clamp(MIN_DISTANCE_M, MAX_DISTANCE_M)
                } else {
                    self.bisect_los_above_breakpoint(path_loss_db)
                }
            }
            Regime::Nlos => {
                let exponent = (path_loss_db - 22.4 - 21.3 * self.frequency_ghz.log10()
                    + 0.3 * (self.radio.entity_height_m - 1.5))
                    / 35.3;
                10f64.powf(exponent).clamp(MIN_DISTANCE_M, MAX_DISTANCE_M)
            }
        }
    }

    /// Bisection over the steeper line-of-sight branch. Stops early
    /// when the forward loss lands within 0.1 dB of the target; after
    /// the iteration cap the last midpoint stands.
    fn bisect_los_above_breakpoint(&self, target_db: f64) -> f64 {
        let mut low = BISECT_LOW_M;
        let mut high = BISECT_HIGH_M;
        let mut mid = (low + high) / 2.0;

        for _ in 0..BISECT_MAX_ITERATIONS {
            mid = (low + high) / 2.0;
            let (calculated, _) = self.path_loss_at(mid);
            if (calculated - target_db).abs() < BISECT_TOLERANCE_DB {
                return mid;
            } else if calculated < target_db {
                low = mid;
            } else {
                high = mid;
            }
        }

        mid
    }

    /// Full inversion chain: raw SINR to a 3D distance.
    ///
    /// Tries LOS then NLOS; a regime is accepted when the forward loss
    /// at the inverted distance is within 1 dB of the target AND the
    /// dominant regime there matches the assumed one. When neither
    /// regime is self-consistent the default distance applies.
    pub fn distance_from_sinr(&self, sinr_raw: f64) -> Inversion {
        let path_loss_db = self.path_loss_from_sinr(sinr_raw);

        for regime in [Regime::Los, Regime::Nlos] {
            let distance_3d = self.invert_regime(path_loss_db, regime);
            let (calculated, dominant) = self.path_loss_at(distance_3d);
            if (calculated - path_loss_db).abs() < ACCEPT_TOLERANCE_DB && dominant == regime {
                return Inversion {
                    distance_3d,
                    regime: Some(regime),
                    fallback: false,
                };
            }
        }

        Inversion {
            distance_3d: DEFAULT_DISTANCE_M,
            regime: None,
            fallback: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> PropagationModel {
        PropagationModel::new(RadioConfig::default())
    }

    #[test]
    fn test_sinr_decode() {
        let m = model();
        assert!((m.sinr_db_from_raw(0.0) - (-23.0)).abs() < 1e-9);
        assert!((m.sinr_db_from_raw(127.0) - 40.0).abs() < 1e-9);
        // raw 0 -> -23 dB SINR -> -119 dBm received -> 149 dB loss
        assert!((m.path_loss_from_sinr(0.0) - 149.0).abs() < 1e-9);
        assert!((m.sinr_raw_from_path_loss(149.0) - 0.0).abs() < 1e-9);
        assert!((m.sinr_raw_from_path_loss(m.path_loss_from_sinr(42.0)) - 42.0).abs() < 1e-9);
    }

    #[test]
    fn test_forward_monotonic_and_nlos_dominant() {
        let m = model();
        let mut previous = f64::MIN;
        for d in [1.0, 5.0, 20.0, 100.0, 500.0, 2000.0, 5000.0] {
            let (pl, regime) = m.path_loss_at(d);
            assert!(pl > previous, "loss not monotonic at {d}");
            // Ground-level entities give a negative breakpoint, NLOS
            // dominates across the whole clamp range
            assert_eq!(regime, Regime::Nlos);
            previous = pl;
        }
    }

    #[test]
    fn test_nlos_round_trip_within_half_meter() {
        let m = model();
        for d in [1.5, 10.0, 50.0, 100.0, 700.0, 3000.0, 4999.0] {
            let (pl, regime) = m.path_loss_at(d);
            assert_eq!(regime, Regime::Nlos);
            let inverted = m.invert_regime(pl, Regime::Nlos);
            assert!((inverted - d).abs() < 0.5, "d={d} inverted={inverted}");
        }
    }

    #[test]
    fn test_los_closed_form_round_trip() {
        // Elevated entity: positive breakpoint, short ranges LOS-dominant
        let radio = RadioConfig {
            anchor_height_m: 10.0,
            entity_height_m: 2.0,
            ..RadioConfig::default()
        };
        let m = PropagationModel::new(radio);
        assert!(m.breakpoint_m > 0.0);

        let (pl, regime) = m.path_loss_at(4.0);
        assert_eq!(regime, Regime::Los);
        let inverted = m.invert_regime(pl, Regime::Los);
        assert!((inverted - 4.0).abs() < 0.5, "inverted={inverted}");
    }

    #[test]
    fn test_bisection_round_trip_los_dominant_geometry() {
        // Entity just above the environment height: tiny positive
        // breakpoint, the steep LOS branch dominates everywhere
        let radio = RadioConfig {
            entity_height_m: 1.02,
            ..RadioConfig::default()
        };
        let m = PropagationModel::new(radio);

        let (pl, regime) = m.path_loss_at(60.0);
        assert_eq!(regime, Regime::Los);
        let inverted = m.invert_regime(pl, Regime::Los);
        assert!((inverted - 60.0).abs() < 0.5, "inverted={inverted}");

        // The 0.1 dB early stop scales with distance on this branch
        let (pl_far, _) = m.path_loss_at(800.0);
        let inverted_far = m.invert_regime(pl_far, Regime::Los);
        assert!((inverted_far - 800.0).abs() < 8.0, "inverted={inverted_far}");
    }

    #[test]
    fn test_selection_accepts_nlos_on_default_geometry() {
        let m = model();
        let (pl, _) = m.path_loss_at(250.0);
        // Re-encode the loss to the raw scale the wire carries
        let sinr_db = m.radio.tx_power_dbm - pl - m.radio.noise_floor_dbm;
        let raw = (sinr_db - SINR_OFFSET_DB) / SINR_SCALE;

        let inversion = m.distance_from_sinr(raw);
        assert!(!inversion.fallback);
        assert_eq!(inversion.regime, Some(Regime::Nlos));
        assert!((inversion.distance_3d - 250.0).abs() < 0.5);
    }

    #[test]
    fn test_extreme_sinr_falls_back_to_default() {
        let m = model();
        // Decodes to a ~191 dB loss, far beyond the clamp range
        let inversion = m.distance_from_sinr(-85.0);
        assert!(inversion.fallback);
        assert_eq!(inversion.regime, None);
        assert_eq!(inversion.distance_3d, DEFAULT_DISTANCE_M);
    }

    #[test]
    fn test_inverted_distances_stay_clamped() {
        let m = model();
        assert_eq!(m.invert_regime(500.0, Regime::Nlos), MAX_DISTANCE_M);
        assert_eq!(m.invert_regime(0.0, Regime::Nlos), MIN_DISTANCE_M);
    }
}
