//! Three-baseline linear predictor used to sharpen delta baselines.
//!
//! All arithmetic is integer with 1/16 fixed-point fractions and
//! truncating division, so sender and receiver compute identical results
//! on every platform.

use crate::Tick;

/// Fixed-point fractions derived from the target tick and three baseline
/// ticks (`b0` newest).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeltaPredictor {
    predict_frac: i64,
    apply_frac: i64,
    enabled: bool,
}

impl DeltaPredictor {
    /// Builds a predictor for extrapolating from `b0` to `target`.
    ///
    /// Equal baseline ticks disable extrapolation.
    #[must_use]
    pub fn new(target: Tick, b0: Tick, b1: Tick, b2: Tick) -> Self {
        let span01 = i64::from(b0.signed_diff(b1));
        let span12 = i64::from(b1.signed_diff(b2));
        if span01 == 0 || span12 == 0 {
            return Self::disabled();
        }
        let ahead = i64::from(target.signed_diff(b0));
        Self {
            predict_frac: 16 * span01 / span12,
            apply_frac: 16 * ahead / span01,
            enabled: true,
        }
    }

    /// A predictor that always returns the newest baseline value.
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            predict_frac: 0,
            apply_frac: 0,
            enabled: false,
        }
    }

    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Predicts the value at the target tick from three baseline values.
    ///
    /// The older pair predicts where `v0` should be; if `v0` is not closer
    /// to that prediction than to `v1`, motion is not linear and `v0` is
    /// returned unchanged.
    #[must_use]
    pub fn predict(&self, v0: i32, v1: i32, v2: i32) -> i32 {
        if !self.enabled {
            return v0;
        }
        let (v0, v1, v2) = (i128::from(v0), i128::from(v1), i128::from(v2));
        let predicted = v1 + (v1 - v2) * i128::from(self.predict_frac) / 16;
        let delta = v0 - v1;
        if (v0 - predicted).abs() >= delta.abs() {
            return v0 as i32;
        }
        (v0 + delta * i128::from(self.apply_frac) / 16) as i32
    }
}
