//! Altitude spread safeguard for the final ellipse

use tracing::debug;

use crate::core::{Ellipse, ALTITUDE_SPREAD_MAX_FACTOR, ALTITUDE_SPREAD_MIN_FACTOR};

/// Inflates the final ellipse when the raw contributor altitudes spread
/// further than the modelled altitude uncertainty.
///
/// `factor = clamp(max|alt_i - fused_alt| / altitude_uncertainty, 1.0, 2.5)`
/// is applied to `sma`, `smi`, `altitude_uncertainty` and `max_axis_length`.
/// This is a heuristic, not a statistical correction.
#[derive(Debug, Clone, Copy)]
pub struct AltitudeVarianceAdjuster {
    min_factor: f64,
    max_factor: f64,
}

impl Default for AltitudeVarianceAdjuster {
    fn default() -> Self {
        Self {
            min_factor: ALTITUDE_SPREAD_MIN_FACTOR,
            max_factor: ALTITUDE_SPREAD_MAX_FACTOR,
        }
    }
}

impl AltitudeVarianceAdjuster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inflation factor for `ellipse` given the raw altitudes (km)
    pub fn factor(&self, ellipse: &Ellipse, altitudes: impl IntoIterator<Item = f64>) -> f64 {
        let spread = altitudes
            .into_iter()
            .map(|alt| (alt - ellipse.alt).abs())
            .fold(0.0_f64, f64::max);

        if spread <= 0.0 {
            return self.min_factor;
        }
        // Zero uncertainty with a real spread saturates at the cap
        let ratio = if ellipse.altitude_uncertainty > 0.0 {
            spread / ellipse.altitude_uncertainty
        } else {
            f64::INFINITY
        };
        ratio.clamp(self.min_factor, self.max_factor)
    }

    /// Apply the factor in place and return it
    pub fn adjust(&self, ellipse: &mut Ellipse, altitudes: impl IntoIterator<Item = f64>) -> f64 {
        let factor = self.factor(ellipse, altitudes);
        if factor > self.min_factor {
            ellipse.sma *= factor;
            ellipse.smi *= factor;
            ellipse.altitude_uncertainty *= factor;
            ellipse.max_axis_length *= factor;
            debug!(factor, "altitude spread inflated final ellipse");
        }
        factor
    }
}
