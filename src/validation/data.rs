//! Pre-flight validation of caller-supplied ellipses

use crate::core::Ellipse;
use crate::validation::error::{FusionError, FusionResult};

/// Checks applied to every contributor before a fusion run
#[derive(Debug, Clone)]
pub struct InputValidator {
    /// Largest accepted semi-major axis (km)
    pub max_axis_km: f64,
    /// Accepted altitude band (km)
    pub altitude_range_km: (f64, f64),
}

impl Default for InputValidator {
    fn default() -> Self {
        Self {
            max_axis_km: 20_000.0,
            altitude_range_km: (-100.0, 100_000.0),
        }
    }
}

impl InputValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate one ellipse; `index` is only used for the error report.
    pub fn validate_ellipse(&self, index: usize, ellipse: &Ellipse) -> FusionResult<()> {
        let invalid = |reason: String| FusionError::InvalidEllipse { index, reason };

        let fields = [
            ("lat", ellipse.lat),
            ("lon", ellipse.lon),
            ("alt", ellipse.alt),
            ("sma", ellipse.sma),
            ("smi", ellipse.smi),
            ("orientation", ellipse.orientation),
        ];
        for (name, value) in fields {
            if !value.is_finite() {
                return Err(invalid(format!("{} is not finite", name)));
            }
        }

        if !(-90.0..=90.0).contains(&ellipse.lat) {
            return Err(invalid(format!("latitude {} outside [-90, 90]", ellipse.lat)));
        }
        if !(-180.0..=360.0).contains(&ellipse.lon) {
            return Err(invalid(format!("longitude {} outside [-180, 360]", ellipse.lon)));
        }
        let (min_alt, max_alt) = self.altitude_range_km;
        if ellipse.alt < min_alt || ellipse.alt > max_alt {
            return Err(invalid(format!("altitude {} km outside [{}, {}]", ellipse.alt, min_alt, max_alt)));
        }
        if ellipse.smi < 0.0 {
            return Err(invalid(format!("negative semi-minor axis {}", ellipse.smi)));
        }
        if ellipse.sma < ellipse.smi {
            return Err(invalid(format!(
                "semi-major axis {} smaller than semi-minor axis {}",
                ellipse.sma, ellipse.smi
            )));
        }
        if ellipse.sma > self.max_axis_km {
            return Err(invalid(format!("semi-major axis {} km exceeds {} km", ellipse.sma, self.max_axis_km)));
        }
        if let Some(sigma) = ellipse.elevation_uncertainty {
            if !sigma.is_finite() || sigma < 0.0 {
                return Err(invalid(format!("elevation uncertainty {} is not a non-negative number", sigma)));
            }
        }
        if let Some(precision) = &ellipse.precision {
            if precision.iter().any(|v| !v.is_finite()) {
                return Err(invalid("precision matrix has non-finite entries".to_string()));
            }
        }
        Ok(())
    }

    /// Validate a whole contributor list. An empty list is `InsufficientInput`.
    pub fn validate_all(&self, ellipses: &[Ellipse]) -> FusionResult<()> {
        if ellipses.is_empty() {
            return Err(FusionError::InsufficientInput { available: 0, required: 1 });
        }
        ellipses
            .iter()
            .enumerate()
            .try_for_each(|(index, ellipse)| self.validate_ellipse(index, ellipse))
    }
}
