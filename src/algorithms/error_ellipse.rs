//! Final confidence ellipse estimation
//!
//! The fused model covariance is inflated by the observed chi-square of the
//! surviving contributors and blended with the scatter of their misses.
//! Two details are kept exactly as calibrated and should not be
//! "corrected" without re-deriving the calibration:
//!
//! * the scatter term only uses each miss projected on the contributor's
//!   own minor-axis direction, not the full horizontal residual;
//! * the scatter term is divided by `n²`, not `n` or `n - 1`.

use nalgebra::{Matrix3, Vector3};
use tracing::debug;

use crate::algorithms::fusion::FusedEstimate;
use crate::algorithms::geodetic::GeodeticTransform;
use crate::algorithms::linalg;
use crate::algorithms::outlier::Residual;
use crate::core::{normalize_orientation, Ellipse, CHI2_95_2DOF_SCALE};
use crate::validation::error::{FusionError, FusionResult};

/// Semi-axes and orientation of the horizontal block of an ENU covariance.
///
/// Returns `(sma, smi, orientation_deg)` with axes `sqrt(eigenvalue) * scale`
/// and the orientation clockwise from north, normalized into `[0, 180)`.
pub fn horizontal_axes(enu_covariance: &Matrix3<f64>, scale: f64) -> (f64, f64, f64) {
    let block = linalg::horizontal_block(enu_covariance);
    let (largest, smallest) = linalg::eigenvalues_symmetric2(&block);
    let sma = largest.max(0.0).sqrt() * scale;
    let smi = smallest.max(0.0).sqrt() * scale;

    let orientation = 0.5
        * (2.0 * block[(0, 1)])
            .atan2(block[(1, 1)] - block[(0, 0)])
            .to_degrees();
    (sma, smi, normalize_orientation(orientation.rem_euclid(180.0)))
}

/// Intermediate values of an estimate, kept for diagnostics
#[derive(Debug, Clone)]
pub struct EllipseDiagnostics {
    /// Sum of contributor norms converted to 1-sigma chi-square
    pub chi2_one_sigma: f64,
    /// `(chi2 + 1) / n`
    pub inflation_factor: f64,
    /// Minor-axis residual scatter in ENU before the `n²` divisor
    pub minor_axis_scatter: Matrix3<f64>,
    /// Final blended ENU covariance (1-sigma)
    pub blended_covariance: Matrix3<f64>,
}

/// Produces the final 95% confidence ellipse of a converged fusion
#[derive(Debug, Clone, Default)]
pub struct ErrorEllipseEstimator {
    transform: GeodeticTransform,
}

impl ErrorEllipseEstimator {
    pub fn new(transform: GeodeticTransform) -> Self {
        Self { transform }
    }

    /// Estimate the final ellipse from the fused estimate and the residuals
    /// of the surviving contributors.
    pub fn estimate(
        &self,
        fused: &FusedEstimate,
        arena: &[Ellipse],
        residuals: &[Residual],
    ) -> FusionResult<(Ellipse, EllipseDiagnostics)> {
        let n = residuals.len();
        if n == 0 {
            return Err(FusionError::InsufficientInput { available: 0, required: 1 });
        }
        let n_f = n as f64;
        let k2 = CHI2_95_2DOF_SCALE * CHI2_95_2DOF_SCALE;

        let chi2_one_sigma = residuals.iter().map(|r| r.norm2).sum::<f64>() * k2;
        let inflation_factor = (chi2_one_sigma + 1.0) / n_f;
        let model_covariance = fused.one_sigma_covariance() * inflation_factor;

        let basis = self.transform.enu_basis(&fused.ecef, fused.geodetic.z);

        let mut minor_axis_scatter = Matrix3::zeros();
        for residual in residuals {
            let theta = normalize_orientation(arena[residual.id].orientation).to_radians();
            let minor = Vector3::new(theta.cos(), -theta.sin(), 0.0);
            let outer_enu = linalg::rotate_back(&basis, &residual.outer_product);
            let miss2 = (minor.transpose() * outer_enu * minor)[0];
            minor_axis_scatter += minor * minor.transpose() * miss2;
        }

        let blended = linalg::rotate_back(&basis, &model_covariance) + minor_axis_scatter / (n_f * n_f);
        if !linalg::is_finite(&blended) {
            return Err(FusionError::unstable("error ellipse covariance"));
        }

        let (sma, smi, orientation) = horizontal_axes(&blended, CHI2_95_2DOF_SCALE);
        let altitude_uncertainty = blended[(2, 2)].max(0.0).sqrt() * CHI2_95_2DOF_SCALE;
        let max_axis_length = linalg::max_eigenvalue_symmetric3(&blended).max(0.0).sqrt() * CHI2_95_2DOF_SCALE;

        let derived = [sma, smi, orientation, altitude_uncertainty, max_axis_length];
        if derived.iter().any(|v| !v.is_finite()) {
            return Err(FusionError::unstable("error ellipse axes"));
        }

        debug!(
            contributors = n,
            chi2 = chi2_one_sigma,
            inflation = inflation_factor,
            sma,
            smi,
            orientation,
            "error ellipse estimated"
        );

        let mut ellipse = Ellipse::new(fused.geodetic.x, fused.geodetic.y, fused.geodetic.z, sma, smi, orientation);
        ellipse.altitude_uncertainty = altitude_uncertainty;
        ellipse.max_axis_length = max_axis_length;
        ellipse.precision = Some(fused.precision);

        let diagnostics = EllipseDiagnostics {
            chi2_one_sigma,
            inflation_factor,
            minor_axis_scatter,
            blended_covariance: blended,
        };
        Ok((ellipse, diagnostics))
    }
}
