//! Ellipse to ECEF precision matrix conversion

use nalgebra::{Matrix3, Vector2};

use crate::algorithms::geodetic::GeodeticTransform;
use crate::algorithms::linalg;
use crate::core::{normalize_orientation, Ellipse, Position, CHI2_95_2DOF_SCALE};
use crate::utils::config::FusionConfig;
use crate::validation::error::{FusionError, FusionResult};

/// Builds the precision (inverse covariance) matrix of an ellipse in ECEF.
///
/// Precisions are 95% scaled: `deltaᵀ P delta == 1` on the ellipse boundary.
#[derive(Debug, Clone)]
pub struct PrecisionMatrixBuilder {
    transform: GeodeticTransform,
    /// Axis floor (km), applied unconditionally
    min_axis: f64,
    /// 1-sigma vertical uncertainty used when the ellipse has none (km)
    default_elevation_uncertainty: f64,
}

impl PrecisionMatrixBuilder {
    pub fn new(config: &FusionConfig) -> Self {
        Self {
            transform: GeodeticTransform::wgs84(),
            min_axis: config.min_ellipse_axis,
            default_elevation_uncertainty: config.elevation_uncertainty,
        }
    }

    pub fn transform(&self) -> &GeodeticTransform {
        &self.transform
    }

    /// ECEF position of an ellipse's centre
    pub fn ecef_position(&self, ellipse: &Ellipse) -> Position {
        self.transform.to_ecef(ellipse.lat, ellipse.lon, ellipse.alt)
    }

    /// Semi-axes after the floor, `(major, minor)`
    pub fn floored_axes(&self, ellipse: &Ellipse) -> (f64, f64) {
        let sma = ellipse.sma.max(self.min_axis);
        let smi = ellipse.smi.max(self.min_axis);
        if smi > sma {
            (smi, sma)
        } else {
            (sma, smi)
        }
    }

    /// Precision in the ellipse's local ENU frame.
    ///
    /// The vertical 95% extent uses the same 2-DOF factor as the horizontal
    /// axes rather than a 3-DOF quantile.
    pub fn enu_precision(&self, ellipse: &Ellipse) -> Matrix3<f64> {
        let (sma, smi) = self.floored_axes(ellipse);
        let theta = normalize_orientation(ellipse.orientation).to_radians();
        let (sin_t, cos_t) = theta.sin_cos();

        let major = Vector2::new(sin_t, cos_t);
        let minor = Vector2::new(cos_t, -sin_t);
        let horizontal = major * major.transpose() / (sma * sma) + minor * minor.transpose() / (smi * smi);

        let sigma = ellipse
            .elevation_uncertainty
            .unwrap_or(self.default_elevation_uncertainty);
        let vertical_extent = (sigma * CHI2_95_2DOF_SCALE).max(self.min_axis);

        let mut precision = Matrix3::zeros();
        precision.fixed_view_mut::<2, 2>(0, 0).copy_from(&horizontal);
        precision[(2, 2)] = 1.0 / (vertical_extent * vertical_extent);
        precision
    }

    /// ECEF precision matrix, `R · P_enu · Rᵀ` with `R` the ENU basis at the
    /// ellipse centre. A precision already carried by the ellipse is returned
    /// as is.
    pub fn build(&self, ellipse: &Ellipse) -> FusionResult<Matrix3<f64>> {
        if let Some(precision) = ellipse.precision {
            return Ok(linalg::symmetrize(&precision));
        }

        let ecef = self.ecef_position(ellipse);
        let basis = self.transform.enu_basis(&ecef, ellipse.alt);
        let precision = linalg::rotate(&basis, &self.enu_precision(ellipse));

        if linalg::is_finite(&precision) {
            Ok(precision)
        } else {
            Err(FusionError::unstable(format!("precision matrix of {}", ellipse.display_name())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    fn builder() -> PrecisionMatrixBuilder {
        PrecisionMatrixBuilder::new(&FusionConfig::default())
    }

    #[test]
    fn test_circular_enu_precision() {
        let ellipse = Ellipse::circular(45.0, -93.0, 0.0, 2.0).with_elevation_uncertainty(1.0);
        let p = builder().enu_precision(&ellipse);
        assert_relative_eq!(p[(0, 0)], 0.25, epsilon = 1e-12);
        assert_relative_eq!(p[(1, 1)], 0.25, epsilon = 1e-12);
        assert!(p[(0, 1)].abs() < 1e-12);
        assert_relative_eq!(p[(2, 2)], 1.0 / (CHI2_95_2DOF_SCALE * CHI2_95_2DOF_SCALE), epsilon = 1e-12);
    }

    #[test]
    fn test_boundary_has_unit_norm() {
        // Major axis 30 degrees east of north
        let ellipse = Ellipse::new(10.0, 20.0, 0.0, 4.0, 1.0, 30.0);
        let p = builder().enu_precision(&ellipse);
        let theta = 30.0_f64.to_radians();

        let on_major = Vector3::new(4.0 * theta.sin(), 4.0 * theta.cos(), 0.0);
        assert_relative_eq!((on_major.transpose() * p * on_major)[0], 1.0, epsilon = 1e-12);

        let on_minor = Vector3::new(theta.cos(), -theta.sin(), 0.0);
        assert_relative_eq!((on_minor.transpose() * p * on_minor)[0], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_orientation_normalization_is_equivalent() {
        let b = builder();
        let wrapped = b.enu_precision(&Ellipse { orientation: 370.0, ..Ellipse::new(0.0, 0.0, 0.0, 3.0, 1.0, 0.0) });
        let plain = b.enu_precision(&Ellipse::new(0.0, 0.0, 0.0, 3.0, 1.0, 10.0));
        assert!((wrapped - plain).norm() < 1e-12);

        let negative = b.enu_precision(&Ellipse { orientation: -10.0, ..Ellipse::new(0.0, 0.0, 0.0, 3.0, 1.0, 0.0) });
        let plain = b.enu_precision(&Ellipse::new(0.0, 0.0, 0.0, 3.0, 1.0, 350.0));
        assert!((negative - plain).norm() < 1e-12);
    }

    #[test]
    fn test_zero_axes_are_floored() {
        for use_modified in [true, false] {
            let config = FusionConfig { use_modified_ellipses: use_modified, ..FusionConfig::default() };
            let b = PrecisionMatrixBuilder::new(&config);
            let ellipse = Ellipse::new(45.0, -93.0, 0.0, 0.0, 0.0, 0.0);

            let p = b.build(&ellipse).unwrap();
            assert!(linalg::is_finite(&p));
            assert!(linalg::invert_symmetric3(&p).is_some());

            let enu = b.enu_precision(&ellipse);
            let floor = config.min_ellipse_axis;
            assert_relative_eq!(enu[(0, 0)], 1.0 / (floor * floor), max_relative = 1e-12);
        }
    }

    #[test]
    fn test_ecef_precision_preserves_quadratic_form() {
        let b = builder();
        let ellipse = Ellipse::new(45.0, -93.0, 0.0, 3.0, 1.0, 60.0);
        let ecef_p = b.build(&ellipse).unwrap();
        let enu_p = b.enu_precision(&ellipse);

        let basis = b.transform().enu_basis_at(&ellipse.geodetic());
        let enu = Vector3::new(0.7, -1.2, 0.05);
        let ecef = basis * enu;

        let q_enu = (enu.transpose() * enu_p * enu)[0];
        let q_ecef = (ecef.transpose() * ecef_p * ecef)[0];
        assert_relative_eq!(q_enu, q_ecef, max_relative = 1e-9);
    }

    #[test]
    fn test_carried_precision_is_used() {
        let mut ellipse = Ellipse::circular(0.0, 0.0, 0.0, 1.0);
        ellipse.precision = Some(Matrix3::identity() * 5.0);
        let p = builder().build(&ellipse).unwrap();
        assert_eq!(p, Matrix3::identity() * 5.0);
    }
}
