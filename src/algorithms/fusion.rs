//! Weighted least squares fusion of position estimates

use nalgebra::{Matrix3, Vector3};
use tracing::debug;

use crate::algorithms::error_ellipse::horizontal_axes;
use crate::algorithms::linalg;
use crate::algorithms::precision::PrecisionMatrixBuilder;
use crate::core::{Ellipse, Position, CHI2_95_2DOF_SCALE};
use crate::processing::cache::{ContributorId, PrecisionCache};
use crate::validation::error::{FusionError, FusionResult};

/// Result of one weighted least squares pass
#[derive(Debug, Clone)]
pub struct FusedEstimate {
    /// Fused position in ECEF (km)
    pub ecef: Position,
    /// Fused position `(lat, lon, alt)`
    pub geodetic: Position,
    /// Accumulated precision `ΣP_i` (ECEF, 95% scaled)
    pub precision: Matrix3<f64>,
    /// Fused covariance `(ΣP_i)⁻¹` (ECEF, 95% scaled)
    pub covariance: Matrix3<f64>,
    /// Number of contributors in the pass
    pub contributors: usize,
}

impl FusedEstimate {
    /// New ellipse at the fused point, axes read off the model covariance
    pub fn to_ellipse(&self, builder: &PrecisionMatrixBuilder) -> Ellipse {
        let basis = builder.transform().enu_basis(&self.ecef, self.geodetic.z);
        let enu = linalg::rotate_back(&basis, &self.covariance);
        let (sma, smi, orientation) = horizontal_axes(&enu, 1.0);

        let mut ellipse = Ellipse::new(self.geodetic.x, self.geodetic.y, self.geodetic.z, sma, smi, orientation);
        ellipse.altitude_uncertainty = enu[(2, 2)].max(0.0).sqrt();
        ellipse.max_axis_length = linalg::max_eigenvalue_symmetric3(&enu).max(0.0).sqrt();
        ellipse.precision = Some(self.precision);
        ellipse
    }

    /// Fused covariance rescaled to 1-sigma
    pub fn one_sigma_covariance(&self) -> Matrix3<f64> {
        self.covariance / (CHI2_95_2DOF_SCALE * CHI2_95_2DOF_SCALE)
    }
}

/// Combines contributors by weighted least squares in ECEF:
/// `x = (ΣP_i)⁻¹ · ΣP_i·y_i`.
#[derive(Debug, Clone)]
pub struct PositionFuser {
    builder: PrecisionMatrixBuilder,
}

impl PositionFuser {
    pub fn new(builder: PrecisionMatrixBuilder) -> Self {
        Self { builder }
    }

    pub fn builder(&self) -> &PrecisionMatrixBuilder {
        &self.builder
    }

    /// Fuse the contributors named by `ids` from the run's arena
    pub fn fuse(
        &self,
        arena: &[Ellipse],
        ids: &[ContributorId],
        cache: &mut PrecisionCache,
    ) -> FusionResult<FusedEstimate> {
        if ids.is_empty() {
            return Err(FusionError::InsufficientInput { available: 0, required: 1 });
        }

        let mut precision_sum = Matrix3::zeros();
        let mut weighted_sum = Vector3::zeros();
        for &id in ids {
            let ellipse = &arena[id];
            let precision = cache.precision(id, ellipse, &self.builder)?;
            let position = cache.position(id, ellipse, &self.builder);
            precision_sum += precision;
            weighted_sum += precision * position;
        }
        let precision_sum = linalg::symmetrize(&precision_sum);

        let covariance = linalg::invert_symmetric3(&precision_sum)
            .ok_or(FusionError::SingularSystem { contributors: ids.len() })?;
        let ecef = covariance * weighted_sum;
        if !ecef.iter().all(|v| v.is_finite()) {
            return Err(FusionError::unstable("weighted least squares solve"));
        }

        let geodetic = self.builder.transform().to_geodetic(&ecef);
        debug!(
            contributors = ids.len(),
            lat = geodetic.x,
            lon = geodetic.y,
            alt = geodetic.z,
            "fused position"
        );

        Ok(FusedEstimate {
            ecef,
            geodetic,
            precision: precision_sum,
            covariance,
            contributors: ids.len(),
        })
    }

    /// Fuse a plain slice of ellipses with a throwaway cache
    pub fn fuse_all(&self, ellipses: &[Ellipse]) -> FusionResult<FusedEstimate> {
        let ids: Vec<ContributorId> = (0..ellipses.len()).collect();
        let mut cache = PrecisionCache::with_capacity(ellipses.len());
        self.fuse(ellipses, &ids, &mut cache)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::config::FusionConfig;
    use approx::assert_relative_eq;

    fn fuser() -> PositionFuser {
        PositionFuser::new(PrecisionMatrixBuilder::new(&FusionConfig::default()))
    }

    #[test]
    fn test_identical_contributors_halve_covariance() {
        let fuser = fuser();
        let single = Ellipse::circular(45.0, -93.0, 0.0, 1.0);
        let one = fuser.fuse_all(&[single.clone()]).unwrap();
        let two = fuser.fuse_all(&[single.clone(), single.clone()]).unwrap();

        assert!((two.ecef - one.ecef).norm() < 1e-9);
        assert_relative_eq!(two.covariance.trace(), one.covariance.trace() / 2.0, max_relative = 1e-9);
        assert_relative_eq!(two.geodetic.x, 45.0, epsilon = 1e-9);
        assert_relative_eq!(two.geodetic.y, -93.0, epsilon = 1e-9);
    }

    #[test]
    fn test_weights_pull_towards_tighter_contributor() {
        let fuser = fuser();
        let tight = Ellipse::circular(10.0, 10.0, 0.0, 0.5);
        let loose = Ellipse::circular(10.0, 10.1, 0.0, 5.0);
        let fused = fuser.fuse_all(&[tight, loose]).unwrap();
        // 100:1 weight ratio in the horizontal plane
        assert!((fused.geodetic.y - 10.0).abs() < 0.002);
    }

    #[test]
    fn test_singular_precision_reported() {
        let fuser = fuser();
        let mut ellipse = Ellipse::circular(0.0, 0.0, 0.0, 1.0);
        let mut rank_two = Matrix3::identity();
        rank_two[(2, 2)] = 0.0;
        ellipse.precision = Some(rank_two);
        assert_eq!(
            fuser.fuse_all(&[ellipse]).unwrap_err(),
            FusionError::SingularSystem { contributors: 1 }
        );
    }

    #[test]
    fn test_empty_input() {
        assert!(matches!(
            fuser().fuse_all(&[]),
            Err(FusionError::InsufficientInput { .. })
        ));
    }

    #[test]
    fn test_to_ellipse_recovers_single_input_axes() {
        let builder = PrecisionMatrixBuilder::new(&FusionConfig::default());
        let fuser = PositionFuser::new(builder.clone());
        let input = Ellipse::new(45.0, -93.0, 0.0, 3.0, 1.0, 40.0);
        let fused = fuser.fuse_all(&[input]).unwrap().to_ellipse(&builder);

        assert_relative_eq!(fused.sma, 3.0, max_relative = 1e-6);
        assert_relative_eq!(fused.smi, 1.0, max_relative = 1e-6);
        assert_relative_eq!(fused.orientation, 40.0, epsilon = 1e-4);
        assert!(fused.precision.is_some());
    }
}
