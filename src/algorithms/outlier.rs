//! Mahalanobis outlier scoring against the fused position

use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::algorithms::fusion::FusedEstimate;
use crate::algorithms::precision::PrecisionMatrixBuilder;
use crate::core::Ellipse;
use crate::processing::cache::{ContributorId, PrecisionCache};
use crate::utils::config::FusionConfig;
use crate::validation::error::{FusionError, FusionResult};

/// Miss of one contributor relative to the current fused point
#[derive(Debug, Clone)]
pub struct Residual {
    pub id: ContributorId,
    /// `ECEF(contributor) - ECEF(fused)` (km)
    pub delta: Vector3<f64>,
    /// `delta · deltaᵀ`
    pub outer_product: Matrix3<f64>,
    /// `deltaᵀ · P_contributor · delta`, 95% scaled
    pub norm2: f64,
}

impl Residual {
    /// Ellipse-norm distance; 1.0 is on the contributor's own boundary
    pub fn norm(&self) -> f64 {
        self.norm2.sqrt()
    }
}

/// Why a contributor was chosen as the outlier
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutlierReason {
    /// Largest ellipse norm and above the threshold
    NormExceeded { norm: f64 },
    /// Axis below the floor while modified ellipses are disabled
    DegenerateEllipse,
}

/// Result of one scoring pass
#[derive(Debug, Clone)]
pub struct OutlierScan {
    /// Residuals of every scored contributor, in candidate order
    pub residuals: Vec<Residual>,
    /// Contributor selected for removal, if any
    pub outlier: Option<(ContributorId, OutlierReason)>,
    /// Largest ellipse norm seen in the pass
    pub max_norm: f64,
}

/// Scores contributors with their own precision matrices and picks the
/// single worst offender.
#[derive(Debug, Clone)]
pub struct OutlierDetector {
    threshold: f64,
    min_axis: f64,
    use_modified_ellipses: bool,
}

impl OutlierDetector {
    pub fn new(config: &FusionConfig) -> Self {
        Self {
            threshold: config.ellipse_norm_threshold,
            min_axis: config.min_ellipse_axis,
            use_modified_ellipses: config.use_modified_ellipses,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Score every candidate against `fused`.
    ///
    /// Residuals are recomputed on every call since they depend on the
    /// current fused point. The norm uses each contributor's own precision,
    /// not the fused one.
    pub fn scan(
        &self,
        fused: &FusedEstimate,
        arena: &[Ellipse],
        candidates: &[ContributorId],
        cache: &mut PrecisionCache,
        builder: &PrecisionMatrixBuilder,
    ) -> FusionResult<OutlierScan> {
        let mut residuals = Vec::with_capacity(candidates.len());
        let mut worst: Option<(ContributorId, f64)> = None;
        let mut forced: Option<ContributorId> = None;

        for &id in candidates {
            let ellipse = &arena[id];
            let precision = cache.precision(id, ellipse, builder)?;
            let delta = cache.position(id, ellipse, builder) - fused.ecef;
            let norm2 = (delta.transpose() * precision * delta)[0];
            if !norm2.is_finite() {
                return Err(FusionError::unstable(format!("ellipse norm of {}", ellipse.display_name())));
            }

            if forced.is_none() && !self.use_modified_ellipses && ellipse.is_degenerate(self.min_axis) {
                forced = Some(id);
            }
            if worst.map_or(true, |(_, max)| norm2 > max) {
                worst = Some((id, norm2));
            }

            residuals.push(Residual {
                id,
                delta,
                outer_product: delta * delta.transpose(),
                norm2,
            });
        }

        let max_norm = worst.map_or(0.0, |(_, norm2)| norm2.sqrt());
        let outlier = match (forced, worst) {
            (Some(id), _) => Some((id, OutlierReason::DegenerateEllipse)),
            (None, Some((id, norm2))) if norm2.sqrt() > self.threshold => {
                Some((id, OutlierReason::NormExceeded { norm: norm2.sqrt() }))
            }
            _ => None,
        };

        Ok(OutlierScan { residuals, outlier, max_norm })
    }

    /// Score the candidates and remove at most one outlier from them.
    ///
    /// Returns the removed contributor (or `None` once converged) together
    /// with the scan it was based on.
    pub fn remove_outlier(
        &self,
        fused: &FusedEstimate,
        arena: &[Ellipse],
        candidates: &mut Vec<ContributorId>,
        cache: &mut PrecisionCache,
        builder: &PrecisionMatrixBuilder,
    ) -> FusionResult<(Option<ContributorId>, OutlierScan)> {
        let scan = self.scan(fused, arena, candidates, cache, builder)?;
        let removed = match scan.outlier {
            Some((id, reason)) => {
                candidates.retain(|&candidate| candidate != id);
                debug!(
                    contributor = %arena[id].display_name(),
                    ?reason,
                    remaining = candidates.len(),
                    "outlier removed"
                );
                Some(id)
            }
            None => None,
        };
        Ok((removed, scan))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::fusion::PositionFuser;

    fn run_scan(config: &FusionConfig, ellipses: &[Ellipse]) -> OutlierScan {
        let builder = PrecisionMatrixBuilder::new(config);
        let fuser = PositionFuser::new(builder.clone());
        let ids: Vec<ContributorId> = (0..ellipses.len()).collect();
        let mut cache = PrecisionCache::with_capacity(ellipses.len());
        let fused = fuser.fuse(ellipses, &ids, &mut cache).unwrap();
        OutlierDetector::new(config)
            .scan(&fused, ellipses, &ids, &mut cache, &builder)
            .unwrap()
    }

    #[test]
    fn test_distant_contributor_is_flagged() {
        let config = FusionConfig { ellipse_norm_threshold: 3.0, ..FusionConfig::default() };
        let ellipses = vec![
            Ellipse::circular(45.0, -93.0, 0.0, 1.0),
            Ellipse::circular(45.005, -93.0, 0.0, 1.0),
            Ellipse::circular(45.45, -93.0, 0.0, 1.0),
        ];
        let scan = run_scan(&config, &ellipses);
        assert_eq!(scan.residuals.len(), 3);
        match scan.outlier {
            Some((2, OutlierReason::NormExceeded { norm })) => assert!(norm > 3.0),
            other => panic!("unexpected outlier {:?}", other),
        }
    }

    #[test]
    fn test_consistent_contributors_converge() {
        let config = FusionConfig { ellipse_norm_threshold: 3.0, ..FusionConfig::default() };
        let ellipses = vec![
            Ellipse::circular(45.0, -93.0, 0.0, 1.0),
            Ellipse::circular(45.005, -93.0, 0.0, 1.0),
        ];
        let scan = run_scan(&config, &ellipses);
        assert!(scan.outlier.is_none());
        assert!(scan.max_norm < 1.0);
        for residual in &scan.residuals {
            let expected = residual.delta * residual.delta.transpose();
            assert!((residual.outer_product - expected).norm() < 1e-15);
        }
    }

    #[test]
    fn test_degenerate_ellipse_forced_when_modified_disabled() {
        let config = FusionConfig {
            ellipse_norm_threshold: 3.0,
            use_modified_ellipses: false,
            ..FusionConfig::default()
        };
        let ellipses = vec![
            Ellipse::circular(45.0, -93.0, 0.0, 1.0),
            Ellipse::circular(45.0, -93.0, 0.0, 0.0),
            Ellipse::circular(45.001, -93.0, 0.0, 1.0),
        ];
        let scan = run_scan(&config, &ellipses);
        assert_eq!(scan.outlier, Some((1, OutlierReason::DegenerateEllipse)));

        let config = FusionConfig { use_modified_ellipses: true, ..config };
        let scan = run_scan(&config, &ellipses);
        assert_ne!(scan.outlier.map(|(id, _)| id), Some(1));
    }

    #[test]
    fn test_remove_outlier_takes_exactly_one() {
        let config = FusionConfig { ellipse_norm_threshold: 3.0, ..FusionConfig::default() };
        let builder = PrecisionMatrixBuilder::new(&config);
        let fuser = PositionFuser::new(builder.clone());
        let ellipses = vec![
            Ellipse::circular(45.0, -93.0, 0.0, 1.0),
            Ellipse::circular(45.3, -93.0, 0.0, 1.0),
            Ellipse::circular(45.6, -93.0, 0.0, 1.0),
        ];
        let mut candidates: Vec<ContributorId> = vec![0, 1, 2];
        let mut cache = PrecisionCache::with_capacity(3);
        let fused = fuser.fuse(&ellipses, &candidates, &mut cache).unwrap();

        let (removed, scan) = OutlierDetector::new(&config)
            .remove_outlier(&fused, &ellipses, &mut candidates, &mut cache, &builder)
            .unwrap();
        assert!(removed.is_some());
        assert_eq!(candidates.len(), 2);
        assert_eq!(scan.residuals.len(), 3);
    }
}
