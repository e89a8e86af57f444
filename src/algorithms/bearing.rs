//! Bearing-only localization by least-squares ray intersection
//!
//! Sensors are projected into a tangent plane at their centroid and the
//! point minimizing the weighted squared perpendicular distance to every
//! line of sight is solved in closed form.

use nalgebra::{Matrix2, Vector2};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::algorithms::geodetic::GeodeticTransform;
use crate::algorithms::linalg;
use crate::core::Position;
use crate::validation::error::{FusionError, FusionResult};

/// Eigenvalue ratio below which the rays are treated as parallel
const PARALLEL_TOLERANCE: f64 = 1e-12;

/// Line of sight from one sensor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BearingObservation {
    pub lat: f64,
    pub lon: f64,
    /// km
    pub alt: f64,
    /// Degrees clockwise from north
    pub bearing: f64,
    /// 1-sigma bearing error (degrees); unit weight when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sigma: Option<f64>,
}

impl BearingObservation {
    pub fn new(lat: f64, lon: f64, alt: f64, bearing: f64) -> Self {
        Self { lat, lon, alt, bearing, sigma: None }
    }

    pub fn with_sigma(mut self, sigma_deg: f64) -> Self {
        self.sigma = Some(sigma_deg);
        self
    }

    fn weight(&self) -> f64 {
        match self.sigma {
            Some(sigma) => {
                let rad = sigma.to_radians();
                1.0 / (rad * rad)
            }
            None => 1.0,
        }
    }

    fn direction(&self) -> Vector2<f64> {
        let (sin_b, cos_b) = self.bearing.to_radians().sin_cos();
        Vector2::new(sin_b, cos_b)
    }
}

/// Solved intersection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BearingFix {
    /// `(lat, lon, alt)`, altitude taken from the reference point
    pub position: Position,
    /// East/north offset from the reference point (km)
    pub offset: Vector2<f64>,
    /// Signed distance along each ray to the foot of the perpendicular (km);
    /// negative when the fix lies behind that sensor
    pub ranges: Vec<f64>,
    /// RMS perpendicular miss distance (km)
    pub rms_miss: f64,
}

#[derive(Debug, Clone, Default)]
pub struct BearingLocalizer {
    transform: GeodeticTransform,
}

impl BearingLocalizer {
    pub fn new(transform: GeodeticTransform) -> Self {
        Self { transform }
    }

    pub fn locate(&self, observations: &[BearingObservation]) -> FusionResult<BearingFix> {
        if observations.len() < 2 {
            return Err(FusionError::InsufficientInput {
                available: observations.len(),
                required: 2,
            });
        }
        for (index, obs) in observations.iter().enumerate() {
            let fields = [obs.lat, obs.lon, obs.alt, obs.bearing];
            if fields.iter().any(|v| !v.is_finite()) {
                return Err(FusionError::InvalidObservation {
                    index,
                    reason: "non-finite bearing observation".to_string(),
                });
            }
            if let Some(sigma) = obs.sigma {
                if !(sigma.is_finite() && sigma > 0.0) {
                    return Err(FusionError::InvalidObservation {
                        index,
                        reason: format!("bearing sigma must be positive, got {}", sigma),
                    });
                }
            }
        }

        let n = observations.len() as f64;
        let sensors_ecef: Vec<Position> = observations
            .iter()
            .map(|obs| self.transform.to_ecef(obs.lat, obs.lon, obs.alt))
            .collect();
        let centroid = sensors_ecef.iter().fold(Position::zeros(), |acc, p| acc + p) / n;
        let centroid_geodetic = self.transform.to_geodetic(&centroid);
        let reference_alt = observations.iter().map(|obs| obs.alt).sum::<f64>() / n;
        let reference = Position::new(centroid_geodetic.x, centroid_geodetic.y, reference_alt);
        let reference_ecef = self.transform.geodetic_to_ecef(&reference);
        let basis = self.transform.enu_basis_at(&reference);

        let mut a = Matrix2::zeros();
        let mut b = Vector2::zeros();
        let mut planar = Vec::with_capacity(observations.len());
        for (obs, ecef) in observations.iter().zip(&sensors_ecef) {
            let enu = self.transform.ecef_to_enu(ecef, &reference_ecef, &basis);
            let p = Vector2::new(enu.x, enu.y);
            let d = obs.direction();
            let projector = (Matrix2::identity() - d * d.transpose()) * obs.weight();
            a += projector;
            b += projector * p;
            planar.push((p, d));
        }

        let (largest, smallest) = linalg::eigenvalues_symmetric2(&a);
        if largest <= 0.0 || smallest <= PARALLEL_TOLERANCE * largest {
            warn!(sensors = observations.len(), "bearing rays are parallel");
            return Err(FusionError::SingularSystem { contributors: observations.len() });
        }
        let offset = a
            .try_inverse()
            .map(|inverse| inverse * b)
            .ok_or(FusionError::SingularSystem { contributors: observations.len() })?;
        if !offset.iter().all(|v| v.is_finite()) {
            return Err(FusionError::unstable("bearing intersection"));
        }

        let mut ranges = Vec::with_capacity(planar.len());
        let mut miss_sum = 0.0;
        for (p, d) in &planar {
            let to_fix = offset - p;
            let along = d.dot(&to_fix);
            let miss = (to_fix - d * along).norm_squared();
            ranges.push(along);
            miss_sum += miss;
        }
        if ranges.iter().any(|&range| range < 0.0) {
            warn!("bearing fix lies behind at least one sensor");
        }

        let enu = nalgebra::Vector3::new(offset.x, offset.y, 0.0);
        let ecef = self.transform.enu_to_ecef(&enu, &reference_ecef, &basis);
        let mut position = self.transform.to_geodetic(&ecef);
        position.z = reference_alt;

        let rms_miss = (miss_sum / n).sqrt();
        debug!(
            sensors = observations.len(),
            lat = position.x,
            lon = position.y,
            rms_miss,
            "bearing fix"
        );

        Ok(BearingFix { position, offset, ranges, rms_miss })
    }
}
