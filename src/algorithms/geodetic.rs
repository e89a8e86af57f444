//! WGS84 geodetic <-> ECEF conversion and local East-North-Up frames
//!
//! All lengths are kilometres. Geodetic positions are `(lat_deg, lon_deg,
//! alt_km)`; ECEF positions are `(x, y, z)`.
//!
//! The inverse transform uses Bowring's closed form without iterative
//! refinement. For points near the ellipsoid surface the round-trip error is
//! below 1e-9 degrees and a few micrometres in height, and it stays well
//! below 1e-7 degrees / 1e-6 km up to aircraft altitudes. It is an
//! approximation; callers needing exact inverses must iterate themselves.

use nalgebra::{Matrix3, Vector3};
use tracing::warn;

use crate::core::{
    Position, WGS84_ECCENTRICITY_SQUARED, WGS84_FLATTENING, WGS84_SEMI_MAJOR_AXIS_KM,
};

/// Horizontal distance from the spin axis (km) under which East is undefined
pub const POLE_TOLERANCE_KM: f64 = 1e-9;

/// Reference ellipsoid conversions
#[derive(Debug, Clone, Copy)]
pub struct GeodeticTransform {
    /// Equatorial radius (km)
    pub semi_major_axis: f64,
    /// Polar radius (km)
    pub semi_minor_axis: f64,
    /// First eccentricity squared
    pub eccentricity_squared: f64,
    /// Second eccentricity squared
    pub second_eccentricity_squared: f64,
}

impl Default for GeodeticTransform {
    fn default() -> Self {
        Self::wgs84()
    }
}

impl GeodeticTransform {
    /// WGS84 ellipsoid in kilometres
    pub fn wgs84() -> Self {
        let a = WGS84_SEMI_MAJOR_AXIS_KM;
        let e2 = WGS84_ECCENTRICITY_SQUARED;
        Self {
            semi_major_axis: a,
            semi_minor_axis: a * (1.0 - WGS84_FLATTENING),
            eccentricity_squared: e2,
            second_eccentricity_squared: e2 / (1.0 - e2),
        }
    }

    /// Radius of curvature in the prime vertical at a geodetic latitude (radians)
    pub fn prime_vertical_radius(&self, lat_rad: f64) -> f64 {
        self.semi_major_axis / (1.0 - self.eccentricity_squared * lat_rad.sin().powi(2)).sqrt()
    }

    /// Geodetic `(lat, lon, alt)` to ECEF
    pub fn to_ecef(&self, lat: f64, lon: f64, alt: f64) -> Position {
        let lat_rad = lat.to_radians();
        let lon_rad = lon.to_radians();
        let n = self.prime_vertical_radius(lat_rad);

        let x = (n + alt) * lat_rad.cos() * lon_rad.cos();
        let y = (n + alt) * lat_rad.cos() * lon_rad.sin();
        let z = (n * (1.0 - self.eccentricity_squared) + alt) * lat_rad.sin();

        Vector3::new(x, y, z)
    }

    /// ECEF of a geodetic position vector `(lat, lon, alt)`
    pub fn geodetic_to_ecef(&self, geodetic: &Position) -> Position {
        self.to_ecef(geodetic.x, geodetic.y, geodetic.z)
    }

    /// ECEF to geodetic `(lat, lon, alt)`, Bowring's closed form
    pub fn to_geodetic(&self, ecef: &Position) -> Position {
        let (x, y, z) = (ecef.x, ecef.y, ecef.z);
        let a = self.semi_major_axis;
        let b = self.semi_minor_axis;

        let p = x.hypot(y);
        let theta = (z * a).atan2(p * b);
        let (sin_t, cos_t) = theta.sin_cos();

        let lat_rad = (z + self.second_eccentricity_squared * b * sin_t.powi(3))
            .atan2(p - self.eccentricity_squared * a * cos_t.powi(3));
        let lon_rad = y.atan2(x);

        // Height form that stays well conditioned at the poles
        let (sin_lat, cos_lat) = lat_rad.sin_cos();
        let alt = p * cos_lat + z * sin_lat
            - a * (1.0 - self.eccentricity_squared * sin_lat * sin_lat).sqrt();

        Vector3::new(lat_rad.to_degrees(), lon_rad.to_degrees(), alt)
    }

    /// Local East-North-Up basis at an ECEF point, as the columns of the
    /// returned rotation. `alt` is the point's altitude above the ellipsoid.
    ///
    /// Up is the altitude-corrected radius vector, which coincides with the
    /// ellipsoid normal. At the poles East is undefined; the basis then falls
    /// back to the lon = 0 convention (East along +Y) and logs a warning.
    pub fn enu_basis(&self, ecef: &Position, alt: f64) -> Matrix3<f64> {
        let (x, y, z) = (ecef.x, ecef.y, ecef.z);
        let lat_rad = self.to_geodetic(ecef).x.to_radians();
        let n = self.prime_vertical_radius(lat_rad);

        let z_scale = (n + alt) / (n * (1.0 - self.eccentricity_squared) + alt);
        let up = Vector3::new(x, y, z * z_scale).normalize();

        let p = x.hypot(y);
        let east = if p > POLE_TOLERANCE_KM {
            Vector3::new(-y / p, x / p, 0.0)
        } else {
            warn!(z_km = z, "ENU basis requested at a pole; using lon = 0 east direction");
            Vector3::new(0.0, 1.0, 0.0)
        };
        let north = up.cross(&east);

        Matrix3::from_columns(&[east, north, up])
    }

    /// ENU basis at a geodetic `(lat, lon, alt)` position
    pub fn enu_basis_at(&self, geodetic: &Position) -> Matrix3<f64> {
        let ecef = self.geodetic_to_ecef(geodetic);
        self.enu_basis(&ecef, geodetic.z)
    }

    /// ECEF point to ENU offset from a reference
    pub fn ecef_to_enu(&self, ecef: &Position, reference_ecef: &Position, basis: &Matrix3<f64>) -> Vector3<f64> {
        basis.transpose() * (ecef - reference_ecef)
    }

    /// ENU offset from a reference back to an ECEF point
    pub fn enu_to_ecef(&self, enu: &Vector3<f64>, reference_ecef: &Position, basis: &Matrix3<f64>) -> Position {
        reference_ecef + basis * enu
    }
}
