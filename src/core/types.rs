//! Core data types for the fusion engine

use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

/// Plain 3-tuple. Either ECEF `(x, y, z)` in km or geodetic
/// `(lat_deg, lon_deg, alt_km)`, depending on which function produced it.
pub type Position = Vector3<f64>;

/// Normalize an angle in degrees into `[0, 360)`.
pub fn normalize_orientation(degrees: f64) -> f64 {
    let wrapped = degrees.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360.0 for tiny negative inputs
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// One position estimate with its 95% confidence ellipse.
///
/// Ellipses are value objects: the engine copies them on entry and never
/// mutates them, so the same instance can take part in several concurrent
/// fusion runs. Per-run state such as precision memos and residuals lives in
/// the run, keyed by the contributor's index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ellipse {
    /// Caller identifier, carried through to outputs and logs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Longitude (degrees)
    pub lon: f64,
    /// Latitude (degrees)
    pub lat: f64,
    /// Altitude above the WGS84 ellipsoid (km)
    pub alt: f64,
    /// Semi-major axis (km)
    pub sma: f64,
    /// Semi-minor axis (km)
    pub smi: f64,
    /// Major axis orientation, degrees clockwise from north, in `[0, 360)`
    pub orientation: f64,
    /// 1-sigma vertical uncertainty of this report (km); the configured
    /// default applies when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elevation_uncertainty: Option<f64>,
    /// 95% vertical uncertainty (km), derived
    #[serde(default)]
    pub altitude_uncertainty: f64,
    /// Longest 95% axis of the 3D ellipsoid (km), derived
    #[serde(default)]
    pub max_axis_length: f64,
    /// ECEF precision matrix (inverse covariance, 95% scaled, 1/km²)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precision: Option<Matrix3<f64>>,
}

impl Ellipse {
    /// Create an ellipse at a geodetic point. The axes are swapped if given
    /// in the wrong order and the orientation is normalized.
    pub fn new(lat: f64, lon: f64, alt: f64, sma: f64, smi: f64, orientation: f64) -> Self {
        let (sma, smi) = if smi > sma { (smi, sma) } else { (sma, smi) };
        Self {
            label: None,
            lon,
            lat,
            alt,
            sma,
            smi,
            orientation: normalize_orientation(orientation),
            elevation_uncertainty: None,
            altitude_uncertainty: 0.0,
            max_axis_length: 0.0,
            precision: None,
        }
    }

    /// Circular ellipse of the given radius
    pub fn circular(lat: f64, lon: f64, alt: f64, radius: f64) -> Self {
        Self::new(lat, lon, alt, radius, radius, 0.0)
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_elevation_uncertainty(mut self, sigma_km: f64) -> Self {
        self.elevation_uncertainty = Some(sigma_km);
        self
    }

    /// Geodetic position `(lat, lon, alt)`
    pub fn geodetic(&self) -> Position {
        Position::new(self.lat, self.lon, self.alt)
    }

    /// Whether either axis is below the given floor
    pub fn is_degenerate(&self, min_axis: f64) -> bool {
        self.sma < min_axis || self.smi < min_axis
    }

    /// Short identifier for log output
    pub fn display_name(&self) -> String {
        match &self.label {
            Some(label) => label.clone(),
            None => format!("({:.5}, {:.5})", self.lat, self.lon),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orientation_normalization() {
        assert!((normalize_orientation(370.0) - 10.0).abs() < 1e-12);
        assert!((normalize_orientation(-10.0) - 350.0).abs() < 1e-12);
        assert_eq!(normalize_orientation(360.0), 0.0);
        assert_eq!(normalize_orientation(-1e-20), 0.0);
    }

    #[test]
    fn test_new_orders_axes() {
        let ellipse = Ellipse::new(10.0, 20.0, 0.0, 1.0, 3.0, 45.0);
        assert_eq!(ellipse.sma, 3.0);
        assert_eq!(ellipse.smi, 1.0);
        assert_eq!(ellipse.geodetic(), Position::new(10.0, 20.0, 0.0));
    }

    #[test]
    fn test_ellipse_json() {
        let json = r#"{ "label": "radar-1", "lat": 45.0, "lon": -93.0, "alt": 0.2,
                        "sma": 2.0, "smi": 1.0, "orientation": 30.0 }"#;
        let ellipse: Ellipse = serde_json::from_str(json).unwrap();
        assert_eq!(ellipse.label.as_deref(), Some("radar-1"));
        assert!(ellipse.precision.is_none());
        assert!(ellipse.elevation_uncertainty.is_none());
        assert_eq!(ellipse.display_name(), "radar-1");
    }
}
