//! Physical constants and fusion parameters

/// WGS84 equatorial radius (km)
pub const WGS84_SEMI_MAJOR_AXIS_KM: f64 = 6378.137;

/// WGS84 inverse flattening
pub const WGS84_INVERSE_FLATTENING: f64 = 298.257223563;

/// WGS84 flattening
pub const WGS84_FLATTENING: f64 = 1.0 / WGS84_INVERSE_FLATTENING;

/// WGS84 first eccentricity squared
pub const WGS84_ECCENTRICITY_SQUARED: f64 =
    WGS84_FLATTENING * (2.0 - WGS84_FLATTENING);

/// Scale from a 1-sigma axis to the 95% confidence axis of a 2-DOF Gaussian
/// (sqrt of the 95% chi-square quantile with two degrees of freedom).
pub const CHI2_95_2DOF_SCALE: f64 = 2.4477;

/// Lower clamp applied by the altitude spread heuristic
pub const ALTITUDE_SPREAD_MIN_FACTOR: f64 = 1.0;

/// Upper clamp applied by the altitude spread heuristic
pub const ALTITUDE_SPREAD_MAX_FACTOR: f64 = 2.5;
