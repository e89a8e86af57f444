//! Core fusion algorithms

pub mod linalg;
pub mod geodetic;
pub mod precision;
pub mod fusion;
pub mod outlier;
pub mod error_ellipse;
pub mod altitude;
pub mod bearing;

pub use geodetic::GeodeticTransform;
pub use precision::PrecisionMatrixBuilder;
pub use fusion::{FusedEstimate, PositionFuser};
pub use outlier::{OutlierDetector, OutlierReason, OutlierScan, Residual};
pub use error_ellipse::{EllipseDiagnostics, ErrorEllipseEstimator};
pub use altitude::AltitudeVarianceAdjuster;
pub use bearing::{BearingFix, BearingLocalizer, BearingObservation};
