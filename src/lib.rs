//! Ellipse Fusion
//!
//! Fuses independent position reports, each with a 95% confidence ellipse,
//! into one position and ellipse. Contributors are combined by weighted
//! least squares in ECEF, inconsistent ones are rejected one at a time by
//! their ellipse-norm distance, and the final ellipse is re-estimated with
//! chi-square inflation.

pub mod core;
pub mod algorithms;
pub mod processing;
pub mod validation;
pub mod utils;

// Re-export commonly used types
pub use core::{Ellipse, Position, CHI2_95_2DOF_SCALE};
pub use algorithms::{
    AltitudeVarianceAdjuster, BearingFix, BearingLocalizer, BearingObservation, ErrorEllipseEstimator,
    FusedEstimate, GeodeticTransform, OutlierDetector, OutlierReason, PositionFuser, PrecisionMatrixBuilder,
};
pub use processing::{FusionEngine, FusionOutcome, FusionRun, FusionState, FusionStatus, RejectedContributor};
pub use validation::{FusionError, FusionResult, InputValidator};
pub use utils::{ConfigError, ConfigurationManager, FusionConfig};
