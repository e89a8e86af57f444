//! Error classification for the fusion engine

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for fusion operations
pub type FusionResult<T> = Result<T, FusionError>;

/// Failures a fusion run can end in. All are returned as values; nothing in
/// the numeric pipeline panics on bad geometry.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FusionError {
    /// Accumulated precision matrix is not invertible (zero, collinear or
    /// conflicting uncertainties)
    #[error("singular precision system over {contributors} contributor(s)")]
    SingularSystem { contributors: usize },

    /// Nothing left to fuse
    #[error("insufficient input: {available} usable contributor(s), {required} required")]
    InsufficientInput { available: usize, required: usize },

    /// Every candidate was removed as an outlier
    #[error("all {rejected} contributor(s) rejected as outliers")]
    AllRejected { rejected: usize },

    /// NaN or infinity escaped a near-singular computation
    #[error("numerical instability in {stage}")]
    NumericalInstability { stage: String },

    /// Caller-supplied ellipse failed validation
    #[error("invalid ellipse at index {index}: {reason}")]
    InvalidEllipse { index: usize, reason: String },

    /// Caller-supplied bearing observation failed validation
    #[error("invalid observation at index {index}: {reason}")]
    InvalidObservation { index: usize, reason: String },

    /// Engine configuration failed validation
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },
}

impl FusionError {
    pub fn unstable(stage: impl Into<String>) -> Self {
        FusionError::NumericalInstability { stage: stage.into() }
    }

    /// Stable name used in logs and reports
    pub fn kind(&self) -> &'static str {
        match self {
            FusionError::SingularSystem { .. } => "SingularSystem",
            FusionError::InsufficientInput { .. } => "InsufficientInput",
            FusionError::AllRejected { .. } => "AllRejected",
            FusionError::NumericalInstability { .. } => "NumericalInstability",
            FusionError::InvalidEllipse { .. } => "InvalidEllipse",
            FusionError::InvalidObservation { .. } => "InvalidObservation",
            FusionError::InvalidConfig { .. } => "InvalidConfig",
        }
    }
}
