//! Run management: per-run precision memo and the fusion state machine

pub mod cache;
pub mod engine;

pub use cache::{ContributorId, PrecisionCache};
pub use engine::{FusionEngine, FusionOutcome, FusionRun, FusionState, FusionStatus, RejectedContributor};
