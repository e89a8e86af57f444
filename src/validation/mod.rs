//! Input validation and error types

pub mod data;
pub mod error;

pub use data::InputValidator;
pub use error::{FusionError, FusionResult};
