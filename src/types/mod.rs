//! Shared types for Muster

pub mod error;
pub mod validation;

pub use error::{ApiError, Result};
pub use validation::{FieldErrors, Validator};
