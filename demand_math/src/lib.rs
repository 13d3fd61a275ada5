//! # Demand Math
//!
//! Numeric building blocks shared by the forecasting models.
//! This crate has no notion of products or channels; it works on plain
//! `f64` slices.

use thiserror::Error;

pub mod differencing;
pub mod ols;
pub mod optimization;
pub mod stats;

pub use differencing::{difference, Differenced, DifferencingPlan};
pub use ols::{ols_fit, ridge_fit, OlsFit};
pub use optimization::{nelder_mead, NelderMeadConfig, NelderMeadResult};

/// Errors that can occur in numeric routines
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MathError {
    #[error("Insufficient data for calculation: {0}")]
    InsufficientData(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Calculation error: {0}")]
    CalculationError(String),
}

/// Result type for numeric operations
pub type Result<T> = std::result::Result<T, MathError>;
