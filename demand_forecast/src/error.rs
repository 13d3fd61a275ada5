//! Error types for the demand_forecast crate

use demand_math::MathError;
use thiserror::Error;

/// Custom error types for the demand_forecast crate
#[derive(Debug, Error)]
pub enum ForecastError {
    /// Too few periods for a model family; the candidate is skipped
    #[error("Insufficient history for {model}: need {needed} periods, got {got}")]
    InsufficientHistory {
        model: String,
        needed: usize,
        got: usize,
    },

    /// Numerical fitting did not produce a usable model
    #[error("Fit failure: {0}")]
    FitFailure(String),

    /// Every candidate failed for a product
    #[error("No viable model: {0}")]
    NoViableModel(String),

    /// Malformed input data (duplicate or unordered periods, negative values, unknown keys)
    #[error("Data integrity error: {0}")]
    DataIntegrity(String),

    /// A candidate fit exceeded its time budget
    #[error("{model} did not finish within {millis} ms")]
    Timeout { model: String, millis: u64 },

    /// Error from invalid parameters
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Error from numeric routines
    #[error("Math error: {0}")]
    Math(#[from] MathError),

    /// Error from IO operations
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Error from JSON encoding or decoding
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl ForecastError {
    /// Errors that exclude a single candidate without failing the product
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ForecastError::InsufficientHistory { .. }
                | ForecastError::FitFailure(_)
                | ForecastError::Timeout { .. }
                | ForecastError::Math(_)
        )
    }
}

/// Result type with our custom error
pub type Result<T> = std::result::Result<T, ForecastError>;

impl From<serde_json::Error> for ForecastError {
    fn from(err: serde_json::Error) -> Self {
        ForecastError::Serialization(err.to_string())
    }
}
