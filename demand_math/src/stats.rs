//! Descriptive statistics and information criteria

use crate::{MathError, Result};
use statrs::statistics::{Data, Median, Statistics};

/// Arithmetic mean of a non-empty slice
pub fn mean(values: &[f64]) -> Result<f64> {
    if values.is_empty() {
        return Err(MathError::InsufficientData(
            "Mean requires at least one value".to_string(),
        ));
    }
    Ok(values.iter().mean())
}

/// Median of a non-empty slice
pub fn median(values: &[f64]) -> Result<f64> {
    if values.is_empty() {
        return Err(MathError::InsufficientData(
            "Median requires at least one value".to_string(),
        ));
    }
    Ok(Data::new(values.to_vec()).median())
}

/// Sum of squared deviations from the mean
pub fn total_sum_of_squares(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = values.iter().mean();
    values.iter().map(|v| (v - m).powi(2)).sum()
}

/// Sum of squared residuals between two equally long slices
pub fn sum_squared_error(actual: &[f64], fitted: &[f64]) -> Result<f64> {
    if actual.len() != fitted.len() {
        return Err(MathError::InvalidInput(format!(
            "Length mismatch: {} actual values vs {} fitted values",
            actual.len(),
            fitted.len()
        )));
    }
    Ok(actual
        .iter()
        .zip(fitted.iter())
        .map(|(a, f)| (a - f).powi(2))
        .sum())
}

/// Smallest residual variance used when a fit is exact.
///
/// A perfect fit would otherwise give `ln(0) = -inf` and make every exact
/// model compare equal in a meaningless way.
pub const VARIANCE_FLOOR: f64 = 1e-12;

/// Akaike information criterion of a Gaussian model from its residual sum of squares
///
/// `n` is the number of residuals that entered `sse` and `k` the number of
/// estimated parameters.
pub fn gaussian_aic(sse: f64, n: usize, k: usize) -> Result<f64> {
    if n == 0 {
        return Err(MathError::InsufficientData(
            "AIC requires at least one residual".to_string(),
        ));
    }
    if !sse.is_finite() || sse < 0.0 {
        return Err(MathError::CalculationError(format!(
            "Residual sum of squares must be finite and non-negative, got {}",
            sse
        )));
    }
    let n = n as f64;
    let variance = (sse / n).max(VARIANCE_FLOOR);
    let log_likelihood = -0.5 * n * (1.0 + variance.ln() + (2.0 * std::f64::consts::PI).ln());
    Ok(-2.0 * log_likelihood + 2.0 * k as f64)
}
