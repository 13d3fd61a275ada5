//! Ordinary and ridge least squares
//!
//! Regressors are passed column-major: `columns[j][i]` is the value of
//! regressor `j` for observation `i`. An intercept is always fitted and is
//! never penalised.

use crate::{MathError, Result};
use serde::{Deserialize, Serialize};

/// Pivot magnitude below which the normal equations are treated as singular
const PIVOT_TOLERANCE: f64 = 1e-10;

/// Fitted linear model `y = intercept + Σ coefficients[j] * x[j]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OlsFit {
    /// Intercept term
    pub intercept: f64,
    /// One coefficient per regressor column
    pub coefficients: Vec<f64>,
    /// In-sample residual sum of squares
    pub sse: f64,
    /// Number of observations used for the fit
    pub observations: usize,
}

impl OlsFit {
    /// Predict a single observation from its regressor values
    pub fn predict_row(&self, row: &[f64]) -> Result<f64> {
        if row.len() != self.coefficients.len() {
            return Err(MathError::InvalidInput(format!(
                "Expected {} regressors, got {}",
                self.coefficients.len(),
                row.len()
            )));
        }
        Ok(self.intercept
            + self
                .coefficients
                .iter()
                .zip(row.iter())
                .map(|(b, x)| b * x)
                .sum::<f64>())
    }

    /// Predict `n` observations of a column-major regressor matrix
    ///
    /// `n` is explicit so an intercept-only model still yields `n` values.
    pub fn predict_columns(&self, columns: &[Vec<f64>], n: usize) -> Result<Vec<f64>> {
        if columns.len() != self.coefficients.len() {
            return Err(MathError::InvalidInput(format!(
                "Expected {} regressor columns, got {}",
                self.coefficients.len(),
                columns.len()
            )));
        }
        let mut predictions = vec![self.intercept; n];
        for (coefficient, column) in self.coefficients.iter().zip(columns.iter()) {
            if column.len() != n {
                return Err(MathError::InvalidInput(format!(
                    "Regressor length {} does not match {} observations",
                    column.len(),
                    n
                )));
            }
            for (prediction, x) in predictions.iter_mut().zip(column.iter()) {
                *prediction += coefficient * x;
            }
        }
        Ok(predictions)
    }

    /// Number of estimated parameters including the intercept
    pub fn num_params(&self) -> usize {
        self.coefficients.len() + 1
    }
}

/// Fit ordinary least squares with an intercept
pub fn ols_fit(y: &[f64], columns: &[Vec<f64>]) -> Result<OlsFit> {
    ridge_fit(y, columns, 0.0)
}

/// Fit least squares with an L2 penalty `lambda` on the non-intercept coefficients
pub fn ridge_fit(y: &[f64], columns: &[Vec<f64>], lambda: f64) -> Result<OlsFit> {
    let n = y.len();
    if n == 0 {
        return Err(MathError::InsufficientData(
            "Least squares requires at least one observation".to_string(),
        ));
    }
    if !(lambda >= 0.0 && lambda.is_finite()) {
        return Err(MathError::InvalidInput(format!(
            "Ridge penalty must be a non-negative number, got {}",
            lambda
        )));
    }
    for column in columns {
        if column.len() != n {
            return Err(MathError::InvalidInput(format!(
                "Regressor length {} does not match {} observations",
                column.len(),
                n
            )));
        }
    }

    let k = columns.len() + 1;
    let mut xtx = vec![vec![0.0; k]; k];
    let mut xty = vec![0.0; k];
    let mut row = vec![0.0; k];

    for i in 0..n {
        row[0] = 1.0;
        for (j, column) in columns.iter().enumerate() {
            row[j + 1] = column[i];
        }
        for a in 0..k {
            xty[a] += row[a] * y[i];
            for b in a..k {
                xtx[a][b] += row[a] * row[b];
            }
        }
    }
    for a in 0..k {
        for b in 0..a {
            xtx[a][b] = xtx[b][a];
        }
    }
    for (j, xtx_row) in xtx.iter_mut().enumerate().skip(1) {
        xtx_row[j] += lambda;
    }

    let beta = solve(xtx, xty)?;
    let fit = OlsFit {
        intercept: beta[0],
        coefficients: beta[1..].to_vec(),
        sse: 0.0,
        observations: n,
    };
    let fitted = fit.predict_columns(columns, n)?;
    let sse = y
        .iter()
        .zip(fitted.iter())
        .map(|(a, f)| (a - f).powi(2))
        .sum::<f64>();

    if !sse.is_finite() {
        return Err(MathError::CalculationError(
            "Least squares produced non-finite residuals".to_string(),
        ));
    }

    Ok(OlsFit { sse, ..fit })
}

/// Solve `a x = b` by Gaussian elimination with partial pivoting
fn solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Result<Vec<f64>> {
    let k = b.len();
    for col in 0..k {
        let pivot = (col..k)
            .max_by(|&r1, &r2| a[r1][col].abs().total_cmp(&a[r2][col].abs()))
            .unwrap_or(col);
        if a[pivot][col].abs() < PIVOT_TOLERANCE {
            return Err(MathError::CalculationError(
                "Normal equations are singular".to_string(),
            ));
        }
        a.swap(col, pivot);
        b.swap(col, pivot);

        for r in col + 1..k {
            let factor = a[r][col] / a[col][col];
            if factor == 0.0 {
                continue;
            }
            for c in col..k {
                a[r][c] -= factor * a[col][c];
            }
            b[r] -= factor * b[col];
        }
    }

    let mut x = vec![0.0; k];
    for r in (0..k).rev() {
        let tail: f64 = (r + 1..k).map(|c| a[r][c] * x[c]).sum();
        x[r] = (b[r] - tail) / a[r][r];
    }
    Ok(x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_exact_line() {
        let x = vec![0.0, 1.0, 2.0, 3.0, 4.0];
        let y: Vec<f64> = x.iter().map(|v| 2.0 + 3.0 * v).collect();
        let fit = ols_fit(&y, &[x]).unwrap();
        assert_approx_eq!(fit.intercept, 2.0, 1e-9);
        assert_approx_eq!(fit.coefficients[0], 3.0, 1e-9);
        assert!(fit.sse < 1e-12);
        assert_eq!(fit.num_params(), 2);
    }

    #[test]
    fn test_intercept_only() {
        let fit = ols_fit(&[1.0, 2.0, 3.0], &[]).unwrap();
        assert_approx_eq!(fit.intercept, 2.0);
        assert_approx_eq!(fit.sse, 2.0);
    }

    #[test]
    fn test_intercept_only_sse_matches_total_sum_of_squares() {
        let y = [10.0, 14.0, 9.0, 20.0, 7.0];
        let mean = y.iter().sum::<f64>() / y.len() as f64;
        let sst: f64 = y.iter().map(|v| (v - mean).powi(2)).sum();
        let fit = ols_fit(&y, &[]).unwrap();
        assert!(fit.sse > 0.0);
        assert_approx_eq!(fit.sse, sst, 1e-9);
        assert_eq!(fit.observations, 5);
        let predictions = fit.predict_columns(&[], 3).unwrap();
        assert_eq!(predictions.len(), 3);
        for value in predictions {
            assert_approx_eq!(value, mean, 1e-9);
        }
    }

    #[test]
    fn test_collinear_columns_are_singular() {
        let x = vec![1.0, 2.0, 3.0, 4.0];
        let y = vec![1.0, 2.0, 2.5, 4.5];
        assert!(ols_fit(&y, &[x.clone(), x.clone()]).is_err());
        // A ridge penalty makes the same system solvable
        assert!(ridge_fit(&y, &[x.clone(), x], 0.1).is_ok());
    }

    #[test]
    fn test_ridge_shrinks_slope() {
        let x = vec![0.0, 1.0, 2.0, 3.0];
        let y = vec![0.0, 1.0, 2.0, 3.0];
        let plain = ols_fit(&y, &[x.clone()]).unwrap();
        let shrunk = ridge_fit(&y, &[x], 10.0).unwrap();
        assert!(shrunk.coefficients[0] < plain.coefficients[0]);
    }

    #[test]
    fn test_dimension_checks() {
        assert!(ols_fit(&[], &[]).is_err());
        assert!(ols_fit(&[1.0, 2.0], &[vec![1.0]]).is_err());
        let fit = ols_fit(&[1.0, 2.0, 3.0], &[vec![0.0, 1.0, 2.0]]).unwrap();
        assert!(fit.predict_row(&[1.0, 2.0]).is_err());
        assert_approx_eq!(fit.predict_row(&[3.0]).unwrap(), 4.0, 1e-9);
    }
}
