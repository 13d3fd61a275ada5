//! Differencing and its inverse for integrated models

use crate::{MathError, Result};

/// Difference a series at the given lag: `out[t] = values[t + lag] - values[t]`
pub fn difference(values: &[f64], lag: usize) -> Vec<f64> {
    if lag == 0 {
        return values.to_vec();
    }
    if values.len() <= lag {
        return Vec::new();
    }
    values
        .windows(lag + 1)
        .map(|w| w[lag] - w[0])
        .collect()
}

/// Ordered list of differencing lags (seasonal stages first, then regular ones)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DifferencingPlan {
    lags: Vec<usize>,
}

/// A differenced series together with every intermediate level needed to undo it
#[derive(Debug, Clone)]
pub struct Differenced {
    /// `levels[i]` is the input of stage `i`
    levels: Vec<Vec<f64>>,
    /// Fully differenced series
    output: Vec<f64>,
}

impl Differenced {
    /// The fully differenced series
    pub fn output(&self) -> &[f64] {
        &self.output
    }
}

impl DifferencingPlan {
    /// `d` regular differences and `seasonal_d` differences at lag `period`
    pub fn new(d: usize, seasonal_d: usize, period: usize) -> Result<Self> {
        if seasonal_d > 0 && period < 2 {
            return Err(MathError::InvalidInput(format!(
                "Seasonal differencing needs a period of at least 2, got {}",
                period
            )));
        }
        let mut lags = vec![period; seasonal_d];
        lags.extend(std::iter::repeat(1).take(d));
        Ok(Self { lags })
    }

    /// Number of observations consumed by the plan
    pub fn lost_observations(&self) -> usize {
        self.lags.iter().sum()
    }

    /// Apply every stage in order
    pub fn apply(&self, values: &[f64]) -> Result<Differenced> {
        if values.len() <= self.lost_observations() {
            return Err(MathError::InsufficientData(format!(
                "Differencing consumes {} observations but only {} are available",
                self.lost_observations(),
                values.len()
            )));
        }
        let mut levels = Vec::with_capacity(self.lags.len());
        let mut current = values.to_vec();
        for &lag in &self.lags {
            let next = difference(&current, lag);
            levels.push(current);
            current = next;
        }
        Ok(Differenced {
            levels,
            output: current,
        })
    }

    /// Map forecasts of the differenced series back to the original scale
    pub fn integrate(&self, differenced: &Differenced, forecasts: &[f64]) -> Vec<f64> {
        let mut current = forecasts.to_vec();
        for (lag, base) in self.lags.iter().zip(differenced.levels.iter()).rev() {
            let mut extended = base.clone();
            let mut restored = Vec::with_capacity(current.len());
            for value in &current {
                let anchor = extended[extended.len() - lag];
                let level = value + anchor;
                extended.push(level);
                restored.push(level);
            }
            current = restored;
        }
        current
    }
}
