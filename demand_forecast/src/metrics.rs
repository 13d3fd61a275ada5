//! Accuracy metrics for held-out forecasts

use crate::error::{ForecastError, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Accuracy of a forecast over the periods with a known actual value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSet {
    /// Mean absolute error
    pub mae: f64,
    /// Root mean squared error
    pub rmse: f64,
    /// Mean absolute percentage error in percent, over non-zero actuals only
    pub mape: Option<f64>,
    /// Coefficient of determination; undefined when the actuals are constant
    pub r2: Option<f64>,
    /// Number of periods that entered the metrics
    pub observations: usize,
}

impl MetricSet {
    /// Score `forecast` against `actual`, skipping periods whose actual is unknown
    ///
    /// Returns `Ok(None)` when no period has a known actual.
    pub fn compute(actual: &[Option<f64>], forecast: &[f64]) -> Result<Option<Self>> {
        if actual.len() != forecast.len() {
            return Err(ForecastError::InvalidParameter(format!(
                "Forecast length ({}) doesn't match actual length ({})",
                forecast.len(),
                actual.len()
            )));
        }

        let pairs: Vec<(f64, f64)> = actual
            .iter()
            .zip(forecast.iter())
            .filter_map(|(a, f)| a.map(|a| (a, *f)))
            .collect();
        if pairs.is_empty() {
            return Ok(None);
        }

        let n = pairs.len() as f64;
        let mae = pairs.iter().map(|(a, f)| (a - f).abs()).sum::<f64>() / n;
        let sse = pairs.iter().map(|(a, f)| (a - f).powi(2)).sum::<f64>();
        let rmse = (sse / n).sqrt();

        let percentage_errors: Vec<f64> = pairs
            .iter()
            .filter(|(a, _)| *a > 0.0)
            .map(|(a, f)| ((a - f) / a).abs())
            .collect();
        let mape = if percentage_errors.is_empty() {
            None
        } else {
            Some(percentage_errors.iter().sum::<f64>() / percentage_errors.len() as f64 * 100.0)
        };

        let mean_actual = pairs.iter().map(|(a, _)| a).sum::<f64>() / n;
        let sst = pairs
            .iter()
            .map(|(a, _)| (a - mean_actual).powi(2))
            .sum::<f64>();
        let r2 = if sst > 0.0 { Some(1.0 - sse / sst) } else { None };

        Ok(Some(Self {
            mae,
            rmse,
            mape,
            r2,
            observations: pairs.len(),
        }))
    }

    /// Selection order: defined MAPE ascending, then undefined MAPE by RMSE ascending
    pub fn selection_order(&self, other: &Self) -> Ordering {
        match (self.mape, other.mape) {
            (Some(a), Some(b)) => a.total_cmp(&b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.rmse.total_cmp(&other.rmse),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_basic_metrics() {
        let actual = [Some(100.0), Some(200.0), Some(300.0)];
        let forecast = [110.0, 190.0, 330.0];
        let metrics = MetricSet::compute(&actual, &forecast).unwrap().unwrap();
        assert_approx_eq!(metrics.mae, 50.0 / 3.0);
        assert_approx_eq!(metrics.rmse, (1100.0f64 / 3.0).sqrt());
        assert_approx_eq!(metrics.mape.unwrap(), (0.1 + 0.05 + 0.1) / 3.0 * 100.0);
        assert_approx_eq!(metrics.r2.unwrap(), 1.0 - 1100.0 / 20000.0);
        assert_eq!(metrics.observations, 3);
    }

    #[test]
    fn test_unknown_actuals_are_skipped() {
        let metrics = MetricSet::compute(&[Some(10.0), None], &[12.0, 1000.0])
            .unwrap()
            .unwrap();
        assert_eq!(metrics.observations, 1);
        assert_approx_eq!(metrics.mae, 2.0);
        assert!(MetricSet::compute(&[None, None], &[1.0, 2.0]).unwrap().is_none());
    }

    #[test]
    fn test_zero_actuals_leave_mape_undefined() {
        let metrics = MetricSet::compute(&[Some(0.0), Some(0.0)], &[1.0, 3.0])
            .unwrap()
            .unwrap();
        assert!(metrics.mape.is_none());
        assert!(metrics.r2.is_none());
        assert_approx_eq!(metrics.rmse, 5.0f64.sqrt());
    }

    #[test]
    fn test_length_mismatch() {
        assert!(MetricSet::compute(&[Some(1.0)], &[1.0, 2.0]).is_err());
    }

    #[test]
    fn test_selection_order() {
        let scored = |mape: Option<f64>, rmse: f64| MetricSet {
            mae: 0.0,
            rmse,
            mape,
            r2: None,
            observations: 1,
        };
        let five = scored(Some(5.0), 50.0);
        let twelve = scored(Some(12.0), 1.0);
        let undefined = scored(None, 0.5);
        assert_eq!(five.selection_order(&twelve), Ordering::Less);
        assert_eq!(undefined.selection_order(&twelve), Ordering::Greater);
        assert_eq!(
            scored(None, 1.0).selection_order(&scored(None, 2.0)),
            Ordering::Less
        );
    }
}
