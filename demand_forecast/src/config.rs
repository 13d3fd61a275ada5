//! Evaluation and calendar configuration
//!
//! Every field has a default so a partial TOML file or environment override
//! is enough to tune a run.

use crate::error::{ForecastError, Result};
use crate::models::ModelKind;
use chrono::NaiveDate;
use demand_math::NelderMeadConfig;
use serde::{Deserialize, Serialize};

/// Backtest and model-selection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    /// History length below which the long-history families (ARIMA, Prophet) are skipped
    pub min_history: usize,
    /// Number of trailing periods held out for scoring
    pub holdout: usize,
    /// Live forecast horizon in months
    pub horizon: usize,
    /// Seasonal cycle length in months
    pub seasonal_period: usize,
    /// Per-adapter fit deadline
    ///
    /// A late adapter is abandoned, not cancelled: its thread keeps running
    /// until the fit returns and its result is discarded. Wide ARIMA grids
    /// under a short deadline can therefore keep cores busy across products.
    pub fit_timeout_ms: u64,
    /// Enabled candidates, in tie-break order
    pub models: Vec<ModelKind>,
    pub arima: ArimaGrid,
    pub regression: RegressionConfig,
    pub prophet: ProphetConfig,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            min_history: 12,
            holdout: 3,
            horizon: 18,
            seasonal_period: 12,
            fit_timeout_ms: 10_000,
            models: ModelKind::ALL.to_vec(),
            arima: ArimaGrid::default(),
            regression: RegressionConfig::default(),
            prophet: ProphetConfig::default(),
        }
    }
}

impl EvaluationConfig {
    /// Reject settings no evaluation could run with
    pub fn validate(&self) -> Result<()> {
        if self.holdout == 0 {
            return Err(ForecastError::InvalidParameter(
                "holdout must be at least 1".to_string(),
            ));
        }
        if self.horizon == 0 {
            return Err(ForecastError::InvalidParameter(
                "horizon must be at least 1".to_string(),
            ));
        }
        if self.seasonal_period < 2 {
            return Err(ForecastError::InvalidParameter(format!(
                "seasonal_period must be at least 2, got {}",
                self.seasonal_period
            )));
        }
        if self.fit_timeout_ms == 0 {
            return Err(ForecastError::InvalidParameter(
                "fit_timeout_ms must be positive".to_string(),
            ));
        }
        if self.models.is_empty() {
            return Err(ForecastError::InvalidParameter(
                "at least one model must be enabled".to_string(),
            ));
        }
        self.regression.validate()?;
        self.prophet.validate()?;
        Ok(())
    }
}

/// Orders searched by the ARIMA family; every range starts at zero
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArimaGrid {
    pub max_p: usize,
    pub max_d: usize,
    pub max_q: usize,
    pub max_seasonal_p: usize,
    pub max_seasonal_d: usize,
    pub max_seasonal_q: usize,
    pub optimizer: NelderMeadConfig,
}

impl Default for ArimaGrid {
    fn default() -> Self {
        Self {
            max_p: 2,
            max_d: 1,
            max_q: 1,
            max_seasonal_p: 1,
            max_seasonal_d: 1,
            max_seasonal_q: 0,
            optimizer: NelderMeadConfig {
                max_iter: 500,
                ..NelderMeadConfig::default()
            },
        }
    }
}

/// Feature-selection settings for the regression adapters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegressionConfig {
    /// Candidate autoregressive lags
    pub lags: Vec<usize>,
    /// Upper bound on the number of selected features
    pub max_features: usize,
    /// Relative SSE reduction a feature must bring to be accepted
    pub min_improvement: f64,
}

impl Default for RegressionConfig {
    fn default() -> Self {
        Self {
            lags: vec![1, 2, 12],
            max_features: 8,
            min_improvement: 0.01,
        }
    }
}

impl RegressionConfig {
    fn validate(&self) -> Result<()> {
        if self.lags.contains(&0) {
            return Err(ForecastError::InvalidParameter(
                "regression lags must be positive".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.min_improvement) {
            return Err(ForecastError::InvalidParameter(format!(
                "min_improvement must be in [0, 1), got {}",
                self.min_improvement
            )));
        }
        Ok(())
    }
}

/// Decomposition settings for the Prophet-style adapter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProphetConfig {
    /// Number of yearly Fourier pairs
    pub fourier_order: usize,
    /// Number of potential trend changepoints
    pub n_changepoints: usize,
    /// Share of history in which changepoints are placed
    pub changepoint_range: f64,
    /// Ridge penalty on all non-intercept coefficients
    pub regularization: f64,
}

impl Default for ProphetConfig {
    fn default() -> Self {
        Self {
            fourier_order: 3,
            n_changepoints: 5,
            changepoint_range: 0.8,
            regularization: 0.1,
        }
    }
}

impl ProphetConfig {
    fn validate(&self) -> Result<()> {
        if !(self.changepoint_range > 0.0 && self.changepoint_range <= 1.0) {
            return Err(ForecastError::InvalidParameter(format!(
                "changepoint_range must be in (0, 1], got {}",
                self.changepoint_range
            )));
        }
        if !(self.regularization >= 0.0 && self.regularization.is_finite()) {
            return Err(ForecastError::InvalidParameter(format!(
                "regularization must be non-negative, got {}",
                self.regularization
            )));
        }
        Ok(())
    }
}

/// Black Friday dates per channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlackFridayDates {
    pub wb: Vec<NaiveDate>,
    pub ozon: Vec<NaiveDate>,
}

impl Default for BlackFridayDates {
    fn default() -> Self {
        let dates: Vec<NaiveDate> = [(2023, 11, 24), (2024, 11, 29), (2025, 11, 28)]
            .iter()
            .filter_map(|&(y, m, d)| NaiveDate::from_ymd_opt(y, m, d))
            .collect();
        Self {
            wb: dates.clone(),
            ozon: dates,
        }
    }
}

/// Calendar data supplied by configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CalendarConfig {
    pub black_friday: BlackFridayDates,
    /// Holidays on top of the fixed public-holiday table
    pub extra_holidays: Vec<NaiveDate>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = EvaluationConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.models.len(), 9);
        assert_eq!(config.holdout, 3);
        assert_eq!(config.horizon, 18);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = EvaluationConfig {
            holdout: 0,
            ..EvaluationConfig::default()
        };
        assert!(config.validate().is_err());

        config.holdout = 3;
        config.regression.min_improvement = 1.5;
        assert!(config.validate().is_err());

        config.regression.min_improvement = 0.01;
        config.models.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: EvaluationConfig =
            serde_json::from_str(r#"{"holdout": 6, "models": ["baseline_mean", "sarima"]}"#).unwrap();
        assert_eq!(config.holdout, 6);
        assert_eq!(config.horizon, 18);
        assert_eq!(config.models, vec![ModelKind::BaselineMean, ModelKind::Sarima]);
    }

    #[test]
    fn test_calendar_defaults() {
        let config = CalendarConfig::default();
        assert_eq!(config.black_friday.wb.len(), 3);
        assert_eq!(config.black_friday.wb, config.black_friday.ozon);
    }
}
