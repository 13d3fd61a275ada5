//! Forecasting models for monthly sales series
//!
//! Four families sit behind one train/forecast contract. The evaluator only
//! ever sees the closed [`ModelSpec`] / [`FittedModel`] pair, so every family
//! is handled exhaustively and every forecast leaves through the same
//! non-negativity clamp.

use crate::calendar::{CalendarFeatureProvider, FeatureVector};
use crate::config::EvaluationConfig;
use crate::data::{Period, TimeSeries};
use crate::error::{ForecastError, Result};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug};
use std::str::FromStr;

pub mod arima;
pub mod baseline;
pub mod prophet;
pub mod regression;

pub use arima::{ArimaModel, ArimaOrder, ArimaVariant, TrainedArima};
pub use baseline::{BaselineMethod, BaselineModel, TrainedBaseline};
pub use prophet::{ProphetModel, TrainedProphet};
pub use regression::{FeatureMode, RegressionModel, TrainedRegression};

/// Model family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelFamily {
    Baseline,
    Regression,
    Arima,
    Prophet,
}

/// Every candidate the evaluator can fit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    BaselineMean,
    BaselineMedian,
    BaselineLast,
    RegressionContinuous,
    RegressionBinary,
    Arima,
    Sarima,
    Sarimax,
    Prophet,
}

impl ModelKind {
    /// All candidates in their default tie-break order
    pub const ALL: [ModelKind; 9] = [
        ModelKind::BaselineMean,
        ModelKind::BaselineMedian,
        ModelKind::BaselineLast,
        ModelKind::RegressionContinuous,
        ModelKind::RegressionBinary,
        ModelKind::Arima,
        ModelKind::Sarima,
        ModelKind::Sarimax,
        ModelKind::Prophet,
    ];

    /// Stable name used in logs and stored records
    pub fn name(&self) -> &'static str {
        match self {
            ModelKind::BaselineMean => "baseline_mean",
            ModelKind::BaselineMedian => "baseline_median",
            ModelKind::BaselineLast => "baseline_last",
            ModelKind::RegressionContinuous => "regression_continuous",
            ModelKind::RegressionBinary => "regression_binary",
            ModelKind::Arima => "arima",
            ModelKind::Sarima => "sarima",
            ModelKind::Sarimax => "sarimax",
            ModelKind::Prophet => "prophet",
        }
    }

    pub fn family(&self) -> ModelFamily {
        match self {
            ModelKind::BaselineMean | ModelKind::BaselineMedian | ModelKind::BaselineLast => {
                ModelFamily::Baseline
            }
            ModelKind::RegressionContinuous | ModelKind::RegressionBinary => ModelFamily::Regression,
            ModelKind::Arima | ModelKind::Sarima | ModelKind::Sarimax => ModelFamily::Arima,
            ModelKind::Prophet => ModelFamily::Prophet,
        }
    }

    /// Families skipped when history is shorter than the configured minimum
    pub fn needs_long_history(&self) -> bool {
        matches!(self.family(), ModelFamily::Arima | ModelFamily::Prophet)
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ModelKind {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim().to_lowercase();
        ModelKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| ForecastError::InvalidParameter(format!("Unknown model: {}", s)))
    }
}

/// History prepared for fitting plus the calendar features the exogenous
/// models need, covering the history and the periods after it
#[derive(Debug, Clone)]
pub struct TrainingSet {
    start: Period,
    values: Vec<f64>,
    features: Vec<FeatureVector>,
    seasonal_period: usize,
}

impl TrainingSet {
    /// `features` must cover at least every value
    pub fn new(
        start: Period,
        values: Vec<f64>,
        features: Vec<FeatureVector>,
        seasonal_period: usize,
    ) -> Result<Self> {
        if features.len() < values.len() {
            return Err(ForecastError::InvalidParameter(format!(
                "Calendar features cover {} periods but history has {}",
                features.len(),
                values.len()
            )));
        }
        if let Some(bad) = values.iter().find(|v| !v.is_finite() || **v < 0.0) {
            return Err(ForecastError::DataIntegrity(format!(
                "Training values must be finite and non-negative, got {}",
                bad
            )));
        }
        Ok(Self {
            start,
            values,
            features,
            seasonal_period,
        })
    }

    /// Impute a series and attach calendar features for its history and `future` periods after it
    pub fn from_series(
        series: &TimeSeries,
        calendar: &dyn CalendarFeatureProvider,
        future: usize,
        seasonal_period: usize,
    ) -> Result<Self> {
        let values = series.filled().unwrap_or_default();
        let features = calendar.features_for(series.start(), values.len() + future, series.channel());
        Self::new(series.start(), values, features, seasonal_period)
    }

    /// The first `len` values, keeping every feature so the dropped tail becomes future
    pub fn prefix(&self, len: usize) -> TrainingSet {
        let len = len.min(self.values.len());
        TrainingSet {
            start: self.start,
            values: self.values[..len].to_vec(),
            features: self.features.clone(),
            seasonal_period: self.seasonal_period,
        }
    }

    pub fn start(&self) -> Period {
        self.start
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn seasonal_period(&self) -> usize {
        self.seasonal_period
    }

    /// Features aligned with the history
    pub fn history_features(&self) -> &[FeatureVector] {
        &self.features[..self.values.len()]
    }

    /// Features of the periods after the history
    pub fn future_features(&self) -> &[FeatureVector] {
        &self.features[self.values.len()..]
    }

    /// Fail with `InsufficientHistory` unless at least `needed` values are present
    pub fn require(&self, model: &str, needed: usize) -> Result<()> {
        if self.values.len() < needed {
            return Err(ForecastError::InsufficientHistory {
                model: model.to_string(),
                needed,
                got: self.values.len(),
            });
        }
        Ok(())
    }
}

/// Take `horizons` future feature vectors, failing when the set does not reach that far
pub(crate) fn future_window(
    model: &str,
    features: &[FeatureVector],
    horizons: usize,
) -> Result<Vec<FeatureVector>> {
    if features.len() < horizons {
        return Err(ForecastError::InvalidParameter(format!(
            "{} needs calendar features for {} future periods, only {} available",
            model,
            horizons,
            features.len()
        )));
    }
    Ok(features[..horizons].to_vec())
}

/// Forecast result containing predicted values
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastResult {
    values: Vec<f64>,
    horizons: usize,
}

impl ForecastResult {
    /// Create a new forecast result
    pub fn new(values: Vec<f64>, horizons: usize) -> Result<Self> {
        if values.len() != horizons {
            return Err(ForecastError::FitFailure(format!(
                "Values length ({}) doesn't match horizons ({})",
                values.len(),
                horizons
            )));
        }
        Ok(Self { values, horizons })
    }

    /// Get the forecasted values
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Get the number of periods forecasted
    pub fn horizons(&self) -> usize {
        self.horizons
    }

    pub fn into_values(self) -> Vec<f64> {
        self.values
    }
}

/// Trained forecast model
pub trait TrainedForecastModel: Debug + Send {
    /// Generate forecast for future periods
    fn forecast(&self, horizons: usize) -> Result<ForecastResult>;

    /// Short description of the fitted parameters
    fn describe(&self) -> String;

    /// Name of the model
    fn name(&self) -> &str;
}

/// Forecast model that can be trained on a training set
pub trait ForecastModel: Debug + Clone {
    /// The type of trained model produced
    type Trained: TrainedForecastModel;

    /// Train the model on a training set
    fn train(&self, data: &TrainingSet) -> Result<Self::Trained>;

    /// Get the name of the model
    fn name(&self) -> &str;
}

/// An unfitted candidate
#[derive(Debug, Clone)]
pub enum ModelSpec {
    Baseline(BaselineModel),
    Regression(RegressionModel),
    Arima(ArimaModel),
    Prophet(ProphetModel),
}

impl ModelSpec {
    /// Build the candidate for `kind` from the evaluation settings
    pub fn for_kind(kind: ModelKind, config: &EvaluationConfig) -> Self {
        match kind {
            ModelKind::BaselineMean => ModelSpec::Baseline(BaselineModel::new(BaselineMethod::Mean)),
            ModelKind::BaselineMedian => {
                ModelSpec::Baseline(BaselineModel::new(BaselineMethod::Median))
            }
            ModelKind::BaselineLast => ModelSpec::Baseline(BaselineModel::new(BaselineMethod::Last)),
            ModelKind::RegressionContinuous => ModelSpec::Regression(RegressionModel::new(
                FeatureMode::Continuous,
                config.regression.clone(),
            )),
            ModelKind::RegressionBinary => ModelSpec::Regression(RegressionModel::new(
                FeatureMode::Binary,
                config.regression.clone(),
            )),
            ModelKind::Arima => ModelSpec::Arima(ArimaModel::new(
                ArimaVariant::Arima,
                config.arima.clone(),
                config.seasonal_period,
            )),
            ModelKind::Sarima => ModelSpec::Arima(ArimaModel::new(
                ArimaVariant::Sarima,
                config.arima.clone(),
                config.seasonal_period,
            )),
            ModelKind::Sarimax => ModelSpec::Arima(ArimaModel::new(
                ArimaVariant::Sarimax,
                config.arima.clone(),
                config.seasonal_period,
            )),
            ModelKind::Prophet => ModelSpec::Prophet(ProphetModel::new(config.prophet.clone())),
        }
    }

    pub fn kind(&self) -> ModelKind {
        match self {
            ModelSpec::Baseline(m) => m.kind(),
            ModelSpec::Regression(m) => m.kind(),
            ModelSpec::Arima(m) => m.kind(),
            ModelSpec::Prophet(_) => ModelKind::Prophet,
        }
    }

    /// Fit the candidate
    pub fn fit(&self, data: &TrainingSet) -> Result<FittedModel> {
        Ok(match self {
            ModelSpec::Baseline(m) => FittedModel::Baseline(m.train(data)?),
            ModelSpec::Regression(m) => FittedModel::Regression(m.train(data)?),
            ModelSpec::Arima(m) => FittedModel::Arima(m.train(data)?),
            ModelSpec::Prophet(m) => FittedModel::Prophet(m.train(data)?),
        })
    }
}

/// A fitted candidate
#[derive(Debug, Clone)]
pub enum FittedModel {
    Baseline(TrainedBaseline),
    Regression(TrainedRegression),
    Arima(TrainedArima),
    Prophet(TrainedProphet),
}

impl FittedModel {
    fn inner(&self) -> &dyn TrainedForecastModel {
        match self {
            FittedModel::Baseline(m) => m,
            FittedModel::Regression(m) => m,
            FittedModel::Arima(m) => m,
            FittedModel::Prophet(m) => m,
        }
    }

    pub fn kind(&self) -> ModelKind {
        match self {
            FittedModel::Baseline(m) => m.kind(),
            FittedModel::Regression(m) => m.kind(),
            FittedModel::Arima(m) => m.kind(),
            FittedModel::Prophet(_) => ModelKind::Prophet,
        }
    }

    /// Point forecasts for the next `horizon` periods, clamped to zero from below
    pub fn forecast(&self, horizon: usize) -> Result<Vec<f64>> {
        let raw = self.inner().forecast(horizon)?;
        clamp_non_negative(self.kind(), raw.into_values())
    }

    pub fn describe(&self) -> String {
        self.inner().describe()
    }
}

/// Clamp negative points to zero; a non-finite point fails the whole forecast
pub fn clamp_non_negative(kind: ModelKind, values: Vec<f64>) -> Result<Vec<f64>> {
    values
        .into_iter()
        .map(|v| {
            if v.is_finite() {
                Ok(v.max(0.0))
            } else {
                Err(ForecastError::FitFailure(format!(
                    "{} produced a non-finite forecast",
                    kind
                )))
            }
        })
        .collect()
}
