//! Linear regression over lags, trend and calendar signals
//!
//! Features are chosen by greedy forward selection on in-sample squared
//! error. Candidates are scanned in a fixed order (trend, lags, calendar) and
//! a feature is only accepted when it lowers the error by more than the
//! configured relative threshold, so a marginal gain keeps the smaller set.

use crate::calendar::{binary_feature_names, FeatureVector, CONTINUOUS_FEATURES};
use crate::config::RegressionConfig;
use crate::error::Result;
use crate::models::{
    future_window, ForecastModel, ForecastResult, ModelKind, TrainedForecastModel, TrainingSet,
};
use demand_math::{ols_fit, stats, OlsFit};
use tracing::trace;

/// Calendar encoding used by the regression
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureMode {
    /// Day shares and cyclic month encoding
    Continuous,
    /// Indicator flags and month one-hot columns
    Binary,
}

impl FeatureMode {
    fn encode(&self, features: &FeatureVector) -> Vec<f64> {
        match self {
            FeatureMode::Continuous => features.continuous(),
            FeatureMode::Binary => features.binary(),
        }
    }

    fn names(&self) -> Vec<String> {
        match self {
            FeatureMode::Continuous => CONTINUOUS_FEATURES.iter().map(|s| s.to_string()).collect(),
            FeatureMode::Binary => binary_feature_names(),
        }
    }
}

/// One candidate regressor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Feature {
    Trend,
    Lag(usize),
    Calendar(usize),
}

/// Regression candidate
#[derive(Debug, Clone)]
pub struct RegressionModel {
    mode: FeatureMode,
    config: RegressionConfig,
}

/// Trained regression
#[derive(Debug, Clone)]
pub struct TrainedRegression {
    mode: FeatureMode,
    features: Vec<Feature>,
    fit: OlsFit,
    history: Vec<f64>,
    calendar_history: Vec<Vec<f64>>,
    future_features: Vec<FeatureVector>,
}

impl RegressionModel {
    pub fn new(mode: FeatureMode, config: RegressionConfig) -> Self {
        Self { mode, config }
    }

    pub fn kind(&self) -> ModelKind {
        kind_of(self.mode)
    }

    /// Lags usable with `n` observations while leaving at least two rows
    fn usable_lags(&self, n: usize) -> Vec<usize> {
        let mut lags: Vec<usize> = self
            .config
            .lags
            .iter()
            .copied()
            .filter(|&k| k * 2 <= n && n - k >= 2)
            .collect();
        lags.sort_unstable();
        lags.dedup();
        lags
    }
}

fn kind_of(mode: FeatureMode) -> ModelKind {
    match mode {
        FeatureMode::Continuous => ModelKind::RegressionContinuous,
        FeatureMode::Binary => ModelKind::RegressionBinary,
    }
}

/// Value of `feature` at time `t` given the (possibly extended) series and calendar row
fn feature_value(feature: Feature, t: usize, series: &[f64], calendar: &[f64]) -> f64 {
    match feature {
        Feature::Trend => t as f64,
        Feature::Lag(k) => series[t - k],
        Feature::Calendar(i) => calendar[i],
    }
}

impl ForecastModel for RegressionModel {
    type Trained = TrainedRegression;

    fn train(&self, data: &TrainingSet) -> Result<Self::Trained> {
        data.require(self.name(), 2)?;
        let y_all = data.values();
        let n = y_all.len();

        let lags = self.usable_lags(n);
        let first_row = lags.iter().copied().max().unwrap_or(0);
        let calendar_history: Vec<Vec<f64>> = data
            .history_features()
            .iter()
            .map(|f| self.mode.encode(f))
            .collect();
        let calendar_width = self.mode.names().len();

        let mut candidates = vec![Feature::Trend];
        candidates.extend(lags.iter().map(|&k| Feature::Lag(k)));
        candidates.extend((0..calendar_width).map(Feature::Calendar));

        let rows: Vec<usize> = (first_row..n).collect();
        let y: Vec<f64> = rows.iter().map(|&t| y_all[t]).collect();
        let column = |feature: Feature| -> Vec<f64> {
            rows.iter()
                .map(|&t| feature_value(feature, t, y_all, &calendar_history[t]))
                .collect()
        };

        let mut selected: Vec<Feature> = Vec::new();
        let mut columns: Vec<Vec<f64>> = Vec::new();
        let mut current = ols_fit(&y, &columns)?;

        while selected.len() < self.config.max_features && rows.len() >= selected.len() + 3 {
            if current.sse <= stats::VARIANCE_FLOOR {
                break;
            }
            let mut best: Option<(Feature, Vec<f64>, OlsFit)> = None;
            for &candidate in candidates.iter().filter(|c| !selected.contains(c)) {
                let candidate_column = column(candidate);
                let mut trial = columns.clone();
                trial.push(candidate_column.clone());
                let fit = match ols_fit(&y, &trial) {
                    Ok(fit) => fit,
                    Err(_) => continue,
                };
                let better = best.as_ref().map_or(true, |(_, _, b)| fit.sse < b.sse);
                if better {
                    best = Some((candidate, candidate_column, fit));
                }
            }

            let Some((feature, feature_column, fit)) = best else {
                break;
            };
            let gain = (current.sse - fit.sse) / current.sse;
            if gain <= self.config.min_improvement {
                break;
            }
            trace!(model = self.name(), ?feature, gain, "regression feature accepted");
            selected.push(feature);
            columns.push(feature_column);
            current = fit;
        }

        Ok(TrainedRegression {
            mode: self.mode,
            features: selected,
            fit: current,
            history: y_all.to_vec(),
            calendar_history,
            future_features: data.future_features().to_vec(),
        })
    }

    fn name(&self) -> &str {
        self.kind().name()
    }
}

impl TrainedRegression {
    pub fn kind(&self) -> ModelKind {
        kind_of(self.mode)
    }

    /// Names of the selected regressors, in selection order
    pub fn selected_features(&self) -> Vec<String> {
        let calendar_names = self.mode.names();
        self.features
            .iter()
            .map(|f| match f {
                Feature::Trend => "trend".to_string(),
                Feature::Lag(k) => format!("lag_{}", k),
                Feature::Calendar(i) => calendar_names
                    .get(*i)
                    .cloned()
                    .unwrap_or_else(|| format!("calendar_{}", i)),
            })
            .collect()
    }

    /// Fitted coefficients
    pub fn fit(&self) -> &OlsFit {
        &self.fit
    }
}

impl TrainedForecastModel for TrainedRegression {
    fn forecast(&self, horizons: usize) -> Result<ForecastResult> {
        let uses_calendar = self.features.iter().any(|f| matches!(f, Feature::Calendar(_)));
        let future: Vec<Vec<f64>> = if uses_calendar {
            future_window(self.name(), &self.future_features, horizons)?
                .iter()
                .map(|f| self.mode.encode(f))
                .collect()
        } else {
            vec![Vec::new(); horizons]
        };

        let n = self.history.len();
        let mut extended = self.history.clone();
        let mut values = Vec::with_capacity(horizons);
        for (h, calendar) in future.iter().enumerate() {
            let t = n + h;
            let row: Vec<f64> = self
                .features
                .iter()
                .map(|&f| feature_value(f, t, &extended, calendar))
                .collect();
            let prediction = self.fit.predict_row(&row)?;
            // Lags only ever see non-negative demand
            extended.push(prediction.max(0.0));
            values.push(prediction);
        }
        ForecastResult::new(values, horizons)
    }

    fn describe(&self) -> String {
        format!(
            "{} features=[{}] in-sample rows={}",
            self.name(),
            self.selected_features().join(", "),
            self.fit.observations
        )
    }

    fn name(&self) -> &str {
        self.kind().name()
    }
}

impl TrainedRegression {
    /// In-sample fitted values over the rows the regression was estimated on
    pub fn fitted_values(&self) -> Result<Vec<f64>> {
        let first_row = self.history.len() - self.fit.observations;
        (first_row..self.history.len())
            .map(|t| {
                let row: Vec<f64> = self
                    .features
                    .iter()
                    .map(|&f| feature_value(f, t, &self.history, &self.calendar_history[t]))
                    .collect();
                Ok(self.fit.predict_row(&row)?)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::{CalendarFeatureProvider, StaticCalendar};
    use crate::data::{Channel, Period};
    use crate::error::ForecastError;
    use assert_approx_eq::assert_approx_eq;

    fn training(values: Vec<f64>, future: usize) -> TrainingSet {
        let start = Period::new(2023, 1).unwrap();
        let features =
            StaticCalendar::default().features_for(start, values.len() + future, Channel::Wildberries);
        TrainingSet::new(start, values, features, 12).unwrap()
    }

    #[test]
    fn test_linear_trend_is_recovered() {
        let values: Vec<f64> = (0..24).map(|t| 50.0 + 5.0 * t as f64).collect();
        let model = RegressionModel::new(FeatureMode::Continuous, RegressionConfig::default());
        let trained = model.train(&training(values, 6)).unwrap();
        assert_eq!(trained.selected_features().len(), 1);
        let forecast = trained.forecast(3).unwrap();
        assert_approx_eq!(forecast.values()[0], 170.0, 1e-6);
        assert_approx_eq!(forecast.values()[2], 180.0, 1e-6);
    }

    #[test]
    fn test_constant_series_keeps_intercept_only() {
        let model = RegressionModel::new(FeatureMode::Binary, RegressionConfig::default());
        let trained = model.train(&training(vec![100.0; 24], 18)).unwrap();
        assert!(trained.selected_features().is_empty());
        let forecast = trained.forecast(18).unwrap();
        for value in forecast.values() {
            assert_approx_eq!(*value, 100.0, 1e-9);
        }
    }

    #[test]
    fn test_selection_is_deterministic() {
        let values: Vec<f64> = (0..30)
            .map(|t| 80.0 + 20.0 * ((t % 12) as f64 / 11.0) + (t as f64) * 0.7)
            .collect();
        let model = RegressionModel::new(FeatureMode::Binary, RegressionConfig::default());
        let a = model.train(&training(values.clone(), 12)).unwrap();
        let b = model.train(&training(values, 12)).unwrap();
        assert_eq!(a.selected_features(), b.selected_features());
        assert_eq!(a.forecast(12).unwrap(), b.forecast(12).unwrap());
    }

    #[test]
    fn test_max_features_is_respected() {
        let values: Vec<f64> = (0..36).map(|t| ((t * 37) % 17) as f64 * 10.0).collect();
        let config = RegressionConfig {
            max_features: 2,
            min_improvement: 0.0,
            ..RegressionConfig::default()
        };
        let trained = RegressionModel::new(FeatureMode::Binary, config)
            .train(&training(values, 3))
            .unwrap();
        assert!(trained.selected_features().len() <= 2);
        assert_eq!(trained.fitted_values().unwrap().len(), trained.fit().observations);
    }

    #[test]
    fn test_requires_two_observations() {
        let model = RegressionModel::new(FeatureMode::Continuous, RegressionConfig::default());
        assert!(matches!(
            model.train(&training(vec![5.0], 1)),
            Err(ForecastError::InsufficientHistory { .. })
        ));
        assert!(model.train(&training(vec![5.0, 7.0], 1)).is_ok());
    }

    #[test]
    fn test_lags_limited_by_history() {
        let model = RegressionModel::new(FeatureMode::Continuous, RegressionConfig::default());
        assert_eq!(model.usable_lags(24), vec![1, 2, 12]);
        assert_eq!(model.usable_lags(9), vec![1, 2]);
        assert_eq!(model.usable_lags(2), Vec::<usize>::new());
    }
}
