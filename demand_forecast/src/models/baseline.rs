//! Flat baseline forecasts

use crate::error::Result;
use crate::models::{ForecastModel, ForecastResult, ModelKind, TrainedForecastModel, TrainingSet};
use demand_math::stats;

/// Statistic carried forward by the baseline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaselineMethod {
    Mean,
    Median,
    /// Last observed value
    Last,
}

/// Forecasts a single level for every future period
#[derive(Debug, Clone)]
pub struct BaselineModel {
    method: BaselineMethod,
}

/// Trained baseline
#[derive(Debug, Clone)]
pub struct TrainedBaseline {
    method: BaselineMethod,
    level: f64,
}

impl BaselineModel {
    pub fn new(method: BaselineMethod) -> Self {
        Self { method }
    }

    pub fn kind(&self) -> ModelKind {
        kind_of(self.method)
    }
}

fn kind_of(method: BaselineMethod) -> ModelKind {
    match method {
        BaselineMethod::Mean => ModelKind::BaselineMean,
        BaselineMethod::Median => ModelKind::BaselineMedian,
        BaselineMethod::Last => ModelKind::BaselineLast,
    }
}

impl ForecastModel for BaselineModel {
    type Trained = TrainedBaseline;

    fn train(&self, data: &TrainingSet) -> Result<Self::Trained> {
        data.require(self.name(), 1)?;
        let values = data.values();
        let level = match self.method {
            BaselineMethod::Mean => stats::mean(values)?,
            BaselineMethod::Median => stats::median(values)?,
            BaselineMethod::Last => values[values.len() - 1],
        };
        Ok(TrainedBaseline {
            method: self.method,
            level,
        })
    }

    fn name(&self) -> &str {
        self.kind().name()
    }
}

impl TrainedBaseline {
    pub fn kind(&self) -> ModelKind {
        kind_of(self.method)
    }

    /// The level carried forward
    pub fn level(&self) -> f64 {
        self.level
    }
}

impl TrainedForecastModel for TrainedBaseline {
    fn forecast(&self, horizons: usize) -> Result<ForecastResult> {
        ForecastResult::new(vec![self.level; horizons], horizons)
    }

    fn describe(&self) -> String {
        format!("{} level={:.3}", self.name(), self.level)
    }

    fn name(&self) -> &str {
        self.kind().name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Period;
    use crate::error::ForecastError;
    use assert_approx_eq::assert_approx_eq;
    use rstest::rstest;

    fn training(values: Vec<f64>) -> TrainingSet {
        let start = Period::new(2024, 1).unwrap();
        let features = crate::calendar::CalendarFeatureProvider::features_for(
            &crate::calendar::StaticCalendar::default(),
            start,
            values.len(),
            crate::data::Channel::Ozon,
        );
        TrainingSet::new(start, values, features, 12).unwrap()
    }

    #[rstest]
    #[case(BaselineMethod::Mean, 4.0)]
    #[case(BaselineMethod::Median, 3.0)]
    #[case(BaselineMethod::Last, 1.0)]
    fn test_levels(#[case] method: BaselineMethod, #[case] expected: f64) {
        let model = BaselineModel::new(method);
        let trained = model.train(&training(vec![2.0, 10.0, 3.0, 4.0, 1.0])).unwrap();
        assert_approx_eq!(trained.level(), expected);
        let forecast = trained.forecast(3).unwrap();
        assert_eq!(forecast.values(), &[expected; 3]);
    }

    #[test]
    fn test_empty_history_fails() {
        let result = BaselineModel::new(BaselineMethod::Mean).train(&training(vec![]));
        assert!(matches!(
            result,
            Err(ForecastError::InsufficientHistory { needed: 1, got: 0, .. })
        ));
    }
}
