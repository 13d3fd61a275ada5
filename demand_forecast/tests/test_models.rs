use assert_approx_eq::assert_approx_eq;
use demand_forecast::calendar::{CalendarFeatureProvider, StaticCalendar};
use demand_forecast::config::EvaluationConfig;
use demand_forecast::data::{Channel, Period};
use demand_forecast::error::ForecastError;
use demand_forecast::models::{FittedModel, ModelKind, ModelSpec, TrainingSet};
use proptest::prelude::*;
use rstest::rstest;

fn training(values: Vec<f64>, future: usize) -> TrainingSet {
    let start = Period::new(2022, 6).unwrap();
    let features =
        StaticCalendar::default().features_for(start, values.len() + future, Channel::Ozon);
    TrainingSet::new(start, values, features, 12).unwrap()
}

fn fit(kind: ModelKind, values: Vec<f64>, future: usize) -> Result<FittedModel, ForecastError> {
    ModelSpec::for_kind(kind, &EvaluationConfig::default()).fit(&training(values, future))
}

#[rstest]
#[case(ModelKind::BaselineMean)]
#[case(ModelKind::BaselineMedian)]
#[case(ModelKind::BaselineLast)]
#[case(ModelKind::RegressionContinuous)]
#[case(ModelKind::RegressionBinary)]
#[case(ModelKind::Arima)]
#[case(ModelKind::Sarima)]
#[case(ModelKind::Sarimax)]
#[case(ModelKind::Prophet)]
fn test_every_kind_fits_a_flat_series(#[case] kind: ModelKind) {
    let fitted = fit(kind, vec![80.0; 30], 12).unwrap();
    assert_eq!(fitted.kind(), kind);
    let forecast = fitted.forecast(12).unwrap();
    assert_eq!(forecast.len(), 12);
    for value in forecast {
        assert_approx_eq!(value, 80.0, 1e-4);
    }
    assert!(fitted.describe().starts_with(kind.name()));
}

#[rstest]
#[case(ModelKind::Arima, 24)]
#[case(ModelKind::Sarima, 24)]
#[case(ModelKind::Sarimax, 24)]
#[case(ModelKind::Prophet, 2)]
#[case(ModelKind::RegressionBinary, 2)]
#[case(ModelKind::BaselineLast, 1)]
fn test_minimum_history(#[case] kind: ModelKind, #[case] needed: usize) {
    let short = fit(kind, vec![10.0; needed - 1], 3);
    assert!(matches!(
        short,
        Err(ForecastError::InsufficientHistory { needed: n, .. }) if n == needed
    ));
    assert!(fit(kind, vec![10.0; needed], 3).is_ok());
}

#[test]
fn test_declining_series_is_clamped() {
    let values: Vec<f64> = (0..24).map(|t| 240.0 - 10.0 * t as f64).collect();
    let fitted = fit(ModelKind::RegressionContinuous, values, 18).unwrap();
    let forecast = fitted.forecast(18).unwrap();
    assert!(forecast.iter().all(|v| *v >= 0.0));
    assert_eq!(*forecast.last().unwrap(), 0.0);
}

#[test]
fn test_config_drives_candidate_construction() {
    let mut config = EvaluationConfig::default();
    config.arima.max_p = 0;
    config.arima.max_q = 0;
    let spec = ModelSpec::for_kind(ModelKind::Arima, &config);
    let fitted = spec.fit(&training(vec![5.0, 6.0, 7.0, 8.0].repeat(8), 3)).unwrap();
    // Only differencing orders remain in the grid
    assert!(fitted.describe().contains("ARIMA(0,"));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_forecasts_are_never_negative(
        values in prop::collection::vec(0u32..500, 1..40),
        kind_index in 0usize..ModelKind::ALL.len(),
    ) {
        let kind = ModelKind::ALL[kind_index];
        let values: Vec<f64> = values.into_iter().map(f64::from).collect();
        if let Ok(fitted) = fit(kind, values, 6) {
            if let Ok(forecast) = fitted.forecast(6) {
                prop_assert!(forecast.iter().all(|v| *v >= 0.0 && v.is_finite()));
            }
        }
    }
}
