use assert_approx_eq::assert_approx_eq;
use demand_forecast::calendar::StaticCalendar;
use demand_forecast::config::{ArimaGrid, EvaluationConfig};
use demand_forecast::data::{Channel, Period, ProductKey, TimeSeries};
use demand_forecast::evaluator::{CandidateStatus, EvaluationOutcome, ModelEvaluator};
use demand_forecast::models::ModelKind;
use demand_math::NelderMeadConfig;
use pretty_assertions::assert_eq;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

fn series(values: Vec<Option<u64>>) -> TimeSeries {
    TimeSeries::new(
        ProductKey::new("SKU-1").unwrap(),
        Channel::Wildberries,
        Period::new(2023, 1).unwrap(),
        values,
    )
}

fn evaluator(config: EvaluationConfig) -> ModelEvaluator {
    ModelEvaluator::new(config, Arc::new(StaticCalendar::default())).unwrap()
}

fn seasonal_history(seed: u64, months: usize) -> Vec<Option<u64>> {
    let pattern = [60, 55, 70, 80, 95, 110, 120, 115, 100, 90, 150, 210];
    let mut rng = StdRng::seed_from_u64(seed);
    (0..months)
        .map(|t| Some((pattern[t % 12] as i64 + rng.gen_range(-8..=8)) as u64))
        .collect()
}

#[test]
fn test_constant_history_forecasts_constant() {
    let outcome = evaluator(EvaluationConfig::default())
        .evaluate(&series(vec![Some(100); 24]))
        .unwrap();
    let evaluation = outcome.evaluation().expect("a model should be selected");

    assert_eq!(evaluation.holdout, 3);
    assert_eq!(evaluation.selected.forecast.len(), 18);
    assert_eq!(evaluation.selected.forecast.start, Period::new(2025, 1).unwrap());
    for value in &evaluation.selected.forecast.values {
        assert_approx_eq!(*value, 100.0, 1e-6);
    }
    // Every baseline scores a perfect backtest; configuration order breaks the tie
    assert_eq!(evaluation.selected.model, ModelKind::BaselineMean);
    assert_eq!(evaluation.summary().len(), ModelKind::ALL.len());
}

#[test]
fn test_lower_mape_wins() {
    let config = EvaluationConfig {
        models: vec![ModelKind::BaselineLast, ModelKind::BaselineMean],
        ..EvaluationConfig::default()
    };
    let history = vec![Some(98), Some(105), Some(112), Some(100), Some(100), Some(100)];
    let evaluation = evaluator(config)
        .evaluate(&series(history))
        .unwrap()
        .into_result()
        .unwrap();

    let last = evaluation.candidate(ModelKind::BaselineLast).unwrap();
    let mean = evaluation.candidate(ModelKind::BaselineMean).unwrap();
    assert_approx_eq!(last.metrics.as_ref().unwrap().mape.unwrap(), 12.0);
    assert_approx_eq!(mean.metrics.as_ref().unwrap().mape.unwrap(), 5.0);
    assert_eq!(evaluation.selected.model, ModelKind::BaselineMean);
    assert_eq!(mean.rank, Some(1));
    assert_eq!(last.rank, Some(2));
}

#[test]
fn test_single_month_history_uses_baselines_only() {
    let outcome = evaluator(EvaluationConfig::default())
        .evaluate(&series(vec![Some(40)]))
        .unwrap();
    let evaluation = outcome.evaluation().unwrap();

    assert_eq!(evaluation.holdout, 0);
    for candidate in &evaluation.candidates {
        match candidate.model {
            ModelKind::BaselineMean | ModelKind::BaselineMedian | ModelKind::BaselineLast => {
                assert_eq!(candidate.status, CandidateStatus::Unscored);
                assert!(candidate.metrics.is_none());
            }
            _ => assert!(matches!(candidate.status, CandidateStatus::Skipped { .. })),
        }
    }
    assert_eq!(evaluation.selected.model, ModelKind::BaselineMean);
    assert_approx_eq!(evaluation.selected.forecast.values[0], 40.0);
}

#[test]
fn test_zero_holdout_actuals_fall_back_to_rmse() {
    let mut history: Vec<Option<u64>> = (0..21).map(|t| Some(50 + (t % 5) * 10)).collect();
    history.extend([Some(0), Some(0), Some(0)]);
    let evaluation = evaluator(EvaluationConfig::default())
        .evaluate(&series(history))
        .unwrap()
        .into_result()
        .unwrap();

    let scored: Vec<_> = evaluation
        .candidates
        .iter()
        .filter(|c| c.status == CandidateStatus::Scored)
        .collect();
    assert!(!scored.is_empty());
    for candidate in &scored {
        assert!(candidate.metrics.as_ref().unwrap().mape.is_none());
    }
    let best_rmse = scored
        .iter()
        .filter(|c| c.forecast.is_some())
        .map(|c| c.metrics.as_ref().unwrap().rmse)
        .fold(f64::INFINITY, f64::min);
    assert_approx_eq!(evaluation.selected.metrics.as_ref().unwrap().rmse, best_rmse);
}

#[test]
fn test_empty_history_yields_no_forecast() {
    let outcome = evaluator(EvaluationConfig::default())
        .evaluate(&series(vec![]))
        .unwrap();
    match &outcome {
        EvaluationOutcome::NoForecast { candidates, .. } => {
            assert_eq!(candidates.len(), ModelKind::ALL.len());
            assert!(candidates.iter().all(|c| c.rank.is_none()));
        }
        EvaluationOutcome::Selected(_) => panic!("an empty history must not produce a forecast"),
    }
    assert!(outcome.into_result().is_err());
}

#[test]
fn test_short_history_skips_long_history_families() {
    let evaluation = evaluator(EvaluationConfig::default())
        .evaluate(&series(seasonal_history(5, 10)))
        .unwrap()
        .into_result()
        .unwrap();
    for kind in [ModelKind::Arima, ModelKind::Sarima, ModelKind::Sarimax, ModelKind::Prophet] {
        let candidate = evaluation.candidate(kind).unwrap();
        assert!(matches!(candidate.status, CandidateStatus::Skipped { .. }));
    }
    let regression = evaluation.candidate(ModelKind::RegressionContinuous).unwrap();
    assert_eq!(regression.status, CandidateStatus::Scored);
}

#[test]
fn test_evaluation_is_idempotent() {
    let history = series(seasonal_history(42, 36));
    let evaluator = evaluator(EvaluationConfig::default());
    let first = evaluator.evaluate(&history).unwrap();
    let second = evaluator.evaluate(&history).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_missing_months_are_not_scored() {
    let mut history = vec![Some(100); 21];
    history.extend([Some(100), None, Some(100)]);
    let evaluation = evaluator(EvaluationConfig {
        models: vec![ModelKind::BaselineMean],
        ..EvaluationConfig::default()
    })
    .evaluate(&series(history))
    .unwrap()
    .into_result()
    .unwrap();
    assert_eq!(
        evaluation.selected.metrics.as_ref().unwrap().observations,
        2
    );
}

#[test]
fn test_every_candidate_forecast_is_non_negative() {
    // Sharp decline pushes trend models below zero before clamping
    let history: Vec<Option<u64>> = (0..30).map(|t| Some(300u64.saturating_sub(t * 10))).collect();
    let evaluation = evaluator(EvaluationConfig::default())
        .evaluate(&series(history))
        .unwrap()
        .into_result()
        .unwrap();
    for candidate in &evaluation.candidates {
        if let Some(forecast) = &candidate.forecast {
            assert!(forecast.values.iter().all(|v| *v >= 0.0), "{}", candidate.model);
        }
    }
}

#[test]
fn test_tiny_timeout_never_fails_the_run() {
    let config = EvaluationConfig {
        fit_timeout_ms: 1,
        ..EvaluationConfig::default()
    };
    let outcome = evaluator(config).evaluate(&series(seasonal_history(9, 36)));
    assert!(outcome.is_ok());
}

#[test]
fn test_slow_candidate_times_out_and_fast_one_is_selected() {
    // A grid this wide with a tolerance the simplex can never reach runs far past the deadline
    let config = EvaluationConfig {
        fit_timeout_ms: 300,
        models: vec![ModelKind::BaselineMean, ModelKind::Sarima],
        arima: ArimaGrid {
            max_p: 6,
            max_d: 2,
            max_q: 6,
            max_seasonal_p: 2,
            max_seasonal_d: 1,
            max_seasonal_q: 2,
            optimizer: NelderMeadConfig {
                max_iter: 1_000_000,
                tolerance: 0.0,
                ..NelderMeadConfig::default()
            },
        },
        ..EvaluationConfig::default()
    };
    let evaluation = evaluator(config)
        .evaluate(&series(seasonal_history(21, 36)))
        .unwrap()
        .into_result()
        .unwrap();

    let sarima = evaluation
        .candidates
        .iter()
        .find(|c| c.model == ModelKind::Sarima)
        .unwrap();
    assert_eq!(sarima.status, CandidateStatus::TimedOut { millis: 300 });
    assert_eq!(sarima.rank, None);
    assert!(sarima.forecast.is_none());

    assert_eq!(evaluation.selected.model, ModelKind::BaselineMean);
    let mean = evaluation
        .candidates
        .iter()
        .find(|c| c.model == ModelKind::BaselineMean)
        .unwrap();
    assert_eq!(mean.rank, Some(1));
}
