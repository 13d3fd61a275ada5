use demand_forecast::data::{Channel, ForecastSeries, Period, ProductKey, TimeSeries};
use demand_forecast::error::ForecastError;
use pretty_assertions::assert_eq;

fn p(s: &str) -> Period {
    s.parse().unwrap()
}

#[test]
fn test_series_from_sparse_observations() {
    let series = TimeSeries::from_observations(
        ProductKey::new("A-1").unwrap(),
        Channel::Wildberries,
        vec![
            (p("2024-11"), Some(10)),
            (p("2025-01"), Some(30)),
            (p("2025-02"), None),
            (p("2025-03"), Some(50)),
        ],
    )
    .unwrap();

    assert_eq!(series.len(), 5);
    assert_eq!(series.known_count(), 3);
    assert_eq!(
        series.periods(),
        vec![p("2024-11"), p("2024-12"), p("2025-01"), p("2025-02"), p("2025-03")]
    );
    assert_eq!(series.filled().unwrap(), vec![10.0, 20.0, 30.0, 40.0, 50.0]);
    assert_eq!(series.next_period(), p("2025-04"));
}

#[test]
fn test_empty_observations_are_rejected() {
    let result = TimeSeries::from_observations(ProductKey::new("A").unwrap(), Channel::Ozon, vec![]);
    assert!(matches!(result, Err(ForecastError::DataIntegrity(_))));
}

#[test]
fn test_series_serde() {
    let series = TimeSeries::new(
        ProductKey::new("A").unwrap(),
        Channel::Ozon,
        p("2024-01"),
        vec![Some(1), None],
    );
    let json = serde_json::to_string(&series).unwrap();
    assert!(json.contains("\"start\":\"2024-01\""));
    assert!(json.contains("\"channel\":\"ozon\""));
    let back: TimeSeries = serde_json::from_str(&json).unwrap();
    assert_eq!(back, series);
}

#[test]
fn test_forecast_series_periods() {
    let forecast = ForecastSeries::new(p("2025-11"), vec![1.0, 2.0, 3.0]);
    assert_eq!(forecast.periods(), vec![p("2025-11"), p("2025-12"), p("2026-01")]);
}
