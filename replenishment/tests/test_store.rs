use demand_forecast::{Channel, EvaluationConfig, ModelKind, Period, ProductKey, TimeSeries};
use pretty_assertions::assert_eq;
use replenishment::{
    ForecastStore, HistoryFilter, InMemoryStore, JsonLinesStore, Planner, RunConfig, RunInputs,
    RunRecord, RunRequest, StockSnapshot,
};
use std::sync::Arc;
use tempfile::tempdir;

fn key(code: &str) -> ProductKey {
    ProductKey::new(code).unwrap()
}

fn history(code: &str, channel: Channel, values: &[u64]) -> TimeSeries {
    TimeSeries::new(
        key(code),
        channel,
        Period::new(2024, 1).unwrap(),
        values.iter().map(|v| Some(*v)).collect(),
    )
}

fn config() -> RunConfig {
    RunConfig {
        evaluation: EvaluationConfig {
            models: vec![ModelKind::BaselineLast, ModelKind::BaselineMean],
            horizon: 3,
            ..EvaluationConfig::default()
        },
        ..RunConfig::default()
    }
}

/// Run the planner once and return what it stored
fn records(store: Arc<dyn ForecastStore>) -> Vec<RunRecord> {
    let mut stocks = StockSnapshot::new();
    stocks.insert(key("A"), Channel::Wildberries, "Kazan", 5).unwrap();
    let inputs = RunInputs {
        sales: vec![
            history("A", Channel::Wildberries, &[10, 10, 10, 10, 20, 20]),
            history("A", Channel::Ozon, &[4, 4, 4, 4]),
            history("B", Channel::Wildberries, &[7, 8, 9, 10]),
        ],
        stocks,
        ..RunInputs::default()
    };
    let request = RunRequest {
        horizon: 3,
        ..RunRequest::default()
    };
    Planner::new(config(), store.clone())
        .unwrap()
        .run(&request, &inputs)
        .unwrap();
    store.history(&HistoryFilter::default()).unwrap()
}

#[test]
fn test_json_lines_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("runs.jsonl");
    let store = Arc::new(JsonLinesStore::new(&path));

    assert!(store.history(&HistoryFilter::default()).unwrap().is_empty());
    let written = records(store.clone());
    assert_eq!(written.len(), 3);

    let contents = std::fs::read_to_string(&path).unwrap();
    assert_eq!(contents.lines().count(), 3);

    // A fresh handle on the same file sees the same records
    let reopened = JsonLinesStore::new(&path);
    assert_eq!(reopened.history(&HistoryFilter::default()).unwrap(), written);
}

#[test]
fn test_history_filters() {
    let store = Arc::new(InMemoryStore::new());
    let all = records(store.clone());
    assert_eq!(all.len(), 3);

    let a = store
        .history(&HistoryFilter::default().product(key("A")))
        .unwrap();
    assert_eq!(a.len(), 2);

    let a_wb = store
        .history(
            &HistoryFilter::default()
                .product(key("A"))
                .channel(Channel::Wildberries),
        )
        .unwrap();
    assert_eq!(a_wb.len(), 1);
    assert_eq!(a_wb[0].shipment_plan.lines.len(), 3);

    let model = a_wb[0].selected.model;
    let by_model = store.history(&HistoryFilter::default().model(model)).unwrap();
    assert!(by_model.iter().all(|r| r.selected.model == model));
    assert!(by_model.iter().any(|r| r.product == key("A")));
}

#[test]
fn test_compare_against_actuals() {
    let store = Arc::new(InMemoryStore::new());
    records(store.clone());

    // Forecasts for B start in 2024-05; two of the three months are observed
    let actual = TimeSeries::new(
        key("B"),
        Channel::Wildberries,
        Period::new(2024, 5).unwrap(),
        vec![Some(10), None, Some(12)],
    );
    let rows = store.compare(Channel::Wildberries, &key("B"), &actual).unwrap();

    assert_eq!(rows.len(), 2);
    assert_eq!(rows.iter().filter(|r| r.selected).count(), 1);
    for row in &rows {
        let metrics = row.metrics.as_ref().unwrap();
        assert_eq!(metrics.observations, 2);
    }

    let last = rows.iter().find(|r| r.model == ModelKind::BaselineLast).unwrap();
    // Last value 10 against actuals 10 and 12
    assert!((last.metrics.as_ref().unwrap().mae - 1.0).abs() < 1e-9);
}

#[test]
fn test_compare_without_overlap() {
    let store = Arc::new(InMemoryStore::new());
    records(store.clone());
    let actual = TimeSeries::new(
        key("A"),
        Channel::Ozon,
        Period::new(2030, 1).unwrap(),
        vec![Some(1)],
    );
    let rows = store.compare(Channel::Ozon, &key("A"), &actual).unwrap();
    assert!(!rows.is_empty());
    assert!(rows.iter().all(|r| r.metrics.is_none()));
}
