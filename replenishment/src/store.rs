//! Append-only log of forecast runs
//!
//! Every product and channel of a run becomes one [`RunRecord`]. Records are
//! written whole and read back in append order.

use crate::shipment::ShipmentPlan;
use crate::{ReplenishError, Result};
use chrono::{DateTime, Utc};
use demand_forecast::{
    CandidateResult, Channel, MetricSet, ModelKind, ProductKey, SelectedForecast, TimeSeries,
};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

/// One product and channel of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub product: ProductKey,
    pub channel: Channel,
    pub horizon: usize,
    /// Every candidate with its metrics and live forecast
    pub candidates: Vec<CandidateResult>,
    /// Winner, with constraints applied to its forecast
    pub selected: SelectedForecast,
    pub shipment_plan: ShipmentPlan,
}

/// Optional filters for [`ForecastStore::history`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryFilter {
    pub product: Option<ProductKey>,
    pub channel: Option<Channel>,
    /// Selected model of the run
    pub model: Option<ModelKind>,
}

impl HistoryFilter {
    pub fn product(mut self, product: ProductKey) -> Self {
        self.product = Some(product);
        self
    }

    pub fn channel(mut self, channel: Channel) -> Self {
        self.channel = Some(channel);
        self
    }

    pub fn model(mut self, model: ModelKind) -> Self {
        self.model = Some(model);
        self
    }

    pub fn matches(&self, record: &RunRecord) -> bool {
        self.product.as_ref().map_or(true, |p| *p == record.product)
            && self.channel.map_or(true, |c| c == record.channel)
            && self.model.map_or(true, |m| m == record.selected.model)
    }
}

/// Accuracy of one stored candidate forecast against observed sales
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccuracyRow {
    pub run_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub model: ModelKind,
    /// Whether the candidate was the run's selection
    pub selected: bool,
    /// `None` when no forecast month has a known actual
    pub metrics: Option<MetricSet>,
}

/// Durable history of runs
pub trait ForecastStore: Send + Sync {
    /// Persist one record as a unit
    fn append_run(&self, record: &RunRecord) -> Result<()>;

    /// Matching records in append order
    fn history(&self, filter: &HistoryFilter) -> Result<Vec<RunRecord>>;

    /// Score every stored candidate forecast for `product` on `channel` against `actual`
    fn compare(
        &self,
        channel: Channel,
        product: &ProductKey,
        actual: &TimeSeries,
    ) -> Result<Vec<AccuracyRow>> {
        let filter = HistoryFilter::default()
            .product(product.clone())
            .channel(channel);
        let mut rows = Vec::new();
        for record in self.history(&filter)? {
            for candidate in &record.candidates {
                let Some(forecast) = &candidate.forecast else {
                    continue;
                };
                let observed: Vec<Option<f64>> = forecast
                    .periods()
                    .into_iter()
                    .map(|period| actual.get(period).flatten().map(|v| v as f64))
                    .collect();
                rows.push(AccuracyRow {
                    run_id: record.run_id,
                    created_at: record.created_at,
                    model: candidate.model,
                    selected: candidate.model == record.selected.model,
                    metrics: MetricSet::compute(&observed, &forecast.values)?,
                });
            }
        }
        Ok(rows)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex.lock().map_err(|_| {
        ReplenishError::Io(std::io::Error::new(
            ErrorKind::Other,
            "forecast store lock poisoned",
        ))
    })
}

/// Store kept in process memory
#[derive(Debug, Default)]
pub struct InMemoryStore {
    records: Mutex<Vec<RunRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map_or(0, |r| r.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ForecastStore for InMemoryStore {
    fn append_run(&self, record: &RunRecord) -> Result<()> {
        lock(&self.records)?.push(record.clone());
        Ok(())
    }

    fn history(&self, filter: &HistoryFilter) -> Result<Vec<RunRecord>> {
        Ok(lock(&self.records)?
            .iter()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect())
    }
}

/// Store backed by a JSON Lines file, one record per line
#[derive(Debug)]
pub struct JsonLinesStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonLinesStore {
    /// Use `path`; the file is created on first append
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ForecastStore for JsonLinesStore {
    fn append_run(&self, record: &RunRecord) -> Result<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let _guard = lock(&self.write_lock)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    fn history(&self, filter: &HistoryFilter) -> Result<Vec<RunRecord>> {
        let _guard = lock(&self.write_lock)?;
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut records = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record: RunRecord = serde_json::from_str(&line)?;
            if filter.matches(&record) {
                records.push(record);
            }
        }
        Ok(records)
    }
}
