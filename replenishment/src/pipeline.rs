//! Batch planning across products and channels

use crate::constraints::ConstraintBook;
use crate::settings::RunConfig;
use crate::shipment::{ShipmentCalculator, ShipmentPlan, StockSnapshot};
use crate::store::{ForecastStore, RunRecord};
use crate::{ReplenishError, Result};
use chrono::{DateTime, Utc};
use demand_forecast::{
    Channel, EvaluationOutcome, ModelEvaluator, ModelKind, ProductKey, SelectedForecast,
    StaticCalendar, SummaryRow, TimeSeries,
};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, info_span, warn};
use uuid::Uuid;

/// What to plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRequest {
    pub channels: Vec<Channel>,
    /// Live forecast length in months
    pub horizon: usize,
    /// Restrict the run to one product
    pub product: Option<ProductKey>,
}

impl Default for RunRequest {
    fn default() -> Self {
        Self {
            channels: Channel::ALL.to_vec(),
            horizon: 18,
            product: None,
        }
    }
}

/// Input rows refused at ingestion, attributed to the product they belong to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedInput {
    pub product: ProductKey,
    /// `None` when the row carried no usable channel; the product fails on every channel
    pub channel: Option<Channel>,
    pub reason: String,
}

impl RejectedInput {
    pub fn new(product: ProductKey, channel: Option<Channel>, err: &ReplenishError) -> Self {
        Self {
            product,
            channel,
            reason: err.to_string(),
        }
    }

    pub fn applies_to(&self, product: &ProductKey, channel: Channel) -> bool {
        &self.product == product && self.channel.map_or(true, |c| c == channel)
    }
}

/// Data a run works on, already keyed by canonical product code
#[derive(Debug, Clone, Default)]
pub struct RunInputs {
    pub sales: Vec<TimeSeries>,
    pub stocks: StockSnapshot,
    pub constraints: ConstraintBook,
    /// Products whose input rows were refused; each fails without being planned
    pub rejected: Vec<RejectedInput>,
}

/// Outcome for one product on one channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProductStatus {
    Planned {
        model: ModelKind,
        total_units: u64,
        lines: usize,
    },
    /// No candidate produced a forecast; nothing is shipped
    Skipped { reason: String },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductReport {
    pub product: ProductKey,
    pub channel: Channel,
    pub status: ProductStatus,
    /// One row per candidate model; empty unless planned
    pub summary: Vec<SummaryRow>,
    /// Selected forecast with constraints applied
    pub selected: Option<SelectedForecast>,
    pub plan: Option<ShipmentPlan>,
}

impl ProductReport {
    fn without_plan(product: ProductKey, channel: Channel, status: ProductStatus) -> Self {
        Self {
            product,
            channel,
            status,
            summary: Vec::new(),
            selected: None,
            plan: None,
        }
    }
}

/// Per-product statuses of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub horizon: usize,
    pub products: Vec<ProductReport>,
}

impl RunReport {
    fn count(&self, pred: impl Fn(&ProductStatus) -> bool) -> usize {
        self.products.iter().filter(|p| pred(&p.status)).count()
    }

    pub fn planned(&self) -> usize {
        self.count(|s| matches!(s, ProductStatus::Planned { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|s| matches!(s, ProductStatus::Skipped { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, ProductStatus::Failed { .. }))
    }

    /// Shipped units per channel over all planned products
    pub fn totals_by_channel(&self) -> BTreeMap<Channel, u64> {
        let mut totals = BTreeMap::new();
        for report in &self.products {
            if let ProductStatus::Planned { total_units, .. } = report.status {
                *totals.entry(report.channel).or_insert(0) += total_units;
            }
        }
        totals
    }

    pub fn report(&self, product: &ProductKey, channel: Channel) -> Option<&ProductReport> {
        self.products
            .iter()
            .find(|r| &r.product == product && r.channel == channel)
    }
}

/// Runs evaluation, constraints, shipment sizing and persistence
pub struct Planner {
    config: Arc<RunConfig>,
    evaluator: ModelEvaluator,
    calculator: ShipmentCalculator,
    store: Arc<dyn ForecastStore>,
}

impl std::fmt::Debug for Planner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Planner")
            .field("config", &self.config)
            .field("calculator", &self.calculator)
            .finish_non_exhaustive()
    }
}

impl Planner {
    pub fn new(config: RunConfig, store: Arc<dyn ForecastStore>) -> Result<Self> {
        config.validate()?;
        let calendar = Arc::new(StaticCalendar::new(&config.calendar));
        let evaluator = ModelEvaluator::new(config.evaluation.clone(), calendar)?;
        let calculator = ShipmentCalculator::new(config.coverage_coefficient)?;
        Ok(Self {
            config: Arc::new(config),
            evaluator,
            calculator,
            store,
        })
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Plan every requested product and channel
    ///
    /// Products fail independently; only an invalid request is an `Err`.
    pub fn run(&self, request: &RunRequest, inputs: &RunInputs) -> Result<RunReport> {
        if request.horizon == 0 {
            return Err(ReplenishError::Config(
                "horizon must be at least 1".to_string(),
            ));
        }
        if request.channels.is_empty() {
            return Err(ReplenishError::Config(
                "at least one channel is required".to_string(),
            ));
        }

        let run_id = Uuid::new_v4();
        let created_at = Utc::now();
        let span = info_span!("run", %run_id);
        let _guard = span.enter();

        let in_scope = |product: &ProductKey, channel: Channel| {
            request.channels.contains(&channel)
                && request.product.as_ref().map_or(true, |p| p == product)
        };

        let mut failures: BTreeMap<(ProductKey, Channel), String> = BTreeMap::new();
        for rejected in &inputs.rejected {
            let channels = match rejected.channel {
                Some(channel) => vec![channel],
                None => request.channels.clone(),
            };
            for channel in channels {
                if in_scope(&rejected.product, channel) {
                    failures
                        .entry((rejected.product.clone(), channel))
                        .or_insert_with(|| rejected.reason.clone());
                }
            }
        }

        let mut by_key: BTreeMap<(ProductKey, Channel), Vec<&TimeSeries>> = BTreeMap::new();
        for series in inputs
            .sales
            .iter()
            .filter(|s| in_scope(s.product(), s.channel()))
        {
            by_key
                .entry((series.product().clone(), series.channel()))
                .or_default()
                .push(series);
        }

        // One selected forecast per product and channel: duplicates plan nothing
        let mut selected: Vec<&TimeSeries> = Vec::with_capacity(by_key.len());
        for (key, series) in by_key {
            if failures.contains_key(&key) {
                continue;
            }
            match series.as_slice() {
                [single] => selected.push(*single),
                _ => {
                    let err = ReplenishError::DataIntegrity(format!(
                        "{} sales series for {} on {}",
                        series.len(),
                        key.0,
                        key.1
                    ));
                    failures.insert(key, err.to_string());
                }
            }
        }

        let mut products: Vec<ProductReport> = selected
            .par_iter()
            .map(|series| {
                let _guard = span.enter();
                self.plan_series(run_id, created_at, series, request.horizon, inputs)
            })
            .collect();

        for ((product, channel), error) in failures {
            warn!(%product, %channel, "product failed: {}", error);
            products.push(ProductReport::without_plan(
                product,
                channel,
                ProductStatus::Failed { error },
            ));
        }

        if let Some(product) = &request.product {
            for &channel in &request.channels {
                let reported = products
                    .iter()
                    .any(|r| &r.product == product && r.channel == channel);
                if !reported {
                    let err = ReplenishError::UnknownProduct(format!(
                        "{} has no sales history on {}",
                        product, channel
                    ));
                    warn!(%product, %channel, "{}", err);
                    products.push(ProductReport::without_plan(
                        product.clone(),
                        channel,
                        ProductStatus::Failed {
                            error: err.to_string(),
                        },
                    ));
                }
            }
        }

        let report = RunReport {
            run_id,
            created_at,
            horizon: request.horizon,
            products,
        };
        info!(
            planned = report.planned(),
            skipped = report.skipped(),
            failed = report.failed(),
            "run finished"
        );
        Ok(report)
    }

    fn plan_series(
        &self,
        run_id: Uuid,
        created_at: DateTime<Utc>,
        series: &TimeSeries,
        horizon: usize,
        inputs: &RunInputs,
    ) -> ProductReport {
        let product = series.product().clone();
        let channel = series.channel();
        match self.try_plan(run_id, created_at, series, horizon, inputs) {
            Ok(report) => report,
            Err(err) => {
                warn!(%product, %channel, data_integrity = err.is_data_integrity(), "product failed: {}", err);
                ProductReport::without_plan(
                    product,
                    channel,
                    ProductStatus::Failed {
                        error: err.to_string(),
                    },
                )
            }
        }
    }

    fn try_plan(
        &self,
        run_id: Uuid,
        created_at: DateTime<Utc>,
        series: &TimeSeries,
        horizon: usize,
        inputs: &RunInputs,
    ) -> Result<ProductReport> {
        let product = series.product();
        let channel = series.channel();

        let evaluation = match self.evaluator.evaluate_with_horizon(series, horizon)? {
            EvaluationOutcome::Selected(evaluation) => evaluation,
            EvaluationOutcome::NoForecast { candidates, .. } => {
                let reason = format!(
                    "no viable model among {} candidates",
                    candidates.len()
                );
                warn!(%product, %channel, "skipping product: {}", reason);
                return Ok(ProductReport::without_plan(
                    product.clone(),
                    channel,
                    ProductStatus::Skipped { reason },
                ));
            }
        };

        let mut selected = evaluation.selected.clone();
        selected.forecast = inputs.constraints.clamp_forecast(product, &selected.forecast);

        let plan = self.calculator.plan(
            product,
            channel,
            &selected.forecast,
            &inputs.stocks,
            &inputs.constraints,
        );

        let record = RunRecord {
            run_id,
            created_at,
            product: product.clone(),
            channel,
            horizon,
            candidates: evaluation.candidates.clone(),
            selected: selected.clone(),
            shipment_plan: plan.clone(),
        };
        self.store.append_run(&record)?;

        let total_units = plan.total_units();
        info!(
            %product,
            %channel,
            model = %selected.model,
            total_units,
            "product planned"
        );
        Ok(ProductReport {
            product: product.clone(),
            channel,
            status: ProductStatus::Planned {
                model: selected.model,
                total_units,
                lines: plan.lines.len(),
            },
            summary: evaluation.summary(),
            selected: Some(selected),
            plan: Some(plan),
        })
    }
}
