//! Backtest and automatic model selection
//!
//! One product history is split into a training prefix and a held-out tail.
//! Every enabled candidate is fitted on the prefix, scored on the tail, and
//! refitted on the whole history for the live horizon. Candidates run on
//! their own threads and are joined against a deadline; a thread still
//! running at the deadline is detached and its result dropped.

use crate::calendar::CalendarFeatureProvider;
use crate::config::EvaluationConfig;
use crate::data::{Channel, ForecastSeries, Period, ProductKey, TimeSeries};
use crate::error::{ForecastError, Result};
use crate::metrics::MetricSet;
use crate::models::{ModelKind, ModelSpec, TrainingSet};
use serde::{Deserialize, Serialize};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, info_span, warn};

/// What happened to one candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CandidateStatus {
    /// Fitted and scored on the held-out tail
    Scored,
    /// Fitted, but no held-out actual was available to score it
    Unscored,
    /// Not applicable to this history
    Skipped { reason: String },
    /// Fitting or forecasting failed
    Failed { error: String },
    /// Did not finish before the deadline
    TimedOut { millis: u64 },
}

impl CandidateStatus {
    pub fn label(&self) -> &'static str {
        match self {
            CandidateStatus::Scored => "scored",
            CandidateStatus::Unscored => "unscored",
            CandidateStatus::Skipped { .. } => "skipped",
            CandidateStatus::Failed { .. } => "failed",
            CandidateStatus::TimedOut { .. } => "timed_out",
        }
    }

    fn from_error(error: &ForecastError) -> Self {
        match error {
            ForecastError::InsufficientHistory { .. } => CandidateStatus::Skipped {
                reason: error.to_string(),
            },
            ForecastError::Timeout { millis, .. } => CandidateStatus::TimedOut { millis: *millis },
            other => CandidateStatus::Failed {
                error: other.to_string(),
            },
        }
    }
}

/// Result of one candidate in one evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateResult {
    pub model: ModelKind,
    pub status: CandidateStatus,
    /// Accuracy on the held-out tail
    pub metrics: Option<MetricSet>,
    /// 1-based selection rank among candidates with a usable fit
    pub rank: Option<usize>,
    /// Fitted parameters of the full-history refit
    pub description: Option<String>,
    /// Live forecast from the full-history refit
    pub forecast: Option<ForecastSeries>,
    /// Why the full-history refit failed, when the backtest itself succeeded
    pub refit_error: Option<String>,
}

impl CandidateResult {
    fn not_run(model: ModelKind, status: CandidateStatus) -> Self {
        Self {
            model,
            status,
            metrics: None,
            rank: None,
            description: None,
            forecast: None,
            refit_error: None,
        }
    }
}

/// The winning candidate and its full-history forecast
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedForecast {
    pub model: ModelKind,
    pub description: String,
    pub metrics: Option<MetricSet>,
    pub forecast: ForecastSeries,
}

/// A completed evaluation with a winner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub product: ProductKey,
    pub channel: Channel,
    /// Periods of history the candidates saw
    pub history_len: usize,
    /// Periods actually held out
    pub holdout: usize,
    pub candidates: Vec<CandidateResult>,
    pub selected: SelectedForecast,
}

/// One line of the evaluation summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRow {
    pub model: ModelKind,
    pub status: String,
    pub mae: Option<f64>,
    pub rmse: Option<f64>,
    pub mape: Option<f64>,
    pub r2: Option<f64>,
    pub rank: Option<usize>,
    pub selected: bool,
}

impl Evaluation {
    /// One row per candidate, in configuration order
    pub fn summary(&self) -> Vec<SummaryRow> {
        self.candidates
            .iter()
            .map(|c| SummaryRow {
                model: c.model,
                status: c.status.label().to_string(),
                mae: c.metrics.as_ref().map(|m| m.mae),
                rmse: c.metrics.as_ref().map(|m| m.rmse),
                mape: c.metrics.as_ref().and_then(|m| m.mape),
                r2: c.metrics.as_ref().and_then(|m| m.r2),
                rank: c.rank,
                selected: c.model == self.selected.model,
            })
            .collect()
    }

    /// Candidate result for `model`, if it was enabled
    pub fn candidate(&self, model: ModelKind) -> Option<&CandidateResult> {
        self.candidates.iter().find(|c| c.model == model)
    }
}

/// Outcome of evaluating one product on one channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EvaluationOutcome {
    Selected(Evaluation),
    /// Every candidate failed; the product must be skipped, not planned at zero
    NoForecast {
        product: ProductKey,
        channel: Channel,
        candidates: Vec<CandidateResult>,
    },
}

impl EvaluationOutcome {
    pub fn evaluation(&self) -> Option<&Evaluation> {
        match self {
            EvaluationOutcome::Selected(evaluation) => Some(evaluation),
            EvaluationOutcome::NoForecast { .. } => None,
        }
    }

    pub fn candidates(&self) -> &[CandidateResult] {
        match self {
            EvaluationOutcome::Selected(evaluation) => &evaluation.candidates,
            EvaluationOutcome::NoForecast { candidates, .. } => candidates,
        }
    }

    /// Turn a missing forecast into a `NoViableModel` error
    pub fn into_result(self) -> Result<Evaluation> {
        match self {
            EvaluationOutcome::Selected(evaluation) => Ok(evaluation),
            EvaluationOutcome::NoForecast {
                product, channel, ..
            } => Err(ForecastError::NoViableModel(format!(
                "no candidate produced a forecast for {} on {}",
                product, channel
            ))),
        }
    }
}

/// Output of one adapter job
#[derive(Debug)]
struct AdapterRun {
    metrics: Option<MetricSet>,
    live: Result<(Vec<f64>, String)>,
}

/// Runs the backtest protocol across every enabled candidate
#[derive(Clone)]
pub struct ModelEvaluator {
    config: Arc<EvaluationConfig>,
    calendar: Arc<dyn CalendarFeatureProvider>,
}

impl std::fmt::Debug for ModelEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelEvaluator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ModelEvaluator {
    /// Create an evaluator; the configuration is validated once here
    pub fn new(config: EvaluationConfig, calendar: Arc<dyn CalendarFeatureProvider>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            calendar,
        })
    }

    pub fn config(&self) -> &EvaluationConfig {
        &self.config
    }

    /// Evaluate every candidate on `series` and select a winner
    pub fn evaluate(&self, series: &TimeSeries) -> Result<EvaluationOutcome> {
        self.evaluate_with_horizon(series, self.config.horizon)
    }

    /// Same as [`evaluate`](Self::evaluate) with an explicit live horizon
    pub fn evaluate_with_horizon(&self, series: &TimeSeries, horizon: usize) -> Result<EvaluationOutcome> {
        if horizon == 0 {
            return Err(ForecastError::InvalidParameter(
                "horizon must be at least 1".to_string(),
            ));
        }
        let span = info_span!("evaluate", product = %series.product(), channel = %series.channel());
        let _guard = span.enter();

        let config = &self.config;
        let full = Arc::new(TrainingSet::from_series(
            series,
            self.calendar.as_ref(),
            horizon,
            config.seasonal_period,
        )?);
        let n = full.len();
        let holdout = config.holdout.min(n.saturating_sub(1));
        let prefix = Arc::new(full.prefix(n - holdout));
        let actuals = series.actuals();
        let actual_tail: Arc<Vec<Option<f64>>> = Arc::new(actuals[actuals.len() - holdout..].to_vec());

        debug!(history = n, holdout, horizon, "starting evaluation");

        let mut results: Vec<Option<CandidateResult>> = vec![None; config.models.len()];
        let (tx, rx) = mpsc::channel::<(usize, Result<AdapterRun>)>();
        let mut pending = Vec::new();

        for (slot, &kind) in config.models.iter().enumerate() {
            if kind.needs_long_history() && n < config.min_history {
                let reason = format!(
                    "history of {} periods is shorter than the minimum of {}",
                    n, config.min_history
                );
                debug!(model = %kind, %reason, "candidate skipped");
                results[slot] = Some(CandidateResult::not_run(kind, CandidateStatus::Skipped { reason }));
                continue;
            }

            let spec = ModelSpec::for_kind(kind, config);
            let tx = tx.clone();
            let full = Arc::clone(&full);
            let prefix = Arc::clone(&prefix);
            let actual_tail = Arc::clone(&actual_tail);
            let spawned = thread::Builder::new()
                .name(format!("fit-{}", kind))
                .spawn(move || {
                    let run = run_adapter(&spec, &full, &prefix, &actual_tail, horizon);
                    // The receiver is gone once the deadline has passed
                    let _ = tx.send((slot, run));
                });
            match spawned {
                Ok(_) => pending.push(slot),
                Err(e) => {
                    results[slot] = Some(CandidateResult::not_run(
                        kind,
                        CandidateStatus::Failed {
                            error: format!("could not start fit: {}", e),
                        },
                    ))
                }
            }
        }
        drop(tx);

        let deadline = Instant::now() + Duration::from_millis(config.fit_timeout_ms);
        let mut runs: Vec<Option<Result<AdapterRun>>> = (0..config.models.len()).map(|_| None).collect();
        let mut remaining = pending.len();
        let mut disconnected = false;
        while remaining > 0 {
            let wait = deadline.saturating_duration_since(Instant::now());
            match rx.recv_timeout(wait) {
                Ok((slot, run)) => {
                    runs[slot] = Some(run);
                    remaining -= 1;
                }
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => {
                    disconnected = true;
                    break;
                }
            }
        }

        let start = series.next_period();
        for slot in pending {
            let kind = config.models[slot];
            let result = match runs[slot].take() {
                Some(run) => candidate_from_run(kind, run, start),
                None if disconnected => {
                    CandidateResult::not_run(
                        kind,
                        CandidateStatus::Failed {
                            error: "fit thread terminated without a result".to_string(),
                        },
                    )
                }
                None => CandidateResult::not_run(
                    kind,
                    CandidateStatus::from_error(&ForecastError::Timeout {
                        model: kind.to_string(),
                        millis: config.fit_timeout_ms,
                    }),
                ),
            };
            match &result.status {
                CandidateStatus::Failed { error } => warn!(model = %kind, %error, "candidate failed"),
                CandidateStatus::TimedOut { millis } => warn!(model = %kind, millis, "candidate timed out"),
                status => debug!(
                    model = %kind,
                    status = status.label(),
                    mape = ?result.metrics.as_ref().and_then(|m| m.mape),
                    "candidate finished"
                ),
            }
            results[slot] = Some(result);
        }

        let mut candidates: Vec<CandidateResult> = results.into_iter().flatten().collect();
        rank_candidates(&mut candidates);

        let selected = candidates
            .iter()
            .filter(|c| c.rank.is_some())
            .min_by_key(|c| c.rank)
            .and_then(|c| {
                let forecast = c.forecast.clone()?;
                Some(SelectedForecast {
                    model: c.model,
                    description: c.description.clone().unwrap_or_default(),
                    metrics: c.metrics.clone(),
                    forecast,
                })
            });

        match selected {
            Some(selected) => {
                info!(
                    model = %selected.model,
                    mape = ?selected.metrics.as_ref().and_then(|m| m.mape),
                    total = selected.forecast.total(),
                    "model selected"
                );
                Ok(EvaluationOutcome::Selected(Evaluation {
                    product: series.product().clone(),
                    channel: series.channel(),
                    history_len: n,
                    holdout,
                    candidates,
                    selected,
                }))
            }
            None => {
                warn!("no candidate produced a forecast");
                Ok(EvaluationOutcome::NoForecast {
                    product: series.product().clone(),
                    channel: series.channel(),
                    candidates,
                })
            }
        }
    }
}

/// Backtest on the prefix (when something is held out), then refit on the full history
fn run_adapter(
    spec: &ModelSpec,
    full: &TrainingSet,
    prefix: &TrainingSet,
    actual_tail: &[Option<f64>],
    horizon: usize,
) -> Result<AdapterRun> {
    let holdout = actual_tail.len();
    let metrics = if holdout > 0 {
        let fitted = spec.fit(prefix)?;
        let backtest = fitted.forecast(holdout)?;
        MetricSet::compute(actual_tail, &backtest)?
    } else {
        None
    };

    let live = spec
        .fit(full)
        .and_then(|fitted| Ok((fitted.forecast(horizon)?, fitted.describe())));

    // Without a backtest the refit is the only evidence the model works
    let live = if holdout == 0 { Ok(live?) } else { live };

    Ok(AdapterRun { metrics, live })
}

fn candidate_from_run(kind: ModelKind, run: Result<AdapterRun>, start: Period) -> CandidateResult {
    match run {
        Err(e) => CandidateResult::not_run(kind, CandidateStatus::from_error(&e)),
        Ok(AdapterRun { metrics, live }) => {
            let status = if metrics.is_some() {
                CandidateStatus::Scored
            } else {
                CandidateStatus::Unscored
            };
            let (forecast, description, refit_error) = match live {
                Ok((values, description)) => (
                    Some(ForecastSeries::new(start, values)),
                    Some(description),
                    None,
                ),
                Err(e) => (None, None, Some(e.to_string())),
            };
            CandidateResult {
                model: kind,
                status,
                metrics,
                rank: None,
                description,
                forecast,
                refit_error,
            }
        }
    }
}

/// Assign ranks: scored candidates by MAPE (undefined MAPE last, by RMSE),
/// then unscored candidates in configuration order. Only candidates with a
/// live forecast are ranked.
fn rank_candidates(candidates: &mut [CandidateResult]) {
    let mut scored: Vec<usize> = candidates
        .iter()
        .enumerate()
        .filter(|(_, c)| c.forecast.is_some() && c.status == CandidateStatus::Scored)
        .map(|(i, _)| i)
        .collect();
    // Stable sort keeps configuration order on equal metrics
    scored.sort_by(|&a, &b| match (&candidates[a].metrics, &candidates[b].metrics) {
        (Some(ma), Some(mb)) => ma.selection_order(mb),
        _ => std::cmp::Ordering::Equal,
    });
    let unscored = candidates
        .iter()
        .enumerate()
        .filter(|(_, c)| c.forecast.is_some() && c.status == CandidateStatus::Unscored)
        .map(|(i, _)| i)
        .collect::<Vec<_>>();

    for (rank, index) in scored.into_iter().chain(unscored).enumerate() {
        candidates[index].rank = Some(rank + 1);
    }
}
