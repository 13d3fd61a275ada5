//! # Demand Forecast
//!
//! Monthly unit-sales forecasting for marketplace channels with automatic
//! model selection.
//!
//! ## Features
//!
//! - Monthly series keyed by canonical product code and channel
//! - Calendar features (public holidays, weekends, per-channel Black Friday)
//! - Four model families: baseline, regression with feature selection,
//!   ARIMA / SARIMA / SARIMAX, and a Prophet-style decomposition
//! - Fixed-origin backtest with MAE, RMSE, MAPE and R²
//! - Deterministic ranking and a full-history refit of the winner
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use demand_forecast::calendar::StaticCalendar;
//! use demand_forecast::config::EvaluationConfig;
//! use demand_forecast::data::{Channel, Period, ProductKey, TimeSeries};
//! use demand_forecast::evaluator::{EvaluationOutcome, ModelEvaluator};
//!
//! # fn main() -> demand_forecast::Result<()> {
//! let history = TimeSeries::new(
//!     ProductKey::new("SKU-42")?,
//!     Channel::Ozon,
//!     Period::new(2023, 1)?,
//!     vec![Some(120); 24],
//! );
//!
//! let evaluator = ModelEvaluator::new(
//!     EvaluationConfig::default(),
//!     Arc::new(StaticCalendar::default()),
//! )?;
//!
//! match evaluator.evaluate(&history)? {
//!     EvaluationOutcome::Selected(evaluation) => {
//!         println!("{} won", evaluation.selected.model);
//!     }
//!     EvaluationOutcome::NoForecast { .. } => println!("skipped"),
//! }
//! # Ok(())
//! # }
//! ```

pub mod calendar;
pub mod config;
pub mod data;
pub mod error;
pub mod evaluator;
pub mod metrics;
pub mod models;

pub use calendar::{CalendarFeatureProvider, FeatureVector, StaticCalendar};
pub use config::{CalendarConfig, EvaluationConfig};
pub use data::{Channel, ForecastSeries, Period, ProductKey, TimeSeries};
pub use error::{ForecastError, Result};
pub use evaluator::{
    CandidateResult, CandidateStatus, Evaluation, EvaluationOutcome, ModelEvaluator,
    SelectedForecast, SummaryRow,
};
pub use metrics::MetricSet;
pub use models::{FittedModel, ModelFamily, ModelKind, ModelSpec, TrainingSet};
