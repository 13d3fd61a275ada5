//! # Replenishment
//!
//! `replenishment` turns selected sales forecasts into per-warehouse shipment
//! plans for the Wildberries and Ozon marketplaces.
//!
//! ## Pipeline
//!
//! For every product and channel a [`Planner`] run:
//!
//! 1. evaluates all candidate models on the product's monthly history
//!    ([`demand_forecast::ModelEvaluator`]),
//! 2. applies withdrawal and defecture overrides to the selected forecast
//!    ([`ConstraintBook`]),
//! 3. sizes shipments against the stock snapshot, a coverage coefficient and
//!    box rounding ([`ShipmentCalculator`]),
//! 4. appends the run to a [`ForecastStore`].
//!
//! Products are processed in parallel and fail independently, including
//! products whose input rows were refused at ingestion; the
//! [`RunReport`] carries one status entry per product and channel.
//!
//! ## Usage Example
//!
//! ```no_run
//! use replenishment::{ConstraintBook, InMemoryStore, Planner, RunConfig, RunInputs, RunRequest, StockSnapshot};
//! use std::sync::Arc;
//!
//! # fn main() -> replenishment::Result<()> {
//! let planner = Planner::new(RunConfig::default(), Arc::new(InMemoryStore::new()))?;
//! let inputs = RunInputs {
//!     sales: Vec::new(),
//!     stocks: StockSnapshot::new(),
//!     constraints: ConstraintBook::new(None)?,
//!     rejected: Vec::new(),
//! };
//! let report = planner.run(&RunRequest::default(), &inputs)?;
//! println!("{} planned, {} skipped", report.planned(), report.skipped());
//! # Ok(())
//! # }
//! ```

use demand_forecast::ForecastError;
use thiserror::Error;

pub mod constraints;
pub mod ingest;
pub mod pipeline;
pub mod settings;
pub mod shipment;
pub mod store;

pub use constraints::{round_up_to_box, ConstraintBook, ProductConstraint};
pub use pipeline::{
    Planner, ProductReport, ProductStatus, RejectedInput, RunInputs, RunReport, RunRequest,
};
pub use settings::RunConfig;
pub use shipment::{ShipmentCalculator, ShipmentLine, ShipmentPlan, StockSnapshot};
pub use store::{
    AccuracyRow, ForecastStore, HistoryFilter, InMemoryStore, JsonLinesStore, RunRecord,
};

/// Errors that can occur while planning shipments
#[derive(Error, Debug)]
pub enum ReplenishError {
    #[error("Constraint conflict: {0}")]
    ConstraintConflict(String),

    #[error("Unknown product: {0}")]
    UnknownProduct(String),

    #[error("Data integrity error: {0}")]
    DataIntegrity(String),

    #[error(transparent)]
    Forecast(#[from] ForecastError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl ReplenishError {
    /// Bad input for one product: reported per product, never retried
    pub fn is_data_integrity(&self) -> bool {
        matches!(
            self,
            ReplenishError::ConstraintConflict(_)
                | ReplenishError::UnknownProduct(_)
                | ReplenishError::DataIntegrity(_)
                | ReplenishError::Forecast(ForecastError::DataIntegrity(_))
        )
    }
}

impl From<serde_json::Error> for ReplenishError {
    fn from(err: serde_json::Error) -> Self {
        ReplenishError::Serialization(err.to_string())
    }
}

impl From<config::ConfigError> for ReplenishError {
    fn from(err: config::ConfigError) -> Self {
        ReplenishError::Config(err.to_string())
    }
}

/// Result type for replenishment operations
pub type Result<T> = std::result::Result<T, ReplenishError>;
