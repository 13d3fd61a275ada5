//! Layered run settings
//!
//! Built-in defaults, then an optional TOML file, then `REPLENISH__*`
//! environment variables (`REPLENISH__COVERAGE_COEFFICIENT=1.2`,
//! `REPLENISH__EVALUATION__HOLDOUT=6`).

use crate::{ReplenishError, Result};
use config::{Config, Environment, File};
use demand_forecast::{CalendarConfig, EvaluationConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, error};

/// Environment prefix for overrides
pub const ENV_PREFIX: &str = "REPLENISH";

/// Everything a planning run needs besides its data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub evaluation: EvaluationConfig,
    pub calendar: CalendarConfig,
    /// Stock to hold per unit of forecast demand
    pub coverage_coefficient: f64,
    /// Box size for products without their own
    pub default_box_size: Option<u32>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            evaluation: EvaluationConfig::default(),
            calendar: CalendarConfig::default(),
            coverage_coefficient: 1.0,
            default_box_size: None,
        }
    }
}

impl RunConfig {
    /// Resolve settings from defaults, `file` and the environment
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder()
            .set_default("coverage_coefficient", 1.0)?;

        if let Some(path) = file {
            if !path.exists() {
                return Err(ReplenishError::Config(format!(
                    "settings file {} not found",
                    path.display()
                )));
            }
            debug!(path = %path.display(), "loading settings file");
            builder = builder.add_source(File::from(path));
        }

        let settings: RunConfig = builder
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?
            .try_deserialize()?;

        settings.validate().map_err(|e| {
            error!("settings validation failed: {}", e);
            e
        })?;
        Ok(settings)
    }

    /// Reject settings no run could use
    pub fn validate(&self) -> Result<()> {
        self.evaluation.validate()?;
        if !self.coverage_coefficient.is_finite() || self.coverage_coefficient <= 0.0 {
            return Err(ReplenishError::Config(format!(
                "coverage_coefficient must be positive and finite, got {}",
                self.coverage_coefficient
            )));
        }
        if self.default_box_size == Some(0) {
            return Err(ReplenishError::ConstraintConflict(
                "default_box_size must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
