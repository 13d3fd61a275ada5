//! Additive trend and seasonality decomposition
//!
//! `y(t) = trend(t) + yearly(t) + calendar(t)`, where the trend is linear
//! with hinge changepoints, yearly seasonality is a Fourier series of the
//! month, and the calendar part regresses on holiday, weekend, Black Friday
//! and New Year shares. All pieces are estimated jointly by ridge regression
//! on the max-abs scaled series.

use crate::calendar::FeatureVector;
use crate::config::ProphetConfig;
use crate::error::Result;
use crate::models::{
    future_window, ForecastModel, ForecastResult, ModelKind, TrainedForecastModel, TrainingSet,
};
use demand_math::{ridge_fit, OlsFit};
use std::f64::consts::PI;

/// Periods needed before seasonality and calendar regressors are fitted
pub const SEASONAL_MIN_PERIODS: usize = 12;

/// Prophet-style candidate
#[derive(Debug, Clone)]
pub struct ProphetModel {
    config: ProphetConfig,
}

/// Trained decomposition
#[derive(Debug, Clone)]
pub struct TrainedProphet {
    design: Design,
    fit: OlsFit,
    scale: f64,
    history_len: usize,
    future_features: Vec<FeatureVector>,
}

/// Column layout of the regression
#[derive(Debug, Clone)]
struct Design {
    /// Changepoint locations in index units
    changepoints: Vec<f64>,
    /// Fourier pairs; zero when only the trend is fitted
    fourier_order: usize,
    /// Whether calendar regressors are included
    calendar: bool,
    /// History length used to normalise time
    span: f64,
}

impl Design {
    fn row(&self, index: usize, features: Option<&FeatureVector>) -> Vec<f64> {
        let t = index as f64;
        let mut row = vec![t / self.span];
        row.extend(
            self.changepoints
                .iter()
                .map(|c| (t - c).max(0.0) / self.span),
        );
        if let Some(features) = features {
            let month = features.period.month() as f64 - 1.0;
            for k in 1..=self.fourier_order {
                let angle = 2.0 * PI * k as f64 * month / 12.0;
                row.push(angle.sin());
                row.push(angle.cos());
            }
            if self.calendar {
                row.extend([
                    features.holiday_share,
                    features.weekend_share,
                    features.black_friday_share,
                    features.new_year_share,
                ]);
            }
        }
        row
    }

    fn needs_features(&self) -> bool {
        self.fourier_order > 0 || self.calendar
    }
}

impl ProphetModel {
    pub fn new(config: ProphetConfig) -> Self {
        Self { config }
    }

    fn design(&self, n: usize) -> Design {
        let seasonal = n >= SEASONAL_MIN_PERIODS;
        let reach = self.config.changepoint_range * n as f64;
        let count = self.config.n_changepoints;
        // Changepoints need at least one observation on each side
        let changepoints = if n > count + 1 {
            (1..=count)
                .map(|k| reach * k as f64 / (count + 1) as f64)
                .collect()
        } else {
            Vec::new()
        };
        Design {
            changepoints,
            fourier_order: if seasonal { self.config.fourier_order } else { 0 },
            calendar: seasonal,
            span: n as f64,
        }
    }
}

impl ForecastModel for ProphetModel {
    type Trained = TrainedProphet;

    fn train(&self, data: &TrainingSet) -> Result<Self::Trained> {
        data.require(self.name(), 2)?;
        let values = data.values();
        let n = values.len();

        let max_abs = values.iter().fold(0.0f64, |m, v| m.max(v.abs()));
        let scale = if max_abs > 0.0 { max_abs } else { 1.0 };
        let y: Vec<f64> = values.iter().map(|v| v / scale).collect();

        let design = self.design(n);
        let features = data.history_features();
        let rows: Vec<Vec<f64>> = (0..n)
            .map(|i| {
                design.row(
                    i,
                    design.needs_features().then(|| &features[i]),
                )
            })
            .collect();
        let width = rows.first().map_or(0, Vec::len);
        let columns: Vec<Vec<f64>> = (0..width)
            .map(|j| rows.iter().map(|row| row[j]).collect())
            .collect();

        let fit = ridge_fit(&y, &columns, self.config.regularization)?;

        Ok(TrainedProphet {
            design,
            fit,
            scale,
            history_len: n,
            future_features: data.future_features().to_vec(),
        })
    }

    fn name(&self) -> &str {
        ModelKind::Prophet.name()
    }
}

impl TrainedProphet {
    /// Whether seasonality and calendar regressors were fitted
    pub fn is_seasonal(&self) -> bool {
        self.design.needs_features()
    }
}

impl TrainedForecastModel for TrainedProphet {
    fn forecast(&self, horizons: usize) -> Result<ForecastResult> {
        let future = if self.design.needs_features() {
            Some(future_window(self.name(), &self.future_features, horizons)?)
        } else {
            None
        };

        let values = (0..horizons)
            .map(|h| {
                let features = future.as_ref().map(|f| &f[h]);
                let row = self.design.row(self.history_len + h, features);
                Ok(self.fit.predict_row(&row)? * self.scale)
            })
            .collect::<Result<Vec<f64>>>()?;
        ForecastResult::new(values, horizons)
    }

    fn describe(&self) -> String {
        format!(
            "{} changepoints={} fourier_order={} calendar={}",
            self.name(),
            self.design.changepoints.len(),
            self.design.fourier_order,
            self.design.calendar
        )
    }

    fn name(&self) -> &str {
        ModelKind::Prophet.name()
    }
}
