//! ARIMA-family models selected by information criterion
//!
//! Every grid point is estimated by conditional sum of squares: the
//! differenced series is filtered through the ARMA recursion with pre-sample
//! residuals set to zero, and the coefficients minimising the squared
//! residuals are found by a bounded simplex search. Seasonal AR and MA terms
//! enter additively at multiples of the seasonal period. The grid point with
//! the lowest AIC wins; on a tie the earlier (simpler) point is kept.

use crate::calendar::FeatureVector;
use crate::config::ArimaGrid;
use crate::error::{ForecastError, Result};
use crate::models::{
    future_window, ForecastModel, ForecastResult, ModelKind, TrainedForecastModel, TrainingSet,
};
use demand_math::{nelder_mead, ridge_fit, stats, Differenced, DifferencingPlan, OlsFit};
use std::fmt;
use tracing::trace;

/// Coefficient bound keeping the recursion away from the unit circle
const COEFFICIENT_BOUND: f64 = 0.99;

/// Penalty keeping the calendar regression of SARIMAX solvable when shares are collinear
const EXOGENOUS_RIDGE: f64 = 1e-6;

/// Which part of the grid a candidate searches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArimaVariant {
    /// Non-seasonal orders only
    Arima,
    /// Seasonal and non-seasonal orders
    Sarima,
    /// Seasonal orders on the residuals of a calendar regression
    Sarimax,
}

/// `(p, d, q)(P, D, Q)[s]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArimaOrder {
    pub p: usize,
    pub d: usize,
    pub q: usize,
    pub seasonal_p: usize,
    pub seasonal_d: usize,
    pub seasonal_q: usize,
    pub period: usize,
}

impl ArimaOrder {
    fn ar_lags(&self) -> Vec<usize> {
        let mut lags: Vec<usize> = (1..=self.p).collect();
        lags.extend((1..=self.seasonal_p).map(|j| j * self.period));
        lags
    }

    fn ma_lags(&self) -> Vec<usize> {
        let mut lags: Vec<usize> = (1..=self.q).collect();
        lags.extend((1..=self.seasonal_q).map(|j| j * self.period));
        lags
    }

    /// Whether the differenced series keeps a mean term
    fn has_mean(&self) -> bool {
        self.d + self.seasonal_d == 0
    }
}

impl fmt::Display for ArimaOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ARIMA({},{},{})", self.p, self.d, self.q)?;
        if self.seasonal_p + self.seasonal_d + self.seasonal_q > 0 {
            write!(
                f,
                "({},{},{})[{}]",
                self.seasonal_p, self.seasonal_d, self.seasonal_q, self.period
            )?;
        }
        Ok(())
    }
}

/// ARIMA-family candidate
#[derive(Debug, Clone)]
pub struct ArimaModel {
    variant: ArimaVariant,
    grid: ArimaGrid,
    period: usize,
}

/// Estimated ARMA part of one grid point
#[derive(Debug, Clone)]
struct ArmaEstimate {
    order: ArimaOrder,
    ar_lags: Vec<usize>,
    ma_lags: Vec<usize>,
    coefficients: Vec<f64>,
    mean: f64,
    aic: f64,
    converged: bool,
}

/// Trained ARIMA-family model
#[derive(Debug, Clone)]
pub struct TrainedArima {
    variant: ArimaVariant,
    estimate: ArmaEstimate,
    plan: DifferencingPlan,
    differenced: Differenced,
    residuals: Vec<f64>,
    exogenous: Option<OlsFit>,
    future_features: Vec<FeatureVector>,
}

impl ArimaModel {
    pub fn new(variant: ArimaVariant, grid: ArimaGrid, period: usize) -> Self {
        Self {
            variant,
            grid,
            period,
        }
    }

    pub fn kind(&self) -> ModelKind {
        kind_of(self.variant)
    }

    /// Grid points in search order: differencing first, then AR, then MA
    pub fn orders(&self) -> Vec<ArimaOrder> {
        let seasonal = self.variant != ArimaVariant::Arima;
        let (max_sp, max_sd, max_sq) = if seasonal {
            (
                self.grid.max_seasonal_p,
                self.grid.max_seasonal_d,
                self.grid.max_seasonal_q,
            )
        } else {
            (0, 0, 0)
        };

        let mut orders = Vec::new();
        for d in 0..=self.grid.max_d {
            for seasonal_d in 0..=max_sd {
                for p in 0..=self.grid.max_p {
                    for q in 0..=self.grid.max_q {
                        for seasonal_p in 0..=max_sp {
                            for seasonal_q in 0..=max_sq {
                                orders.push(ArimaOrder {
                                    p,
                                    d,
                                    q,
                                    seasonal_p,
                                    seasonal_d,
                                    seasonal_q,
                                    period: self.period,
                                });
                            }
                        }
                    }
                }
            }
        }
        orders
    }

    /// Estimate one grid point on `series`
    fn estimate(&self, series: &[f64], order: ArimaOrder) -> Result<(ArmaEstimate, Differenced)> {
        let plan = DifferencingPlan::new(order.d, order.seasonal_d, order.period)?;
        let differenced = plan.apply(series)?;
        let w = differenced.output();

        let ar_lags = order.ar_lags();
        let ma_lags = order.ma_lags();
        let start = ar_lags.iter().copied().max().unwrap_or(0);
        let n_coefficients = ar_lags.len() + ma_lags.len();
        let n_params = n_coefficients + usize::from(order.has_mean()) + 1;
        if w.len() < start + n_params + 1 {
            return Err(ForecastError::InsufficientHistory {
                model: order.to_string(),
                needed: start + n_params + 1,
                got: w.len(),
            });
        }

        let mean = if order.has_mean() { stats::mean(w)? } else { 0.0 };
        let centered: Vec<f64> = w.iter().map(|v| v - mean).collect();
        let objective = |coefficients: &[f64]| {
            let residuals = css_residuals(&centered, &ar_lags, &ma_lags, coefficients);
            residuals[start..].iter().map(|e| e * e).sum::<f64>()
        };

        let (coefficients, css, converged) = if n_coefficients == 0 {
            (Vec::new(), objective(&[]), true)
        } else {
            let bounds = vec![(-COEFFICIENT_BOUND, COEFFICIENT_BOUND); n_coefficients];
            let result = nelder_mead(
                objective,
                &vec![0.0; n_coefficients],
                Some(bounds.as_slice()),
                &self.grid.optimizer,
            );
            (result.point, result.value, result.converged)
        };

        if !css.is_finite() {
            return Err(ForecastError::FitFailure(format!(
                "{} produced a non-finite sum of squares",
                order
            )));
        }
        let aic = stats::gaussian_aic(css, w.len() - start, n_params)?;

        Ok((
            ArmaEstimate {
                order,
                ar_lags,
                ma_lags,
                coefficients,
                mean,
                aic,
                converged,
            },
            differenced,
        ))
    }
}

fn kind_of(variant: ArimaVariant) -> ModelKind {
    match variant {
        ArimaVariant::Arima => ModelKind::Arima,
        ArimaVariant::Sarima => ModelKind::Sarima,
        ArimaVariant::Sarimax => ModelKind::Sarimax,
    }
}

/// One-step residuals of the ARMA recursion with zero pre-sample residuals
fn css_residuals(w: &[f64], ar_lags: &[usize], ma_lags: &[usize], coefficients: &[f64]) -> Vec<f64> {
    let start = ar_lags.iter().copied().max().unwrap_or(0);
    let (ar, ma) = coefficients.split_at(ar_lags.len());
    let mut residuals = vec![0.0; w.len()];
    for t in start..w.len() {
        let mut prediction = 0.0;
        for (phi, &lag) in ar.iter().zip(ar_lags) {
            prediction += phi * w[t - lag];
        }
        for (theta, &lag) in ma.iter().zip(ma_lags) {
            if t >= lag {
                prediction += theta * residuals[t - lag];
            }
        }
        residuals[t] = w[t] - prediction;
    }
    residuals
}

impl ForecastModel for ArimaModel {
    type Trained = TrainedArima;

    fn train(&self, data: &TrainingSet) -> Result<Self::Trained> {
        data.require(self.name(), 2 * self.period)?;

        let (series, exogenous) = if self.variant == ArimaVariant::Sarimax {
            let columns = transpose(
                &data
                    .history_features()
                    .iter()
                    .map(FeatureVector::exogenous)
                    .collect::<Vec<_>>(),
            );
            let fit = ridge_fit(data.values(), &columns, EXOGENOUS_RIDGE)?;
            let fitted = fit.predict_columns(&columns, data.values().len())?;
            let residuals: Vec<f64> = data
                .values()
                .iter()
                .zip(fitted.iter())
                .map(|(y, f)| y - f)
                .collect();
            (residuals, Some(fit))
        } else {
            (data.values().to_vec(), None)
        };

        let mut best: Option<(ArmaEstimate, Differenced)> = None;
        for order in self.orders() {
            match self.estimate(&series, order) {
                Ok((estimate, differenced)) => {
                    trace!(
                        model = self.name(),
                        order = %order,
                        aic = estimate.aic,
                        converged = estimate.converged,
                        "grid point estimated"
                    );
                    let better = best
                        .as_ref()
                        .map_or(true, |(current, _)| estimate.aic < current.aic);
                    if better {
                        best = Some((estimate, differenced));
                    }
                }
                Err(e) => trace!(model = self.name(), order = %order, error = %e, "grid point skipped"),
            }
        }

        let (estimate, differenced) = best.ok_or_else(|| {
            ForecastError::FitFailure(format!("{}: no grid point could be estimated", self.name()))
        })?;
        let plan = DifferencingPlan::new(
            estimate.order.d,
            estimate.order.seasonal_d,
            estimate.order.period,
        )?;
        let centered: Vec<f64> = differenced
            .output()
            .iter()
            .map(|v| v - estimate.mean)
            .collect();
        let residuals = css_residuals(
            &centered,
            &estimate.ar_lags,
            &estimate.ma_lags,
            &estimate.coefficients,
        );

        Ok(TrainedArima {
            variant: self.variant,
            estimate,
            plan,
            differenced,
            residuals,
            exogenous,
            future_features: data.future_features().to_vec(),
        })
    }

    fn name(&self) -> &str {
        self.kind().name()
    }
}

/// Row-major feature rows to column-major regressors
fn transpose(rows: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let width = rows.first().map_or(0, Vec::len);
    (0..width)
        .map(|j| rows.iter().map(|row| row[j]).collect())
        .collect()
}

impl TrainedArima {
    pub fn kind(&self) -> ModelKind {
        kind_of(self.variant)
    }

    /// Selected grid point
    pub fn order(&self) -> ArimaOrder {
        self.estimate.order
    }

    /// AIC of the selected grid point
    pub fn aic(&self) -> f64 {
        self.estimate.aic
    }

    /// Estimated AR coefficients followed by MA coefficients
    pub fn coefficients(&self) -> &[f64] {
        &self.estimate.coefficients
    }
}

impl TrainedForecastModel for TrainedArima {
    fn forecast(&self, horizons: usize) -> Result<ForecastResult> {
        let estimate = &self.estimate;
        let (ar, ma) = estimate.coefficients.split_at(estimate.ar_lags.len());

        let mut w: Vec<f64> = self
            .differenced
            .output()
            .iter()
            .map(|v| v - estimate.mean)
            .collect();
        let mut residuals = self.residuals.clone();
        let mut differenced_forecast = Vec::with_capacity(horizons);
        for _ in 0..horizons {
            let t = w.len();
            let mut prediction = 0.0;
            for (phi, &lag) in ar.iter().zip(&estimate.ar_lags) {
                prediction += phi * w[t - lag];
            }
            for (theta, &lag) in ma.iter().zip(&estimate.ma_lags) {
                if t >= lag {
                    prediction += theta * residuals[t - lag];
                }
            }
            w.push(prediction);
            residuals.push(0.0);
            differenced_forecast.push(prediction + estimate.mean);
        }

        let mut values = self.plan.integrate(&self.differenced, &differenced_forecast);

        if let Some(fit) = &self.exogenous {
            let future = future_window(self.name(), &self.future_features, horizons)?;
            for (value, features) in values.iter_mut().zip(future.iter()) {
                *value += fit.predict_row(&features.exogenous())?;
            }
        }

        ForecastResult::new(values, horizons)
    }

    fn describe(&self) -> String {
        format!(
            "{} {} aic={:.2}",
            self.name(),
            self.estimate.order,
            self.estimate.aic
        )
    }

    fn name(&self) -> &str {
        self.kind().name()
    }
}
