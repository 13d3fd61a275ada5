//! Shipment sizing against a stock snapshot

use crate::constraints::ConstraintBook;
use crate::{ReplenishError, Result};
use demand_forecast::{Channel, ForecastSeries, Period, ProductKey};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

/// On-hand units per product, channel and warehouse, read once per run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StockSnapshot {
    stocks: BTreeMap<(ProductKey, Channel), BTreeMap<String, u64>>,
}

impl StockSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `units` at `warehouse`; repeated rows for one warehouse are summed
    pub fn insert(
        &mut self,
        product: ProductKey,
        channel: Channel,
        warehouse: impl Into<String>,
        units: i64,
    ) -> Result<()> {
        let warehouse = warehouse.into();
        if units < 0 {
            return Err(ReplenishError::DataIntegrity(format!(
                "negative stock {} for {} at {} ({})",
                units, product, warehouse, channel
            )));
        }
        let entry = self
            .stocks
            .entry((product, channel))
            .or_default()
            .entry(warehouse)
            .or_insert(0);
        *entry = entry.saturating_add(units as u64);
        Ok(())
    }

    /// Warehouses holding `product` on `channel`, with on-hand units
    pub fn warehouses(&self, product: &ProductKey, channel: Channel) -> Option<&BTreeMap<String, u64>> {
        self.stocks.get(&(product.clone(), channel))
    }

    /// Total on-hand units of `product` on `channel`
    pub fn on_hand(&self, product: &ProductKey, channel: Channel) -> u64 {
        self.warehouses(product, channel)
            .map_or(0, |w| w.values().sum())
    }

    pub fn len(&self) -> usize {
        self.stocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stocks.is_empty()
    }
}

/// One warehouse and one month of a plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShipmentLine {
    pub warehouse: String,
    pub period: Period,
    /// Constrained forecast demand for the period
    pub forecast: f64,
    pub on_hand: u64,
    /// Stock required to cover the forecast: `forecast * coverage`
    pub required: f64,
    /// Units to ship after clamping and rounding
    pub quantity: u64,
    /// Whole boxes, when a box size applies
    pub boxes: Option<u64>,
}

/// Shipments for one product on one channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShipmentPlan {
    pub product: ProductKey,
    pub channel: Channel,
    pub coverage_coefficient: f64,
    pub box_size: Option<u32>,
    pub lines: Vec<ShipmentLine>,
}

impl ShipmentPlan {
    pub fn total_units(&self) -> u64 {
        self.lines.iter().map(|l| l.quantity).sum()
    }

    /// Units per period summed over warehouses
    pub fn by_period(&self) -> BTreeMap<Period, u64> {
        let mut totals = BTreeMap::new();
        for line in &self.lines {
            *totals.entry(line.period).or_insert(0) += line.quantity;
        }
        totals
    }

    pub fn lines_for<'a>(&'a self, warehouse: &'a str) -> impl Iterator<Item = &'a ShipmentLine> + 'a {
        self.lines.iter().filter(move |l| l.warehouse == warehouse)
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Converts forecasts into shipment plans
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShipmentCalculator {
    coverage_coefficient: f64,
}

impl Default for ShipmentCalculator {
    fn default() -> Self {
        Self {
            coverage_coefficient: 1.0,
        }
    }
}

impl ShipmentCalculator {
    pub fn new(coverage_coefficient: f64) -> Result<Self> {
        if !coverage_coefficient.is_finite() || coverage_coefficient <= 0.0 {
            return Err(ReplenishError::Config(format!(
                "coverage coefficient must be positive and finite, got {}",
                coverage_coefficient
            )));
        }
        Ok(Self {
            coverage_coefficient,
        })
    }

    pub fn coverage_coefficient(&self) -> f64 {
        self.coverage_coefficient
    }

    /// Plan every warehouse holding the product for every forecast month
    ///
    /// Each month is sized independently against the same snapshot:
    /// `max(0, forecast * coverage - on_hand)`, then the constraint book
    /// zeroes blocked months and rounds the rest up to whole boxes.
    pub fn plan(
        &self,
        product: &ProductKey,
        channel: Channel,
        forecast: &ForecastSeries,
        stocks: &StockSnapshot,
        constraints: &ConstraintBook,
    ) -> ShipmentPlan {
        let box_size = constraints.box_size(product);
        let mut lines = Vec::new();

        match stocks.warehouses(product, channel) {
            Some(warehouses) if !warehouses.is_empty() => {
                for (warehouse, &on_hand) in warehouses {
                    for (period, &demand) in forecast.periods().into_iter().zip(&forecast.values) {
                        let demand = if constraints.is_blocked(product, period) {
                            0.0
                        } else {
                            demand.max(0.0)
                        };
                        let required = demand * self.coverage_coefficient;
                        let raw = (required - on_hand as f64).max(0.0);
                        let quantity = constraints.finalize(product, period, raw);
                        lines.push(ShipmentLine {
                            warehouse: warehouse.clone(),
                            period,
                            forecast: demand,
                            on_hand,
                            required,
                            quantity,
                            boxes: box_size.map(|size| quantity / u64::from(size)),
                        });
                    }
                }
            }
            _ => warn!(%product, %channel, "no warehouse stock known, plan is empty"),
        }

        ShipmentPlan {
            product: product.clone(),
            channel,
            coverage_coefficient: self.coverage_coefficient,
            box_size,
            lines,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use pretty_assertions::assert_eq;

    fn key() -> ProductKey {
        ProductKey::new("SKU-1").unwrap()
    }

    fn forecast(values: Vec<f64>) -> ForecastSeries {
        ForecastSeries::new(Period::new(2025, 1).unwrap(), values)
    }

    fn stock(entries: &[(&str, i64)]) -> StockSnapshot {
        let mut snapshot = StockSnapshot::new();
        for (warehouse, units) in entries {
            snapshot
                .insert(key(), Channel::Wildberries, *warehouse, *units)
                .unwrap();
        }
        snapshot
    }

    #[test]
    fn test_negative_stock_is_rejected() {
        let mut snapshot = StockSnapshot::new();
        let err = snapshot
            .insert(key(), Channel::Ozon, "Tver", -1)
            .unwrap_err();
        assert!(err.is_data_integrity());
        assert!(snapshot.is_empty());
    }

    #[test]
    fn test_repeated_rows_are_summed() {
        let snapshot = stock(&[("Kazan", 10), ("Kazan", 5), ("Tula", 1)]);
        let warehouses = snapshot.warehouses(&key(), Channel::Wildberries).unwrap();
        assert_eq!(warehouses["Kazan"], 15);
        assert_eq!(snapshot.on_hand(&key(), Channel::Wildberries), 16);
    }

    #[test]
    fn test_quantity_subtracts_stock_per_warehouse() {
        let calculator = ShipmentCalculator::new(1.5).unwrap();
        let book = ConstraintBook::new(None).unwrap();
        let plan = calculator.plan(
            &key(),
            Channel::Wildberries,
            &forecast(vec![100.0, 20.0]),
            &stock(&[("Kazan", 40), ("Tula", 0)]),
            &book,
        );

        assert_eq!(plan.lines.len(), 4);
        let kazan: Vec<u64> = plan.lines_for("Kazan").map(|l| l.quantity).collect();
        let tula: Vec<u64> = plan.lines_for("Tula").map(|l| l.quantity).collect();
        assert_eq!(kazan, vec![110, 0]);
        assert_eq!(tula, vec![150, 30]);
        assert_approx_eq!(plan.lines[0].required, 150.0);
        assert_eq!(plan.total_units(), 290);
    }

    #[test]
    fn test_box_count_is_recorded() {
        let calculator = ShipmentCalculator::default();
        let mut book = ConstraintBook::new(None).unwrap();
        book.set_box_size(key(), 24).unwrap();
        let plan = calculator.plan(
            &key(),
            Channel::Wildberries,
            &forecast(vec![100.0]),
            &stock(&[("Kazan", 0)]),
            &book,
        );
        assert_eq!(plan.lines[0].quantity, 120);
        assert_eq!(plan.lines[0].boxes, Some(5));
        assert_eq!(plan.box_size, Some(24));
    }

    #[test]
    fn test_unknown_warehouses_give_empty_plan() {
        let plan = ShipmentCalculator::default().plan(
            &key(),
            Channel::Ozon,
            &forecast(vec![10.0]),
            &StockSnapshot::new(),
            &ConstraintBook::default(),
        );
        assert!(plan.is_empty());
        assert_eq!(plan.total_units(), 0);
    }

    #[test]
    fn test_invalid_coverage() {
        assert!(ShipmentCalculator::new(0.0).is_err());
        assert!(ShipmentCalculator::new(f64::INFINITY).is_err());
        assert!(ShipmentCalculator::new(0.5).is_ok());
    }
}
