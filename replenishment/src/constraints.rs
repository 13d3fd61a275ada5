//! Per-product business constraints and the clamp-and-round pipeline
//!
//! Withdrawal and defecture zero whole periods; box rounding runs last and
//! only on periods that survive the clamp.

use crate::{ReplenishError, Result};
use chrono::NaiveDate;
use demand_forecast::{ForecastSeries, Period, ProductKey};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Values closer than this to an integer are not rounded up
const CEIL_TOLERANCE: f64 = 1e-9;

/// Constraints attached to one product
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductConstraint {
    /// Permanently removed from replenishment
    #[serde(default)]
    pub withdrawn: bool,
    /// Supply shortage lasting until this date (exclusive)
    #[serde(default)]
    pub defecture_until: Option<NaiveDate>,
    /// Units per box
    #[serde(default)]
    pub box_size: Option<u32>,
}

impl ProductConstraint {
    /// Whether `period` must carry zero demand and zero shipments
    pub fn blocks(&self, period: Period) -> bool {
        if self.withdrawn {
            return true;
        }
        self.defecture_until
            .map_or(false, |end| period.first_day() < end)
    }

    fn validate(&self, product: &ProductKey) -> Result<()> {
        if self.box_size == Some(0) {
            return Err(ReplenishError::ConstraintConflict(format!(
                "box size of {} must be positive",
                product
            )));
        }
        Ok(())
    }
}

/// Constraint data for every known product
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawConstraintBook")]
pub struct ConstraintBook {
    constraints: HashMap<ProductKey, ProductConstraint>,
    default_box_size: Option<u32>,
}

/// Unvalidated serialized form of a [`ConstraintBook`]
#[derive(Deserialize)]
struct RawConstraintBook {
    #[serde(default)]
    constraints: HashMap<ProductKey, ProductConstraint>,
    #[serde(default)]
    default_box_size: Option<u32>,
}

impl TryFrom<RawConstraintBook> for ConstraintBook {
    type Error = ReplenishError;

    fn try_from(raw: RawConstraintBook) -> Result<Self> {
        let mut book = ConstraintBook::new(raw.default_box_size)?;
        for (product, constraint) in raw.constraints {
            book.insert(product, constraint)?;
        }
        Ok(book)
    }
}

impl ConstraintBook {
    /// Create an empty book; `default_box_size` applies to products without their own
    pub fn new(default_box_size: Option<u32>) -> Result<Self> {
        if default_box_size == Some(0) {
            return Err(ReplenishError::ConstraintConflict(
                "default box size must be positive".to_string(),
            ));
        }
        Ok(Self {
            constraints: HashMap::new(),
            default_box_size,
        })
    }

    /// Replace the constraints of `product`
    pub fn insert(&mut self, product: ProductKey, constraint: ProductConstraint) -> Result<()> {
        constraint.validate(&product)?;
        self.constraints.insert(product, constraint);
        Ok(())
    }

    /// Flag `product` as withdrawn
    pub fn withdraw(&mut self, product: ProductKey) {
        self.constraints.entry(product).or_default().withdrawn = true;
    }

    /// Set the defecture end date of `product`
    pub fn set_defecture(&mut self, product: ProductKey, until: NaiveDate) {
        self.constraints.entry(product).or_default().defecture_until = Some(until);
    }

    /// Set the box size of `product`
    pub fn set_box_size(&mut self, product: ProductKey, box_size: u32) -> Result<()> {
        let candidate = ProductConstraint {
            box_size: Some(box_size),
            ..ProductConstraint::default()
        };
        candidate.validate(&product)?;
        self.constraints.entry(product).or_default().box_size = Some(box_size);
        Ok(())
    }

    pub fn get(&self, product: &ProductKey) -> Option<&ProductConstraint> {
        self.constraints.get(product)
    }

    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    pub fn default_box_size(&self) -> Option<u32> {
        self.default_box_size
    }

    /// Effective box size: the product's own, else the default
    pub fn box_size(&self, product: &ProductKey) -> Option<u32> {
        self.get(product)
            .and_then(|c| c.box_size)
            .or(self.default_box_size)
    }

    pub fn is_withdrawn(&self, product: &ProductKey) -> bool {
        self.get(product).map_or(false, |c| c.withdrawn)
    }

    pub fn is_blocked(&self, product: &ProductKey, period: Period) -> bool {
        self.get(product).map_or(false, |c| c.blocks(period))
    }

    /// Zero every blocked period of a schedule starting at `start`
    pub fn clamp_schedule<T: Copy + Default>(
        &self,
        product: &ProductKey,
        start: Period,
        values: &[T],
    ) -> Vec<T> {
        values
            .iter()
            .enumerate()
            .map(|(i, value)| {
                if self.is_blocked(product, start.offset(i as i64)) {
                    T::default()
                } else {
                    *value
                }
            })
            .collect()
    }

    /// Forecast with blocked months set to zero demand
    pub fn clamp_forecast(&self, product: &ProductKey, forecast: &ForecastSeries) -> ForecastSeries {
        ForecastSeries::new(
            forecast.start,
            self.clamp_schedule(product, forecast.start, &forecast.values),
        )
    }

    /// Round `quantity` up to whole boxes of the product
    pub fn round_to_box(&self, product: &ProductKey, quantity: u64) -> u64 {
        match self.box_size(product) {
            Some(size) => round_up_to_box(quantity, size),
            None => quantity,
        }
    }

    /// Final shipment units for one period: clamp, integer ceiling, box rounding
    pub fn finalize(&self, product: &ProductKey, period: Period, raw: f64) -> u64 {
        if self.is_blocked(product, period) {
            return 0;
        }
        self.round_to_box(product, ceil_units(raw))
    }
}

/// `ceil(quantity / box_size) * box_size`; zero stays zero
///
/// A zero `box_size` means no boxing and returns `quantity`; a
/// [`ConstraintBook`] never holds one.
pub fn round_up_to_box(quantity: u64, box_size: u32) -> u64 {
    if quantity == 0 || box_size == 0 {
        return quantity;
    }
    let size = u64::from(box_size);
    let boxes = quantity / size + u64::from(quantity % size != 0);
    boxes.saturating_mul(size)
}

/// Smallest whole unit count covering `raw`; negative and NaN map to zero
pub fn ceil_units(raw: f64) -> u64 {
    if raw.is_nan() || raw <= 0.0 {
        return 0;
    }
    let nearest = raw.round();
    if (raw - nearest).abs() < CEIL_TOLERANCE {
        nearest as u64
    } else {
        raw.ceil() as u64
    }
}
