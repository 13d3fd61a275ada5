//! Monthly sales series and the keys that identify them

use crate::error::{ForecastError, Result};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Marketplace channel a series belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Channel {
    /// Wildberries
    #[serde(rename = "wb")]
    Wildberries,
    /// Ozon
    #[serde(rename = "ozon")]
    Ozon,
}

impl Channel {
    /// Every supported channel, in a fixed order
    pub const ALL: [Channel; 2] = [Channel::Wildberries, Channel::Ozon];

    /// Short code used in files and logs
    pub fn code(&self) -> &'static str {
        match self {
            Channel::Wildberries => "wb",
            Channel::Ozon => "ozon",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Channel {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "wb" | "wildberries" => Ok(Channel::Wildberries),
            "ozon" => Ok(Channel::Ozon),
            other => Err(ForecastError::InvalidParameter(format!(
                "Unknown channel: {}",
                other
            ))),
        }
    }
}

/// Canonical ("unified") product code shared by every channel-specific SKU of one product
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductKey(String);

impl ProductKey {
    /// Create a key from a canonical code; surrounding whitespace is ignored
    pub fn new(code: impl Into<String>) -> Result<Self> {
        let code = code.into();
        let trimmed = code.trim();
        if trimmed.is_empty() {
            return Err(ForecastError::DataIntegrity(
                "Product key must not be empty".to_string(),
            ));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// The canonical code
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProductKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

const MIN_YEAR: i32 = 1;
const MAX_YEAR: i32 = 9999;

/// One calendar month
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Period {
    year: i32,
    month: u32,
}

impl Period {
    /// Create a period; `month` is 1-based
    pub fn new(year: i32, month: u32) -> Result<Self> {
        if !(1..=12).contains(&month) {
            return Err(ForecastError::InvalidParameter(format!(
                "Month must be between 1 and 12, got {}",
                month
            )));
        }
        if !(MIN_YEAR..=MAX_YEAR).contains(&year) {
            return Err(ForecastError::InvalidParameter(format!(
                "Year must be between {} and {}, got {}",
                MIN_YEAR, MAX_YEAR, year
            )));
        }
        Ok(Self { year, month })
    }

    /// The month containing `date`
    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year().clamp(MIN_YEAR, MAX_YEAR),
            month: date.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    fn index(&self) -> i64 {
        self.year as i64 * 12 + (self.month as i64 - 1)
    }

    fn from_index(index: i64) -> Self {
        let min = MIN_YEAR as i64 * 12;
        let max = MAX_YEAR as i64 * 12 + 11;
        let index = index.clamp(min, max);
        Self {
            year: index.div_euclid(12) as i32,
            month: index.rem_euclid(12) as u32 + 1,
        }
    }

    /// The period `months` months later (earlier when negative)
    pub fn offset(&self, months: i64) -> Self {
        Self::from_index(self.index() + months)
    }

    /// The following month
    pub fn succ(&self) -> Self {
        self.offset(1)
    }

    /// Signed number of months from `self` to `other`
    pub fn months_until(&self, other: Period) -> i64 {
        other.index() - self.index()
    }

    /// First day of the month
    pub fn first_day(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN)
    }

    /// Every day of the month, in order
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let first = self.first_day();
        let next = self.succ().first_day();
        first.iter_days().take_while(move |d| *d < next)
    }

    /// Number of days in the month
    pub fn days_in_month(&self) -> u32 {
        self.days().count() as u32
    }

    /// `len` consecutive periods starting at `self`
    pub fn range(&self, len: usize) -> Vec<Period> {
        (0..len as i64).map(|i| self.offset(i)).collect()
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for Period {
    type Err = ForecastError;

    /// Accepts `YYYY-MM` or a full `YYYY-MM-DD` date
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
            return Ok(Period::from_date(date));
        }
        let (year, month) = s.split_once('-').ok_or_else(|| {
            ForecastError::InvalidParameter(format!("Invalid period '{}', expected YYYY-MM", s))
        })?;
        let year = year.parse::<i32>().map_err(|_| {
            ForecastError::InvalidParameter(format!("Invalid year in period '{}'", s))
        })?;
        let month = month.parse::<u32>().map_err(|_| {
            ForecastError::InvalidParameter(format!("Invalid month in period '{}'", s))
        })?;
        Period::new(year, month)
    }
}

impl TryFrom<String> for Period {
    type Error = ForecastError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Period> for String {
    fn from(period: Period) -> Self {
        period.to_string()
    }
}

/// Monthly unit sales for one product on one channel
///
/// Periods are contiguous from `start`; a `None` value marks a month whose
/// sales are unknown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    product: ProductKey,
    channel: Channel,
    start: Period,
    values: Vec<Option<u64>>,
}

impl TimeSeries {
    /// Create a series from contiguous monthly values
    pub fn new(product: ProductKey, channel: Channel, start: Period, values: Vec<Option<u64>>) -> Self {
        Self {
            product,
            channel,
            start,
            values,
        }
    }

    /// Create a series from dated observations
    ///
    /// Observations must be strictly increasing by period. Months skipped
    /// between two observations become missing values.
    pub fn from_observations(
        product: ProductKey,
        channel: Channel,
        observations: Vec<(Period, Option<u64>)>,
    ) -> Result<Self> {
        let start = observations.first().map(|(p, _)| *p).ok_or_else(|| {
            ForecastError::DataIntegrity(format!(
                "No observations for product {} on {}",
                product, channel
            ))
        })?;

        let mut values = Vec::with_capacity(observations.len());
        let mut previous: Option<Period> = None;
        for (period, value) in observations {
            if let Some(prev) = previous {
                if period == prev {
                    return Err(ForecastError::DataIntegrity(format!(
                        "Duplicate period {} for product {} on {}",
                        period, product, channel
                    )));
                }
                if period < prev {
                    return Err(ForecastError::DataIntegrity(format!(
                        "Period {} follows {} for product {} on {}",
                        period, prev, product, channel
                    )));
                }
                let gap = prev.months_until(period) - 1;
                values.extend(std::iter::repeat(None).take(gap as usize));
            }
            values.push(value);
            previous = Some(period);
        }

        Ok(Self {
            product,
            channel,
            start,
            values,
        })
    }

    pub fn product(&self) -> &ProductKey {
        &self.product
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    /// First period of the series
    pub fn start(&self) -> Period {
        self.start
    }

    /// Number of periods, including missing ones
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Raw monthly values
    pub fn values(&self) -> &[Option<u64>] {
        &self.values
    }

    /// Number of periods with a known value
    pub fn known_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_some()).count()
    }

    /// Period of the value at `index`
    pub fn period_at(&self, index: usize) -> Period {
        self.start.offset(index as i64)
    }

    /// Every period covered by the series
    pub fn periods(&self) -> Vec<Period> {
        self.start.range(self.len())
    }

    /// The period right after the last observation
    pub fn next_period(&self) -> Period {
        self.start.offset(self.len() as i64)
    }

    /// Value recorded for `period`, if the period lies inside the series
    pub fn get(&self, period: Period) -> Option<Option<u64>> {
        let index = self.start.months_until(period);
        if index < 0 {
            return None;
        }
        self.values.get(index as usize).copied()
    }

    /// Values as floats, keeping missing months as `None`
    pub fn actuals(&self) -> Vec<Option<f64>> {
        self.values.iter().map(|v| v.map(|x| x as f64)).collect()
    }

    /// Values with missing months imputed, or `None` when nothing is known
    ///
    /// Interior gaps are linearly interpolated between their known
    /// neighbours; leading and trailing gaps repeat the nearest known value.
    pub fn filled(&self) -> Option<Vec<f64>> {
        let known: Vec<(usize, f64)> = self
            .values
            .iter()
            .enumerate()
            .filter_map(|(i, v)| v.map(|x| (i, x as f64)))
            .collect();
        let (first_index, first_value) = *known.first()?;
        let (last_index, last_value) = *known.last()?;

        let mut filled = vec![0.0; self.values.len()];
        for slot in filled.iter_mut().take(first_index) {
            *slot = first_value;
        }
        for pair in known.windows(2) {
            let (i0, v0) = pair[0];
            let (i1, v1) = pair[1];
            let span = (i1 - i0) as f64;
            for (step, slot) in filled[i0..i1].iter_mut().enumerate() {
                *slot = v0 + (v1 - v0) * step as f64 / span;
            }
        }
        for slot in filled.iter_mut().skip(last_index) {
            *slot = last_value;
        }
        Some(filled)
    }

    /// Split into the first `at` periods and the rest
    pub fn split_at(&self, at: usize) -> (TimeSeries, TimeSeries) {
        let at = at.min(self.len());
        let (head, tail) = self.values.split_at(at);
        (
            TimeSeries::new(self.product.clone(), self.channel, self.start, head.to_vec()),
            TimeSeries::new(
                self.product.clone(),
                self.channel,
                self.start.offset(at as i64),
                tail.to_vec(),
            ),
        )
    }
}

/// A dated sequence of point forecasts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastSeries {
    /// First forecast period
    pub start: Period,
    /// One value per period
    pub values: Vec<f64>,
}

impl ForecastSeries {
    pub fn new(start: Period, values: Vec<f64>) -> Self {
        Self { start, values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Every forecast period
    pub fn periods(&self) -> Vec<Period> {
        self.start.range(self.values.len())
    }

    /// Forecast for `period`, if covered
    pub fn value_at(&self, period: Period) -> Option<f64> {
        let index = self.start.months_until(period);
        if index < 0 {
            return None;
        }
        self.values.get(index as usize).copied()
    }

    /// Sum of all forecast values
    pub fn total(&self) -> f64 {
        self.values.iter().sum()
    }
}
