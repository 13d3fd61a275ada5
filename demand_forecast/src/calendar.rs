//! Calendar feature provider
//!
//! Daily flags (public holiday, weekend, Black Friday window, New Year
//! window, summer) are aggregated into one [`FeatureVector`] per month so
//! the monthly models can use them as regressors.

use crate::config::CalendarConfig;
use crate::data::{Channel, Period};
use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::f64::consts::PI;

/// Fixed-date public holidays as (month, day)
const FIXED_HOLIDAYS: [(u32, u32); 14] = [
    (1, 1),
    (1, 2),
    (1, 3),
    (1, 4),
    (1, 5),
    (1, 6),
    (1, 7),
    (1, 8),
    (2, 23),
    (3, 8),
    (5, 1),
    (5, 9),
    (6, 12),
    (11, 4),
];

/// Days on either side of a Black Friday date that count as its sale window
pub const BLACK_FRIDAY_WINDOW_DAYS: i64 = 7;

/// Flags for a single day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DayFeatures {
    pub is_holiday: bool,
    pub is_weekend: bool,
    /// The day is a configured Black Friday for the channel
    pub is_black_friday: bool,
    /// The day lies within a week of a Black Friday
    pub is_black_friday_period: bool,
    /// December 20th through January 10th
    pub is_new_year_period: bool,
    /// June through August
    pub is_summer: bool,
}

/// Calendar features of one monthly period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub period: Period,
    /// Share of days that are public holidays
    pub holiday_share: f64,
    /// Share of days falling on a weekend
    pub weekend_share: f64,
    /// Share of days inside a Black Friday window
    pub black_friday_share: f64,
    /// Share of days inside the New Year window
    pub new_year_share: f64,
    pub has_black_friday: bool,
    pub is_summer: bool,
}

/// Names of the columns returned by [`FeatureVector::continuous`]
pub const CONTINUOUS_FEATURES: [&str; 6] = [
    "holiday_share",
    "weekend_share",
    "black_friday_share",
    "new_year_share",
    "month_sin",
    "month_cos",
];

/// Names of the columns returned by [`FeatureVector::exogenous`]
pub const EXOGENOUS_FEATURES: [&str; 3] = ["holiday_share", "black_friday_share", "new_year_share"];

impl FeatureVector {
    /// Aggregate daily flags over a month
    pub fn from_days(period: Period, days: &[DayFeatures]) -> Self {
        let n = days.len().max(1) as f64;
        let share = |f: fn(&DayFeatures) -> bool| days.iter().filter(|d| f(d)).count() as f64 / n;
        Self {
            period,
            holiday_share: share(|d| d.is_holiday),
            weekend_share: share(|d| d.is_weekend),
            black_friday_share: share(|d| d.is_black_friday_period),
            new_year_share: share(|d| d.is_new_year_period),
            has_black_friday: days.iter().any(|d| d.is_black_friday),
            is_summer: days.iter().any(|d| d.is_summer),
        }
    }

    /// Cyclic encoding of the month
    pub fn month_angle(&self) -> (f64, f64) {
        let angle = 2.0 * PI * (self.period.month() as f64 - 1.0) / 12.0;
        (angle.sin(), angle.cos())
    }

    /// Continuous calendar signals, ordered as [`CONTINUOUS_FEATURES`]
    pub fn continuous(&self) -> Vec<f64> {
        let (sin, cos) = self.month_angle();
        vec![
            self.holiday_share,
            self.weekend_share,
            self.black_friday_share,
            self.new_year_share,
            sin,
            cos,
        ]
    }

    /// Binary calendar indicators, ordered as [`binary_feature_names`]
    pub fn binary(&self) -> Vec<f64> {
        let flag = |b: bool| if b { 1.0 } else { 0.0 };
        let mut values = vec![
            flag(self.holiday_share > 0.0),
            flag(self.has_black_friday),
            flag(self.new_year_share > 0.0),
            flag(self.is_summer),
        ];
        values.extend((1..=12).map(|m| flag(self.period.month() == m)));
        values
    }

    /// Small set of demand shocks used as exogenous regressors
    pub fn exogenous(&self) -> Vec<f64> {
        vec![
            self.holiday_share,
            self.black_friday_share,
            self.new_year_share,
        ]
    }
}

/// Names of the columns returned by [`FeatureVector::binary`]
pub fn binary_feature_names() -> Vec<String> {
    let mut names: Vec<String> = ["is_holiday", "is_black_friday", "is_new_year", "is_summer"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    names.extend((1..=12).map(|m| format!("month_{}", m)));
    names
}

/// Source of calendar features for a channel
pub trait CalendarFeatureProvider: Send + Sync {
    /// Flags for one day
    fn day_features(&self, date: NaiveDate, channel: Channel) -> DayFeatures;

    /// Flags for every day in `[from, to]`
    fn daily_features(&self, from: NaiveDate, to: NaiveDate, channel: Channel) -> Vec<(NaiveDate, DayFeatures)> {
        from.iter_days()
            .take_while(|d| *d <= to)
            .map(|d| (d, self.day_features(d, channel)))
            .collect()
    }

    /// Monthly feature vectors for `len` periods starting at `start`
    fn features_for(&self, start: Period, len: usize, channel: Channel) -> Vec<FeatureVector> {
        start
            .range(len)
            .into_iter()
            .map(|period| {
                let days: Vec<DayFeatures> = period
                    .days()
                    .map(|d| self.day_features(d, channel))
                    .collect();
                FeatureVector::from_days(period, &days)
            })
            .collect()
    }
}

/// Calendar built from the fixed public-holiday table plus configured dates
#[derive(Debug, Clone)]
pub struct StaticCalendar {
    extra_holidays: HashSet<NaiveDate>,
    black_friday_wb: Vec<NaiveDate>,
    black_friday_ozon: Vec<NaiveDate>,
}

impl StaticCalendar {
    pub fn new(config: &CalendarConfig) -> Self {
        Self {
            extra_holidays: config.extra_holidays.iter().copied().collect(),
            black_friday_wb: config.black_friday.wb.clone(),
            black_friday_ozon: config.black_friday.ozon.clone(),
        }
    }

    fn black_fridays(&self, channel: Channel) -> &[NaiveDate] {
        match channel {
            Channel::Wildberries => &self.black_friday_wb,
            Channel::Ozon => &self.black_friday_ozon,
        }
    }

    /// Whether `date` is a public holiday
    pub fn is_holiday(&self, date: NaiveDate) -> bool {
        FIXED_HOLIDAYS.contains(&(date.month(), date.day())) || self.extra_holidays.contains(&date)
    }
}

impl Default for StaticCalendar {
    fn default() -> Self {
        Self::new(&CalendarConfig::default())
    }
}

impl CalendarFeatureProvider for StaticCalendar {
    fn day_features(&self, date: NaiveDate, channel: Channel) -> DayFeatures {
        let black_fridays = self.black_fridays(channel);
        let window = Duration::days(BLACK_FRIDAY_WINDOW_DAYS);
        DayFeatures {
            is_holiday: self.is_holiday(date),
            is_weekend: matches!(date.weekday(), Weekday::Sat | Weekday::Sun),
            is_black_friday: black_fridays.contains(&date),
            is_black_friday_period: black_fridays
                .iter()
                .any(|bf| date >= *bf - window && date <= *bf + window),
            is_new_year_period: (date.month() == 12 && date.day() >= 20)
                || (date.month() == 1 && date.day() <= 10),
            is_summer: (6..=8).contains(&date.month()),
        }
    }
}
