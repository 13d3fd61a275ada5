//! # Replenish
//!
//! Marketplace sales forecasting and warehouse replenishment.
//!
//! - [`math`]: statistics, least squares, differencing and simplex search
//! - [`forecast`]: monthly series, calendar features, candidate models and
//!   the evaluator that selects one per product and channel
//! - [`replenishment`]: constraints, shipment sizing, run history and
//!   batch planning
//!
//! ```
//! use replenish_workspace::forecast::{Channel, Period};
//!
//! let period: Period = "2025-11".parse().unwrap();
//! assert_eq!(period.succ().to_string(), "2025-12");
//! assert_eq!(Channel::Wildberries.code(), "wb");
//! ```

pub use demand_forecast as forecast;
pub use demand_math as math;
pub use replenishment;
