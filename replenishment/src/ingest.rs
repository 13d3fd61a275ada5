//! CSV ingestion of sales, stock and constraint tables
//!
//! Expected files in a data directory:
//!
//! | file              | columns                                                     |
//! |-------------------|-------------------------------------------------------------|
//! | `sales.csv`       | `date,channel,product,quantity`                             |
//! | `stocks.csv`      | `date,channel,warehouse,product,stock` (`date` may be empty)|
//! | `constraints.csv` | `product,withdrawn,defecture_until,box_size` (optional file)|
//!
//! `product` is the canonical product code. Sales dates may be daily or
//! `YYYY-MM`; they are summed per month.
//!
//! A row with a bad value (negative quantity or stock, unknown channel,
//! unparseable date or number, zero box size) rejects its product rather
//! than the whole table. Rejections travel in [`RunInputs::rejected`] and the
//! planner reports them as failed products. Rows without a product code
//! cannot be attributed and are dropped with a warning; a file that is not
//! valid CSV is still an error.

use crate::constraints::ConstraintBook;
use crate::pipeline::{RejectedInput, RunInputs};
use crate::shipment::StockSnapshot;
use crate::{ReplenishError, Result};
use chrono::NaiveDate;
use demand_forecast::{Channel, Period, ProductKey, TimeSeries};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{info, warn};

pub const SALES_FILE: &str = "sales.csv";
pub const STOCKS_FILE: &str = "stocks.csv";
pub const CONSTRAINTS_FILE: &str = "constraints.csv";

/// Accepted content of one table and the products it refused
#[derive(Debug, Clone, Default)]
pub struct Ingested<T> {
    pub data: T,
    pub rejected: Vec<RejectedInput>,
}

#[derive(Debug, Deserialize)]
struct SalesRow {
    date: String,
    channel: String,
    product: String,
    quantity: String,
}

#[derive(Debug, Deserialize)]
struct StockRow {
    #[serde(default)]
    date: Option<String>,
    channel: String,
    warehouse: String,
    product: String,
    stock: String,
}

#[derive(Debug, Deserialize)]
struct ConstraintRow {
    product: String,
    #[serde(default)]
    withdrawn: Option<String>,
    #[serde(default)]
    defecture_until: Option<String>,
    #[serde(default)]
    box_size: Option<String>,
}

fn reader<R: Read>(input: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(false)
        .from_reader(input)
}

fn channel(value: &str, line: usize) -> Result<Channel> {
    value.parse().map_err(|_| {
        ReplenishError::DataIntegrity(format!("line {}: unknown channel '{}'", line, value))
    })
}

fn integer(value: &str, column: &str, line: usize) -> Result<i64> {
    value.parse().map_err(|_| {
        ReplenishError::DataIntegrity(format!("line {}: invalid {} '{}'", line, column, value))
    })
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "y"
    )
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Product code of a row; `None` (logged) when the row cannot be attributed
fn product(code: String, table: &str, line: usize) -> Option<ProductKey> {
    match ProductKey::new(code) {
        Ok(key) => Some(key),
        Err(err) => {
            warn!(table, line, "dropping row without a product: {}", err);
            None
        }
    }
}

fn reject(
    rejected: &mut Vec<RejectedInput>,
    product: ProductKey,
    channel: Option<Channel>,
    err: ReplenishError,
) {
    warn!(%product, channel = ?channel, "rejecting product input: {}", err);
    rejected.push(RejectedInput::new(product, channel, &err));
}

fn is_rejected(rejected: &[RejectedInput], product: &ProductKey, channel: Channel) -> bool {
    rejected.iter().any(|r| r.applies_to(product, channel))
}

fn sales_month(row: &SalesRow, line: usize) -> Result<(Period, u64)> {
    let quantity = integer(&row.quantity, "quantity", line)?;
    if quantity < 0 {
        return Err(ReplenishError::DataIntegrity(format!(
            "line {}: negative sales quantity {}",
            line, quantity
        )));
    }
    let period: Period = row.date.parse().map_err(|_| {
        ReplenishError::DataIntegrity(format!("line {}: invalid date '{}'", line, row.date))
    })?;
    Ok((period, quantity as u64))
}

/// Monthly series per product and channel, sorted by product then channel
///
/// A product and channel with any rejected row yields no series.
pub fn read_sales<R: Read>(input: R) -> Result<Ingested<Vec<TimeSeries>>> {
    let mut totals: BTreeMap<(ProductKey, Channel), BTreeMap<Period, u64>> = BTreeMap::new();
    let mut rejected = Vec::new();
    for (index, row) in reader(input).deserialize::<SalesRow>().enumerate() {
        let line = index + 2;
        let mut row: SalesRow = row?;
        let Some(key) = product(std::mem::take(&mut row.product), SALES_FILE, line) else {
            continue;
        };
        let channel = match channel(&row.channel, line) {
            Ok(channel) => channel,
            Err(err) => {
                reject(&mut rejected, key, None, err);
                continue;
            }
        };
        match sales_month(&row, line) {
            Ok((period, quantity)) => {
                *totals
                    .entry((key, channel))
                    .or_default()
                    .entry(period)
                    .or_insert(0) += quantity;
            }
            Err(err) => reject(&mut rejected, key, Some(channel), err),
        }
    }

    let mut series = Vec::with_capacity(totals.len());
    for ((key, channel), months) in totals {
        if is_rejected(&rejected, &key, channel) {
            continue;
        }
        let observations = months.into_iter().map(|(p, v)| (p, Some(v))).collect();
        match TimeSeries::from_observations(key.clone(), channel, observations) {
            Ok(s) => series.push(s),
            Err(err) => reject(&mut rejected, key, Some(channel), err.into()),
        }
    }
    Ok(Ingested {
        data: series,
        rejected,
    })
}

fn iso_date(value: Option<String>, line: usize) -> Result<Option<NaiveDate>> {
    value
        .map(|value| {
            NaiveDate::parse_from_str(&value, "%Y-%m-%d").map_err(|_| {
                ReplenishError::DataIntegrity(format!("line {}: invalid date '{}'", line, value))
            })
        })
        .transpose()
}

/// Stock snapshot; dated rows keep only the latest date of each channel
///
/// Rows older than the latest date are discarded before validation.
pub fn read_stocks<R: Read>(input: R) -> Result<Ingested<StockSnapshot>> {
    let mut rows = Vec::new();
    let mut rejected = Vec::new();
    for (index, row) in reader(input).deserialize::<StockRow>().enumerate() {
        let line = index + 2;
        let mut row: StockRow = row?;
        let Some(key) = product(std::mem::take(&mut row.product), STOCKS_FILE, line) else {
            continue;
        };
        let channel = match channel(&row.channel, line) {
            Ok(channel) => channel,
            Err(err) => {
                reject(&mut rejected, key, None, err);
                continue;
            }
        };
        match iso_date(non_empty(row.date.take()), line) {
            Ok(date) => rows.push((line, key, channel, date, row)),
            Err(err) => reject(&mut rejected, key, Some(channel), err),
        }
    }

    let mut latest: HashMap<Channel, NaiveDate> = HashMap::new();
    for (_, _, channel, date, _) in &rows {
        if let Some(date) = *date {
            let entry = latest.entry(*channel).or_insert(date);
            if date > *entry {
                *entry = date;
            }
        }
    }

    let mut snapshot = StockSnapshot::new();
    for (line, key, channel, date, row) in rows {
        let current = match (date, latest.get(&channel)) {
            (Some(date), Some(last)) => date == *last,
            _ => true,
        };
        if !current {
            continue;
        }
        let inserted = integer(&row.stock, "stock", line)
            .and_then(|units| snapshot.insert(key.clone(), channel, row.warehouse, units));
        if let Err(err) = inserted {
            reject(&mut rejected, key, Some(channel), err);
        }
    }
    Ok(Ingested {
        data: snapshot,
        rejected,
    })
}

fn apply_constraint(
    book: &mut ConstraintBook,
    key: &ProductKey,
    row: ConstraintRow,
    line: usize,
) -> Result<()> {
    let until = iso_date(non_empty(row.defecture_until), line)?;
    let box_size = non_empty(row.box_size)
        .map(|value| {
            value.parse::<u32>().map_err(|_| {
                ReplenishError::DataIntegrity(format!(
                    "line {}: invalid box size '{}'",
                    line, value
                ))
            })
        })
        .transpose()?;

    if row.withdrawn.as_deref().map_or(false, parse_flag) {
        book.withdraw(key.clone());
    }
    if let Some(until) = until {
        book.set_defecture(key.clone(), until);
    }
    if let Some(size) = box_size {
        book.set_box_size(key.clone(), size)?;
    }
    Ok(())
}

/// Constraint book on top of `default_box_size`
///
/// A refused row rejects its product on every channel.
pub fn read_constraints<R: Read>(
    input: R,
    default_box_size: Option<u32>,
) -> Result<Ingested<ConstraintBook>> {
    let mut book = ConstraintBook::new(default_box_size)?;
    let mut rejected = Vec::new();
    for (index, row) in reader(input).deserialize::<ConstraintRow>().enumerate() {
        let line = index + 2;
        let mut row: ConstraintRow = row?;
        let Some(key) = product(std::mem::take(&mut row.product), CONSTRAINTS_FILE, line) else {
            continue;
        };
        if let Err(err) = apply_constraint(&mut book, &key, row, line) {
            reject(&mut rejected, key, None, err);
        }
    }
    Ok(Ingested {
        data: book,
        rejected,
    })
}

/// Read every table from `dir`; a missing constraints file means no constraints
pub fn load_dir(dir: &Path, default_box_size: Option<u32>) -> Result<RunInputs> {
    let sales = read_sales(File::open(dir.join(SALES_FILE))?)?;
    let stocks = read_stocks(File::open(dir.join(STOCKS_FILE))?)?;
    let constraints_path = dir.join(CONSTRAINTS_FILE);
    let constraints = if constraints_path.exists() {
        read_constraints(File::open(constraints_path)?, default_box_size)?
    } else {
        Ingested {
            data: ConstraintBook::new(default_box_size)?,
            rejected: Vec::new(),
        }
    };

    let mut rejected = sales.rejected;
    rejected.extend(stocks.rejected);
    rejected.extend(constraints.rejected);

    info!(
        series = sales.data.len(),
        stocked = stocks.data.len(),
        constrained = constraints.data.len(),
        rejected = rejected.len(),
        dir = %dir.display(),
        "loaded run inputs"
    );
    Ok(RunInputs {
        sales: sales.data,
        stocks: stocks.data,
        constraints: constraints.data,
        rejected,
    })
}
