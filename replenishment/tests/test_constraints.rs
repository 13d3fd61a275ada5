use chrono::NaiveDate;
use demand_forecast::{Channel, ForecastSeries, Period, ProductKey};
use proptest::prelude::*;
use replenishment::constraints::ceil_units;
use replenishment::{round_up_to_box, ConstraintBook, ShipmentCalculator, StockSnapshot};
use rstest::rstest;

fn key() -> ProductKey {
    ProductKey::new("SKU-9").unwrap()
}

fn start() -> Period {
    Period::new(2025, 1).unwrap()
}

fn stocks(levels: &[u32]) -> StockSnapshot {
    let mut snapshot = StockSnapshot::new();
    for (i, level) in levels.iter().enumerate() {
        snapshot
            .insert(key(), Channel::Ozon, format!("W{}", i), i64::from(*level))
            .unwrap();
    }
    snapshot
}

#[rstest]
#[case(NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(), 0)]
#[case(NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(), 0)]
#[case(NaiveDate::from_ymd_opt(2025, 1, 2).unwrap(), 1)]
#[case(NaiveDate::from_ymd_opt(2025, 3, 31).unwrap(), 3)]
#[case(NaiveDate::from_ymd_opt(2025, 4, 1).unwrap(), 3)]
fn test_defecture_blocks_leading_months(#[case] until: NaiveDate, #[case] blocked: usize) {
    let mut book = ConstraintBook::new(None).unwrap();
    book.set_defecture(key(), until);
    let clamped = book.clamp_schedule(&key(), start(), &[1u8; 6]);
    assert_eq!(clamped.iter().filter(|v| **v == 0).count(), blocked);
    assert!(clamped[..blocked].iter().all(|v| *v == 0));
}

proptest! {
    #[test]
    fn prop_box_rounding(quantity in 0u64..1_000_000, size in 1u32..500) {
        let rounded = round_up_to_box(quantity, size);
        let size = u64::from(size);
        prop_assert_eq!(rounded % size, 0);
        if quantity == 0 {
            prop_assert_eq!(rounded, 0);
        } else {
            prop_assert!(rounded >= quantity);
            prop_assert!(rounded - size < quantity);
        }
    }

    #[test]
    fn prop_ceil_covers_demand(raw in 0.0f64..1e6) {
        let units = ceil_units(raw);
        prop_assert!(units as f64 + 1e-9 >= raw);
        prop_assert!((units as f64) < raw + 1.0);
    }

    #[test]
    fn prop_withdrawn_plans_are_zero(
        forecast in prop::collection::vec(0.0f64..1000.0, 1..24),
        levels in prop::collection::vec(0u32..200, 1..4),
        coverage in 0.1f64..3.0,
        box_size in prop::option::of(1u32..50),
    ) {
        let mut book = ConstraintBook::new(box_size).unwrap();
        book.withdraw(key());
        let plan = ShipmentCalculator::new(coverage).unwrap().plan(
            &key(),
            Channel::Ozon,
            &ForecastSeries::new(start(), forecast.clone()),
            &stocks(&levels),
            &book,
        );
        prop_assert_eq!(plan.lines.len(), forecast.len() * levels.len());
        prop_assert!(plan.lines.iter().all(|l| l.quantity == 0));
    }

    #[test]
    fn prop_quantities_are_box_multiples_and_cover_need(
        forecast in prop::collection::vec(0.0f64..1000.0, 1..12),
        levels in prop::collection::vec(0u32..300, 1..4),
        coverage in 0.1f64..3.0,
        box_size in 1u32..50,
    ) {
        let mut book = ConstraintBook::new(None).unwrap();
        book.set_box_size(key(), box_size).unwrap();
        let plan = ShipmentCalculator::new(coverage).unwrap().plan(
            &key(),
            Channel::Ozon,
            &ForecastSeries::new(start(), forecast),
            &stocks(&levels),
            &book,
        );
        for line in &plan.lines {
            prop_assert_eq!(line.quantity % u64::from(box_size), 0);
            let need = (line.required - line.on_hand as f64).max(0.0);
            prop_assert!(line.quantity as f64 + 1e-6 >= need);
            prop_assert_eq!(line.boxes, Some(line.quantity / u64::from(box_size)));
        }
    }
}
