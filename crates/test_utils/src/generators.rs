//! Property-Based Test Generators
//!
//! Proptest strategies that respect the billing invariants: tier tables
//! are contiguous from zero with an unbounded last band, and meter pairs
//! are either forward movements or valid wraps.

use core_kernel::{Currency, Money};
use domain_billing::{MeterPair, TierBand};
use proptest::prelude::*;
use rust_decimal::Decimal;

/// Unit prices between 1 and 10 000 VND
pub fn unit_price_strategy() -> impl Strategy<Value = Money> {
    (1i64..10_000i64).prop_map(|p| Money::new(Decimal::from(p), Currency::VND))
}

/// Contiguous bands starting at zero, 1 to 6 bands, last one unbounded
pub fn tier_bands_strategy() -> impl Strategy<Value = Vec<TierBand>> {
    prop::collection::vec((1u64..200u64, unit_price_strategy()), 0..5)
        .prop_flat_map(|bounded| (Just(bounded), unit_price_strategy()))
        .prop_map(|(bounded, last_price)| {
            let mut bands = Vec::with_capacity(bounded.len() + 1);
            let mut floor = 0u64;
            for (width, price) in bounded {
                bands.push(TierBand::new(floor, Some(floor + width), price));
                floor += width;
            }
            bands.push(TierBand::new(floor, None, last_price));
            bands
        })
}

/// Meter pairs that move forward without wrapping
pub fn forward_reading_strategy() -> impl Strategy<Value = MeterPair> {
    (0u64..50_000u64, 0u64..5_000u64).prop_map(|(old, usage)| MeterPair::new(old, old + usage, 99_999))
}

/// Meter pairs that wrap past the capacity
pub fn rollover_reading_strategy() -> impl Strategy<Value = MeterPair> {
    (1_000u64..100_000u64)
        .prop_flat_map(|max| (Just(max), 1..max))
        .prop_flat_map(|(max, old)| (Just(max), Just(old), 0..old))
        .prop_map(|(max, old, new)| MeterPair::new(old, new, max))
}

/// Either kind of valid reading
pub fn meter_reading_strategy() -> impl Strategy<Value = MeterPair> {
    prop_oneof![forward_reading_strategy(), rollover_reading_strategy()]
}

/// Occupant counts between 1 and 8
pub fn occupant_count_strategy() -> impl Strategy<Value = u32> {
    1u32..=8u32
}

/// Shortfall series in thousands of VND; zeros break debt runs
pub fn shortfall_series_strategy() -> impl Strategy<Value = Vec<u64>> {
    prop::collection::vec(prop_oneof![Just(0u64), 1u64..1_000u64], 1..12)
        .prop_map(|series| series.into_iter().map(|k| k * 1_000).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain_billing::{electricity_cost, process_reading, Utility};

    proptest! {
        #[test]
        fn generated_tiers_are_valid(bands in tier_bands_strategy(), usage in 0u64..2_000u64) {
            prop_assert!(electricity_cost(usage, &bands, Currency::VND).is_ok());
        }

        #[test]
        fn generated_readings_are_accepted(pair in meter_reading_strategy()) {
            prop_assert!(process_reading(Utility::Electricity, &pair).is_ok());
        }

        #[test]
        fn rollover_readings_report_wrap(pair in rollover_reading_strategy()) {
            let usage = process_reading(Utility::Water, &pair).unwrap();
            prop_assert!(usage.rollover);
        }
    }
}
