//! Pre-built Test Fixtures
//!
//! Ready-to-use data for the billing engine. Amounts are in VND unless a
//! fixture says otherwise; the tier table is the one used throughout the
//! worked examples.

use chrono::{DateTime, TimeZone, Utc};
use core_kernel::{BillingPeriod, Currency, Money, RateConfigId, RoomId, UserId};
use domain_billing::{MeterPair, RateConfig, RateScope, TierBand, WaterPricing};
use rust_decimal_macros::dec;

/// Fixture for Money test data
pub struct MoneyFixtures;

impl MoneyFixtures {
    pub fn vnd(amount: i64) -> Money {
        Money::new(rust_decimal::Decimal::from(amount), Currency::VND)
    }

    pub fn vnd_zero() -> Money {
        Money::zero(Currency::VND)
    }

    /// Water price per occupant
    pub fn price_per_person() -> Money {
        Money::new(dec!(100000), Currency::VND)
    }

    /// Metered water price per m³
    pub fn water_unit_price() -> Money {
        Money::new(dec!(10000), Currency::VND)
    }

    /// A USD amount for currency mismatch tests
    pub fn usd_10() -> Money {
        Money::new(dec!(10.00), Currency::USD)
    }
}

/// Electricity tier tables
pub struct TierFixtures;

impl TierFixtures {
    /// `[(0,50,1678), (50,100,1734), (100,200,2014), (200,∞,2536)]`
    pub fn residential() -> Vec<TierBand> {
        vec![
            TierBand::new(0, Some(50), MoneyFixtures::vnd(1_678)),
            TierBand::new(50, Some(100), MoneyFixtures::vnd(1_734)),
            TierBand::new(100, Some(200), MoneyFixtures::vnd(2_014)),
            TierBand::new(200, None, MoneyFixtures::vnd(2_536)),
        ]
    }

    /// One unbounded band at a flat price
    pub fn flat(price: i64) -> Vec<TierBand> {
        vec![TierBand::new(0, None, MoneyFixtures::vnd(price))]
    }

    /// Bands with a hole between 50 and 60
    pub fn with_gap() -> Vec<TierBand> {
        vec![
            TierBand::new(0, Some(50), MoneyFixtures::vnd(1_678)),
            TierBand::new(60, None, MoneyFixtures::vnd(1_734)),
        ]
    }
}

/// Rate configurations
pub struct RateFixtures;

impl RateFixtures {
    /// Property-wide default: residential tiers, water by headcount
    pub fn global_headcount() -> RateConfig {
        RateConfig {
            id: RateConfigId::new(),
            scope: RateScope::Global,
            currency: Currency::VND,
            water: WaterPricing::ByHeadcount {
                price_per_person: MoneyFixtures::price_per_person(),
            },
            tiers: TierFixtures::residential(),
        }
    }

    /// Room override: flat electricity, metered water
    pub fn room_metered(room_id: RoomId) -> RateConfig {
        RateConfig {
            id: RateConfigId::new(),
            scope: RateScope::Room(room_id),
            currency: Currency::VND,
            water: WaterPricing::ByMeter {
                price_per_unit: MoneyFixtures::water_unit_price(),
            },
            tiers: TierFixtures::flat(3_000),
        }
    }
}

/// Meter reading pairs
pub struct MeterFixtures;

impl MeterFixtures {
    /// 120 kWh without wrap
    pub fn electricity_120() -> MeterPair {
        MeterPair::new(1_000, 1_120, 99_999)
    }

    /// 9990 → 50 on a 9999 meter: 59 units with rollover
    pub fn rollover_59() -> MeterPair {
        MeterPair::new(9_990, 50, 9_999)
    }

    /// 12 m³ of water
    pub fn water_12() -> MeterPair {
        MeterPair::new(100, 112, 99_999)
    }
}

/// Fixed dates and periods
pub struct TemporalFixtures;

impl TemporalFixtures {
    pub fn january_2024() -> BillingPeriod {
        BillingPeriod::new(1, 2024).expect("valid period")
    }

    pub fn december_2023() -> BillingPeriod {
        BillingPeriod::new(12, 2023).expect("valid period")
    }

    /// Mid-month instant in UTC
    pub fn mid_january_2024() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0)
            .single()
            .expect("valid timestamp")
    }
}

/// Identifiers
pub struct IdFixtures;

impl IdFixtures {
    pub fn room_id() -> RoomId {
        RoomId::new()
    }

    pub fn owner_id() -> UserId {
        UserId::new()
    }
}
