//! Test Data Builders
//!
//! Builders with sensible defaults so a test only spells out the fields it
//! cares about. Bills are priced through the real composer, so a built bill
//! always satisfies the aggregate's invariants.

use core_kernel::{BillingPeriod, Currency, Money, RateConfigId, RoomId, UserId};
use domain_billing::{
    Bill, BillComposer, BillReadings, BillingError, Fee, Locale, MeterPair, OccupantCount, PricingContext,
    RateConfig, RateScope, ResolvedRate, TierBand, WaterPricing,
};

use crate::fixtures::{MeterFixtures, MoneyFixtures, RateFixtures, TemporalFixtures, TierFixtures};

/// Builder for rate configurations
pub struct RateConfigBuilder {
    id: RateConfigId,
    scope: RateScope,
    currency: Currency,
    water: WaterPricing,
    tiers: Vec<TierBand>,
}

impl Default for RateConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RateConfigBuilder {
    /// Global configuration with the residential tiers and headcount water
    pub fn new() -> Self {
        let base = RateFixtures::global_headcount();
        Self {
            id: base.id,
            scope: base.scope,
            currency: base.currency,
            water: base.water,
            tiers: base.tiers,
        }
    }

    pub fn for_room(mut self, room_id: RoomId) -> Self {
        self.scope = RateScope::Room(room_id);
        self
    }

    pub fn global(mut self) -> Self {
        self.scope = RateScope::Global;
        self
    }

    pub fn with_currency(mut self, currency: Currency) -> Self {
        self.currency = currency;
        self
    }

    pub fn with_tiers(mut self, tiers: Vec<TierBand>) -> Self {
        self.tiers = tiers;
        self
    }

    /// Single unbounded band
    pub fn with_flat_price(mut self, price: i64) -> Self {
        self.tiers = TierFixtures::flat(price);
        self
    }

    pub fn water_by_meter(mut self, price_per_unit: Money) -> Self {
        self.water = WaterPricing::ByMeter { price_per_unit };
        self
    }

    pub fn water_by_headcount(mut self, price_per_person: Money) -> Self {
        self.water = WaterPricing::ByHeadcount { price_per_person };
        self
    }

    pub fn build(self) -> RateConfig {
        RateConfig {
            id: self.id,
            scope: self.scope,
            currency: self.currency,
            water: self.water,
            tiers: self.tiers,
        }
    }

    /// Builds and validates the configuration
    pub fn resolve(self) -> Result<ResolvedRate, BillingError> {
        ResolvedRate::from_config(self.build())
    }
}

/// Builder for priced bills
pub struct TestBillBuilder {
    room_id: RoomId,
    owner_id: UserId,
    period: BillingPeriod,
    electricity: MeterPair,
    water: Option<MeterPair>,
    fees: Vec<Fee>,
    occupants: u32,
    rate: RateConfig,
    locale: Locale,
    paid: Option<Money>,
    mark_paid: bool,
}

impl Default for TestBillBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestBillBuilder {
    /// 120 kWh in January 2024 for one occupant under the global rate
    pub fn new() -> Self {
        Self {
            room_id: RoomId::new(),
            owner_id: UserId::new(),
            period: TemporalFixtures::january_2024(),
            electricity: MeterFixtures::electricity_120(),
            water: None,
            fees: Vec::new(),
            occupants: 1,
            rate: RateFixtures::global_headcount(),
            locale: Locale::default(),
            paid: None,
            mark_paid: false,
        }
    }

    pub fn for_room(mut self, room_id: RoomId) -> Self {
        self.room_id = room_id;
        self
    }

    pub fn owned_by(mut self, owner_id: UserId) -> Self {
        self.owner_id = owner_id;
        self
    }

    pub fn in_period(mut self, month: u32, year: i32) -> Self {
        self.period = BillingPeriod::new(month, year).expect("valid test period");
        self
    }

    pub fn with_electricity(mut self, readings: MeterPair) -> Self {
        self.electricity = readings;
        self
    }

    /// Electricity usage without wrap, starting from zero
    pub fn with_usage(mut self, usage: u64) -> Self {
        self.electricity = MeterPair::new(0, usage, usage.max(1) * 10);
        self
    }

    pub fn with_water(mut self, readings: MeterPair) -> Self {
        self.water = Some(readings);
        self
    }

    pub fn with_fee(mut self, fee: Fee) -> Self {
        self.fees.push(fee);
        self
    }

    pub fn with_occupants(mut self, count: u32) -> Self {
        self.occupants = count;
        self
    }

    pub fn with_rate(mut self, rate: RateConfig) -> Self {
        self.rate = rate;
        self
    }

    pub fn with_locale(mut self, locale: Locale) -> Self {
        self.locale = locale;
        self
    }

    /// Records a partial or full payment
    pub fn with_payment(mut self, amount: Money) -> Self {
        self.paid = Some(amount);
        self
    }

    pub fn paid(mut self) -> Self {
        self.mark_paid = true;
        self
    }

    /// Prices the bill; errors come from the domain unchanged
    pub fn try_build(self) -> Result<Bill, BillingError> {
        let composer = BillComposer::new(self.locale);
        let rate = ResolvedRate::from_config(self.rate)?;
        let pricing = PricingContext {
            composer: &composer,
            rate: &rate,
            occupant_count: OccupantCount::new(self.occupants)?,
        };

        let mut bill = Bill::create(
            self.room_id,
            self.owner_id,
            self.period,
            BillReadings {
                electricity: self.electricity,
                water: self.water,
            },
            self.fees,
            pricing,
        )?;

        if let Some(amount) = self.paid {
            bill.apply_payment(amount, pricing)?;
        }
        if self.mark_paid {
            bill.set_paid(true, pricing)?;
        }
        Ok(bill)
    }

    pub fn build(self) -> Bill {
        self.try_build().expect("test bill should price")
    }
}

/// Bills for consecutive months of one room with the given shortfalls
///
/// Each bill is worth `total` (flat 1 000 per kWh, free water). The first
/// bill is for `start`, each following one a calendar month later.
pub fn bills_with_shortfalls(room_id: RoomId, start: BillingPeriod, total: u64, shortfalls: &[u64]) -> Vec<Bill> {
    let mut period = start;
    let mut bills = Vec::with_capacity(shortfalls.len());
    for &shortfall in shortfalls {
        let mut builder = TestBillBuilder::new()
            .for_room(room_id)
            .in_period(period.month(), period.year())
            .with_rate(
                RateConfigBuilder::new()
                    .with_flat_price(1_000)
                    .water_by_headcount(MoneyFixtures::vnd_zero())
                    .build(),
            )
            .with_usage(total / 1_000);
        let paid = total.saturating_sub(shortfall);
        if paid > 0 {
            builder = builder.with_payment(MoneyFixtures::vnd(paid as i64));
        }
        bills.push(builder.build());
        period = period.next();
    }
    bills
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_bill_uses_residential_tiers() {
        let bill = TestBillBuilder::new().build();
        assert_eq!(bill.calculation().electricity_cost, MoneyFixtures::vnd(210_880));
        assert_eq!(bill.calculation().water_cost, MoneyFixtures::vnd(100_000));
        assert_eq!(bill.total_cost(), MoneyFixtures::vnd(310_880));
    }

    #[test]
    fn test_metered_room_requires_water_readings() {
        let room = RoomId::new();
        let result = TestBillBuilder::new()
            .for_room(room)
            .with_rate(RateFixtures::room_metered(room))
            .try_build();
        assert!(matches!(result, Err(BillingError::MissingWaterReading)));
    }

    #[test]
    fn test_shortfall_series() {
        let bills = bills_with_shortfalls(
            RoomId::new(),
            TemporalFixtures::january_2024(),
            1_000_000,
            &[0, 500_000, 700_000, 0],
        );
        assert_eq!(bills.len(), 4);
        assert!(bills[0].is_paid() || bills[0].shortfall().is_zero());
        assert_eq!(bills[2].shortfall(), MoneyFixtures::vnd(700_000));
        assert_eq!(bills[3].period().month(), 4);
    }
}
