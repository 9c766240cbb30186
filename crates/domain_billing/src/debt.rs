//! Debt aggregation
//!
//! Folds a room's bills into its outstanding debt and finds the longest
//! run of consecutive calendar months with an unpaid remainder. A run of
//! two or more months raises a debt warning.

use serde::{Deserialize, Serialize};

use core_kernel::{BillId, BillingPeriod, Currency, Money, RoomId};

use crate::bill::{Bill, PaymentState};
use crate::error::BillingError;

/// Minimum run length that raises a warning
pub const WARNING_THRESHOLD_MONTHS: u32 = 2;

/// A bill that still has a shortfall
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnpaidBill {
    pub bill_id: BillId,
    pub period: BillingPeriod,
    pub total_cost: Money,
    pub paid_amount: Money,
    pub shortfall: Money,
    pub state: PaymentState,
}

/// Longest stretch of consecutive months in debt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebtRun {
    pub start: BillingPeriod,
    pub end: BillingPeriod,
    pub months: u32,
    /// Sum of shortfalls inside the run
    pub debt: Money,
}

/// Outstanding debt of one room
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebtRecord {
    pub room_id: RoomId,
    /// All-time outstanding amount
    pub total_debt: Money,
    /// Bills with a shortfall, oldest first
    pub unpaid_bills: Vec<UnpaidBill>,
    /// Length of the longest run, 0 when the room owes nothing
    pub consecutive_months_at_risk: u32,
    pub longest_run: Option<DebtRun>,
}

impl DebtRecord {
    pub fn has_warning(&self) -> bool {
        self.consecutive_months_at_risk >= WARNING_THRESHOLD_MONTHS
    }

    /// Converts into a warning if the run is long enough
    pub fn warning(&self) -> Option<DebtWarning> {
        if !self.has_warning() {
            return None;
        }
        let run = self.longest_run.as_ref()?;
        Some(DebtWarning {
            room_id: self.room_id,
            consecutive_months: self.consecutive_months_at_risk,
            total_debt: self.total_debt,
            run_debt: run.debt,
            run_start: run.start,
            run_end: run.end,
        })
    }
}

/// A room flagged for multi-month debt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebtWarning {
    pub room_id: RoomId,
    pub consecutive_months: u32,
    /// All-time outstanding debt of the room
    pub total_debt: Money,
    /// Debt accumulated inside the flagged run
    pub run_debt: Money,
    pub run_start: BillingPeriod,
    pub run_end: BillingPeriod,
}

/// Folds a room's bills into a [`DebtRecord`]
///
/// Bills may arrive in any order; they are sorted by period first. A month
/// without a bill, or with a fully paid bill, ends a run. When two runs
/// have the same length the earlier one is reported.
pub fn aggregate_room_debt(room_id: RoomId, bills: &[Bill], currency: Currency) -> Result<DebtRecord, BillingError> {
    let mut ordered: Vec<&Bill> = bills.iter().collect();
    ordered.sort_by_key(|bill| bill.period());

    let mut total_debt = Money::zero(currency);
    let mut unpaid_bills = Vec::new();

    let mut longest: Option<DebtRun> = None;
    let mut current: Option<DebtRun> = None;

    for bill in ordered {
        let shortfall = bill.shortfall();
        if shortfall.currency() != currency {
            return Err(BillingError::CurrencyMismatch(core_kernel::MoneyError::CurrencyMismatch(
                currency.to_string(),
                shortfall.currency().to_string(),
            )));
        }

        if shortfall.is_zero() {
            close_run(&mut current, &mut longest);
            continue;
        }

        total_debt = total_debt.checked_add(&shortfall)?;
        unpaid_bills.push(UnpaidBill {
            bill_id: bill.id(),
            period: bill.period(),
            total_cost: bill.total_cost(),
            paid_amount: bill.paid_amount().unwrap_or_else(|| Money::zero(currency)),
            shortfall,
            state: bill.payment_state(),
        });

        let extends_run = current
            .as_ref()
            .map_or(false, |run| run.end.is_followed_by(&bill.period()));
        if extends_run {
            if let Some(run) = current.as_mut() {
                run.end = bill.period();
                run.months += 1;
                run.debt = run.debt.checked_add(&shortfall)?;
            }
        } else {
            close_run(&mut current, &mut longest);
            current = Some(DebtRun {
                start: bill.period(),
                end: bill.period(),
                months: 1,
                debt: shortfall,
            });
        }
    }
    close_run(&mut current, &mut longest);

    let consecutive_months_at_risk = longest.as_ref().map_or(0, |run| run.months);
    tracing::trace!(
        room_id = %room_id,
        total_debt = %total_debt,
        consecutive_months_at_risk,
        "room debt aggregated"
    );

    Ok(DebtRecord {
        room_id,
        total_debt,
        unpaid_bills,
        consecutive_months_at_risk,
        longest_run: longest,
    })
}

/// Ends the current run, keeping it if strictly longer than the best so far
fn close_run(current: &mut Option<DebtRun>, longest: &mut Option<DebtRun>) {
    if let Some(run) = current.take() {
        let is_longer = longest.as_ref().map_or(true, |best| run.months > best.months);
        if is_longer {
            *longest = Some(run);
        }
    }
}

/// Sorts warnings by run length (longest first), then by room id
pub fn sort_warnings(warnings: &mut [DebtWarning]) {
    warnings.sort_by(|a, b| {
        b.consecutive_months
            .cmp(&a.consecutive_months)
            .then_with(|| a.room_id.cmp(&b.room_id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bill::PricingContext;
    use crate::composer::{BillComposer, BillReadings};
    use crate::meter::MeterPair;
    use crate::occupancy::OccupantCount;
    use crate::rate::{RateConfig, RateScope, ResolvedRate, WaterPricing};
    use crate::tiered::TierBand;
    use core_kernel::{RateConfigId, UserId};
    use proptest::prelude::*;
    use rust_decimal::Decimal;

    fn vnd(amount: i64) -> Money {
        Money::new(Decimal::from(amount), Currency::VND)
    }

    /// 1 000 per kWh so the reading delta equals the total
    fn unit_rate() -> ResolvedRate {
        ResolvedRate::from_config(RateConfig {
            id: RateConfigId::new(),
            scope: RateScope::Global,
            currency: Currency::VND,
            water: WaterPricing::ByHeadcount { price_per_person: vnd(0) },
            tiers: vec![TierBand::new(0, None, vnd(1_000))],
        })
        .unwrap()
    }

    /// Bill with the given total and shortfall
    fn bill(room: RoomId, month: u32, year: i32, total: u64, shortfall: u64) -> Bill {
        let composer = BillComposer::default();
        let rate = unit_rate();
        let pricing = PricingContext { composer: &composer, rate: &rate, occupant_count: OccupantCount::single() };
        let mut bill = Bill::create(
            room,
            UserId::new(),
            BillingPeriod::new(month, year).unwrap(),
            BillReadings { electricity: MeterPair::new(0, total / 1000, 999_999), water: None },
            vec![],
            pricing,
        )
        .unwrap();
        let paid = total - shortfall;
        if paid > 0 {
            bill.apply_payment(vnd(paid as i64), pricing).unwrap();
        }
        bill
    }

    #[test]
    fn test_scenario_two_month_run() {
        let room = RoomId::new();
        let bills = vec![
            bill(room, 1, 2024, 1_000_000, 0),
            bill(room, 2, 2024, 1_000_000, 500_000),
            bill(room, 3, 2024, 1_000_000, 700_000),
            bill(room, 4, 2024, 1_000_000, 0),
        ];
        let record = aggregate_room_debt(room, &bills, Currency::VND).unwrap();

        assert_eq!(record.total_debt, vnd(1_200_000));
        assert_eq!(record.consecutive_months_at_risk, 2);
        assert!(record.has_warning());
        let run = record.longest_run.clone().unwrap();
        assert_eq!(run.start, BillingPeriod::new(2, 2024).unwrap());
        assert_eq!(run.end, BillingPeriod::new(3, 2024).unwrap());
        assert_eq!(record.unpaid_bills.len(), 2);
        assert_eq!(record.unpaid_bills[0].state, PaymentState::PartiallyPaid);

        let warning = record.warning().unwrap();
        assert_eq!(warning.run_debt, vnd(1_200_000));
    }

    #[test]
    fn test_missing_month_breaks_run() {
        let room = RoomId::new();
        let bills = vec![
            bill(room, 1, 2024, 100_000, 100_000),
            bill(room, 3, 2024, 100_000, 100_000),
        ];
        let record = aggregate_room_debt(room, &bills, Currency::VND).unwrap();
        assert_eq!(record.consecutive_months_at_risk, 1);
        assert!(record.warning().is_none());
        assert_eq!(record.total_debt, vnd(200_000));
    }

    #[test]
    fn test_run_spans_year_end_and_unsorted_input() {
        let room = RoomId::new();
        let bills = vec![
            bill(room, 1, 2024, 100_000, 100_000),
            bill(room, 11, 2023, 100_000, 100_000),
            bill(room, 12, 2023, 100_000, 100_000),
        ];
        let record = aggregate_room_debt(room, &bills, Currency::VND).unwrap();
        assert_eq!(record.consecutive_months_at_risk, 3);
        assert_eq!(record.longest_run.unwrap().start, BillingPeriod::new(11, 2023).unwrap());
    }

    #[test]
    fn test_tie_keeps_earliest_run() {
        let room = RoomId::new();
        let bills = vec![
            bill(room, 1, 2024, 100_000, 100_000),
            bill(room, 2, 2024, 100_000, 100_000),
            bill(room, 3, 2024, 100_000, 0),
            bill(room, 4, 2024, 200_000, 200_000),
            bill(room, 5, 2024, 200_000, 200_000),
        ];
        let record = aggregate_room_debt(room, &bills, Currency::VND).unwrap();
        let run = record.longest_run.clone().unwrap();
        assert_eq!(run.start, BillingPeriod::new(1, 2024).unwrap());
        assert_eq!(run.debt, vnd(200_000));
        assert_eq!(record.total_debt, vnd(600_000));
    }

    #[test]
    fn test_no_bills_no_debt() {
        let record = aggregate_room_debt(RoomId::new(), &[], Currency::VND).unwrap();
        assert!(record.total_debt.is_zero());
        assert_eq!(record.consecutive_months_at_risk, 0);
        assert!(record.longest_run.is_none());
    }

    #[test]
    fn test_warning_sort_order() {
        let period = BillingPeriod::new(1, 2024).unwrap();
        let warning = |months| DebtWarning {
            room_id: RoomId::new(),
            consecutive_months: months,
            total_debt: vnd(1),
            run_debt: vnd(1),
            run_start: period,
            run_end: period,
        };
        let mut warnings = vec![warning(2), warning(4), warning(3)];
        sort_warnings(&mut warnings);
        let lengths: Vec<u32> = warnings.iter().map(|w| w.consecutive_months).collect();
        assert_eq!(lengths, vec![4, 3, 2]);
    }

    proptest! {
        #[test]
        fn debt_is_additive(count in 1usize..12usize, thousands in 1u64..500u64) {
            let room = RoomId::new();
            let shortfall = thousands * 1000;
            let bills: Vec<Bill> = (0..count)
                .map(|i| bill(room, (i % 12) as u32 + 1, 2024, shortfall, shortfall))
                .collect();
            let record = aggregate_room_debt(room, &bills, Currency::VND).unwrap();
            prop_assert_eq!(record.total_debt.amount(), Decimal::from(shortfall * count as u64));
            prop_assert_eq!(record.consecutive_months_at_risk, count as u32);
        }
    }
}
