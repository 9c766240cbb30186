//! Comprehensive tests for domain_billing

use std::sync::Arc;

use rust_decimal_macros::dec;

use core_kernel::{BillingPeriod, Currency, Money, RateConfigId, RoomId, UserId};

use domain_billing::audit::{Actor, BillAction};
use domain_billing::bill::PaymentState;
use domain_billing::composer::{compute_bill, BillInputs, BillReadings};
use domain_billing::error::{BillingError, ErrorKind};
use domain_billing::fee::Fee;
use domain_billing::meter::{process_reading, MeterPair};
use domain_billing::occupancy::OccupantCount;
use domain_billing::ports::mock::InMemoryBillingStore;
use domain_billing::rate::{RateConfig, RateScope, ResolvedRate, WaterPricing};
use domain_billing::service::{BillingService, BillingSettings, NewBill};
use domain_billing::tiered::{electricity_cost, TierBand};
use domain_billing::error::Utility;

fn vnd(amount: rust_decimal::Decimal) -> Money {
    Money::new(amount, Currency::VND)
}

fn residential_tiers() -> Vec<TierBand> {
    vec![
        TierBand::new(0, Some(50), vnd(dec!(1678))),
        TierBand::new(50, Some(100), vnd(dec!(1734))),
        TierBand::new(100, Some(200), vnd(dec!(2014))),
        TierBand::new(200, None, vnd(dec!(2536))),
    ]
}

fn rate_config(scope: RateScope, water: WaterPricing) -> RateConfig {
    RateConfig {
        id: RateConfigId::new(),
        scope,
        currency: Currency::VND,
        water,
        tiers: residential_tiers(),
    }
}

fn headcount_water() -> WaterPricing {
    WaterPricing::ByHeadcount { price_per_person: vnd(dec!(100000)) }
}

// ============================================================================
// Calculator Scenarios
// ============================================================================

mod calculator_tests {
    use super::*;

    #[test]
    fn test_tiered_electricity_scenario() {
        let cost = electricity_cost(120, &residential_tiers(), Currency::VND).unwrap();
        assert_eq!(cost.amount(), dec!(210880));
    }

    #[test]
    fn test_water_by_headcount_scenario() {
        let rate = ResolvedRate::from_config(rate_config(RateScope::Global, headcount_water())).unwrap();
        let readings = BillReadings { electricity: MeterPair::new(0, 0, 9999), water: None };
        let calc = compute_bill(&BillInputs {
            readings: &readings,
            rate: &rate,
            occupant_count: OccupantCount::new(3).unwrap(),
            fees: &[],
        })
        .unwrap();
        assert_eq!(calc.water_cost.amount(), dec!(300000));
        assert_eq!(calc.water_usage, None);
    }

    #[test]
    fn test_rollover_scenario() {
        let usage = process_reading(Utility::Electricity, &MeterPair::new(9990, 50, 9999)).unwrap();
        assert_eq!(usage.usage, 59);
        assert!(usage.rollover);
    }

    #[test]
    fn test_full_bill_text() {
        let rate = ResolvedRate::from_config(rate_config(
            RateScope::Global,
            WaterPricing::ByHeadcount { price_per_person: vnd(dec!(0)) },
        ))
        .unwrap();
        let readings = BillReadings { electricity: MeterPair::new(1000, 1120, 99999), water: None };
        let calc = compute_bill(&BillInputs {
            readings: &readings,
            rate: &rate,
            occupant_count: OccupantCount::single(),
            fees: &[],
        })
        .unwrap();
        assert_eq!(calc.total_cost_text, "Hai trăm mười nghìn tám trăm tám mươi đồng");
    }

    #[test]
    fn test_metered_water_rollover() {
        let rate = ResolvedRate::from_config(rate_config(
            RateScope::Global,
            WaterPricing::ByMeter { price_per_unit: vnd(dec!(15000)) },
        ))
        .unwrap();
        let readings = BillReadings {
            electricity: MeterPair::new(0, 10, 9999),
            water: Some(MeterPair::new(995, 3, 999)),
        };
        let calc = compute_bill(&BillInputs {
            readings: &readings,
            rate: &rate,
            occupant_count: OccupantCount::single(),
            fees: &[],
        })
        .unwrap();
        assert_eq!(calc.water_usage, Some(7));
        assert_eq!(calc.water_rollover, Some(true));
        assert_eq!(calc.water_cost.amount(), dec!(105000));
    }

    #[test]
    fn test_configuration_errors_are_classified() {
        let mut config = rate_config(RateScope::Global, headcount_water());
        config.tiers.remove(1);
        let err = ResolvedRate::from_config(config).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(!err.is_retryable());
    }
}

// ============================================================================
// Service Tests
// ============================================================================

mod service_tests {
    use super::*;

    struct Fixture {
        service: BillingService,
        store: Arc<InMemoryBillingStore>,
        room: RoomId,
        owner: UserId,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(InMemoryBillingStore::new());
        store.add_rate(rate_config(RateScope::Global, headcount_water())).await;
        let service = BillingService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            BillingSettings::default(),
        );
        Fixture {
            service,
            store,
            room: RoomId::new(),
            owner: UserId::new(),
        }
    }

    fn new_bill(room: RoomId, owner: UserId, month: u32, usage: u64) -> NewBill {
        NewBill {
            room_id: room,
            owner_id: owner,
            period: BillingPeriod::new(month, 2024).unwrap(),
            readings: BillReadings { electricity: MeterPair::new(0, usage, 99999), water: None },
            fees: vec![],
        }
    }

    #[tokio::test]
    async fn test_create_bill_records_history() {
        let f = fixture().await;
        let outcome = f
            .service
            .create_bill(new_bill(f.room, f.owner, 1, 120), Actor::new(f.owner))
            .await
            .unwrap();

        // 210 880 electricity + 100 000 water for the primary tenant
        assert_eq!(outcome.value.total_cost().amount(), dec!(310880));
        let history = outcome.history.unwrap();
        assert_eq!(history.action, BillAction::Create);
        assert!(history.old_snapshot.is_none());
    }

    #[tokio::test]
    async fn test_second_bill_for_same_month_rejected() {
        let f = fixture().await;
        f.service
            .create_bill(new_bill(f.room, f.owner, 1, 10), Actor::new(f.owner))
            .await
            .unwrap();
        let err = f
            .service
            .create_bill(new_bill(f.room, f.owner, 1, 20), Actor::new(f.owner))
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::DuplicateBill { .. }));
    }

    #[tokio::test]
    async fn test_occupant_change_applies_on_recalculate() {
        let f = fixture().await;
        let created = f
            .service
            .create_bill(new_bill(f.room, f.owner, 2, 0), Actor::new(f.owner))
            .await
            .unwrap();
        assert_eq!(created.value.total_cost().amount(), dec!(100000));

        f.store.set_additional_occupants(f.room, 2).await;
        let outcome = f
            .service
            .recalculate(created.value.id(), Actor::new(f.owner))
            .await
            .unwrap();
        assert_eq!(outcome.value.total_cost().amount(), dec!(300000));
        assert!(outcome.history.unwrap().diff.has_changed("water_cost"));
    }

    #[tokio::test]
    async fn test_overpayment_rejected_before_write() {
        let f = fixture().await;
        let created = f
            .service
            .create_bill(new_bill(f.room, f.owner, 3, 0), Actor::new(f.owner))
            .await
            .unwrap();

        let err = f
            .service
            .apply_payment(created.value.id(), vnd(dec!(120000)), Actor::new(f.owner))
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::OverpaymentRejected { .. }));

        let stored = f.service.get_bill(created.value.id()).await.unwrap();
        assert_eq!(stored.paid_amount(), None);
        assert_eq!(stored.version(), created.value.version());
    }

    #[tokio::test]
    async fn test_fee_lifecycle() {
        let f = fixture().await;
        let created = f
            .service
            .create_bill(new_bill(f.room, f.owner, 4, 0), Actor::new(f.owner))
            .await
            .unwrap();
        let bill_id = created.value.id();

        let fee = Fee::ad_hoc("Parking", vnd(dec!(50000)));
        let fee_id = fee.id();
        let added = f.service.add_fee(bill_id, fee, Actor::new(f.owner)).await.unwrap();
        assert_eq!(added.value.total_cost().amount(), dec!(150000));

        let removed = f.service.remove_fee(bill_id, fee_id, Actor::new(f.owner)).await.unwrap();
        assert_eq!(removed.value.total_cost().amount(), dec!(100000));
        assert!(removed.history.unwrap().description.contains("Parking"));

        let err = f.service.remove_fee(bill_id, fee_id, Actor::new(f.owner)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_history_survives_deletion() {
        let f = fixture().await;
        let created = f
            .service
            .create_bill(new_bill(f.room, f.owner, 5, 10), Actor::new(f.owner))
            .await
            .unwrap();
        let bill_id = created.value.id();
        f.service.set_paid(bill_id, true, Actor::new(f.owner)).await.unwrap();
        f.service.delete_bill(bill_id, Actor::new(f.owner)).await.unwrap();

        assert!(matches!(
            f.service.get_bill(bill_id).await,
            Err(BillingError::BillNotFound(_))
        ));

        let history = f.service.bill_history(bill_id, f.owner).await.unwrap();
        let actions: Vec<BillAction> = history.iter().map(|h| h.action).collect();
        assert_eq!(actions, vec![BillAction::Create, BillAction::UpdatePayment, BillAction::Delete]);
        assert!(history.iter().all(|h| h.bill_id.is_none()));
        assert!(history.iter().all(|h| h.original_bill_id == bill_id));

        let stranger = f.service.bill_history(bill_id, UserId::new()).await.unwrap();
        assert!(stranger.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_bill_history_is_not_found() {
        let f = fixture().await;
        let err = f
            .service
            .bill_history(core_kernel::BillId::new(), f.owner)
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::BillNotFound(_)));
    }

    #[tokio::test]
    async fn test_room_debt_and_warnings() {
        let f = fixture().await;
        let quiet_room = RoomId::new();

        // Shortfalls 0, 500k, 700k, 0 over four months
        let mut ids = Vec::new();
        for month in 1..=4 {
            let created = f
                .service
                .create_bill(new_bill(f.room, f.owner, month, 0), Actor::new(f.owner))
                .await
                .unwrap();
            ids.push(created.value.id());
        }
        for (index, fee) in [(1, dec!(400000)), (2, dec!(600000))] {
            f.service
                .add_fee(ids[index], Fee::ad_hoc("Repair", vnd(fee)), Actor::new(f.owner))
                .await
                .unwrap();
        }
        f.service.set_paid(ids[0], true, Actor::new(f.owner)).await.unwrap();
        f.service.set_paid(ids[3], true, Actor::new(f.owner)).await.unwrap();

        f.service
            .create_bill(new_bill(quiet_room, f.owner, 1, 0), Actor::new(f.owner))
            .await
            .unwrap();

        let paid = f.service.get_bill(ids[0]).await.unwrap();
        test_utils::assert_payment_state(&paid, PaymentState::Paid);
        let unpaid = f.service.get_bill(ids[2]).await.unwrap();
        test_utils::assert_payment_state(&unpaid, PaymentState::Unpaid);

        let debt = f.service.get_room_debt(f.room).await.unwrap();
        assert_eq!(debt.total_debt.amount(), dec!(1200000));
        assert_eq!(debt.consecutive_months_at_risk, 2);
        assert!(debt.unpaid_bills.iter().all(|b| b.state == PaymentState::Unpaid));

        let warnings = f.service.get_debt_warnings().await.unwrap();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].room_id, f.room);
        assert_eq!(warnings[0].consecutive_months, 2);
        assert_eq!(warnings[0].total_debt.amount(), dec!(1200000));
    }

    #[tokio::test]
    async fn test_room_override_rate() {
        let f = fixture().await;
        f.store
            .add_rate(RateConfig {
                id: RateConfigId::new(),
                scope: RateScope::Room(f.room),
                currency: Currency::VND,
                water: WaterPricing::ByHeadcount { price_per_person: vnd(dec!(0)) },
                tiers: vec![TierBand::new(0, None, vnd(dec!(4000)))],
            })
            .await;

        let preview = f
            .service
            .preview_bill(
                f.room,
                BillReadings { electricity: MeterPair::new(0, 10, 9999), water: None },
                vec![],
            )
            .await
            .unwrap();
        assert_eq!(preview.total_cost.amount(), dec!(40000));
    }

    #[tokio::test]
    async fn test_missing_configuration_propagates() {
        let store = Arc::new(InMemoryBillingStore::new());
        let service = BillingService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            BillingSettings::default(),
        );
        let err = service
            .preview_bill(
                RoomId::new(),
                BillReadings { electricity: MeterPair::new(0, 1, 9999), water: None },
                vec![],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::ConfigurationMissing { .. }));
    }
}

// ============================================================================
// Property Tests
// ============================================================================

mod property_tests {
    use super::*;
    use domain_billing::debt::aggregate_room_debt;
    use proptest::prelude::*;
    use rust_decimal::Decimal;
    use test_utils::{
        assert_bill_total_identity, assert_debt, assert_money_sum, bills_with_shortfalls, meter_reading_strategy,
        occupant_count_strategy, shortfall_series_strategy, tier_bands_strategy,
    };

    /// Prices each unit individually by finding the band that contains it
    fn brute_force_cost(usage: u64, bands: &[TierBand]) -> Decimal {
        (0..usage)
            .map(|unit| {
                bands
                    .iter()
                    .find(|b| unit >= b.min_usage && b.max_usage.map_or(true, |m| unit < m))
                    .map(|b| b.price_per_unit.amount())
                    .unwrap()
            })
            .sum()
    }

    /// Length of the longest stretch of non-zero shortfalls
    fn longest_run(shortfalls: &[u64]) -> u32 {
        let mut best = 0;
        let mut current = 0;
        for &shortfall in shortfalls {
            current = if shortfall > 0 { current + 1 } else { 0 };
            best = best.max(current);
        }
        best
    }

    proptest! {
        #[test]
        fn cost_matches_unit_by_unit_enumeration(usage in 0u64..3000u64, bands in tier_bands_strategy()) {
            let cost = electricity_cost(usage, &bands, Currency::VND).unwrap();
            prop_assert_eq!(cost.amount(), brute_force_cost(usage, &bands));
        }

        #[test]
        fn cost_is_non_decreasing(usage in 0u64..3000u64, extra in 0u64..500u64, bands in tier_bands_strategy()) {
            let lower = electricity_cost(usage, &bands, Currency::VND).unwrap();
            let higher = electricity_cost(usage + extra, &bands, Currency::VND).unwrap();
            prop_assert!(higher.amount() >= lower.amount());
        }

        #[test]
        fn any_valid_reading_prices_to_its_parts(
            pair in meter_reading_strategy(),
            occupants in occupant_count_strategy(),
            fee in 0i64..500_000i64,
        ) {
            let rate = ResolvedRate::from_config(rate_config(RateScope::Global, headcount_water())).unwrap();
            let readings = BillReadings { electricity: pair, water: None };
            let fees = vec![Fee::ad_hoc("Cleaning", vnd(Decimal::from(fee)))];
            let calc = compute_bill(&BillInputs {
                readings: &readings,
                rate: &rate,
                occupant_count: OccupantCount::new(occupants).unwrap(),
                fees: &fees,
            })
            .unwrap();
            assert_money_sum(&[calc.electricity_cost, calc.water_cost, calc.fees_total], &calc.total_cost);
        }

        #[test]
        fn debt_follows_shortfall_series(shortfalls in shortfall_series_strategy()) {
            let room = RoomId::new();
            let bills = bills_with_shortfalls(room, BillingPeriod::new(1, 2024).unwrap(), 1_000_000, &shortfalls);
            for bill in &bills {
                assert_bill_total_identity(bill);
            }

            let record = aggregate_room_debt(room, &bills, Currency::VND).unwrap();
            let total: u64 = shortfalls.iter().sum();
            assert_debt(&record, longest_run(&shortfalls), &vnd(Decimal::from(total)));
            prop_assert_eq!(record.has_warning(), longest_run(&shortfalls) >= 2);
        }
    }
}
