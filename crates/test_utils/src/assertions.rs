//! Custom Test Assertions
//!
//! Assertion helpers for money and bills with messages that name the
//! amounts involved.

use core_kernel::Money;
use domain_billing::{Bill, DebtRecord, PaymentState};
use rust_decimal::Decimal;

/// Asserts that two Money values are equal within a tolerance
///
/// # Panics
///
/// Panics if the currencies differ or the amounts differ by more than `tolerance`
pub fn assert_money_approx_eq(actual: &Money, expected: &Money, tolerance: Decimal) {
    assert_eq!(
        actual.currency(),
        expected.currency(),
        "Currency mismatch: actual={}, expected={}",
        actual.currency(),
        expected.currency()
    );

    let diff = (actual.amount() - expected.amount()).abs();
    assert!(
        diff <= tolerance,
        "Money amounts differ by more than tolerance: actual={}, expected={}, diff={}, tolerance={}",
        actual.amount(),
        expected.amount(),
        diff,
        tolerance
    );
}

pub fn assert_money_zero(money: &Money) {
    assert!(
        money.is_zero(),
        "Expected zero money, got {} {}",
        money.currency().symbol(),
        money.amount()
    );
}

pub fn assert_money_positive(money: &Money) {
    assert!(
        money.is_positive(),
        "Expected positive money, got {} {}",
        money.currency().symbol(),
        money.amount()
    );
}

/// Asserts that parts sum exactly to a total in the same currency
pub fn assert_money_sum(parts: &[Money], total: &Money) {
    let sum = Money::sum(total.currency(), parts.iter()).expect("parts share the total's currency");
    assert_eq!(sum, *total, "Parts sum to {}, expected {}", sum, total);
}

/// Asserts `total = electricity + water + fees` on a bill
pub fn assert_bill_total_identity(bill: &Bill) {
    let calc = bill.calculation();
    assert_money_sum(
        &[calc.electricity_cost, calc.water_cost, calc.fees_total],
        &calc.total_cost,
    );
}

/// Asserts the payment state and the matching shortfall
pub fn assert_payment_state(bill: &Bill, expected: PaymentState) {
    assert_eq!(
        bill.payment_state(),
        expected,
        "Bill {} total={} paid={:?}",
        bill.id(),
        bill.total_cost(),
        bill.paid_amount()
    );
    if expected == PaymentState::Paid {
        assert_money_zero(&bill.shortfall());
    } else {
        assert_money_positive(&bill.shortfall());
    }
}

/// Asserts the run length and the all-time debt of a room
pub fn assert_debt(record: &DebtRecord, months_at_risk: u32, total_debt: &Money) {
    assert_eq!(
        record.consecutive_months_at_risk, months_at_risk,
        "Room {} run length",
        record.room_id
    );
    assert_eq!(record.total_debt, *total_debt, "Room {} total debt", record.room_id);
}
