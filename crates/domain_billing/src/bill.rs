//! Bill aggregate
//!
//! A bill covers one room for one calendar month. Its derived figures
//! (usages, costs, total) are owned by the aggregate and recomputed through
//! the [`BillComposer`] on every mutation; they cannot be set directly.
//! Every mutation is evaluated on a copy and only committed once the new
//! state is valid, so a rejected change leaves the bill untouched.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::{BillId, BillingPeriod, Currency, FeeId, Money, RateConfigId, RoomId, UserId};

use crate::composer::{BillCalculation, BillComposer, BillInputs, BillReadings};
use crate::error::BillingError;
use crate::fee::Fee;
use crate::occupancy::OccupantCount;
use crate::rate::ResolvedRate;

/// Payment state derived from `is_paid`, `paid_amount` and the total
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentState {
    Unpaid,
    PartiallyPaid,
    Paid,
}

/// Inputs a recomputation is priced against
#[derive(Debug, Clone, Copy)]
pub struct PricingContext<'a> {
    pub composer: &'a BillComposer,
    pub rate: &'a ResolvedRate,
    pub occupant_count: OccupantCount,
}

/// Storage representation of a bill
///
/// Adapters load rows into this struct and hand it to [`Bill::rehydrate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillRecord {
    pub id: BillId,
    pub room_id: RoomId,
    pub owner_id: UserId,
    pub period: BillingPeriod,
    pub readings: BillReadings,
    pub fees: Vec<Fee>,
    pub occupant_count: OccupantCount,
    pub rate_config_id: RateConfigId,
    pub calculation: BillCalculation,
    pub paid_amount: Option<Money>,
    pub is_paid: bool,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A monthly utility bill for one room
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Bill {
    id: BillId,
    room_id: RoomId,
    owner_id: UserId,
    period: BillingPeriod,
    readings: BillReadings,
    fees: Vec<Fee>,
    occupant_count: OccupantCount,
    rate_config_id: RateConfigId,
    calculation: BillCalculation,
    paid_amount: Option<Money>,
    is_paid: bool,
    version: u64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Bill {
    /// Creates and prices a new bill
    ///
    /// # Arguments
    ///
    /// * `room_id` - Room being billed
    /// * `owner_id` - Property owner, used for access checks on the audit trail
    /// * `period` - Billing month
    /// * `readings` - Electricity (and, when metered, water) readings
    /// * `fees` - Initial fees
    /// * `pricing` - Resolved rate, occupant count and composer
    pub fn create(
        room_id: RoomId,
        owner_id: UserId,
        period: BillingPeriod,
        readings: BillReadings,
        fees: Vec<Fee>,
        pricing: PricingContext<'_>,
    ) -> Result<Self, BillingError> {
        let calculation = pricing.composer.compose(&BillInputs {
            readings: &readings,
            rate: pricing.rate,
            occupant_count: pricing.occupant_count,
            fees: &fees,
        })?;
        let now = Utc::now();

        Ok(Self {
            id: BillId::new_v7(),
            room_id,
            owner_id,
            period,
            readings,
            fees,
            occupant_count: pricing.occupant_count,
            rate_config_id: pricing.rate.config_id(),
            calculation,
            paid_amount: None,
            is_paid: false,
            version: 0,
            created_at: now,
            updated_at: now,
        })
    }

    /// Restores a bill from storage without recomputing it
    pub fn rehydrate(record: BillRecord) -> Self {
        Self {
            id: record.id,
            room_id: record.room_id,
            owner_id: record.owner_id,
            period: record.period,
            readings: record.readings,
            fees: record.fees,
            occupant_count: record.occupant_count,
            rate_config_id: record.rate_config_id,
            calculation: record.calculation,
            paid_amount: record.paid_amount,
            is_paid: record.is_paid,
            version: record.version,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }

    /// Converts the bill into its storage representation
    pub fn to_record(&self) -> BillRecord {
        BillRecord {
            id: self.id,
            room_id: self.room_id,
            owner_id: self.owner_id,
            period: self.period,
            readings: self.readings,
            fees: self.fees.clone(),
            occupant_count: self.occupant_count,
            rate_config_id: self.rate_config_id,
            calculation: self.calculation.clone(),
            paid_amount: self.paid_amount,
            is_paid: self.is_paid,
            version: self.version,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    pub fn id(&self) -> BillId {
        self.id
    }

    pub fn room_id(&self) -> RoomId {
        self.room_id
    }

    pub fn owner_id(&self) -> UserId {
        self.owner_id
    }

    pub fn period(&self) -> BillingPeriod {
        self.period
    }

    pub fn readings(&self) -> &BillReadings {
        &self.readings
    }

    pub fn fees(&self) -> &[Fee] {
        &self.fees
    }

    pub fn occupant_count(&self) -> OccupantCount {
        self.occupant_count
    }

    pub fn rate_config_id(&self) -> RateConfigId {
        self.rate_config_id
    }

    pub fn calculation(&self) -> &BillCalculation {
        &self.calculation
    }

    pub fn total_cost(&self) -> Money {
        self.calculation.total_cost
    }

    pub fn currency(&self) -> Currency {
        self.calculation.total_cost.currency()
    }

    pub fn paid_amount(&self) -> Option<Money> {
        self.paid_amount
    }

    pub fn is_paid(&self) -> bool {
        self.is_paid
    }

    /// Optimistic concurrency version, bumped by the store on every write
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Returns the bill as stored under `version`
    pub fn with_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Unpaid remainder: `max(0, total - paid)`, or zero once marked paid
    pub fn shortfall(&self) -> Money {
        let currency = self.currency();
        if self.is_paid {
            return Money::zero(currency);
        }
        let paid = self.paid_amount.map_or(rust_decimal::Decimal::ZERO, |p| p.amount());
        let remainder = self.total_cost().amount() - paid;
        if remainder.is_sign_positive() && !remainder.is_zero() {
            Money::new(remainder, currency)
        } else {
            Money::zero(currency)
        }
    }

    pub fn payment_state(&self) -> PaymentState {
        if self.is_paid || self.shortfall().is_zero() {
            PaymentState::Paid
        } else if self.paid_amount.map_or(false, |p| p.is_positive()) {
            PaymentState::PartiallyPaid
        } else {
            PaymentState::Unpaid
        }
    }

    /// Replaces the meter readings and recomputes
    pub fn update_readings(
        &mut self,
        readings: BillReadings,
        pricing: PricingContext<'_>,
    ) -> Result<(), BillingError> {
        self.commit(pricing, |next| {
            next.readings = readings;
            Ok(())
        })
    }

    /// Adds a fee and recomputes
    pub fn add_fee(&mut self, fee: Fee, pricing: PricingContext<'_>) -> Result<(), BillingError> {
        self.commit(pricing, |next| {
            next.fees.push(fee);
            Ok(())
        })
    }

    /// Removes a fee and recomputes, returning the removed fee
    pub fn remove_fee(&mut self, fee_id: FeeId, pricing: PricingContext<'_>) -> Result<Fee, BillingError> {
        let bill_id = self.id;
        let mut removed = None;
        self.commit(pricing, |next| {
            let index = next
                .fees
                .iter()
                .position(|fee| fee.id() == fee_id)
                .ok_or(BillingError::FeeNotFound { bill_id, fee_id })?;
            removed = Some(next.fees.remove(index));
            Ok(())
        })?;
        removed.ok_or(BillingError::FeeNotFound { bill_id, fee_id })
    }

    /// Recomputes against the current rate and occupant count
    pub fn recalculate(&mut self, pricing: PricingContext<'_>) -> Result<(), BillingError> {
        self.commit(pricing, |_| Ok(()))
    }

    /// Records the amount paid so far
    ///
    /// The amount replaces any earlier paid amount. It must not be negative
    /// and must not exceed the freshly computed total.
    pub fn apply_payment(&mut self, amount: Money, pricing: PricingContext<'_>) -> Result<(), BillingError> {
        let currency = pricing.rate.currency();
        if amount.is_negative() || amount.currency() != currency {
            return Err(BillingError::InvalidPaymentAmount(amount.amount()));
        }

        let mut next = self.cleared_payment(pricing)?;
        next.paid_amount = Some(amount);
        next.is_paid = amount.amount() == next.calculation.total_cost.amount();
        next.validate_payment()?;
        *self = next;
        Ok(())
    }

    /// Marks the bill fully paid, or resets it to unpaid
    pub fn set_paid(&mut self, paid: bool, pricing: PricingContext<'_>) -> Result<(), BillingError> {
        let mut next = self.cleared_payment(pricing)?;
        if paid {
            next.paid_amount = Some(next.calculation.total_cost);
            next.is_paid = true;
        }
        *self = next;
        Ok(())
    }

    /// Recomputed copy with no payment recorded
    fn cleared_payment(&self, pricing: PricingContext<'_>) -> Result<Bill, BillingError> {
        let mut next = self.clone();
        next.commit(pricing, |bill| {
            bill.paid_amount = None;
            bill.is_paid = false;
            Ok(())
        })?;
        Ok(next)
    }

    /// Recomputes a copy, applies `change`, validates, then commits
    fn commit<F>(&mut self, pricing: PricingContext<'_>, change: F) -> Result<(), BillingError>
    where
        F: FnOnce(&mut Bill) -> Result<(), BillingError>,
    {
        let mut next = self.clone();
        change(&mut next)?;

        next.calculation = pricing.composer.compose(&BillInputs {
            readings: &next.readings,
            rate: pricing.rate,
            occupant_count: pricing.occupant_count,
            fees: &next.fees,
        })?;
        next.occupant_count = pricing.occupant_count;
        next.rate_config_id = pricing.rate.config_id();

        // A paid flag only survives if the paid amount still covers the total
        if next.is_paid {
            next.is_paid = next.paid_amount == Some(next.calculation.total_cost);
        }
        next.validate_payment()?;

        next.updated_at = Utc::now();
        *self = next;
        Ok(())
    }

    fn validate_payment(&self) -> Result<(), BillingError> {
        if let Some(paid) = self.paid_amount {
            let total = self.calculation.total_cost;
            if paid.amount() > total.amount() {
                return Err(BillingError::OverpaymentRejected {
                    paid: paid.amount(),
                    total: total.amount(),
                });
            }
        }
        Ok(())
    }
}
