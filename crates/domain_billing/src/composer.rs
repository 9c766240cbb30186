//! Bill composition
//!
//! Runs the meter, tier, water and fee calculators over the complete input
//! set of a bill and produces one consistent [`BillCalculation`]. Every
//! mutation of a bill goes back through here; totals are never patched
//! incrementally.

use serde::{Deserialize, Serialize};

use core_kernel::Money;

use crate::error::{BillingError, Utility};
use crate::fee::{fees_total, Fee};
use crate::meter::{process_reading, MeterPair};
use crate::occupancy::OccupantCount;
use crate::rate::ResolvedRate;
use crate::tiered::electricity_cost;
use crate::water::water_cost;
use crate::words::{total_cost_text, Locale};

/// Meter readings recorded on a bill
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillReadings {
    pub electricity: MeterPair,
    /// Absent when water is billed by headcount
    pub water: Option<MeterPair>,
}

/// Everything a bill total depends on
#[derive(Debug, Clone)]
pub struct BillInputs<'a> {
    pub readings: &'a BillReadings,
    pub rate: &'a ResolvedRate,
    pub occupant_count: OccupantCount,
    pub fees: &'a [Fee],
}

/// Derived figures of a bill
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillCalculation {
    pub electricity_usage: u64,
    pub electricity_rollover: bool,
    pub electricity_cost: Money,
    pub water_usage: Option<u64>,
    pub water_rollover: Option<bool>,
    pub water_cost: Money,
    pub fees_total: Money,
    pub total_cost: Money,
    pub total_cost_text: String,
}

/// Composes bill calculations in a fixed locale
#[derive(Debug, Clone, Copy, Default)]
pub struct BillComposer {
    locale: Locale,
}

impl BillComposer {
    pub fn new(locale: Locale) -> Self {
        Self { locale }
    }

    pub fn locale(&self) -> Locale {
        self.locale
    }

    /// Computes all derived figures of a bill
    ///
    /// # Errors
    ///
    /// * `InvalidMeterConfig` / `MissingWaterReading` - inconsistent readings
    /// * `InvalidTierConfig` - the resolved bands are unusable
    /// * `InvalidFeeAmount` - a negative or foreign-currency fee
    pub fn compose(&self, inputs: &BillInputs<'_>) -> Result<BillCalculation, BillingError> {
        let currency = inputs.rate.currency();

        let electricity = process_reading(Utility::Electricity, &inputs.readings.electricity)?;
        let electricity_cost = electricity_cost(electricity.usage, inputs.rate.tiers(), currency)?;

        let water = water_cost(
            inputs.rate.water(),
            inputs.readings.water.as_ref(),
            inputs.occupant_count,
        )?;

        let fees_total = fees_total(inputs.fees, currency)?;

        let total_cost = electricity_cost
            .checked_add(&water.cost)?
            .checked_add(&fees_total)?;

        tracing::debug!(
            electricity_usage = electricity.usage,
            water_usage = ?water.usage,
            total = %total_cost,
            "bill composed"
        );

        Ok(BillCalculation {
            electricity_usage: electricity.usage,
            electricity_rollover: electricity.rollover,
            electricity_cost,
            water_usage: water.usage,
            water_rollover: water.rollover,
            water_cost: water.cost,
            fees_total,
            total_cost,
            total_cost_text: total_cost_text(&total_cost, self.locale),
        })
    }
}

/// Computes a bill with the default (Vietnamese) locale
pub fn compute_bill(inputs: &BillInputs<'_>) -> Result<BillCalculation, BillingError> {
    BillComposer::default().compose(inputs)
}
