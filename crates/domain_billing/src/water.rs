//! Water cost calculation
//!
//! Water is charged either by metered usage or as a flat monthly price per
//! occupant, depending on the resolved rate configuration.

use serde::{Deserialize, Serialize};

use core_kernel::Money;

use crate::error::{BillingError, Utility};
use crate::meter::{process_reading, MeterPair};
use crate::occupancy::OccupantCount;
use crate::rate::WaterPricing;

/// Water charge for one bill
///
/// `usage` and `rollover` are `None` when water is billed by headcount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaterCharge {
    pub usage: Option<u64>,
    pub rollover: Option<bool>,
    pub cost: Money,
}

/// Computes the water charge
///
/// # Errors
///
/// * `MissingWaterReading` - metered billing without a water meter pair
/// * `InvalidMeterConfig` - the water meter pair is inconsistent
pub fn water_cost(
    pricing: &WaterPricing,
    readings: Option<&MeterPair>,
    occupants: OccupantCount,
) -> Result<WaterCharge, BillingError> {
    match pricing {
        WaterPricing::ByMeter { price_per_unit } => {
            let pair = readings.ok_or(BillingError::MissingWaterReading)?;
            let usage = process_reading(Utility::Water, pair)?;
            Ok(WaterCharge {
                usage: Some(usage.usage),
                rollover: Some(usage.rollover),
                cost: price_per_unit.times(usage.usage)?,
            })
        }
        WaterPricing::ByHeadcount { price_per_person } => Ok(WaterCharge {
            usage: None,
            rollover: None,
            cost: price_per_person.times(u64::from(occupants.get()))?,
        }),
    }
}
