//! Meter reading processing
//!
//! Converts a pair of readings into a usage quantity. Meters have a fixed
//! number of digits; when the counter passes its capacity it restarts near
//! zero, so a new reading below the old one means the meter wrapped.

use serde::{Deserialize, Serialize};

use crate::error::{BillingError, Utility};

/// Old and new readings of one meter, with the meter's capacity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeterPair {
    /// Reading at the start of the billing period
    pub old_reading: u64,
    /// Reading at the end of the billing period
    pub new_reading: u64,
    /// Value at which the counter wraps back to zero
    pub max_capacity: u64,
}

impl MeterPair {
    pub fn new(old_reading: u64, new_reading: u64, max_capacity: u64) -> Self {
        Self {
            old_reading,
            new_reading,
            max_capacity,
        }
    }
}

/// Usage derived from a meter pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeterUsage {
    /// Units consumed in the period
    pub usage: u64,
    /// True if the meter wrapped past its capacity
    pub rollover: bool,
}

/// Largest capacity a meter may declare; readings are stored as signed 64-bit
pub const MAX_METER_CAPACITY: u64 = i64::MAX as u64;

/// Computes usage for one utility's meter pair
///
/// `maxCapacity` is the value at which the counter reads zero again, so a
/// wrap contributes `(max_capacity - old_reading) + new_reading` units.
///
/// # Errors
///
/// Returns `InvalidMeterConfig` when the capacity is not above the old
/// reading, the new reading exceeds the capacity, or the capacity does not
/// fit in [`MAX_METER_CAPACITY`]. These hold for forward readings too.
///
/// # Example
///
/// ```rust
/// use domain_billing::meter::{process_reading, MeterPair};
/// use domain_billing::error::Utility;
///
/// let usage = process_reading(Utility::Electricity, &MeterPair::new(9990, 50, 9999)).unwrap();
/// assert_eq!(usage.usage, 59);
/// assert!(usage.rollover);
/// ```
pub fn process_reading(utility: Utility, pair: &MeterPair) -> Result<MeterUsage, BillingError> {
    if pair.max_capacity <= pair.old_reading
        || pair.new_reading > pair.max_capacity
        || pair.max_capacity > MAX_METER_CAPACITY
    {
        return Err(BillingError::InvalidMeterConfig {
            utility,
            old_reading: pair.old_reading,
            new_reading: pair.new_reading,
            max_capacity: pair.max_capacity,
        });
    }

    if pair.new_reading >= pair.old_reading {
        return Ok(MeterUsage {
            usage: pair.new_reading - pair.old_reading,
            rollover: false,
        });
    }

    let usage = (pair.max_capacity - pair.old_reading) + pair.new_reading;
    tracing::debug!(%utility, usage, "meter rollover detected");

    Ok(MeterUsage {
        usage,
        rollover: true,
    })
}
