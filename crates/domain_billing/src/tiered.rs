//! Tiered (progressive) electricity pricing
//!
//! Usage is split across ascending bands; each band charges its own unit
//! price for the units that fall inside it. With bands
//! `[(0,50,1678), (50,100,1734), (100,200,2014), (200,∞,2536)]` a usage of
//! 120 kWh costs `50×1678 + 50×1734 + 20×2014 = 210 880`.

use serde::{Deserialize, Serialize};

use core_kernel::{Currency, Money};

use crate::error::BillingError;

/// One band of a progressive tariff
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierBand {
    /// First unit of the band (inclusive)
    pub min_usage: u64,
    /// End of the band (exclusive); `None` means unbounded
    pub max_usage: Option<u64>,
    /// Price charged per unit inside the band
    pub price_per_unit: Money,
}

impl TierBand {
    pub fn new(min_usage: u64, max_usage: Option<u64>, price_per_unit: Money) -> Self {
        Self {
            min_usage,
            max_usage,
            price_per_unit,
        }
    }

    /// Number of units the band can hold, `None` when unbounded
    pub fn width(&self) -> Option<u64> {
        self.max_usage.map(|max| max.saturating_sub(self.min_usage))
    }
}

/// Checks that bands are sorted, contiguous, start at zero and end unbounded
///
/// # Errors
///
/// Returns `InvalidTierConfig` describing the first violation found.
pub fn validate_tiers(bands: &[TierBand], currency: Currency) -> Result<(), BillingError> {
    let first = bands
        .first()
        .ok_or_else(|| BillingError::invalid_tiers("at least one band is required"))?;

    if first.min_usage != 0 {
        return Err(BillingError::invalid_tiers(format!(
            "first band must start at 0, starts at {}",
            first.min_usage
        )));
    }

    let mut expected_start = 0u64;
    for (index, band) in bands.iter().enumerate() {
        let is_last = index == bands.len() - 1;

        if band.min_usage != expected_start {
            return Err(BillingError::invalid_tiers(format!(
                "band {} starts at {} but the previous band ends at {}",
                index + 1,
                band.min_usage,
                expected_start
            )));
        }

        if band.price_per_unit.currency() != currency {
            return Err(BillingError::invalid_tiers(format!(
                "band {} is priced in {} instead of {}",
                index + 1,
                band.price_per_unit.currency(),
                currency
            )));
        }

        if band.price_per_unit.is_negative() {
            return Err(BillingError::invalid_tiers(format!(
                "band {} has a negative price",
                index + 1
            )));
        }

        match (band.max_usage, is_last) {
            (None, true) => {}
            (None, false) => {
                return Err(BillingError::invalid_tiers(format!(
                    "band {} is unbounded but is not the last band",
                    index + 1
                )));
            }
            (Some(max), true) => {
                return Err(BillingError::invalid_tiers(format!(
                    "last band must be unbounded, ends at {}",
                    max
                )));
            }
            (Some(max), false) => {
                if max <= band.min_usage {
                    return Err(BillingError::invalid_tiers(format!(
                        "band {} is empty ({}..{})",
                        index + 1,
                        band.min_usage,
                        max
                    )));
                }
                expected_start = max;
            }
        }
    }

    Ok(())
}

/// Cost of `usage` units across the given bands
///
/// Bands are walked in ascending order; each consumes
/// `min(remaining, width)` units at its price until nothing remains.
///
/// # Errors
///
/// Returns `InvalidTierConfig` if the bands do not cover `[0, ∞)` without
/// gaps or overlaps.
pub fn electricity_cost(usage: u64, bands: &[TierBand], currency: Currency) -> Result<Money, BillingError> {
    validate_tiers(bands, currency)?;

    let mut remaining = usage;
    let mut cost = Money::zero(currency);

    for band in bands {
        if remaining == 0 {
            break;
        }
        let consumed = match band.width() {
            Some(width) => remaining.min(width),
            None => remaining,
        };
        let band_cost = band.price_per_unit.times(consumed)?;
        cost = cost.checked_add(&band_cost)?;
        remaining -= consumed;
    }

    tracing::trace!(usage, cost = %cost, "electricity cost computed");
    Ok(cost)
}
