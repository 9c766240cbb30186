//! Rate configuration and resolution
//!
//! A room is billed with its own rate configuration when one exists,
//! otherwise with the single property-wide default. Resolution is an
//! explicit two-step lookup with fixed precedence.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::instrument;

use core_kernel::{Currency, Money, RateConfigId, RoomId};

use crate::error::BillingError;
use crate::ports::RateConfigPort;
use crate::tiered::{validate_tiers, TierBand};

/// Whether a configuration applies to one room or to every room
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "room_id", rename_all = "snake_case")]
pub enum RateScope {
    Global,
    Room(RoomId),
}

/// How water is charged
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WaterPricing {
    /// Metered usage times a unit price
    ByMeter { price_per_unit: Money },
    /// Flat monthly price per occupant
    ByHeadcount { price_per_person: Money },
}

impl WaterPricing {
    fn price(&self) -> &Money {
        match self {
            WaterPricing::ByMeter { price_per_unit } => price_per_unit,
            WaterPricing::ByHeadcount { price_per_person } => price_per_person,
        }
    }

    /// Returns true if the method requires water meter readings
    pub fn is_metered(&self) -> bool {
        matches!(self, WaterPricing::ByMeter { .. })
    }
}

/// A utility rate configuration as stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateConfig {
    pub id: RateConfigId,
    pub scope: RateScope,
    pub currency: Currency,
    pub water: WaterPricing,
    /// Electricity bands, in any order
    pub tiers: Vec<TierBand>,
}

impl RateConfig {
    pub fn is_global(&self) -> bool {
        matches!(self.scope, RateScope::Global)
    }
}

/// The effective configuration for a room, with bands sorted and validated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedRate {
    config_id: RateConfigId,
    room_specific: bool,
    currency: Currency,
    water: WaterPricing,
    tiers: Vec<TierBand>,
}

impl ResolvedRate {
    /// Validates a configuration and sorts its bands by `min_usage`
    ///
    /// # Errors
    ///
    /// * `InvalidTierConfig` - bands do not cover `[0, ∞)` contiguously
    /// * `InvalidRateConfig` - the water price is negative or in another currency
    pub fn from_config(config: RateConfig) -> Result<Self, BillingError> {
        let mut tiers = config.tiers;
        tiers.sort_by_key(|band| band.min_usage);
        validate_tiers(&tiers, config.currency)?;

        let water_price = config.water.price();
        if water_price.currency() != config.currency {
            return Err(BillingError::InvalidRateConfig(format!(
                "water price is in {} but the configuration uses {}",
                water_price.currency(),
                config.currency
            )));
        }
        if water_price.is_negative() {
            return Err(BillingError::InvalidRateConfig(format!(
                "water price {} is negative",
                water_price
            )));
        }

        Ok(Self {
            config_id: config.id,
            room_specific: !matches!(config.scope, RateScope::Global),
            currency: config.currency,
            water: config.water,
            tiers,
        })
    }

    pub fn config_id(&self) -> RateConfigId {
        self.config_id
    }

    /// True when a room override was used instead of the global default
    pub fn is_room_specific(&self) -> bool {
        self.room_specific
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    pub fn water(&self) -> &WaterPricing {
        &self.water
    }

    /// Bands in ascending order
    pub fn tiers(&self) -> &[TierBand] {
        &self.tiers
    }
}

/// Picks the effective configuration for a room
///
/// A room-specific configuration always wins. Otherwise exactly one global
/// configuration must exist.
pub fn resolve_rate_config(
    room_id: RoomId,
    room_specific: Option<RateConfig>,
    globals: Vec<RateConfig>,
) -> Result<ResolvedRate, BillingError> {
    if let Some(config) = room_specific {
        return ResolvedRate::from_config(config);
    }

    let mut globals = globals.into_iter();
    match (globals.next(), globals.next()) {
        (None, _) => Err(BillingError::ConfigurationMissing { room_id }),
        (Some(global), None) => ResolvedRate::from_config(global),
        (Some(first), Some(second)) => Err(BillingError::AmbiguousConfiguration(format!(
            "{} global configurations are defined ({}, {}, ...)",
            2 + globals.count(),
            first.id,
            second.id
        ))),
    }
}

/// Loads rate configurations through the storage port and resolves them
pub struct RateResolver {
    port: Arc<dyn RateConfigPort>,
}

impl RateResolver {
    pub fn new(port: Arc<dyn RateConfigPort>) -> Self {
        Self { port }
    }

    /// Resolves the effective rate for a room
    #[instrument(skip(self), fields(room_id = %room_id))]
    pub async fn resolve(&self, room_id: RoomId) -> Result<ResolvedRate, BillingError> {
        let room_specific = self.port.find_room_rate(room_id).await?;
        let globals = if room_specific.is_some() {
            Vec::new()
        } else {
            self.port.find_global_rates().await?
        };

        let resolved = resolve_rate_config(room_id, room_specific, globals)?;
        tracing::debug!(
            config_id = %resolved.config_id(),
            room_specific = resolved.is_room_specific(),
            "rate configuration resolved"
        );
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn vnd(amount: i64) -> Money {
        Money::new(Decimal::from(amount), Currency::VND)
    }

    fn config(scope: RateScope, flat_price: i64) -> RateConfig {
        RateConfig {
            id: RateConfigId::new(),
            scope,
            currency: Currency::VND,
            water: WaterPricing::ByMeter { price_per_unit: vnd(15_000) },
            tiers: vec![TierBand::new(0, None, vnd(flat_price))],
        }
    }

    #[test]
    fn test_room_specific_overrides_global() {
        let room = RoomId::new();
        let specific = config(RateScope::Room(room), 4000);
        let specific_id = specific.id;
        let resolved =
            resolve_rate_config(room, Some(specific), vec![config(RateScope::Global, 3000)]).unwrap();
        assert_eq!(resolved.config_id(), specific_id);
        assert!(resolved.is_room_specific());
    }

    #[test]
    fn test_falls_back_to_global() {
        let global = config(RateScope::Global, 3000);
        let global_id = global.id;
        let resolved = resolve_rate_config(RoomId::new(), None, vec![global]).unwrap();
        assert_eq!(resolved.config_id(), global_id);
        assert!(!resolved.is_room_specific());
    }

    #[test]
    fn test_missing_configuration() {
        let room = RoomId::new();
        let err = resolve_rate_config(room, None, vec![]).unwrap_err();
        assert!(matches!(err, BillingError::ConfigurationMissing { room_id } if room_id == room));
    }

    #[test]
    fn test_two_globals_are_ambiguous() {
        let err = resolve_rate_config(
            RoomId::new(),
            None,
            vec![config(RateScope::Global, 1), config(RateScope::Global, 2)],
        )
        .unwrap_err();
        assert!(matches!(err, BillingError::AmbiguousConfiguration(_)));
    }

    #[test]
    fn test_bands_are_sorted() {
        let mut cfg = config(RateScope::Global, 0);
        cfg.tiers = vec![
            TierBand::new(50, None, vnd(1734)),
            TierBand::new(0, Some(50), vnd(1678)),
        ];
        let resolved = ResolvedRate::from_config(cfg).unwrap();
        assert_eq!(resolved.tiers()[0].min_usage, 0);
        assert_eq!(resolved.tiers()[1].max_usage, None);
    }

    #[test]
    fn test_negative_water_price_rejected() {
        let mut cfg = config(RateScope::Global, 3000);
        cfg.water = WaterPricing::ByHeadcount { price_per_person: vnd(-1) };
        assert!(matches!(
            ResolvedRate::from_config(cfg),
            Err(BillingError::InvalidRateConfig(_))
        ));
    }

    #[test]
    fn test_water_pricing_serializes_with_method_tag() {
        let json = serde_json::to_value(WaterPricing::ByHeadcount { price_per_person: vnd(100_000) }).unwrap();
        assert_eq!(json["method"], "BY_HEADCOUNT");
    }
}
