//! PostgreSQL rate configuration and occupancy adapters

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::{debug, instrument};

use core_kernel::{
    Currency, DomainPort, HealthCheckResult, HealthCheckable, Money, PortError, RateConfigId, RoomId,
};
use domain_billing::{OccupancyPort, OccupantCount, RateConfig, RateConfigPort, RateScope, TierBand, WaterPricing};

use super::{probe, to_signed, to_unsigned};
use crate::error::DatabaseError;
use crate::repositories::occupancy::OccupancyRepository;
use crate::repositories::rates::{RateConfigRepository, RateConfigRow, RateConfigWithTiers, TierBandRow};

const BY_METER: &str = "BY_METER";
const BY_HEADCOUNT: &str = "BY_HEADCOUNT";

/// PostgreSQL-backed implementation of [`RateConfigPort`]
///
/// Returns configurations as stored; band validation and precedence are
/// left to the domain resolver.
#[derive(Debug, Clone)]
pub struct PostgresRateConfigAdapter {
    repository: RateConfigRepository,
    pool: PgPool,
}

impl PostgresRateConfigAdapter {
    pub fn new(pool: PgPool) -> Self {
        Self {
            repository: RateConfigRepository::new(pool.clone()),
            pool,
        }
    }

    /// Stores a configuration, replacing an existing one with the same id
    #[instrument(skip(self, config), fields(rate_config_id = %config.id))]
    pub async fn save(&self, config: &RateConfig) -> Result<(), PortError> {
        let (row, tiers) = config_to_rows(config)?;
        self.repository.save(&row, &tiers).await?;
        Ok(())
    }
}

impl DomainPort for PostgresRateConfigAdapter {}

#[async_trait]
impl HealthCheckable for PostgresRateConfigAdapter {
    async fn health_check(&self) -> HealthCheckResult {
        probe(&self.pool, "postgres-rate-config-adapter").await
    }
}

#[async_trait]
impl RateConfigPort for PostgresRateConfigAdapter {
    #[instrument(skip(self), fields(room_id = %room_id))]
    async fn find_room_rate(&self, room_id: RoomId) -> Result<Option<RateConfig>, PortError> {
        self.repository
            .find_for_room(*room_id.as_uuid())
            .await?
            .map(rows_to_config)
            .transpose()
    }

    async fn find_global_rates(&self) -> Result<Vec<RateConfig>, PortError> {
        let configs = self
            .repository
            .find_global()
            .await?
            .into_iter()
            .map(rows_to_config)
            .collect::<Result<Vec<_>, _>>()?;
        debug!(count = configs.len(), "global rate configs loaded");
        Ok(configs)
    }
}

fn config_to_rows(config: &RateConfig) -> Result<(RateConfigRow, Vec<TierBandRow>), PortError> {
    let rate_config_id = *config.id.as_uuid();
    let (water_method, water_price) = match &config.water {
        WaterPricing::ByMeter { price_per_unit } => (BY_METER, price_per_unit.amount()),
        WaterPricing::ByHeadcount { price_per_person } => (BY_HEADCOUNT, price_per_person.amount()),
    };
    let now = Utc::now();

    let row = RateConfigRow {
        rate_config_id,
        room_id: match config.scope {
            RateScope::Global => None,
            RateScope::Room(room_id) => Some(*room_id.as_uuid()),
        },
        is_global: config.is_global(),
        currency: config.currency.code().to_string(),
        water_method: water_method.to_string(),
        water_price,
        created_at: now,
        updated_at: now,
    };

    let tiers = config
        .tiers
        .iter()
        .map(|band| {
            Ok(TierBandRow {
                rate_config_id,
                min_usage: to_signed(band.min_usage, "min_usage")?,
                max_usage: band.max_usage.map(|max| to_signed(max, "max_usage")).transpose()?,
                price_per_unit: band.price_per_unit.amount(),
            })
        })
        .collect::<Result<Vec<_>, PortError>>()?;

    Ok((row, tiers))
}

fn rows_to_config(stored: RateConfigWithTiers) -> Result<RateConfig, PortError> {
    let RateConfigWithTiers { config: row, tiers } = stored;

    let currency: Currency = row
        .currency
        .parse()
        .map_err(|e| DatabaseError::corrupt(format!("rate config {}: {}", row.rate_config_id, e)))?;
    let money = |amount: Decimal| Money::new(amount, currency);

    let scope = match (row.is_global, row.room_id) {
        (true, _) => RateScope::Global,
        (false, Some(room_id)) => RateScope::Room(RoomId::from_uuid(room_id)),
        (false, None) => {
            return Err(DatabaseError::corrupt(format!(
                "rate config {} is neither global nor bound to a room",
                row.rate_config_id
            ))
            .into())
        }
    };

    let water = match row.water_method.as_str() {
        BY_METER => WaterPricing::ByMeter { price_per_unit: money(row.water_price) },
        BY_HEADCOUNT => WaterPricing::ByHeadcount { price_per_person: money(row.water_price) },
        other => {
            return Err(DatabaseError::corrupt(format!(
                "rate config {} has unknown water method '{}'",
                row.rate_config_id, other
            ))
            .into())
        }
    };

    let tiers = tiers
        .into_iter()
        .map(|band| {
            Ok(TierBand::new(
                to_unsigned(band.min_usage, "min_usage")?,
                band.max_usage.map(|max| to_unsigned(max, "max_usage")).transpose()?,
                money(band.price_per_unit),
            ))
        })
        .collect::<Result<Vec<_>, PortError>>()?;

    Ok(RateConfig {
        id: RateConfigId::from_uuid(row.rate_config_id),
        scope,
        currency,
        water,
        tiers,
    })
}

/// PostgreSQL-backed implementation of [`OccupancyPort`]
#[derive(Debug, Clone)]
pub struct PostgresOccupancyAdapter {
    repository: OccupancyRepository,
    pool: PgPool,
}

impl PostgresOccupancyAdapter {
    pub fn new(pool: PgPool) -> Self {
        Self {
            repository: OccupancyRepository::new(pool.clone()),
            pool,
        }
    }

    pub fn repository(&self) -> &OccupancyRepository {
        &self.repository
    }
}

impl DomainPort for PostgresOccupancyAdapter {}

#[async_trait]
impl HealthCheckable for PostgresOccupancyAdapter {
    async fn health_check(&self) -> HealthCheckResult {
        probe(&self.pool, "postgres-occupancy-adapter").await
    }
}

#[async_trait]
impl OccupancyPort for PostgresOccupancyAdapter {
    /// A room without a current tenant is billed for one person
    #[instrument(skip(self), fields(room_id = %room_id))]
    async fn load_occupant_count(&self, room_id: RoomId) -> Result<OccupantCount, PortError> {
        let additional = match self.repository.additional_occupants(*room_id.as_uuid()).await? {
            Some(count) => to_unsigned(count, "occupant count")?,
            None => {
                debug!("room has no current tenant; billing one occupant");
                0
            }
        };
        Ok(OccupantCount::for_tenant(additional))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn vnd(amount: i64) -> Money {
        Money::new(Decimal::from(amount), Currency::VND)
    }

    #[test]
    fn test_room_config_maps_to_rows_and_back() {
        let config = RateConfig {
            id: RateConfigId::new(),
            scope: RateScope::Room(RoomId::new()),
            currency: Currency::VND,
            water: WaterPricing::ByMeter { price_per_unit: vnd(10_000) },
            tiers: vec![
                TierBand::new(0, Some(50), vnd(1_678)),
                TierBand::new(50, None, vnd(1_734)),
            ],
        };

        let (row, tiers) = config_to_rows(&config).unwrap();
        assert!(!row.is_global);
        assert_eq!(row.water_method, "BY_METER");
        assert_eq!(tiers[1].max_usage, None);

        let restored = rows_to_config(RateConfigWithTiers { config: row, tiers }).unwrap();
        assert_eq!(restored, config);
    }

    #[test]
    fn test_unknown_water_method_is_rejected() {
        let now = Utc::now();
        let row = RateConfigRow {
            rate_config_id: Uuid::new_v4(),
            room_id: None,
            is_global: true,
            currency: "VND".to_string(),
            water_method: "BY_GUESS".to_string(),
            water_price: Decimal::from(1),
            created_at: now,
            updated_at: now,
        };
        let err = rows_to_config(RateConfigWithTiers { config: row, tiers: vec![] }).unwrap_err();
        assert!(matches!(err, PortError::Transformation { .. }));
    }
}
