//! Rate configuration repository
//!
//! A configuration row holds the water pricing; its electricity bands live
//! in `tier_bands`. At most one configuration is bound to a room, and
//! exactly one should be flagged global.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::DatabaseError;

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct RateConfigRow {
    pub rate_config_id: Uuid,
    pub room_id: Option<Uuid>,
    pub is_global: bool,
    pub currency: String,
    /// `BY_METER` or `BY_HEADCOUNT`
    pub water_method: String,
    pub water_price: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct TierBandRow {
    pub rate_config_id: Uuid,
    pub min_usage: i64,
    pub max_usage: Option<i64>,
    pub price_per_unit: Decimal,
}

/// A configuration row with its bands ordered by `min_usage`
#[derive(Debug, Clone, PartialEq)]
pub struct RateConfigWithTiers {
    pub config: RateConfigRow,
    pub tiers: Vec<TierBandRow>,
}

#[derive(Debug, Clone)]
pub struct RateConfigRepository {
    pool: PgPool,
}

impl RateConfigRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The configuration bound to a room, if any
    pub async fn find_for_room(&self, room_id: Uuid) -> Result<Option<RateConfigWithTiers>, DatabaseError> {
        let config = sqlx::query_as::<_, RateConfigRow>(
            r#"
            SELECT rate_config_id, room_id, is_global, currency, water_method, water_price,
                   created_at, updated_at
            FROM rate_configs
            WHERE room_id = $1 AND NOT is_global
            "#,
        )
        .bind(room_id)
        .fetch_optional(&self.pool)
        .await?;

        match config {
            Some(config) => Ok(self.attach_tiers(vec![config]).await?.pop()),
            None => Ok(None),
        }
    }

    /// Every configuration flagged global
    pub async fn find_global(&self) -> Result<Vec<RateConfigWithTiers>, DatabaseError> {
        let configs = sqlx::query_as::<_, RateConfigRow>(
            r#"
            SELECT rate_config_id, room_id, is_global, currency, water_method, water_price,
                   created_at, updated_at
            FROM rate_configs
            WHERE is_global
            ORDER BY created_at
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        self.attach_tiers(configs).await
    }

    /// Inserts or replaces a configuration and its bands
    pub async fn save(&self, config: &RateConfigRow, tiers: &[TierBandRow]) -> Result<(), DatabaseError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO rate_configs
                (rate_config_id, room_id, is_global, currency, water_method, water_price, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (rate_config_id) DO UPDATE SET
                room_id = EXCLUDED.room_id,
                is_global = EXCLUDED.is_global,
                currency = EXCLUDED.currency,
                water_method = EXCLUDED.water_method,
                water_price = EXCLUDED.water_price,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(config.rate_config_id)
        .bind(config.room_id)
        .bind(config.is_global)
        .bind(&config.currency)
        .bind(&config.water_method)
        .bind(config.water_price)
        .bind(config.created_at)
        .bind(config.updated_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM tier_bands WHERE rate_config_id = $1")
            .bind(config.rate_config_id)
            .execute(&mut *tx)
            .await?;

        for tier in tiers {
            sqlx::query(
                r#"
                INSERT INTO tier_bands (rate_config_id, min_usage, max_usage, price_per_unit)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(config.rate_config_id)
            .bind(tier.min_usage)
            .bind(tier.max_usage)
            .bind(tier.price_per_unit)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        tracing::debug!(rate_config_id = %config.rate_config_id, bands = tiers.len(), "rate config saved");
        Ok(())
    }

    async fn attach_tiers(&self, configs: Vec<RateConfigRow>) -> Result<Vec<RateConfigWithTiers>, DatabaseError> {
        if configs.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<Uuid> = configs.iter().map(|c| c.rate_config_id).collect();

        let tiers = sqlx::query_as::<_, TierBandRow>(
            r#"
            SELECT rate_config_id, min_usage, max_usage, price_per_unit
            FROM tier_bands
            WHERE rate_config_id = ANY($1)
            ORDER BY rate_config_id, min_usage
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(configs
            .into_iter()
            .map(|config| {
                let tiers = tiers
                    .iter()
                    .filter(|t| t.rate_config_id == config.rate_config_id)
                    .cloned()
                    .collect();
                RateConfigWithTiers { config, tiers }
            })
            .collect())
    }
}
