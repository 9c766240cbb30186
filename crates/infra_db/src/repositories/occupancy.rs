//! Occupant counts
//!
//! Tenancy is owned elsewhere; billing only reads how many people live in
//! a room through its current tenant.

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::DatabaseError;

#[derive(Debug, Clone)]
pub struct OccupancyRepository {
    pool: PgPool,
}

impl OccupancyRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Number of additional occupants linked to the room's current tenant
    ///
    /// `None` when the room has no current tenant.
    pub async fn additional_occupants(&self, room_id: Uuid) -> Result<Option<i64>, DatabaseError> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(o.occupant_id)
            FROM tenants t
            LEFT JOIN occupants o ON o.tenant_id = t.tenant_id
            WHERE t.room_id = $1 AND t.is_current
            GROUP BY t.tenant_id
            "#,
        )
        .bind(room_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(count)
    }

    /// Registers the current tenant of a room; returns the tenant id
    pub async fn add_tenant(&self, room_id: Uuid, full_name: &str) -> Result<Uuid, DatabaseError> {
        let tenant_id = sqlx::query_scalar::<_, Uuid>(
            "INSERT INTO tenants (room_id, full_name) VALUES ($1, $2) RETURNING tenant_id",
        )
        .bind(room_id)
        .bind(full_name)
        .fetch_one(&self.pool)
        .await?;
        Ok(tenant_id)
    }

    pub async fn add_occupant(&self, tenant_id: Uuid, full_name: &str) -> Result<Uuid, DatabaseError> {
        let occupant_id = sqlx::query_scalar::<_, Uuid>(
            "INSERT INTO occupants (tenant_id, full_name) VALUES ($1, $2) RETURNING occupant_id",
        )
        .bind(tenant_id)
        .bind(full_name)
        .fetch_one(&self.pool)
        .await?;
        Ok(occupant_id)
    }
}
