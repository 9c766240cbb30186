//! Bill history repository
//!
//! Append-only. Snapshots and diffs are stored as JSONB so the row shape
//! does not change when the snapshot schema does. Entries keep the
//! original bill id after the live id is cleared on deletion.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::DatabaseError;

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct BillHistoryRow {
    pub history_id: Uuid,
    pub bill_id: Option<Uuid>,
    pub original_bill_id: Uuid,
    pub room_id: Uuid,
    pub owner_id: Uuid,
    pub action: String,
    pub actor_id: Uuid,
    pub actor_name: Option<String>,
    pub old_snapshot: Option<Value>,
    pub new_snapshot: Option<Value>,
    pub diff: Value,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct BillHistoryRepository {
    pool: PgPool,
}

impl BillHistoryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn append(&self, row: &BillHistoryRow) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO bill_history
                (history_id, bill_id, original_bill_id, room_id, owner_id, action,
                 actor_id, actor_name, old_snapshot, new_snapshot, diff, description, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(row.history_id)
        .bind(row.bill_id)
        .bind(row.original_bill_id)
        .bind(row.room_id)
        .bind(row.owner_id)
        .bind(&row.action)
        .bind(row.actor_id)
        .bind(&row.actor_name)
        .bind(&row.old_snapshot)
        .bind(&row.new_snapshot)
        .bind(&row.diff)
        .bind(&row.description)
        .bind(row.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Clears the live bill id on every entry of a bill; returns the count
    pub async fn detach(&self, bill_id: Uuid) -> Result<u64, DatabaseError> {
        let result = sqlx::query("UPDATE bill_history SET bill_id = NULL WHERE bill_id = $1")
            .bind(bill_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Entries whose live or original bill id matches, oldest first
    pub async fn list_for_bill(&self, bill_id: Uuid) -> Result<Vec<BillHistoryRow>, DatabaseError> {
        let rows = sqlx::query_as::<_, BillHistoryRow>(
            r#"
            SELECT history_id, bill_id, original_bill_id, room_id, owner_id, action,
                   actor_id, actor_name, old_snapshot, new_snapshot, diff, description, created_at
            FROM bill_history
            WHERE bill_id = $1 OR original_bill_id = $1
            ORDER BY created_at ASC, history_id ASC
            "#,
        )
        .bind(bill_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}
