//! PostgreSQL audit trail store

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::instrument;

use core_kernel::{
    BillHistoryId, BillId, DomainPort, HealthCheckResult, HealthCheckable, PortError, RoomId, UserId,
};
use domain_billing::{Actor, BillAction, BillHistory, BillSnapshot, HistoryStore};

use super::probe;
use crate::error::DatabaseError;
use crate::repositories::history::{BillHistoryRepository, BillHistoryRow};

/// PostgreSQL-backed implementation of [`HistoryStore`]
#[derive(Debug, Clone)]
pub struct PostgresHistoryStore {
    repository: BillHistoryRepository,
    pool: PgPool,
}

impl PostgresHistoryStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            repository: BillHistoryRepository::new(pool.clone()),
            pool,
        }
    }
}

impl DomainPort for PostgresHistoryStore {}

#[async_trait]
impl HealthCheckable for PostgresHistoryStore {
    async fn health_check(&self) -> HealthCheckResult {
        probe(&self.pool, "postgres-history-store").await
    }
}

#[async_trait]
impl HistoryStore for PostgresHistoryStore {
    #[instrument(skip(self, entry), fields(bill_id = %entry.original_bill_id, action = %entry.action))]
    async fn append(&self, entry: &BillHistory) -> Result<(), PortError> {
        let row = history_to_row(entry)?;
        self.repository.append(&row).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(bill_id = %bill_id))]
    async fn detach_bill(&self, bill_id: BillId) -> Result<u64, PortError> {
        Ok(self.repository.detach(*bill_id.as_uuid()).await?)
    }

    async fn list_for_bill(&self, bill_id: BillId) -> Result<Vec<BillHistory>, PortError> {
        self.repository
            .list_for_bill(*bill_id.as_uuid())
            .await?
            .into_iter()
            .map(row_to_history)
            .collect()
    }
}

fn history_to_row(entry: &BillHistory) -> Result<BillHistoryRow, PortError> {
    let snapshot = |s: &Option<BillSnapshot>| {
        s.as_ref()
            .map(serde_json::to_value)
            .transpose()
            .map_err(DatabaseError::from)
    };

    Ok(BillHistoryRow {
        history_id: *entry.id.as_uuid(),
        bill_id: entry.bill_id.map(|id| *id.as_uuid()),
        original_bill_id: *entry.original_bill_id.as_uuid(),
        room_id: *entry.room_id.as_uuid(),
        owner_id: *entry.owner_id.as_uuid(),
        action: entry.action.as_str().to_string(),
        actor_id: *entry.actor.user_id.as_uuid(),
        actor_name: entry.actor.display_name.clone(),
        old_snapshot: snapshot(&entry.old_snapshot)?,
        new_snapshot: snapshot(&entry.new_snapshot)?,
        diff: serde_json::to_value(&entry.diff).map_err(DatabaseError::from)?,
        description: entry.description.clone(),
        created_at: entry.created_at,
    })
}

fn row_to_history(row: BillHistoryRow) -> Result<BillHistory, PortError> {
    let action = row
        .action
        .parse::<BillAction>()
        .map_err(|e| DatabaseError::corrupt(format!("history {}: {}", row.history_id, e)))?;
    let snapshot = |value: Option<serde_json::Value>| {
        value.map(serde_json::from_value::<BillSnapshot>).transpose().map_err(DatabaseError::from)
    };

    Ok(BillHistory {
        id: BillHistoryId::from_uuid(row.history_id),
        bill_id: row.bill_id.map(BillId::from_uuid),
        original_bill_id: BillId::from_uuid(row.original_bill_id),
        room_id: RoomId::from_uuid(row.room_id),
        owner_id: UserId::from_uuid(row.owner_id),
        action,
        actor: Actor {
            user_id: UserId::from_uuid(row.actor_id),
            display_name: row.actor_name,
        },
        old_snapshot: snapshot(row.old_snapshot)?,
        new_snapshot: snapshot(row.new_snapshot)?,
        diff: serde_json::from_value(row.diff).map_err(DatabaseError::from)?,
        description: row.description,
        created_at: row.created_at,
    })
}
