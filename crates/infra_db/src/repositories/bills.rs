//! Bill repository
//!
//! Bills and their fees live in two tables written in one transaction.
//! Every write carries the version the caller read; a mismatch means
//! another writer committed first and is reported as a stale version.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::error::DatabaseError;

const BILL_COLUMNS: &str = r#"
    bill_id, room_id, owner_id, month, year, currency,
    electricity_old, electricity_new, electricity_max,
    electricity_usage, electricity_rollover, electricity_cost,
    water_old, water_new, water_max, water_usage, water_rollover, water_cost,
    occupant_count, rate_config_id, fees_total, total_cost, total_cost_text,
    paid_amount, is_paid, version, created_at, updated_at
"#;

/// A row of the `bills` table
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct BillRow {
    pub bill_id: Uuid,
    pub room_id: Uuid,
    pub owner_id: Uuid,
    pub month: i32,
    pub year: i32,
    pub currency: String,
    pub electricity_old: i64,
    pub electricity_new: i64,
    pub electricity_max: i64,
    pub electricity_usage: i64,
    pub electricity_rollover: bool,
    pub electricity_cost: Decimal,
    pub water_old: Option<i64>,
    pub water_new: Option<i64>,
    pub water_max: Option<i64>,
    pub water_usage: Option<i64>,
    pub water_rollover: Option<bool>,
    pub water_cost: Decimal,
    pub occupant_count: i32,
    pub rate_config_id: Uuid,
    pub fees_total: Decimal,
    pub total_cost: Decimal,
    pub total_cost_text: String,
    pub paid_amount: Option<Decimal>,
    pub is_paid: bool,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A row of the `bill_fees` table
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct FeeRow {
    pub fee_id: Uuid,
    pub bill_id: Uuid,
    /// `ad_hoc` or `typed`
    pub kind: String,
    pub name: String,
    pub amount: Decimal,
    pub fee_type_id: Option<Uuid>,
    pub position: i32,
}

/// A bill row together with its fees, in insertion order
#[derive(Debug, Clone, PartialEq)]
pub struct BillWithFees {
    pub bill: BillRow,
    pub fees: Vec<FeeRow>,
}

/// Repository for bills and their fees
#[derive(Debug, Clone)]
pub struct BillRepository {
    pool: PgPool,
}

impl BillRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts a bill at version 1
    ///
    /// # Errors
    ///
    /// `DuplicateEntry` if the room already has a bill for the month.
    pub async fn insert(&self, bill: &BillRow, fees: &[FeeRow]) -> Result<BillWithFees, DatabaseError> {
        let mut tx = self.pool.begin().await?;

        let stored = sqlx::query_as::<_, BillRow>(&format!(
            r#"
            INSERT INTO bills ({BILL_COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14,
                    $15, $16, $17, $18, $19, $20, $21, $22, $23, $24, $25, 1, $26, $27)
            RETURNING {BILL_COLUMNS}
            "#
        ))
        .bind(bill.bill_id)
        .bind(bill.room_id)
        .bind(bill.owner_id)
        .bind(bill.month)
        .bind(bill.year)
        .bind(&bill.currency)
        .bind(bill.electricity_old)
        .bind(bill.electricity_new)
        .bind(bill.electricity_max)
        .bind(bill.electricity_usage)
        .bind(bill.electricity_rollover)
        .bind(bill.electricity_cost)
        .bind(bill.water_old)
        .bind(bill.water_new)
        .bind(bill.water_max)
        .bind(bill.water_usage)
        .bind(bill.water_rollover)
        .bind(bill.water_cost)
        .bind(bill.occupant_count)
        .bind(bill.rate_config_id)
        .bind(bill.fees_total)
        .bind(bill.total_cost)
        .bind(&bill.total_cost_text)
        .bind(bill.paid_amount)
        .bind(bill.is_paid)
        .bind(bill.created_at)
        .bind(bill.updated_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| match DatabaseError::from(e) {
            DatabaseError::DuplicateEntry(_) => DatabaseError::duplicate(
                "Bill",
                "room and period",
                format!("{} {:02}/{}", bill.room_id, bill.month, bill.year),
            ),
            other => other,
        })?;

        let fees = replace_fees(&mut tx, bill.bill_id, fees).await?;
        tx.commit().await?;

        tracing::debug!(bill_id = %stored.bill_id, "bill inserted");
        Ok(BillWithFees { bill: stored, fees })
    }

    /// Loads one bill with its fees
    pub async fn find(&self, bill_id: Uuid) -> Result<Option<BillWithFees>, DatabaseError> {
        let row = sqlx::query_as::<_, BillRow>(&format!("SELECT {BILL_COLUMNS} FROM bills WHERE bill_id = $1"))
            .bind(bill_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(bill) => Ok(self.attach_fees(vec![bill]).await?.pop()),
            None => Ok(None),
        }
    }

    pub async fn find_by_room_period(
        &self,
        room_id: Uuid,
        month: i32,
        year: i32,
    ) -> Result<Option<BillWithFees>, DatabaseError> {
        let row = sqlx::query_as::<_, BillRow>(&format!(
            "SELECT {BILL_COLUMNS} FROM bills WHERE room_id = $1 AND month = $2 AND year = $3"
        ))
        .bind(room_id)
        .bind(month)
        .bind(year)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(bill) => Ok(self.attach_fees(vec![bill]).await?.pop()),
            None => Ok(None),
        }
    }

    /// All bills of a room, oldest period first
    pub async fn list_for_room(&self, room_id: Uuid) -> Result<Vec<BillWithFees>, DatabaseError> {
        let rows = sqlx::query_as::<_, BillRow>(&format!(
            "SELECT {BILL_COLUMNS} FROM bills WHERE room_id = $1 ORDER BY year ASC, month ASC"
        ))
        .bind(room_id)
        .fetch_all(&self.pool)
        .await?;

        self.attach_fees(rows).await
    }

    /// Distinct rooms that have at least one bill
    pub async fn list_room_ids(&self) -> Result<Vec<Uuid>, DatabaseError> {
        let rooms = sqlx::query_scalar::<_, Uuid>("SELECT DISTINCT room_id FROM bills ORDER BY room_id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rooms)
    }

    /// Overwrites a bill and its fees if the stored version matches
    ///
    /// The stored version is bumped by one.
    ///
    /// # Errors
    ///
    /// `StaleVersion` if the row moved on, `NotFound` if it is gone.
    pub async fn update(
        &self,
        bill: &BillRow,
        fees: &[FeeRow],
        expected_version: i64,
    ) -> Result<BillWithFees, DatabaseError> {
        let mut tx = self.pool.begin().await?;

        let stored = sqlx::query_as::<_, BillRow>(&format!(
            r#"
            UPDATE bills SET
                electricity_old = $3,
                electricity_new = $4,
                electricity_max = $5,
                electricity_usage = $6,
                electricity_rollover = $7,
                electricity_cost = $8,
                water_old = $9,
                water_new = $10,
                water_max = $11,
                water_usage = $12,
                water_rollover = $13,
                water_cost = $14,
                occupant_count = $15,
                rate_config_id = $16,
                fees_total = $17,
                total_cost = $18,
                total_cost_text = $19,
                paid_amount = $20,
                is_paid = $21,
                updated_at = $22,
                version = version + 1
            WHERE bill_id = $1 AND version = $2
            RETURNING {BILL_COLUMNS}
            "#
        ))
        .bind(bill.bill_id)
        .bind(expected_version)
        .bind(bill.electricity_old)
        .bind(bill.electricity_new)
        .bind(bill.electricity_max)
        .bind(bill.electricity_usage)
        .bind(bill.electricity_rollover)
        .bind(bill.electricity_cost)
        .bind(bill.water_old)
        .bind(bill.water_new)
        .bind(bill.water_max)
        .bind(bill.water_usage)
        .bind(bill.water_rollover)
        .bind(bill.water_cost)
        .bind(bill.occupant_count)
        .bind(bill.rate_config_id)
        .bind(bill.fees_total)
        .bind(bill.total_cost)
        .bind(&bill.total_cost_text)
        .bind(bill.paid_amount)
        .bind(bill.is_paid)
        .bind(bill.updated_at)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(stored) = stored else {
            return Err(self.missing_or_stale(&mut tx, bill.bill_id, expected_version).await);
        };

        let fees = replace_fees(&mut tx, bill.bill_id, fees).await?;
        tx.commit().await?;

        tracing::debug!(bill_id = %stored.bill_id, version = stored.version, "bill updated");
        Ok(BillWithFees { bill: stored, fees })
    }

    /// Deletes a bill if the stored version matches; fees cascade
    pub async fn delete(&self, bill_id: Uuid, expected_version: i64) -> Result<(), DatabaseError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query("DELETE FROM bills WHERE bill_id = $1 AND version = $2")
            .bind(bill_id)
            .bind(expected_version)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(self.missing_or_stale(&mut tx, bill_id, expected_version).await);
        }

        tx.commit().await?;
        tracing::debug!(bill_id = %bill_id, "bill deleted");
        Ok(())
    }

    /// Tells a missing row from a stale one after a guarded write hit nothing
    async fn missing_or_stale(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        bill_id: Uuid,
        expected_version: i64,
    ) -> DatabaseError {
        let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM bills WHERE bill_id = $1)")
            .bind(bill_id)
            .fetch_one(&mut **tx)
            .await;

        match exists {
            Ok(true) => DatabaseError::stale("Bill", bill_id, expected_version.max(0) as u64),
            Ok(false) => DatabaseError::not_found("Bill", bill_id),
            Err(e) => e.into(),
        }
    }

    /// Loads the fees of the given bills in one query
    async fn attach_fees(&self, bills: Vec<BillRow>) -> Result<Vec<BillWithFees>, DatabaseError> {
        if bills.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<Uuid> = bills.iter().map(|b| b.bill_id).collect();

        let mut fees = sqlx::query_as::<_, FeeRow>(
            r#"
            SELECT fee_id, bill_id, kind, name, amount, fee_type_id, position
            FROM bill_fees
            WHERE bill_id = ANY($1)
            ORDER BY bill_id, position
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(bills
            .into_iter()
            .map(|bill| {
                let (own, rest): (Vec<FeeRow>, Vec<FeeRow>) =
                    fees.drain(..).partition(|fee| fee.bill_id == bill.bill_id);
                fees = rest;
                BillWithFees { bill, fees: own }
            })
            .collect())
    }
}

/// Replaces the fee rows of a bill inside an open transaction
async fn replace_fees(
    tx: &mut Transaction<'_, Postgres>,
    bill_id: Uuid,
    fees: &[FeeRow],
) -> Result<Vec<FeeRow>, DatabaseError> {
    sqlx::query("DELETE FROM bill_fees WHERE bill_id = $1")
        .bind(bill_id)
        .execute(&mut **tx)
        .await?;

    let mut stored = Vec::with_capacity(fees.len());
    for (position, fee) in fees.iter().enumerate() {
        let row = sqlx::query_as::<_, FeeRow>(
            r#"
            INSERT INTO bill_fees (fee_id, bill_id, kind, name, amount, fee_type_id, position)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING fee_id, bill_id, kind, name, amount, fee_type_id, position
            "#,
        )
        .bind(fee.fee_id)
        .bind(bill_id)
        .bind(&fee.kind)
        .bind(&fee.name)
        .bind(fee.amount)
        .bind(fee.fee_type_id)
        .bind(position as i32)
        .fetch_one(&mut **tx)
        .await?;
        stored.push(row);
    }
    Ok(stored)
}
