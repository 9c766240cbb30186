//! PostgreSQL bill store

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::instrument;

use core_kernel::{
    BillId, BillingPeriod, Currency, DomainPort, FeeId, FeeTypeId, HealthCheckResult, HealthCheckable, Money,
    PortError, RateConfigId, RoomId, UserId,
};
use domain_billing::{
    Bill, BillCalculation, BillReadings, BillRecord, BillStore, Fee, MeterPair, OccupantCount,
};

use super::{probe, to_signed, to_unsigned};
use crate::error::DatabaseError;
use crate::repositories::bills::{BillRepository, BillRow, BillWithFees, FeeRow};

/// PostgreSQL-backed implementation of [`BillStore`]
///
/// Versions are assigned by the database: an insert stores version 1 and
/// each successful update adds one.
#[derive(Debug, Clone)]
pub struct PostgresBillStore {
    repository: BillRepository,
    pool: PgPool,
}

impl PostgresBillStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            repository: BillRepository::new(pool.clone()),
            pool,
        }
    }
}

impl DomainPort for PostgresBillStore {}

#[async_trait]
impl HealthCheckable for PostgresBillStore {
    async fn health_check(&self) -> HealthCheckResult {
        probe(&self.pool, "postgres-bill-store").await
    }
}

#[async_trait]
impl BillStore for PostgresBillStore {
    #[instrument(skip(self, bill), fields(bill_id = %bill.id(), room_id = %bill.room_id()))]
    async fn insert(&self, bill: &Bill) -> Result<Bill, PortError> {
        let (row, fees) = bill_to_rows(bill)?;
        let stored = self.repository.insert(&row, &fees).await?;
        rows_to_bill(stored)
    }

    #[instrument(skip(self), fields(bill_id = %id))]
    async fn get(&self, id: BillId) -> Result<Bill, PortError> {
        let stored = self
            .repository
            .find(*id.as_uuid())
            .await?
            .ok_or_else(|| PortError::not_found("Bill", id))?;
        rows_to_bill(stored)
    }

    async fn find_by_room_period(&self, room_id: RoomId, period: BillingPeriod) -> Result<Option<Bill>, PortError> {
        let month = i32::try_from(period.month()).map_err(|_| PortError::validation("month out of range"))?;
        self.repository
            .find_by_room_period(*room_id.as_uuid(), month, period.year())
            .await?
            .map(rows_to_bill)
            .transpose()
    }

    #[instrument(skip(self), fields(room_id = %room_id))]
    async fn list_for_room(&self, room_id: RoomId) -> Result<Vec<Bill>, PortError> {
        self.repository
            .list_for_room(*room_id.as_uuid())
            .await?
            .into_iter()
            .map(rows_to_bill)
            .collect()
    }

    async fn list_room_ids(&self) -> Result<Vec<RoomId>, PortError> {
        Ok(self
            .repository
            .list_room_ids()
            .await?
            .into_iter()
            .map(RoomId::from_uuid)
            .collect())
    }

    #[instrument(skip(self, bill), fields(bill_id = %bill.id(), expected_version))]
    async fn update(&self, bill: &Bill, expected_version: u64) -> Result<Bill, PortError> {
        let (row, fees) = bill_to_rows(bill)?;
        let stored = self
            .repository
            .update(&row, &fees, to_signed(expected_version, "version")?)
            .await?;
        rows_to_bill(stored)
    }

    #[instrument(skip(self), fields(bill_id = %id, expected_version))]
    async fn delete(&self, id: BillId, expected_version: u64) -> Result<(), PortError> {
        self.repository
            .delete(*id.as_uuid(), to_signed(expected_version, "version")?)
            .await
            .map_err(PortError::from)
    }
}

/// Splits a bill into its `bills` row and `bill_fees` rows
fn bill_to_rows(bill: &Bill) -> Result<(BillRow, Vec<FeeRow>), PortError> {
    let record = bill.to_record();
    let calc = &record.calculation;
    let electricity = record.readings.electricity;
    let water = record.readings.water;

    let water_column = |value: Option<u64>, column: &str| value.map(|v| to_signed(v, column)).transpose();

    let row = BillRow {
        bill_id: *record.id.as_uuid(),
        room_id: *record.room_id.as_uuid(),
        owner_id: *record.owner_id.as_uuid(),
        month: i32::try_from(record.period.month()).map_err(|_| PortError::validation("month out of range"))?,
        year: record.period.year(),
        currency: calc.total_cost.currency().code().to_string(),
        electricity_old: to_signed(electricity.old_reading, "electricity_old")?,
        electricity_new: to_signed(electricity.new_reading, "electricity_new")?,
        electricity_max: to_signed(electricity.max_capacity, "electricity_max")?,
        electricity_usage: to_signed(calc.electricity_usage, "electricity_usage")?,
        electricity_rollover: calc.electricity_rollover,
        electricity_cost: calc.electricity_cost.amount(),
        water_old: water_column(water.map(|w| w.old_reading), "water_old")?,
        water_new: water_column(water.map(|w| w.new_reading), "water_new")?,
        water_max: water_column(water.map(|w| w.max_capacity), "water_max")?,
        water_usage: water_column(calc.water_usage, "water_usage")?,
        water_rollover: calc.water_rollover,
        water_cost: calc.water_cost.amount(),
        occupant_count: i32::try_from(record.occupant_count.get())
            .map_err(|_| PortError::validation("occupant count out of range"))?,
        rate_config_id: *record.rate_config_id.as_uuid(),
        fees_total: calc.fees_total.amount(),
        total_cost: calc.total_cost.amount(),
        total_cost_text: calc.total_cost_text.clone(),
        paid_amount: record.paid_amount.map(|m| m.amount()),
        is_paid: record.is_paid,
        version: to_signed(record.version, "version")?,
        created_at: record.created_at,
        updated_at: record.updated_at,
    };

    let fees = record
        .fees
        .iter()
        .enumerate()
        .map(|(position, fee)| FeeRow {
            fee_id: *fee.id().as_uuid(),
            bill_id: row.bill_id,
            kind: match fee {
                Fee::AdHoc { .. } => "ad_hoc".to_string(),
                Fee::Typed { .. } => "typed".to_string(),
            },
            name: fee.name().to_string(),
            amount: fee.amount().amount(),
            fee_type_id: fee.fee_type_id().map(|id| *id.as_uuid()),
            position: position as i32,
        })
        .collect();

    Ok((row, fees))
}

/// Rebuilds a bill from its stored rows without recomputing it
fn rows_to_bill(stored: BillWithFees) -> Result<Bill, PortError> {
    let BillWithFees { bill: row, fees } = stored;

    let currency: Currency = row
        .currency
        .parse()
        .map_err(|e| DatabaseError::corrupt(format!("bill {}: {}", row.bill_id, e)))?;
    let money = |amount| Money::new(amount, currency);

    let period = BillingPeriod::new(to_unsigned(row.month, "month")?, row.year)
        .map_err(|e| DatabaseError::corrupt(format!("bill {}: {}", row.bill_id, e)))?;

    let electricity = MeterPair::new(
        to_unsigned(row.electricity_old, "electricity_old")?,
        to_unsigned(row.electricity_new, "electricity_new")?,
        to_unsigned(row.electricity_max, "electricity_max")?,
    );
    let water = match (row.water_old, row.water_new, row.water_max) {
        (Some(old), Some(new), Some(max)) => Some(MeterPair::new(
            to_unsigned(old, "water_old")?,
            to_unsigned(new, "water_new")?,
            to_unsigned(max, "water_max")?,
        )),
        _ => None,
    };

    let occupant_count = OccupantCount::new(to_unsigned(row.occupant_count, "occupant_count")?)
        .map_err(|e| DatabaseError::corrupt(format!("bill {}: {}", row.bill_id, e)))?;

    let fees = fees
        .into_iter()
        .map(|fee| row_to_fee(fee, currency))
        .collect::<Result<Vec<_>, _>>()?;

    let calculation = BillCalculation {
        electricity_usage: to_unsigned(row.electricity_usage, "electricity_usage")?,
        electricity_rollover: row.electricity_rollover,
        electricity_cost: money(row.electricity_cost),
        water_usage: row.water_usage.map(|u| to_unsigned(u, "water_usage")).transpose()?,
        water_rollover: row.water_rollover,
        water_cost: money(row.water_cost),
        fees_total: money(row.fees_total),
        total_cost: money(row.total_cost),
        total_cost_text: row.total_cost_text,
    };

    Ok(Bill::rehydrate(BillRecord {
        id: BillId::from_uuid(row.bill_id),
        room_id: RoomId::from_uuid(row.room_id),
        owner_id: UserId::from_uuid(row.owner_id),
        period,
        readings: BillReadings { electricity, water },
        fees,
        occupant_count,
        rate_config_id: RateConfigId::from_uuid(row.rate_config_id),
        calculation,
        paid_amount: row.paid_amount.map(money),
        is_paid: row.is_paid,
        version: to_unsigned(row.version, "version")?,
        created_at: row.created_at,
        updated_at: row.updated_at,
    }))
}

fn row_to_fee(row: FeeRow, currency: Currency) -> Result<Fee, PortError> {
    let id = FeeId::from_uuid(row.fee_id);
    let amount = Money::new(row.amount, currency);
    match (row.kind.as_str(), row.fee_type_id) {
        ("ad_hoc", _) => Ok(Fee::AdHoc { id, name: row.name, amount }),
        ("typed", Some(fee_type_id)) => Ok(Fee::Typed {
            id,
            name: row.name,
            amount,
            fee_type_id: FeeTypeId::from_uuid(fee_type_id),
        }),
        (kind, _) => Err(DatabaseError::corrupt(format!("fee {} has invalid kind '{}'", row.fee_id, kind)).into()),
    }
}
