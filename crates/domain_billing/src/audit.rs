//! Bill change audit trail
//!
//! Every bill mutation produces a [`BillHistory`] entry holding immutable
//! before/after snapshots and a field-level diff. Entries carry the room and
//! owner of the bill so access checks keep working after the bill itself has
//! been deleted; they are looked up either by the live bill id or by the
//! permanent `original_bill_id`.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::instrument;

use core_kernel::{BillHistoryId, BillId, BillingPeriod, Currency, RoomId, UserId};

use crate::bill::Bill;
use crate::error::BillingError;
use crate::fee::Fee;
use crate::ports::HistoryStore;

/// Current layout of [`BillSnapshot`]
pub const SNAPSHOT_SCHEMA_VERSION: u32 = 1;

/// The kind of mutation being recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BillAction {
    Create,
    UpdateReadings,
    AddFee,
    RemoveFee,
    UpdatePayment,
    Recalculate,
    Delete,
}

impl BillAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillAction::Create => "CREATE",
            BillAction::UpdateReadings => "UPDATE_READINGS",
            BillAction::AddFee => "ADD_FEE",
            BillAction::RemoveFee => "REMOVE_FEE",
            BillAction::UpdatePayment => "UPDATE_PAYMENT",
            BillAction::Recalculate => "RECALCULATE",
            BillAction::Delete => "DELETE",
        }
    }
}

impl fmt::Display for BillAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BillAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATE" => Ok(BillAction::Create),
            "UPDATE_READINGS" => Ok(BillAction::UpdateReadings),
            "ADD_FEE" => Ok(BillAction::AddFee),
            "REMOVE_FEE" => Ok(BillAction::RemoveFee),
            "UPDATE_PAYMENT" => Ok(BillAction::UpdatePayment),
            "RECALCULATE" => Ok(BillAction::Recalculate),
            "DELETE" => Ok(BillAction::Delete),
            other => Err(format!("Unknown bill action: {}", other)),
        }
    }
}

/// Who performed a mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: UserId,
    pub display_name: Option<String>,
}

impl Actor {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            display_name: None,
        }
    }

    pub fn named(user_id: UserId, display_name: impl Into<String>) -> Self {
        Self {
            user_id,
            display_name: Some(display_name.into()),
        }
    }
}

/// Immutable point-in-time copy of a bill
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillSnapshot {
    pub schema_version: u32,
    pub bill_id: BillId,
    pub room_id: RoomId,
    pub owner_id: UserId,
    pub period: BillingPeriod,
    pub currency: Currency,
    pub electricity_old_reading: u64,
    pub electricity_new_reading: u64,
    pub electricity_max_capacity: u64,
    pub electricity_usage: u64,
    pub electricity_rollover: bool,
    pub electricity_cost: Decimal,
    pub water_old_reading: Option<u64>,
    pub water_new_reading: Option<u64>,
    pub water_max_capacity: Option<u64>,
    pub water_usage: Option<u64>,
    pub water_rollover: Option<bool>,
    pub water_cost: Decimal,
    pub occupant_count: u32,
    pub fees: Vec<Fee>,
    pub fees_total: Decimal,
    pub total_cost: Decimal,
    pub paid_amount: Option<Decimal>,
    pub is_paid: bool,
}

impl BillSnapshot {
    pub fn of(bill: &Bill) -> Self {
        let readings = bill.readings();
        let calc = bill.calculation();
        Self {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            bill_id: bill.id(),
            room_id: bill.room_id(),
            owner_id: bill.owner_id(),
            period: bill.period(),
            currency: bill.currency(),
            electricity_old_reading: readings.electricity.old_reading,
            electricity_new_reading: readings.electricity.new_reading,
            electricity_max_capacity: readings.electricity.max_capacity,
            electricity_usage: calc.electricity_usage,
            electricity_rollover: calc.electricity_rollover,
            electricity_cost: calc.electricity_cost.amount(),
            water_old_reading: readings.water.map(|w| w.old_reading),
            water_new_reading: readings.water.map(|w| w.new_reading),
            water_max_capacity: readings.water.map(|w| w.max_capacity),
            water_usage: calc.water_usage,
            water_rollover: calc.water_rollover,
            water_cost: calc.water_cost.amount(),
            occupant_count: bill.occupant_count().get(),
            fees: bill.fees().to_vec(),
            fees_total: calc.fees_total.amount(),
            total_cost: calc.total_cost.amount(),
            paid_amount: bill.paid_amount().map(|p| p.amount()),
            is_paid: bill.is_paid(),
        }
    }
}

/// One changed field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub field: String,
    pub old: Value,
    pub new: Value,
}

/// Field-level differences between two snapshots
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BillDiff(Vec<FieldChange>);

impl BillDiff {
    /// Compares two snapshots field by field
    ///
    /// Scalars compare by value; the fee list compares as a whole through its
    /// serialized form. A missing side is treated as all-null.
    pub fn between(old: Option<&BillSnapshot>, new: Option<&BillSnapshot>) -> Self {
        let old = old.map(snapshot_fields).unwrap_or_default();
        let new = new.map(snapshot_fields).unwrap_or_default();

        let mut fields: Vec<&String> = old.keys().chain(new.keys()).collect();
        fields.sort();
        fields.dedup();

        let changes = fields
            .into_iter()
            .filter(|field| field.as_str() != "schema_version")
            .filter_map(|field| {
                let before = old.get(field).cloned().unwrap_or(Value::Null);
                let after = new.get(field).cloned().unwrap_or(Value::Null);
                (before != after).then(|| FieldChange {
                    field: field.clone(),
                    old: before,
                    new: after,
                })
            })
            .collect();
        BillDiff(changes)
    }

    pub fn changes(&self) -> &[FieldChange] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn has_changed(&self, field: &str) -> bool {
        self.0.iter().any(|change| change.field == field)
    }
}

fn snapshot_fields(snapshot: &BillSnapshot) -> serde_json::Map<String, Value> {
    match serde_json::to_value(snapshot) {
        Ok(Value::Object(map)) => map,
        _ => serde_json::Map::new(),
    }
}

/// Before/after states of a mutation
#[derive(Debug, Clone)]
pub enum BillTransition {
    Created(BillSnapshot),
    Changed { old: BillSnapshot, new: BillSnapshot },
    Deleted(BillSnapshot),
}

impl BillTransition {
    fn context(&self) -> &BillSnapshot {
        match self {
            BillTransition::Created(new) => new,
            BillTransition::Changed { new, .. } => new,
            BillTransition::Deleted(old) => old,
        }
    }

    fn into_parts(self) -> (Option<BillSnapshot>, Option<BillSnapshot>) {
        match self {
            BillTransition::Created(new) => (None, Some(new)),
            BillTransition::Changed { old, new } => (Some(old), Some(new)),
            BillTransition::Deleted(old) => (Some(old), None),
        }
    }
}

/// An audit entry; outlives the bill it describes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillHistory {
    pub id: BillHistoryId,
    /// Live bill id, cleared when the bill is deleted
    pub bill_id: Option<BillId>,
    /// Permanent id of the bill this entry was recorded for
    pub original_bill_id: BillId,
    pub room_id: RoomId,
    pub owner_id: UserId,
    pub action: BillAction,
    pub actor: Actor,
    pub old_snapshot: Option<BillSnapshot>,
    pub new_snapshot: Option<BillSnapshot>,
    pub diff: BillDiff,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl BillHistory {
    /// Builds an entry from a transition
    pub fn new(action: BillAction, actor: Actor, transition: BillTransition) -> Self {
        let context = transition.context();
        let bill_id = context.bill_id;
        let room_id = context.room_id;
        let owner_id = context.owner_id;

        let (old_snapshot, new_snapshot) = transition.into_parts();
        let diff = BillDiff::between(old_snapshot.as_ref(), new_snapshot.as_ref());
        let description = describe(action, old_snapshot.as_ref(), new_snapshot.as_ref());

        Self {
            id: BillHistoryId::new_v7(),
            bill_id: if action == BillAction::Delete { None } else { Some(bill_id) },
            original_bill_id: bill_id,
            room_id,
            owner_id,
            action,
            actor,
            old_snapshot,
            new_snapshot,
            diff,
            description,
            created_at: Utc::now(),
        }
    }

    /// The owner of the room and the user who made the change may read it
    pub fn is_visible_to(&self, user_id: UserId) -> bool {
        self.owner_id == user_id || self.actor.user_id == user_id
    }

    /// True if the entry belongs to `bill_id`, live or deleted
    pub fn concerns(&self, bill_id: BillId) -> bool {
        self.original_bill_id == bill_id || self.bill_id == Some(bill_id)
    }
}

fn describe(action: BillAction, old: Option<&BillSnapshot>, new: Option<&BillSnapshot>) -> String {
    let total = |s: Option<&BillSnapshot>| {
        s.map(|s| format!("{} {}", s.total_cost, s.currency.code()))
            .unwrap_or_default()
    };

    match action {
        BillAction::Create => match new {
            Some(s) => format!("Created bill for {} with total {}", s.period, total(new)),
            None => "Created bill".to_string(),
        },
        BillAction::UpdateReadings => {
            format!("Updated meter readings, total {} to {}", total(old), total(new))
        }
        BillAction::AddFee => match fee_difference(new, old) {
            Some(fee) => format!("Added fee '{}' ({})", fee.name(), fee.amount()),
            None => "Added fee".to_string(),
        },
        BillAction::RemoveFee => match fee_difference(old, new) {
            Some(fee) => format!("Removed fee '{}' ({})", fee.name(), fee.amount()),
            None => "Removed fee".to_string(),
        },
        BillAction::UpdatePayment => {
            let paid = new
                .and_then(|s| s.paid_amount)
                .map_or_else(|| "0".to_string(), |p| p.to_string());
            let state = if new.map_or(false, |s| s.is_paid) { "paid" } else { "unpaid" };
            format!("Payment updated to {}, bill {}", paid, state)
        }
        BillAction::Recalculate => format!("Recalculated, total {} to {}", total(old), total(new)),
        BillAction::Delete => match old {
            Some(s) => format!("Deleted bill for {}", s.period),
            None => "Deleted bill".to_string(),
        },
    }
}

/// First fee present in `from` but not in `other`
fn fee_difference<'a>(from: Option<&'a BillSnapshot>, other: Option<&BillSnapshot>) -> Option<&'a Fee> {
    let from = from?;
    let others: Vec<_> = other.map(|s| s.fees.iter().map(Fee::id).collect()).unwrap_or_default();
    from.fees.iter().find(|fee| !others.contains(&fee.id()))
}

/// Records audit entries through the history store
pub struct ChangeAuditor {
    store: Arc<dyn HistoryStore>,
}

impl ChangeAuditor {
    pub fn new(store: Arc<dyn HistoryStore>) -> Self {
        Self { store }
    }

    /// Builds and persists a history entry
    #[instrument(skip(self, actor, transition), fields(action = %action))]
    pub async fn record_history(
        &self,
        action: BillAction,
        actor: Actor,
        transition: BillTransition,
    ) -> Result<BillHistory, BillingError> {
        let entry = BillHistory::new(action, actor, transition);
        self.store.append(&entry).await?;
        tracing::debug!(
            history_id = %entry.id,
            bill_id = %entry.original_bill_id,
            changes = entry.diff.changes().len(),
            "bill history recorded"
        );
        Ok(entry)
    }

    /// Clears the live bill id on every entry of a deleted bill
    pub async fn detach(&self, bill_id: BillId) -> Result<u64, BillingError> {
        Ok(self.store.detach_bill(bill_id).await?)
    }

    /// Entries for a bill, live or deleted, oldest first
    pub async fn history_for(&self, bill_id: BillId) -> Result<Vec<BillHistory>, BillingError> {
        Ok(self.store.list_for_bill(bill_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bill::PricingContext;
    use crate::composer::{BillComposer, BillReadings};
    use crate::meter::MeterPair;
    use crate::occupancy::OccupantCount;
    use crate::rate::{RateConfig, RateScope, ResolvedRate, WaterPricing};
    use crate::tiered::TierBand;
    use core_kernel::{Money, RateConfigId};

    fn vnd(amount: i64) -> Money {
        Money::new(Decimal::from(amount), Currency::VND)
    }

    fn rate() -> ResolvedRate {
        ResolvedRate::from_config(RateConfig {
            id: RateConfigId::new(),
            scope: RateScope::Global,
            currency: Currency::VND,
            water: WaterPricing::ByHeadcount { price_per_person: vnd(100_000) },
            tiers: vec![TierBand::new(0, None, vnd(3_000))],
        })
        .unwrap()
    }

    fn bill(composer: &BillComposer, rate: &ResolvedRate) -> Bill {
        Bill::create(
            RoomId::new(),
            UserId::new(),
            BillingPeriod::new(5, 2024).unwrap(),
            BillReadings { electricity: MeterPair::new(100, 200, 9999), water: None },
            vec![],
            PricingContext { composer, rate, occupant_count: OccupantCount::single() },
        )
        .unwrap()
    }

    #[test]
    fn test_fee_change_diff() {
        let composer = BillComposer::default();
        let rate = rate();
        let before = bill(&composer, &rate);
        let mut after = before.clone();
        after
            .add_fee(
                Fee::ad_hoc("Parking", vnd(100_000)),
                PricingContext { composer: &composer, rate: &rate, occupant_count: OccupantCount::single() },
            )
            .unwrap();

        let entry = BillHistory::new(
            BillAction::AddFee,
            Actor::new(before.owner_id()),
            BillTransition::Changed {
                old: BillSnapshot::of(&before),
                new: BillSnapshot::of(&after),
            },
        );

        assert!(entry.diff.has_changed("fees"));
        assert!(entry.diff.has_changed("fees_total"));
        assert!(entry.diff.has_changed("total_cost"));
        assert!(!entry.diff.has_changed("electricity_cost"));
        assert_eq!(entry.diff.changes().len(), 3);
        assert!(entry.description.contains("Parking"));
        assert_eq!(entry.bill_id, Some(before.id()));
    }

    #[test]
    fn test_deleted_entry_keeps_context() {
        let composer = BillComposer::default();
        let rate = rate();
        let bill = bill(&composer, &rate);
        let stranger = UserId::new();

        let entry = BillHistory::new(
            BillAction::Delete,
            Actor::new(bill.owner_id()),
            BillTransition::Deleted(BillSnapshot::of(&bill)),
        );

        assert_eq!(entry.bill_id, None);
        assert_eq!(entry.original_bill_id, bill.id());
        assert_eq!(entry.room_id, bill.room_id());
        assert!(entry.concerns(bill.id()));
        assert!(entry.is_visible_to(bill.owner_id()));
        assert!(!entry.is_visible_to(stranger));
        assert!(entry.diff.has_changed("total_cost"));
    }

    #[test]
    fn test_identical_snapshots_have_empty_diff() {
        let composer = BillComposer::default();
        let rate = rate();
        let snapshot = BillSnapshot::of(&bill(&composer, &rate));
        assert!(BillDiff::between(Some(&snapshot), Some(&snapshot)).is_empty());
    }

    #[test]
    fn test_snapshot_json_carries_schema_version() {
        let composer = BillComposer::default();
        let rate = rate();
        let json = serde_json::to_value(BillSnapshot::of(&bill(&composer, &rate))).unwrap();
        assert_eq!(json["schema_version"], 1);
        let back: BillSnapshot = serde_json::from_value(json).unwrap();
        assert_eq!(back.schema_version, SNAPSHOT_SCHEMA_VERSION);
    }

    #[test]
    fn test_action_round_trip_through_str() {
        for action in [BillAction::Create, BillAction::UpdatePayment, BillAction::Delete] {
            assert_eq!(action.as_str().parse::<BillAction>().unwrap(), action);
        }
    }
}
