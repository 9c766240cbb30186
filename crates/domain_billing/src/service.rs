//! Billing application service
//!
//! Orchestrates the read-recompute-write cycle for bill mutations:
//! load the bill, resolve the current rate and occupant count, recompute on
//! a copy, then write it back under an optimistic version check. A stale
//! write re-runs the whole cycle once before the conflict is surfaced.
//! Every successful mutation is recorded in the audit trail; an audit
//! failure is logged and reported but never undoes the bill write.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::instrument;

use core_kernel::{BillId, BillingPeriod, Currency, FeeId, Money, PortError, RoomId, UserId};

use crate::audit::{Actor, BillAction, BillHistory, BillSnapshot, BillTransition, ChangeAuditor};
use crate::bill::{Bill, PricingContext};
use crate::composer::{BillCalculation, BillComposer, BillInputs, BillReadings};
use crate::debt::{aggregate_room_debt, sort_warnings, DebtRecord, DebtWarning};
use crate::error::BillingError;
use crate::fee::Fee;
use crate::ports::{BillStore, HistoryStore, OccupancyPort, RateConfigPort};
use crate::rate::RateResolver;
use crate::words::Locale;

/// Service-wide billing settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingSettings {
    /// Currency debt totals are reported in
    pub currency: Currency,
    /// Locale of `total_cost_text`
    pub locale: Locale,
    /// How many times a stale write is retried before it is surfaced
    pub stale_write_retries: u32,
}

impl Default for BillingSettings {
    fn default() -> Self {
        Self {
            currency: Currency::VND,
            locale: Locale::Vi,
            stale_write_retries: 1,
        }
    }
}

/// Data needed to open a bill
#[derive(Debug, Clone)]
pub struct NewBill {
    pub room_id: RoomId,
    pub owner_id: UserId,
    pub period: BillingPeriod,
    pub readings: BillReadings,
    pub fees: Vec<Fee>,
}

/// Result of a mutation together with its audit outcome
#[derive(Debug, Clone)]
pub struct MutationOutcome<T> {
    pub value: T,
    /// The recorded history entry, if the audit write succeeded
    pub history: Option<BillHistory>,
    /// Why the audit write failed, if it did
    pub audit_error: Option<String>,
}

/// Use cases of the billing engine
pub struct BillingService {
    rates: RateResolver,
    occupancy: Arc<dyn OccupancyPort>,
    bills: Arc<dyn BillStore>,
    auditor: ChangeAuditor,
    composer: BillComposer,
    settings: BillingSettings,
}

impl BillingService {
    pub fn new(
        rate_port: Arc<dyn RateConfigPort>,
        occupancy: Arc<dyn OccupancyPort>,
        bills: Arc<dyn BillStore>,
        history: Arc<dyn HistoryStore>,
        settings: BillingSettings,
    ) -> Self {
        Self {
            rates: RateResolver::new(rate_port),
            occupancy,
            bills,
            auditor: ChangeAuditor::new(history),
            composer: BillComposer::new(settings.locale),
            settings,
        }
    }

    pub fn settings(&self) -> &BillingSettings {
        &self.settings
    }

    pub fn auditor(&self) -> &ChangeAuditor {
        &self.auditor
    }

    /// Prices readings and fees for a room without storing anything
    #[instrument(skip(self, readings, fees), fields(room_id = %room_id))]
    pub async fn preview_bill(
        &self,
        room_id: RoomId,
        readings: BillReadings,
        fees: Vec<Fee>,
    ) -> Result<BillCalculation, BillingError> {
        let rate = self.rates.resolve(room_id).await?;
        let occupant_count = self.occupancy.load_occupant_count(room_id).await?;
        self.composer.compose(&BillInputs {
            readings: &readings,
            rate: &rate,
            occupant_count,
            fees: &fees,
        })
    }

    /// Opens the bill of a room for a month
    #[instrument(skip(self, request, actor), fields(room_id = %request.room_id, period = %request.period))]
    pub async fn create_bill(
        &self,
        request: NewBill,
        actor: Actor,
    ) -> Result<MutationOutcome<Bill>, BillingError> {
        let duplicate = BillingError::DuplicateBill {
            room_id: request.room_id,
            period: request.period,
        };
        if self
            .bills
            .find_by_room_period(request.room_id, request.period)
            .await?
            .is_some()
        {
            return Err(duplicate);
        }

        let rate = self.rates.resolve(request.room_id).await?;
        let occupant_count = self.occupancy.load_occupant_count(request.room_id).await?;
        let bill = Bill::create(
            request.room_id,
            request.owner_id,
            request.period,
            request.readings,
            request.fees,
            PricingContext {
                composer: &self.composer,
                rate: &rate,
                occupant_count,
            },
        )?;

        let stored = match self.bills.insert(&bill).await {
            Ok(stored) => stored,
            Err(err) if err.is_conflict() => return Err(duplicate),
            Err(err) => return Err(err.into()),
        };
        tracing::info!(bill_id = %stored.id(), total = %stored.total_cost(), "bill created");

        let (history, audit_error) = self
            .audit(
                BillAction::Create,
                actor,
                BillTransition::Created(BillSnapshot::of(&stored)),
            )
            .await;
        Ok(MutationOutcome {
            value: stored,
            history,
            audit_error,
        })
    }

    /// Loads a bill
    pub async fn get_bill(&self, bill_id: BillId) -> Result<Bill, BillingError> {
        self.bills
            .get(bill_id)
            .await
            .map_err(|err| not_found_or(err, bill_id))
    }

    /// Corrects the meter readings
    pub async fn update_readings(
        &self,
        bill_id: BillId,
        readings: BillReadings,
        actor: Actor,
    ) -> Result<MutationOutcome<Bill>, BillingError> {
        self.mutate(bill_id, BillAction::UpdateReadings, actor, move |bill, pricing| {
            bill.update_readings(readings, pricing)
        })
        .await
    }

    /// Attaches a fee
    pub async fn add_fee(
        &self,
        bill_id: BillId,
        fee: Fee,
        actor: Actor,
    ) -> Result<MutationOutcome<Bill>, BillingError> {
        self.mutate(bill_id, BillAction::AddFee, actor, move |bill, pricing| {
            bill.add_fee(fee.clone(), pricing)
        })
        .await
    }

    /// Detaches a fee
    pub async fn remove_fee(
        &self,
        bill_id: BillId,
        fee_id: FeeId,
        actor: Actor,
    ) -> Result<MutationOutcome<Bill>, BillingError> {
        self.mutate(bill_id, BillAction::RemoveFee, actor, move |bill, pricing| {
            bill.remove_fee(fee_id, pricing).map(|_| ())
        })
        .await
    }

    /// Records the amount paid
    pub async fn apply_payment(
        &self,
        bill_id: BillId,
        amount: Money,
        actor: Actor,
    ) -> Result<MutationOutcome<Bill>, BillingError> {
        self.mutate(bill_id, BillAction::UpdatePayment, actor, move |bill, pricing| {
            bill.apply_payment(amount, pricing)
        })
        .await
    }

    /// Marks a bill fully paid or unpaid
    pub async fn set_paid(
        &self,
        bill_id: BillId,
        paid: bool,
        actor: Actor,
    ) -> Result<MutationOutcome<Bill>, BillingError> {
        self.mutate(bill_id, BillAction::UpdatePayment, actor, move |bill, pricing| {
            bill.set_paid(paid, pricing)
        })
        .await
    }

    /// Re-prices a bill after rate or occupant changes
    pub async fn recalculate(
        &self,
        bill_id: BillId,
        actor: Actor,
    ) -> Result<MutationOutcome<Bill>, BillingError> {
        self.mutate(bill_id, BillAction::Recalculate, actor, |bill, pricing| {
            bill.recalculate(pricing)
        })
        .await
    }

    /// Deletes a bill; its audit trail stays reachable by the original id
    #[instrument(skip(self, actor), fields(bill_id = %bill_id))]
    pub async fn delete_bill(
        &self,
        bill_id: BillId,
        actor: Actor,
    ) -> Result<MutationOutcome<BillId>, BillingError> {
        let mut attempt = 0;
        let deleted = loop {
            attempt += 1;
            let current = self.get_bill(bill_id).await?;
            match self.bills.delete(bill_id, current.version()).await {
                Ok(()) => break current,
                Err(err) if err.is_conflict() => {
                    self.check_retry(bill_id, current.version(), attempt)?;
                }
                Err(err) => return Err(not_found_or(err, bill_id)),
            }
        };
        tracing::info!(room_id = %deleted.room_id(), "bill deleted");

        if let Err(err) = self.auditor.detach(bill_id).await {
            tracing::error!(error = %err, "failed to detach history from deleted bill");
        }
        let (history, audit_error) = self
            .audit(
                BillAction::Delete,
                actor,
                BillTransition::Deleted(BillSnapshot::of(&deleted)),
            )
            .await;
        Ok(MutationOutcome {
            value: bill_id,
            history,
            audit_error,
        })
    }

    /// Audit entries of a bill visible to `viewer`, oldest first
    ///
    /// Works for deleted bills through their original id.
    #[instrument(skip(self), fields(bill_id = %bill_id))]
    pub async fn bill_history(
        &self,
        bill_id: BillId,
        viewer: UserId,
    ) -> Result<Vec<BillHistory>, BillingError> {
        let entries = self.auditor.history_for(bill_id).await?;
        if entries.is_empty() {
            // Distinguish "no history yet" from an unknown bill
            self.get_bill(bill_id).await?;
        }
        Ok(entries
            .into_iter()
            .filter(|entry| entry.is_visible_to(viewer))
            .collect())
    }

    /// Outstanding debt of one room
    #[instrument(skip(self), fields(room_id = %room_id))]
    pub async fn get_room_debt(&self, room_id: RoomId) -> Result<DebtRecord, BillingError> {
        let bills = self.bills.list_for_room(room_id).await?;
        aggregate_room_debt(room_id, &bills, self.settings.currency)
    }

    /// Rooms with two or more consecutive months of debt
    ///
    /// Each room is folded in its own task; results are joined and sorted by
    /// run length, longest first.
    #[instrument(skip(self))]
    pub async fn get_debt_warnings(&self) -> Result<Vec<DebtWarning>, BillingError> {
        let room_ids = self.bills.list_room_ids().await?;
        let mut tasks = JoinSet::new();

        for room_id in room_ids {
            let bills = Arc::clone(&self.bills);
            let currency = self.settings.currency;
            tasks.spawn(async move {
                let room_bills = bills.list_for_room(room_id).await?;
                aggregate_room_debt(room_id, &room_bills, currency)
            });
        }

        let mut warnings = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            let record = joined.map_err(|err| {
                BillingError::Storage(PortError::internal(format!("debt task failed: {}", err)))
            })??;
            if let Some(warning) = record.warning() {
                warnings.push(warning);
            }
        }

        sort_warnings(&mut warnings);
        tracing::info!(count = warnings.len(), "debt warnings computed");
        Ok(warnings)
    }

    /// Runs a read-recompute-write cycle with stale-write retry
    #[instrument(skip(self, actor, change), fields(bill_id = %bill_id, action = %action))]
    async fn mutate<F>(
        &self,
        bill_id: BillId,
        action: BillAction,
        actor: Actor,
        change: F,
    ) -> Result<MutationOutcome<Bill>, BillingError>
    where
        F: Fn(&mut Bill, PricingContext<'_>) -> Result<(), BillingError> + Send,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let current = self.get_bill(bill_id).await?;
            let rate = self.rates.resolve(current.room_id()).await?;
            let occupant_count = self.occupancy.load_occupant_count(current.room_id()).await?;

            let mut next = current.clone();
            change(
                &mut next,
                PricingContext {
                    composer: &self.composer,
                    rate: &rate,
                    occupant_count,
                },
            )?;

            match self.bills.update(&next, current.version()).await {
                Ok(stored) => {
                    tracing::info!(
                        version = stored.version(),
                        total = %stored.total_cost(),
                        "bill updated"
                    );
                    let (history, audit_error) = self
                        .audit(
                            action,
                            actor,
                            BillTransition::Changed {
                                old: BillSnapshot::of(&current),
                                new: BillSnapshot::of(&stored),
                            },
                        )
                        .await;
                    return Ok(MutationOutcome {
                        value: stored,
                        history,
                        audit_error,
                    });
                }
                Err(err) if err.is_conflict() => {
                    self.check_retry(bill_id, current.version(), attempt)?;
                }
                Err(err) => return Err(not_found_or(err, bill_id)),
            }
        }
    }

    /// Returns the conflict once the retry budget is spent
    fn check_retry(&self, bill_id: BillId, expected_version: u64, attempt: u32) -> Result<(), BillingError> {
        if attempt > self.settings.stale_write_retries {
            tracing::error!(%bill_id, expected_version, attempt, "stale write conflict, giving up");
            return Err(BillingError::StaleWriteConflict {
                bill_id,
                expected_version,
            });
        }
        tracing::warn!(%bill_id, expected_version, attempt, "stale write conflict, retrying");
        Ok(())
    }

    /// Records history without failing the caller
    async fn audit(
        &self,
        action: BillAction,
        actor: Actor,
        transition: BillTransition,
    ) -> (Option<BillHistory>, Option<String>) {
        match self.auditor.record_history(action, actor, transition).await {
            Ok(entry) => (Some(entry), None),
            Err(err) => {
                tracing::error!(%action, error = %err, "failed to record bill history");
                (None, Some(err.to_string()))
            }
        }
    }
}

fn not_found_or(err: PortError, bill_id: BillId) -> BillingError {
    if err.is_not_found() {
        BillingError::BillNotFound(bill_id)
    } else {
        BillingError::Storage(err)
    }
}
