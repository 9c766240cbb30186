//! Billing Domain Ports
//!
//! The calculators in this crate are pure. Everything they need from the
//! outside world (rate configurations, occupant counts, stored bills and
//! the audit trail) is read and written through the traits below, which the
//! PostgreSQL adapters in `infra_db` and the in-memory [`mock`] implement.
//!
//! # Usage
//!
//! ```rust,ignore
//! use domain_billing::ports::{BillStore, RateConfigPort};
//! use std::sync::Arc;
//!
//! let service = BillingService::new(
//!     Arc::new(PostgresRateConfigAdapter::new(pool.clone())),
//!     Arc::new(PostgresOccupancyAdapter::new(pool.clone())),
//!     Arc::new(PostgresBillStore::new(pool.clone())),
//!     Arc::new(PostgresHistoryStore::new(pool)),
//!     BillingSettings::default(),
//! );
//! ```

use async_trait::async_trait;

use core_kernel::{BillId, BillingPeriod, DomainPort, PortError, RoomId};

use crate::audit::BillHistory;
use crate::bill::Bill;
use crate::occupancy::OccupantCount;
use crate::rate::RateConfig;

/// Source of utility rate configurations
#[async_trait]
pub trait RateConfigPort: DomainPort {
    /// The configuration bound to a room, if any
    async fn find_room_rate(&self, room_id: RoomId) -> Result<Option<RateConfig>, PortError>;

    /// All configurations flagged as global; more than one is a setup error
    async fn find_global_rates(&self) -> Result<Vec<RateConfig>, PortError>;
}

/// Source of occupant counts for headcount water billing
#[async_trait]
pub trait OccupancyPort: DomainPort {
    /// Primary tenant plus additional occupants; 1 for an empty room
    async fn load_occupant_count(&self, room_id: RoomId) -> Result<OccupantCount, PortError>;
}

/// Persistence of bills with optimistic versioning
#[async_trait]
pub trait BillStore: DomainPort {
    /// Stores a new bill; `Conflict` if the room already has one for the period
    async fn insert(&self, bill: &Bill) -> Result<Bill, PortError>;

    /// Loads a bill; `NotFound` if it does not exist
    async fn get(&self, id: BillId) -> Result<Bill, PortError>;

    async fn find_by_room_period(
        &self,
        room_id: RoomId,
        period: BillingPeriod,
    ) -> Result<Option<Bill>, PortError>;

    /// All bills of a room, ordered by period
    async fn list_for_room(&self, room_id: RoomId) -> Result<Vec<Bill>, PortError>;

    /// Every room that has at least one bill
    async fn list_room_ids(&self) -> Result<Vec<RoomId>, PortError>;

    /// Writes a bill if its stored version still equals `expected_version`
    ///
    /// Returns the bill with its new version; `Conflict` if another writer
    /// got there first.
    async fn update(&self, bill: &Bill, expected_version: u64) -> Result<Bill, PortError>;

    /// Deletes a bill if its stored version still equals `expected_version`
    async fn delete(&self, id: BillId, expected_version: u64) -> Result<(), PortError>;
}

/// Append-only store for the audit trail
#[async_trait]
pub trait HistoryStore: DomainPort {
    async fn append(&self, entry: &BillHistory) -> Result<(), PortError>;

    /// Clears the live bill id on all entries of a deleted bill
    async fn detach_bill(&self, bill_id: BillId) -> Result<u64, PortError>;

    /// Entries whose live or original bill id is `bill_id`, oldest first
    async fn list_for_bill(&self, bill_id: BillId) -> Result<Vec<BillHistory>, PortError>;
}

/// In-memory adapter
///
/// Implements every billing port over shared maps. Useful for unit and HTTP
/// tests without a database; failures can be injected to exercise the
/// retry and audit paths.
#[cfg(any(test, feature = "mock"))]
pub mod mock {
    use super::*;
    use chrono::Utc;
    use core_kernel::{AdapterHealth, HealthCheckResult, HealthCheckable};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::sync::RwLock;

    /// In-memory implementation of all billing ports
    #[derive(Debug, Default)]
    pub struct InMemoryBillingStore {
        rates: Arc<RwLock<Vec<RateConfig>>>,
        occupants: Arc<RwLock<HashMap<RoomId, u32>>>,
        bills: Arc<RwLock<HashMap<BillId, Bill>>>,
        history: Arc<RwLock<Vec<BillHistory>>>,
        fail_history_writes: AtomicBool,
        pending_conflicts: AtomicU32,
    }

    impl InMemoryBillingStore {
        pub fn new() -> Self {
            Self::default()
        }

        /// Adds a rate configuration (room-specific or global)
        pub async fn add_rate(&self, config: RateConfig) {
            self.rates.write().await.push(config);
        }

        /// Sets the number of additional occupants linked to a room's tenant
        pub async fn set_additional_occupants(&self, room_id: RoomId, count: u32) {
            self.occupants.write().await.insert(room_id, count);
        }

        /// Makes every following history append fail
        pub fn fail_history_writes(&self, fail: bool) {
            self.fail_history_writes.store(fail, Ordering::SeqCst);
        }

        /// Rejects the next `count` bill updates as stale
        pub fn inject_conflicts(&self, count: u32) {
            self.pending_conflicts.store(count, Ordering::SeqCst);
        }

        /// Snapshot of every stored history entry
        pub async fn all_history(&self) -> Vec<BillHistory> {
            self.history.read().await.clone()
        }

        fn take_conflict(&self) -> bool {
            self.pending_conflicts
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        }
    }

    impl DomainPort for InMemoryBillingStore {}

    #[async_trait]
    impl HealthCheckable for InMemoryBillingStore {
        async fn health_check(&self) -> HealthCheckResult {
            HealthCheckResult {
                adapter_id: "mock-billing-store".to_string(),
                status: AdapterHealth::Healthy,
                latency_ms: 0,
                message: Some("Mock adapter always healthy".to_string()),
                checked_at: Utc::now(),
            }
        }
    }

    #[async_trait]
    impl RateConfigPort for InMemoryBillingStore {
        async fn find_room_rate(&self, room_id: RoomId) -> Result<Option<RateConfig>, PortError> {
            Ok(self
                .rates
                .read()
                .await
                .iter()
                .find(|config| config.scope == crate::rate::RateScope::Room(room_id))
                .cloned())
        }

        async fn find_global_rates(&self) -> Result<Vec<RateConfig>, PortError> {
            Ok(self
                .rates
                .read()
                .await
                .iter()
                .filter(|config| config.is_global())
                .cloned()
                .collect())
        }
    }

    #[async_trait]
    impl OccupancyPort for InMemoryBillingStore {
        async fn load_occupant_count(&self, room_id: RoomId) -> Result<OccupantCount, PortError> {
            let additional = self.occupants.read().await.get(&room_id).copied().unwrap_or(0);
            Ok(OccupantCount::for_tenant(additional))
        }
    }

    #[async_trait]
    impl BillStore for InMemoryBillingStore {
        async fn insert(&self, bill: &Bill) -> Result<Bill, PortError> {
            let mut bills = self.bills.write().await;
            let duplicate = bills
                .values()
                .any(|b| b.room_id() == bill.room_id() && b.period() == bill.period());
            if duplicate {
                return Err(PortError::conflict(format!(
                    "room {} already has a bill for {}",
                    bill.room_id(),
                    bill.period()
                )));
            }
            let stored = bill.clone().with_version(1);
            bills.insert(stored.id(), stored.clone());
            Ok(stored)
        }

        async fn get(&self, id: BillId) -> Result<Bill, PortError> {
            self.bills
                .read()
                .await
                .get(&id)
                .cloned()
                .ok_or_else(|| PortError::not_found("Bill", id))
        }

        async fn find_by_room_period(
            &self,
            room_id: RoomId,
            period: BillingPeriod,
        ) -> Result<Option<Bill>, PortError> {
            Ok(self
                .bills
                .read()
                .await
                .values()
                .find(|b| b.room_id() == room_id && b.period() == period)
                .cloned())
        }

        async fn list_for_room(&self, room_id: RoomId) -> Result<Vec<Bill>, PortError> {
            let mut bills: Vec<Bill> = self
                .bills
                .read()
                .await
                .values()
                .filter(|b| b.room_id() == room_id)
                .cloned()
                .collect();
            bills.sort_by_key(|b| b.period());
            Ok(bills)
        }

        async fn list_room_ids(&self) -> Result<Vec<RoomId>, PortError> {
            let mut rooms: Vec<RoomId> = self.bills.read().await.values().map(|b| b.room_id()).collect();
            rooms.sort();
            rooms.dedup();
            Ok(rooms)
        }

        async fn update(&self, bill: &Bill, expected_version: u64) -> Result<Bill, PortError> {
            if self.take_conflict() {
                return Err(PortError::conflict(format!(
                    "bill {} version {} is stale (injected)",
                    bill.id(),
                    expected_version
                )));
            }

            let mut bills = self.bills.write().await;
            let current = bills
                .get(&bill.id())
                .ok_or_else(|| PortError::not_found("Bill", bill.id()))?;
            if current.version() != expected_version {
                return Err(PortError::conflict(format!(
                    "bill {} is at version {}, expected {}",
                    bill.id(),
                    current.version(),
                    expected_version
                )));
            }
            let stored = bill.clone().with_version(expected_version + 1);
            bills.insert(stored.id(), stored.clone());
            Ok(stored)
        }

        async fn delete(&self, id: BillId, expected_version: u64) -> Result<(), PortError> {
            if self.take_conflict() {
                return Err(PortError::conflict(format!(
                    "bill {} version {} is stale (injected)",
                    id, expected_version
                )));
            }

            let mut bills = self.bills.write().await;
            let current = bills.get(&id).ok_or_else(|| PortError::not_found("Bill", id))?;
            if current.version() != expected_version {
                return Err(PortError::conflict(format!(
                    "bill {} is at version {}, expected {}",
                    id,
                    current.version(),
                    expected_version
                )));
            }
            bills.remove(&id);
            Ok(())
        }
    }

    #[async_trait]
    impl HistoryStore for InMemoryBillingStore {
        async fn append(&self, entry: &BillHistory) -> Result<(), PortError> {
            if self.fail_history_writes.load(Ordering::SeqCst) {
                return Err(PortError::connection("history store unavailable"));
            }
            self.history.write().await.push(entry.clone());
            Ok(())
        }

        async fn detach_bill(&self, bill_id: BillId) -> Result<u64, PortError> {
            let mut history = self.history.write().await;
            let mut detached = 0;
            for entry in history.iter_mut().filter(|e| e.bill_id == Some(bill_id)) {
                entry.bill_id = None;
                detached += 1;
            }
            Ok(detached)
        }

        async fn list_for_bill(&self, bill_id: BillId) -> Result<Vec<BillHistory>, PortError> {
            let mut entries: Vec<BillHistory> = self
                .history
                .read()
                .await
                .iter()
                .filter(|e| e.concerns(bill_id))
                .cloned()
                .collect();
            entries.sort_by_key(|e| e.created_at);
            Ok(entries)
        }
    }
}
