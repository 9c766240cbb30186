//! Billing domain errors
//!
//! Errors fall into the classes reported by [`BillingError::kind`]:
//! configuration problems are fatal to a calculation, input problems are
//! rejected before anything is written, and a stale write may be retried
//! once by re-running the whole read-recompute-write cycle.

use core_kernel::{BillId, BillingPeriod, FeeId, MoneyError, PeriodError, PortError, RoomId};
use rust_decimal::Decimal;
use thiserror::Error;

/// The meter a reading belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Utility {
    Electricity,
    Water,
}

impl std::fmt::Display for Utility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Utility::Electricity => write!(f, "electricity"),
            Utility::Water => write!(f, "water"),
        }
    }
}

/// Error classes used to decide how a caller should react
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Setup problem (rates, tiers); surfaced, never retried
    Configuration,
    /// Caller-supplied data is invalid; rejected before any write
    Input,
    /// Concurrent modification of the same bill
    Concurrency,
    /// The referenced bill or fee does not exist
    NotFound,
    /// Storage or other infrastructure failure
    Infrastructure,
}

/// Errors that can occur in the billing domain
#[derive(Debug, Error)]
pub enum BillingError {
    /// Neither a room-specific nor a global rate configuration exists
    #[error("No rate configuration found for room {room_id} and no global default is defined")]
    ConfigurationMissing { room_id: RoomId },

    /// More than one configuration claims to be the effective one
    #[error("Ambiguous rate configuration: {0}")]
    AmbiguousConfiguration(String),

    /// Tier bands do not cover [0, ∞) contiguously
    #[error("Invalid tier configuration: {0}")]
    InvalidTierConfig(String),

    /// A rate configuration value is unusable (negative price, wrong currency)
    #[error("Invalid rate configuration: {0}")]
    InvalidRateConfig(String),

    /// A meter wrapped but the configured capacity cannot explain it
    #[error("Invalid {utility} meter configuration: old={old_reading}, new={new_reading}, max={max_capacity}")]
    InvalidMeterConfig {
        utility: Utility,
        old_reading: u64,
        new_reading: u64,
        max_capacity: u64,
    },

    /// Water is billed by meter but no water readings were supplied
    #[error("Water is billed by meter but no water readings were provided")]
    MissingWaterReading,

    /// Headcount billing needs at least the primary tenant
    #[error("Occupant count must be at least 1, got {0}")]
    InvalidOccupantCount(u32),

    /// A fee amount is negative or in the wrong currency
    #[error("Invalid amount {amount} for fee '{name}'")]
    InvalidFeeAmount { name: String, amount: Decimal },

    /// A payment amount is negative or in the wrong currency
    #[error("Invalid payment amount: {0}")]
    InvalidPaymentAmount(Decimal),

    /// The paid amount would exceed the bill total
    #[error("Paid amount {paid} exceeds bill total {total}")]
    OverpaymentRejected { paid: Decimal, total: Decimal },

    /// Amounts in different currencies were combined
    #[error("Currency error: {0}")]
    CurrencyMismatch(#[from] MoneyError),

    /// The billing month/year is invalid
    #[error("Invalid billing period: {0}")]
    InvalidPeriod(#[from] PeriodError),

    /// Another writer updated the bill since it was read
    #[error("Bill {bill_id} was modified concurrently (expected version {expected_version})")]
    StaleWriteConflict { bill_id: BillId, expected_version: u64 },

    /// Bill not found
    #[error("Bill not found: {0}")]
    BillNotFound(BillId),

    /// Fee not found on the bill
    #[error("Fee {fee_id} not found on bill {bill_id}")]
    FeeNotFound { bill_id: BillId, fee_id: FeeId },

    /// A bill already exists for the room and period
    #[error("A bill already exists for room {room_id} in {period}")]
    DuplicateBill { room_id: RoomId, period: BillingPeriod },

    /// Collaborator (storage) failure
    #[error("Storage error: {0}")]
    Storage(#[from] PortError),
}

impl BillingError {
    /// Creates an invalid tier configuration error
    pub fn invalid_tiers(message: impl Into<String>) -> Self {
        BillingError::InvalidTierConfig(message.into())
    }

    /// Classifies the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            BillingError::ConfigurationMissing { .. }
            | BillingError::AmbiguousConfiguration(_)
            | BillingError::InvalidTierConfig(_)
            | BillingError::InvalidRateConfig(_) => ErrorKind::Configuration,

            BillingError::InvalidMeterConfig { .. }
            | BillingError::MissingWaterReading
            | BillingError::InvalidOccupantCount(_)
            | BillingError::InvalidFeeAmount { .. }
            | BillingError::InvalidPaymentAmount(_)
            | BillingError::OverpaymentRejected { .. }
            | BillingError::CurrencyMismatch(_)
            | BillingError::InvalidPeriod(_)
            | BillingError::DuplicateBill { .. } => ErrorKind::Input,

            BillingError::StaleWriteConflict { .. } => ErrorKind::Concurrency,

            BillingError::BillNotFound(_) | BillingError::FeeNotFound { .. } => ErrorKind::NotFound,

            BillingError::Storage(_) => ErrorKind::Infrastructure,
        }
    }

    /// Only a stale write is worth retrying automatically
    pub fn is_retryable(&self) -> bool {
        matches!(self, BillingError::StaleWriteConflict { .. })
    }
}
