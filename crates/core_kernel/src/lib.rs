//! Core Kernel - Foundational types for the boarding-house billing engine
//!
//! This crate provides the building blocks shared by the billing domain,
//! the persistence layer and the HTTP surface:
//! - Money types with precise decimal arithmetic
//! - Billing periods (calendar month/year) with adjacency checks
//! - Strongly-typed identifiers
//! - Port error and marker traits for hexagonal adapters

pub mod money;
pub mod period;
pub mod identifiers;
pub mod ports;
pub mod error;

pub use money::{Money, Currency, MoneyError};
pub use period::{BillingPeriod, PeriodError, Timezone};
pub use identifiers::{
    RoomId, BillId, FeeId, FeeTypeId, UserId, RateConfigId, BillHistoryId, TenantId,
};
pub use ports::{
    PortError, DomainPort, HealthCheckable, HealthCheckResult, AdapterHealth,
};
pub use error::CoreError;
