//! Billing Domain - Utility Billing and Debt Engine
//!
//! This crate turns meter readings, utility rate configurations, ad-hoc fees
//! and payment history into bill totals, and folds a room's bills into its
//! outstanding debt.
//!
//! # Components
//!
//! - **Rate resolution**: room-specific configuration, else the single global default
//! - **Meter readings**: usage from old/new readings, with counter rollover
//! - **Tiered electricity**: progressive pricing across ascending bands
//! - **Water**: by meter or by headcount
//! - **Fees**: ad-hoc or typed charges attached to a bill
//! - **Bill composition**: one consistent recomputation on every mutation
//! - **Audit trail**: before/after snapshots and diffs that outlive the bill
//! - **Debt**: outstanding totals and consecutive-month debt warnings
//!
//! # Example
//!
//! ```rust,ignore
//! use domain_billing::{compute_bill, BillInputs, BillReadings, MeterPair, OccupantCount};
//!
//! let readings = BillReadings {
//!     electricity: MeterPair::new(1200, 1320, 99_999),
//!     water: None,
//! };
//! let calculation = compute_bill(&BillInputs {
//!     readings: &readings,
//!     rate: &resolved_rate,
//!     occupant_count: OccupantCount::new(3)?,
//!     fees: &[],
//! })?;
//! println!("{}", calculation.total_cost_text);
//! ```

pub mod audit;
pub mod bill;
pub mod composer;
pub mod debt;
pub mod error;
pub mod fee;
pub mod meter;
pub mod occupancy;
pub mod ports;
pub mod rate;
pub mod service;
pub mod tiered;
pub mod water;
pub mod words;

pub use audit::{Actor, BillAction, BillDiff, BillHistory, BillSnapshot, BillTransition, ChangeAuditor};
pub use bill::{Bill, BillRecord, PaymentState, PricingContext};
pub use composer::{compute_bill, BillCalculation, BillComposer, BillInputs, BillReadings};
pub use debt::{aggregate_room_debt, DebtRecord, DebtRun, DebtWarning, UnpaidBill};
pub use error::{BillingError, ErrorKind, Utility};
pub use fee::{fees_total, Fee};
pub use meter::{process_reading, MeterPair, MeterUsage};
pub use occupancy::OccupantCount;
pub use ports::{BillStore, HistoryStore, OccupancyPort, RateConfigPort};
pub use rate::{resolve_rate_config, RateConfig, RateResolver, RateScope, ResolvedRate, WaterPricing};
pub use service::{BillingService, BillingSettings, MutationOutcome, NewBill};
pub use tiered::{electricity_cost, TierBand};
pub use water::{water_cost, WaterCharge};
pub use words::Locale;
