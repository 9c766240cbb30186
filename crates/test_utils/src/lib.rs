//! Test Utilities Crate
//!
//! Shared test infrastructure for the billing workspace.
//!
//! # Modules
//!
//! - `fixtures`: tier tables, rate configurations, meter readings
//! - `builders`: `TestBillBuilder` and `RateConfigBuilder`
//! - `database`: Postgres testcontainer and seeding helpers
//! - `assertions`: money and bill assertions
//! - `generators`: proptest strategies for tiers, readings and shortfall series

pub mod assertions;
pub mod builders;
pub mod database;
pub mod fixtures;
pub mod generators;

pub use assertions::*;
pub use builders::*;
pub use database::*;
pub use fixtures::*;
pub use generators::*;
