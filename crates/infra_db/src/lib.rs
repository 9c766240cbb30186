//! Infrastructure Database Layer
//!
//! PostgreSQL persistence for the billing engine using SQLx.
//!
//! # Architecture
//!
//! The crate follows the repository pattern. Repositories hold the SQL and
//! map rows; adapters implement the `domain_billing` ports on top of them:
//!
//! | Port | Adapter | Tables |
//! |------|---------|--------|
//! | `RateConfigPort` | [`PostgresRateConfigAdapter`] | `rate_configs`, `tier_bands` |
//! | `OccupancyPort` | [`PostgresOccupancyAdapter`] | `tenants`, `occupants` |
//! | `BillStore` | [`PostgresBillStore`] | `bills`, `bill_fees` |
//! | `HistoryStore` | [`PostgresHistoryStore`] | `bill_history` |
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_db::{create_pool_from_url, run_migrations, PostgresBillStore};
//!
//! let pool = create_pool_from_url("postgres://localhost/boarding_billing").await?;
//! run_migrations(&pool).await?;
//! let bills = PostgresBillStore::new(pool);
//! ```

pub mod adapters;
pub mod error;
pub mod pool;
pub mod repositories;

pub use adapters::{PostgresBillStore, PostgresHistoryStore, PostgresOccupancyAdapter, PostgresRateConfigAdapter};
pub use error::DatabaseError;
pub use pool::{create_pool, create_pool_from_url, run_migrations, DatabaseConfig, DatabasePool};
