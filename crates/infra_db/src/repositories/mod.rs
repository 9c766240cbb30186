//! Repository implementations
//!
//! Repositories own the SQL. They speak in row structs and raw ids; the
//! [`adapters`](crate::adapters) turn rows into domain values.
//!
//! # Conventions
//!
//! - Queries are built at runtime with `sqlx::query_as` over `FromRow` rows
//! - Multi-table writes run in one transaction
//! - Bills carry an optimistic version column checked on every write

pub mod bills;
pub mod history;
pub mod occupancy;
pub mod rates;

pub use bills::BillRepository;
pub use history::BillHistoryRepository;
pub use occupancy::OccupancyRepository;
pub use rates::RateConfigRepository;
