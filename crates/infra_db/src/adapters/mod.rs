//! Domain Adapters
//!
//! PostgreSQL implementations of the `domain_billing` ports. Each adapter
//! wraps a repository, converts rows into domain values and translates
//! [`DatabaseError`](crate::DatabaseError) into `PortError`.
//!
//! # Usage
//!
//! ```rust,ignore
//! use infra_db::adapters::{PostgresBillStore, PostgresHistoryStore};
//! use domain_billing::BillStore;
//!
//! let bills = PostgresBillStore::new(pool.clone());
//! let bill = bills.get(bill_id).await?;
//! ```

pub mod bills;
pub mod history;
pub mod rates;

pub use bills::PostgresBillStore;
pub use history::PostgresHistoryStore;
pub use rates::{PostgresOccupancyAdapter, PostgresRateConfigAdapter};

use chrono::Utc;
use core_kernel::{AdapterHealth, HealthCheckResult, PortError};
use sqlx::PgPool;

use crate::error::DatabaseError;

/// Runs `SELECT 1` and reports latency
pub(crate) async fn probe(pool: &PgPool, adapter_id: &str) -> HealthCheckResult {
    let start = std::time::Instant::now();

    let result = sqlx::query_scalar::<_, i32>("SELECT 1").fetch_one(pool).await;

    let latency_ms = start.elapsed().as_millis() as u64;

    match result {
        Ok(_) => HealthCheckResult {
            adapter_id: adapter_id.to_string(),
            status: AdapterHealth::Healthy,
            latency_ms,
            message: None,
            checked_at: Utc::now(),
        },
        Err(e) => HealthCheckResult {
            adapter_id: adapter_id.to_string(),
            status: AdapterHealth::Unhealthy,
            latency_ms,
            message: Some(format!("Database error: {}", e)),
            checked_at: Utc::now(),
        },
    }
}

/// Narrows a stored integer into an unsigned domain value
pub(crate) fn to_unsigned<T, U>(value: T, column: &str) -> Result<U, PortError>
where
    T: Copy + std::fmt::Display,
    U: TryFrom<T>,
{
    U::try_from(value).map_err(|_| DatabaseError::corrupt(format!("{} out of range: {}", column, value)).into())
}

/// Widens a domain counter into a BIGINT column
pub(crate) fn to_signed(value: u64, column: &str) -> Result<i64, PortError> {
    i64::try_from(value).map_err(|_| DatabaseError::corrupt(format!("{} too large to store: {}", column, value)).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negative_reading_is_rejected() {
        let err = to_unsigned::<i64, u64>(-1, "electricity_old").unwrap_err();
        assert!(matches!(err, PortError::Transformation { .. }));
    }

    #[test]
    fn test_counter_round_trips_through_bigint() {
        let stored = to_signed(4_200, "electricity_usage").unwrap();
        let back: u64 = to_unsigned(stored, "electricity_usage").unwrap();
        assert_eq!(back, 4_200);
        assert!(to_signed(u64::MAX, "electricity_usage").is_err());
    }
}
