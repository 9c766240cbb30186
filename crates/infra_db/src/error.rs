//! Database error types
//!
//! Errors raised by the repositories, classified by PostgreSQL error code so
//! the adapters can translate them into [`PortError`] variants the billing
//! service knows how to react to.

use core_kernel::PortError;
use thiserror::Error;

/// Errors that can occur during database operations
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to establish a database connection
    #[error("Failed to connect to database: {0}")]
    ConnectionFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Entity not found: {entity} with id '{id}'")]
    NotFound { entity: &'static str, id: String },

    /// Unique constraint violation
    #[error("Duplicate entry: {0}")]
    DuplicateEntry(String),

    #[error("Foreign key violation: {0}")]
    ForeignKeyViolation(String),

    /// Check constraint violation
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// Serialization failure under concurrent transactions (SQLSTATE 40001)
    #[error("Serialization failure: {0}")]
    SerializationFailure(String),

    /// Row version did not match the expected one
    #[error("Stale version for {entity} '{id}': expected {expected}")]
    StaleVersion {
        entity: &'static str,
        id: String,
        expected: u64,
    },

    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// A stored value could not be mapped to a domain value
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Pool exhaustion - no available connections
    #[error("Connection pool exhausted")]
    PoolExhausted,
}

impl DatabaseError {
    /// Creates a not found error for a specific entity type and identifier
    ///
    /// # Example
    ///
    /// ```rust
    /// use infra_db::DatabaseError;
    ///
    /// let error = DatabaseError::not_found("Bill", "BILL-123");
    /// assert!(error.to_string().contains("Bill"));
    /// assert!(error.is_not_found());
    /// ```
    pub fn not_found(entity: &'static str, id: impl std::fmt::Display) -> Self {
        DatabaseError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Creates a duplicate entry error
    pub fn duplicate(entity: &str, field: &str, value: impl std::fmt::Display) -> Self {
        DatabaseError::DuplicateEntry(format!("{} with {} '{}' already exists", entity, field, value))
    }

    pub fn stale(entity: &'static str, id: impl std::fmt::Display, expected: u64) -> Self {
        DatabaseError::StaleVersion {
            entity,
            id: id.to_string(),
            expected,
        }
    }

    /// Wraps a value that failed to map into its domain type
    pub fn corrupt(what: impl std::fmt::Display) -> Self {
        DatabaseError::SerializationError(what.to_string())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, DatabaseError::NotFound { .. })
    }

    /// Checks if this error is a constraint violation
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            DatabaseError::DuplicateEntry(_)
                | DatabaseError::ForeignKeyViolation(_)
                | DatabaseError::ConstraintViolation(_)
        )
    }

    /// Checks if another writer got there first
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            DatabaseError::DuplicateEntry(_)
                | DatabaseError::SerializationFailure(_)
                | DatabaseError::StaleVersion { .. }
        )
    }

    /// Checks if this error is a connection-related issue
    pub fn is_connection_error(&self) -> bool {
        matches!(self, DatabaseError::ConnectionFailed(_) | DatabaseError::PoolExhausted)
    }
}

/// Maps SQLx errors to DatabaseError variants using the PostgreSQL error code
///
/// See <https://www.postgresql.org/docs/current/errcodes-appendix.html>.
impl From<sqlx::Error> for DatabaseError {
    fn from(error: sqlx::Error) -> Self {
        match &error {
            sqlx::Error::RowNotFound => DatabaseError::NotFound {
                entity: "Record",
                id: "unknown".to_string(),
            },
            sqlx::Error::PoolTimedOut => DatabaseError::PoolExhausted,
            sqlx::Error::PoolClosed | sqlx::Error::Io(_) | sqlx::Error::Tls(_) => {
                DatabaseError::ConnectionFailed(error.to_string())
            }
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                DatabaseError::SerializationError(error.to_string())
            }
            sqlx::Error::Database(db_err) => {
                let message = db_err.message().to_string();
                match db_err.code().as_deref() {
                    Some("23505") => DatabaseError::DuplicateEntry(message),
                    Some("23503") => DatabaseError::ForeignKeyViolation(message),
                    Some("23514") => DatabaseError::ConstraintViolation(message),
                    Some("40001") | Some("40P01") => DatabaseError::SerializationFailure(message),
                    _ => DatabaseError::QueryFailed(message),
                }
            }
            _ => DatabaseError::QueryFailed(error.to_string()),
        }
    }
}

impl From<serde_json::Error> for DatabaseError {
    fn from(error: serde_json::Error) -> Self {
        DatabaseError::SerializationError(error.to_string())
    }
}

/// Translates repository errors into port errors
///
/// Duplicate keys, serialization failures and stale versions all surface
/// as `Conflict`, which the billing service treats as a stale write.
impl From<DatabaseError> for PortError {
    fn from(error: DatabaseError) -> Self {
        match error {
            DatabaseError::NotFound { entity, id } => PortError::not_found(entity, id),
            DatabaseError::DuplicateEntry(_)
            | DatabaseError::SerializationFailure(_)
            | DatabaseError::StaleVersion { .. } => PortError::conflict(error.to_string()),
            DatabaseError::ForeignKeyViolation(_) | DatabaseError::ConstraintViolation(_) => {
                PortError::validation(error.to_string())
            }
            DatabaseError::ConnectionFailed(_) | DatabaseError::PoolExhausted => PortError::Connection {
                message: error.to_string(),
                source: Some(Box::new(error)),
            },
            DatabaseError::SerializationError(_) => PortError::transformation(error.to_string()),
            _ => PortError::Internal {
                message: error.to_string(),
                source: Some(Box::new(error)),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stale_version_maps_to_conflict() {
        let error = DatabaseError::stale("Bill", "BILL-1", 3);
        assert!(error.is_conflict());
        let port: PortError = error.into();
        assert!(port.is_conflict());
    }

    #[test]
    fn test_not_found_keeps_entity() {
        let port: PortError = DatabaseError::not_found("Bill", "BILL-9").into();
        assert!(port.is_not_found());
        assert!(port.to_string().contains("BILL-9"));
    }

    #[test]
    fn test_pool_exhaustion_is_transient() {
        let port: PortError = DatabaseError::PoolExhausted.into();
        assert!(port.is_transient());
    }

    #[test]
    fn test_row_not_found_classification() {
        let error = DatabaseError::from(sqlx::Error::RowNotFound);
        assert!(error.is_not_found());
    }

    #[test]
    fn test_corrupt_value_is_transformation_error() {
        let port: PortError = DatabaseError::corrupt("unknown currency 'XXX'").into();
        assert!(matches!(port, PortError::Transformation { .. }));
    }
}
