//! # Store and Ledger Error Types
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  SQLite Error (sqlx::Error)         Rule violation (CoreError)         │
//! │       │                                   │                             │
//! │       ▼                                   │                             │
//! │  DbError ← categorised, retryable?        │                             │
//! │       │                                   │                             │
//! │       └──────────────┬────────────────────┘                             │
//! │                      ▼                                                  │
//! │  LedgerError (what every Ledger operation returns)                     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  CLI prints it / caller refetches and retries                          │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use tally_core::{CoreError, ValidationError};
use thiserror::Error;

/// Database operation errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// Entity not found in database.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Unique constraint violation.
    #[error("Duplicate {field}: '{value}' already exists")]
    UniqueViolation { field: String, value: String },

    /// Foreign key constraint violation.
    ///
    /// ## When This Occurs
    /// - Order for a seller that does not exist
    /// - Line for a product that does not exist
    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// A guarded update matched zero rows: another operation changed the
    /// row first. Refetch and retry.
    ///
    /// ## When This Occurs
    /// ```text
    /// Admin A reads order v3 ──┐
    /// Admin B reads order v3 ──┤
    /// Admin B approves  → v4   │
    /// Admin A approves (WHERE version = 3) → 0 rows → ConcurrentModification
    /// ```
    #[error("{entity} {id} was modified concurrently")]
    ConcurrentModification { entity: String, id: String },

    /// Transient store failure (pool timeout, closed pool, I/O, busy
    /// database). Nothing was committed; safe to retry the operation.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// Migration failed.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Internal database error.
    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Creates a ConcurrentModification error.
    pub fn concurrent(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::ConcurrentModification {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// True when retrying the whole operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DbError::ConcurrentModification { .. } | DbError::StoreUnavailable(_)
        )
    }
}

/// Convert sqlx errors to DbError.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::RowNotFound           → DbError::NotFound
/// sqlx::Error::Database (UNIQUE/FK)  → UniqueViolation / ForeignKeyViolation
/// sqlx::Error::Database (busy/lock)  → StoreUnavailable
/// PoolTimedOut / PoolClosed / Io     → StoreUnavailable
/// Other                              → DbError::Internal
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::NotFound {
                entity: "Record".to_string(),
                id: "unknown".to_string(),
            },

            sqlx::Error::Database(db_err) => {
                let msg = db_err.message();

                // UNIQUE constraint: "UNIQUE constraint failed: <table>.<column>"
                // FK constraint: "FOREIGN KEY constraint failed"
                // SQLITE_BUSY / SQLITE_LOCKED: "database is locked", "database table is locked"
                if msg.contains("UNIQUE constraint failed") {
                    let field = msg
                        .split("UNIQUE constraint failed: ")
                        .nth(1)
                        .unwrap_or("unknown")
                        .to_string();
                    DbError::UniqueViolation {
                        field,
                        value: "unknown".to_string(),
                    }
                } else if msg.contains("FOREIGN KEY constraint failed") {
                    DbError::ForeignKeyViolation {
                        message: msg.to_string(),
                    }
                } else if msg.contains("locked") || msg.contains("busy") {
                    DbError::StoreUnavailable(msg.to_string())
                } else {
                    DbError::QueryFailed(msg.to_string())
                }
            }

            sqlx::Error::PoolTimedOut => {
                DbError::StoreUnavailable("connection pool timed out".to_string())
            }

            sqlx::Error::PoolClosed => DbError::StoreUnavailable("pool is closed".to_string()),

            sqlx::Error::Io(io) => DbError::StoreUnavailable(io.to_string()),

            _ => DbError::Internal(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;

// =============================================================================
// Ledger Error
// =============================================================================

/// Errors returned by [`crate::Ledger`] operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// A ledger rule refused the operation (quantities, gating, debt bound).
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The store failed or a guarded update lost a race.
    #[error(transparent)]
    Store(#[from] DbError),

    /// The actor's role or ownership does not allow the operation.
    #[error("{actor} is not allowed to {action}")]
    Forbidden { actor: String, action: String },

    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },
}

impl LedgerError {
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        LedgerError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    pub fn forbidden(actor: impl Into<String>, action: impl Into<String>) -> Self {
        LedgerError::Forbidden {
            actor: actor.into(),
            action: action.into(),
        }
    }

    /// True exactly for `ConcurrentModification` and `StoreUnavailable`.
    pub fn is_retryable(&self) -> bool {
        match self {
            LedgerError::Store(err) => err.is_retryable(),
            _ => false,
        }
    }
}

impl From<ValidationError> for LedgerError {
    fn from(err: ValidationError) -> Self {
        LedgerError::Core(CoreError::Validation(err))
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(err: sqlx::Error) -> Self {
        LedgerError::Store(DbError::from(err))
    }
}

/// Result type for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(LedgerError::from(DbError::concurrent("Order", "o1")).is_retryable());
        assert!(LedgerError::from(DbError::StoreUnavailable("busy".into())).is_retryable());
        assert!(!LedgerError::from(DbError::not_found("Order", "o1")).is_retryable());
        assert!(!LedgerError::from(CoreError::EmptyOrder).is_retryable());
        assert!(!LedgerError::forbidden("seller s1", "approve orders").is_retryable());
    }

    #[test]
    fn test_pool_errors_are_store_unavailable() {
        assert!(matches!(
            DbError::from(sqlx::Error::PoolTimedOut),
            DbError::StoreUnavailable(_)
        ));
        assert!(matches!(
            DbError::from(sqlx::Error::PoolClosed),
            DbError::StoreUnavailable(_)
        ));
    }

    #[test]
    fn test_messages() {
        let err = LedgerError::forbidden("seller s1", "approve orders");
        assert_eq!(err.to_string(), "seller s1 is not allowed to approve orders");

        let err = LedgerError::from(DbError::concurrent("Order", "o1"));
        assert_eq!(err.to_string(), "Order o1 was modified concurrently");
    }
}
