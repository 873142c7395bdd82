//! # Database Error Types
//!
//! Error types for database operations.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  SQLite Error (sqlx::Error)                                            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  DbError (this module) ← Adds context and categorization               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SyncError (tally-sync) ← Decides whether the drain retries             │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

/// Database operation errors.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// A UNIQUE index rejected the write. `field` is `table.column` as
    /// SQLite reports it.
    #[error("Duplicate {field}: '{value}' already exists")]
    UniqueViolation { field: String, value: String },

    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// Another connection, usually a second terminal on the same file,
    /// held the write lock past the busy timeout.
    #[error("Database is busy: {0}")]
    Busy(String),

    /// Pool could not connect, or has been closed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// SQL error, including CHECK constraints such as a transfer whose
    /// source and destination outlets match.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// A stored column could not be decoded (malformed BOM, combo or outbox
    /// JSON, a non-decimal quantity, an unknown unit code), or an incoming
    /// payload is not acceptable.
    #[error("Payload error in {field}: {message}")]
    Payload { field: String, message: String },

    #[error("Connection pool exhausted")]
    PoolExhausted,

    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    pub fn payload(field: impl Into<String>, message: impl ToString) -> Self {
        DbError::Payload {
            field: field.into(),
            message: message.to_string(),
        }
    }

    /// Whether the same operation may succeed if retried later.
    ///
    /// Lock contention, lost connections and I/O failures are transient.
    /// Constraint violations, missing rows, bad payloads and schema errors
    /// fail the same way on every retry.
    pub fn is_transient(&self) -> bool {
        match self {
            DbError::Busy(_)
            | DbError::ConnectionFailed(_)
            | DbError::PoolExhausted
            | DbError::Internal(_) => true,
            DbError::QueryFailed(msg) => !msg.contains("constraint failed"),
            DbError::NotFound { .. }
            | DbError::UniqueViolation { .. }
            | DbError::ForeignKeyViolation { .. }
            | DbError::MigrationFailed(_)
            | DbError::Payload { .. } => false,
        }
    }
}

/// ```text
/// RowNotFound                         → NotFound
/// Database("UNIQUE constraint ...")   → UniqueViolation
/// Database("FOREIGN KEY ...")         → ForeignKeyViolation
/// Database("database is locked")      → Busy
/// PoolTimedOut                        → PoolExhausted
/// PoolClosed                          → ConnectionFailed
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::not_found("Record", "unknown"),

            sqlx::Error::Database(db_err) => {
                let msg = db_err.message();
                if let Some(field) = msg.strip_prefix("UNIQUE constraint failed: ") {
                    DbError::UniqueViolation {
                        field: field.to_string(),
                        value: "unknown".to_string(),
                    }
                } else if msg.contains("FOREIGN KEY constraint failed") {
                    DbError::ForeignKeyViolation {
                        message: msg.to_string(),
                    }
                } else if msg.contains("database is locked") || msg.contains("database table is locked") {
                    DbError::Busy(msg.to_string())
                } else {
                    DbError::QueryFailed(msg.to_string())
                }
            }

            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,
            sqlx::Error::PoolClosed => DbError::ConnectionFailed("Pool is closed".to_string()),
            _ => DbError::Internal(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for DbError {
    fn from(err: serde_json::Error) -> Self {
        DbError::payload("json", err)
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_errors_become_payload_errors() {
        let err: DbError = serde_json::from_str::<Vec<i32>>("not json").unwrap_err().into();
        assert!(matches!(err, DbError::Payload { ref field, .. } if field == "json"));
    }

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        let err: DbError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, DbError::NotFound { .. }));
        assert_eq!(DbError::not_found("Product", "p1").to_string(), "Product not found: p1");
    }

    #[test]
    fn test_transient_errors() {
        assert!(DbError::Busy("database is locked".into()).is_transient());
        assert!(DbError::from(sqlx::Error::PoolClosed).is_transient());
        assert!(!DbError::payload("transactions.status", "OPEN").is_transient());
        assert!(!DbError::QueryFailed("CHECK constraint failed".into()).is_transient());
        assert!(DbError::QueryFailed("disk I/O error".into()).is_transient());
    }

    #[test]
    fn test_constraint_violations_are_permanent() {
        let unique = DbError::UniqueViolation {
            field: "transactions.id".into(),
            value: "unknown".into(),
        };
        assert!(!unique.is_transient());
        assert!(!DbError::ForeignKeyViolation { message: "FOREIGN KEY constraint failed".into() }.is_transient());
        assert!(!DbError::not_found("Transaction", "t1").is_transient());
        assert!(!DbError::QueryFailed("NOT NULL constraint failed: purchases.staff".into()).is_transient());
    }
}
