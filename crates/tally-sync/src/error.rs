//! # Sync Error Types
//!
//! Error types for the sync queue, agent and terminal façade.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │   Durability    │  │     Payload             │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  StoreUnavail.  │  │  SerializationFailed    │ │
//! │  │  MissingTermId  │  │  Rejected       │  │  DeserializationFailed  │ │
//! │  │  ConfigLoad/Save│  │  DatabaseError  │  │  UnknownEntityType      │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────────────────────────────────┐  │
//! │  │    Domain       │  │      Internal                               │  │
//! │  │                 │  │                                             │  │
//! │  │  Core(CoreError)│  │  Internal                                   │  │
//! │  └─────────────────┘  └─────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use tally_core::CoreError;
use tally_db::DbError;
use thiserror::Error;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Sync error type covering all possible sync failures.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid sync configuration.
    #[error("Invalid sync configuration: {0}")]
    InvalidConfig(String),

    /// Missing terminal ID (required to tag outbox entries).
    #[error("Terminal ID not configured. Run initial setup first.")]
    MissingTerminalId,

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Durability Errors
    // =========================================================================
    /// The durable store could not be reached. Retried on the next drain.
    #[error("Durable store unavailable: {0}")]
    StoreUnavailable(String),

    /// The durable store refused the payload. Retrying will not help.
    #[error("Payload rejected: {0}")]
    Rejected(String),

    /// Local database failure (outbox read/write).
    #[error("Database error: {0}")]
    DatabaseError(String),

    // =========================================================================
    // Payload Errors
    // =========================================================================
    /// Failed to serialize a payload for the outbox.
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    /// A queued payload could not be decoded.
    #[error("Deserialization failed for outbox entry {id}: {message}")]
    DeserializationFailed { id: String, message: String },

    /// Outbox row carries an entity type this build cannot replay.
    #[error("Unknown entity type: {0}")]
    UnknownEntityType(String),

    // =========================================================================
    // Domain Errors
    // =========================================================================
    /// Checkout or stock-event failure from tally-core.
    #[error(transparent)]
    Core(#[from] CoreError),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Internal sync agent error.
    #[error("Internal error: {0}")]
    Internal(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

/// Unreachable or contended stores are retried; other transient failures
/// surface as `DatabaseError` (also retried). Anything the store will refuse
/// again on replay, such as a constraint violation or an undecodable
/// payload, becomes `Rejected` so the drain can skip past it.
impl From<DbError> for SyncError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::ConnectionFailed(msg) | DbError::Busy(msg) => SyncError::StoreUnavailable(msg),
            DbError::PoolExhausted => SyncError::StoreUnavailable("connection pool exhausted".into()),
            other if other.is_transient() => SyncError::DatabaseError(other.to_string()),
            other => SyncError::Rejected(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::SerializationFailed(err.to_string())
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization (for retry logic)
// =============================================================================

impl SyncError {
    /// Returns true if the drain should stop and retry this entry later.
    ///
    /// ## Retryable Errors
    /// - Durable store unreachable
    /// - Local database failures (busy, locked, I/O)
    ///
    /// ## Non-Retryable Errors
    /// - Rejected or undecodable payloads
    /// - Configuration errors
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::StoreUnavailable(_) | SyncError::DatabaseError(_)
        )
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig(_)
                | SyncError::MissingTerminalId
                | SyncError::ConfigLoadFailed(_)
                | SyncError::ConfigSaveFailed(_)
        )
    }
}
