//! # tally-db: Durable Store for Tally POS
//!
//! SQLite persistence for the catalog, outlet stock, sales, stock events,
//! customers and the sync outbox. Runtime sqlx queries, no build-time
//! DATABASE_URL.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Tally POS Data Flow                              │
//! │                                                                         │
//! │  tally-sync (SyncQueue drain / Terminal reads)                          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     tally-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐   │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │   │   │
//! │  │   │   (pool.rs)   │    │  catalog      │    │  (embedded)  │   │   │
//! │  │   │               │    │  inventory    │    │              │   │   │
//! │  │   │ SqlitePool    │◄───│  transaction  │    │ 001_initial  │   │   │
//! │  │   │ apply_*       │    │  events, sync │    │              │   │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘   │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database (WAL)                       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations
//! - [`apply`] - Idempotent application of synced events
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tally_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("path/to/tally.db")).await?;
//!
//! let catalog = db.catalog().load_catalog().await?;
//! let stock = db.inventory().load_snapshot().await?;
//!
//! // Replays are harmless
//! db.apply_commit(&payload).await?;
//! db.apply_commit(&payload).await?; // ApplyOutcome::AlreadyApplied
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod apply;
pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use apply::ApplyOutcome;
pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::catalog::CatalogRepository;
pub use repository::customer::CustomerRepository;
pub use repository::events::{EventRepository, LedgerEvents};
pub use repository::inventory::InventoryRepository;
pub use repository::sync::SyncOutboxRepository;
pub use repository::transaction::TransactionRepository;
