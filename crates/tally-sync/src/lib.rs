//! # tally-sync: Write-Ahead Queue & Terminal Runtime for Tally POS
//!
//! Keeps a terminal selling while the durable store is slow or unreachable.
//! Every committed sale and stock event is written ahead to the
//! `sync_outbox` table and drained into the durable store in the background.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Terminal Runtime                                │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │  Terminal                                                        │  │
//! │  │  cart + checkout state machine + local stock (tally-core)        │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │ SyncPayload (COMMIT, PURCHASE, ...)    │
//! │  ┌────────────────────────────▼─────────────────────────────────────┐  │
//! │  │  SyncQueue                                                       │  │
//! │  │  sync_outbox rows, FIFO, attempts + last error per entry         │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │ drained by                              │
//! │  ┌────────────────────────────▼─────────────────────────────────────┐  │
//! │  │  SyncAgent                                                       │  │
//! │  │  tokio task: poll interval, manual trigger, exponential backoff  │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │ DurableStore::apply (idempotent)       │
//! │  ┌────────────────────────────▼─────────────────────────────────────┐  │
//! │  │  tally-db  (applied_commits dedup, inventory, transactions)      │  │
//! │  └──────────────────────────────────────────────────────────────────┘  │
//! │                                                                         │
//! │  STATUS EVENTS (SyncEventEmitter):                                     │
//! │  • status    - running, pending count, last error                      │
//! │  • progress  - entries delivered per drain                             │
//! │  • error     - drain failures                                          │
//! │  • escalation - entries stuck past the attempt threshold               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`terminal`] - Checkout + local stock + write-ahead enqueue
//! - [`queue`] - Outbox enqueue and drain
//! - [`store`] - Payload envelope and the `DurableStore` seam
//! - [`agent`] - Background drain task
//! - [`config`] - Terminal, outlet and sync settings (TOML + env)
//! - [`error`] - Sync error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tally_db::{Database, DbConfig};
//! use tally_sync::{SyncAgent, SyncConfig, SyncQueue, Terminal};
//!
//! let config = SyncConfig::load_or_default(None);
//! let db = Database::new(DbConfig::new("tally.db")).await?;
//!
//! let queue = SyncQueue::local(&db, &config.sync);
//! let handle = SyncAgent::new(config.clone(), queue.clone()).start();
//!
//! let terminal = Terminal::load(&db, queue, config.outlet_id())
//!     .await?
//!     .with_trigger(handle.trigger_handle());
//!
//! terminal.add_item("croissant", 2).await?;
//! let outcome = terminal.checkout(&request).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod agent;
pub mod config;
pub mod error;
pub mod queue;
pub mod store;
pub mod terminal;

// =============================================================================
// Re-exports
// =============================================================================

pub use agent::{NoOpEmitter, SyncAgent, SyncAgentHandle, SyncEventEmitter, SyncStatus};
pub use config::{OutletConfig, SyncConfig, SyncMode, SyncSettings, TerminalConfig};
pub use error::{SyncError, SyncResult};
pub use queue::{DrainReport, Escalation, SyncQueue};
pub use store::{DurableStore, SyncPayload};
pub use terminal::Terminal;
