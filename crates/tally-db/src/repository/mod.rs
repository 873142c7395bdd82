//! # Repository Module
//!
//! Database repository implementations for Tally POS.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Pattern Explained                         │
//! │                                                                         │
//! │  The Repository pattern abstracts database access behind a clean API.  │
//! │                                                                         │
//! │  Terminal / Sync agent                                                  │
//! │       │                                                                 │
//! │       │  db.inventory().list_for_outlet("outlet-1")                     │
//! │       │  ↓                                                              │
//! │       ▼                                                                 │
//! │  InventoryRepository                                                    │
//! │  ├── get_row(&self, outlet, name)                                       │
//! │  ├── upsert_row(&self, item)                                            │
//! │  └── adjust(&self, outlet, name, delta, reason, reference)              │
//! │       │                                                                 │
//! │       │  SQL Query                                                      │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! │                                                                         │
//! │  Writes that must land together (a sale and its deductions) go          │
//! │  through the `*_in` helpers, which take an open connection so the       │
//! │  caller controls the SQL transaction.                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`CatalogRepository`](catalog::CatalogRepository) - Products, materials, categories
//! - [`InventoryRepository`](inventory::InventoryRepository) - Outlet stock rows and journal
//! - [`TransactionRepository`](transaction::TransactionRepository) - Sale records
//! - [`EventRepository`](events::EventRepository) - Purchases, transfers, production
//! - [`CustomerRepository`](customer::CustomerRepository) - Customers and points
//! - [`SyncOutboxRepository`](sync::SyncOutboxRepository) - Sync queue management

pub mod catalog;
pub mod customer;
pub mod events;
pub mod inventory;
pub mod sync;
pub mod transaction;

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::de::DeserializeOwned;

use crate::error::{DbError, DbResult};

/// Parses a TEXT quantity column.
pub(crate) fn decode_decimal(field: &str, raw: &str) -> DbResult<Decimal> {
    Decimal::from_str(raw.trim()).map_err(|e| DbError::payload(field, e))
}

/// Parses a JSON TEXT column.
pub(crate) fn decode_json<T: DeserializeOwned>(field: &str, raw: &str) -> DbResult<T> {
    serde_json::from_str(raw).map_err(|e| DbError::payload(field, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_decode_decimal() {
        assert_eq!(decode_decimal("quantity", " 12.500 ").unwrap(), dec!(12.5));
        assert!(matches!(
            decode_decimal("quantity", "twelve"),
            Err(DbError::Payload { ref field, .. }) if field == "quantity"
        ));
    }
}
