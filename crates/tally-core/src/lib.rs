//! # tally-core: Inventory Consistency & Transaction Ledger Engine
//!
//! Pure business logic for Tally POS. Nothing in this crate performs I/O;
//! every service takes the catalog and inventory snapshots it needs as
//! parameters and returns computed results.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Tally POS Architecture                           │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │            UI collaborators (catalog, cart, audit screens)      │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ tally-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   catalog ──► bom ──► inventory ──► pricing ──► checkout        │   │
//! │  │                 └──────────────► ledger (read-side view)        │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • NO LOGGING                │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ CommitPayload                          │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │      tally-sync (outbox + drain)  ──►  tally-db (SQLite)         │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`catalog`] - Products, combos, BOM templates, materials, categories
//! - [`bom`] - Recursive BOM resolution
//! - [`inventory`] - Outlet stock keyed by material name, journaled
//! - [`cart`] - The open cart of a terminal
//! - [`pricing`] - Outlet prices, tier/bulk/points discounts
//! - [`ledger`] - Derived movement ledger
//! - [`checkout`] - Checkout state machine
//! - [`money`] - Integer money and basis-point percentages
//! - [`types`] - Outlet-scoped records and event logs
//! - [`validation`] - Input validation
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use rust_decimal::Decimal;
//! use tally_core::bom::BomResolver;
//! use tally_core::catalog::{BomLine, Catalog, ComboItem, Product};
//! use tally_core::money::Money;
//!
//! let mut catalog = Catalog::new();
//! catalog.insert_product(Product::simple(
//!     "bread",
//!     "Bread",
//!     Money::from_minor(10_000),
//!     vec![BomLine { material_id: "flour".into(), qty: Decimal::from(100) }],
//! ));
//! catalog.insert_product(Product::combo(
//!     "duo",
//!     "Bread Duo",
//!     Money::from_minor(18_000),
//!     vec![ComboItem { product_id: "bread".into(), qty: Decimal::from(2) }],
//! ));
//!
//! let usages = BomResolver::new(&catalog).resolve_id("duo", Decimal::ONE).unwrap();
//! assert_eq!(usages[0].quantity, Decimal::from(200));
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod bom;
pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod error;
pub mod inventory;
pub mod ledger;
pub mod money;
pub mod pricing;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, PreconditionError, ValidationError};
pub use money::{Money, Percent};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum distinct lines in a single cart.
pub const MAX_CART_LINES: usize = 100;

/// Maximum quantity of a single cart line.
///
/// Catches typing 1000 instead of 10.
pub const MAX_LINE_QUANTITY: i64 = 999;
