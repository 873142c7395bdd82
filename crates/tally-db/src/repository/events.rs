//! # Stock Event Repository
//!
//! The three independent stock event logs: purchases, inter-outlet
//! transfers and production runs. Together with closed transactions they
//! are everything the movement ledger is rebuilt from.
//!
//! ## Ledger Inputs
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  purchases            ─┐                                                │
//! │  stock_transfers      ─┤  load_sources(outlet, from, until)             │
//! │  production_records   ─┤ ─────────────────────────────►  LedgerEvents   │
//! │  transactions (CLOSED)─┘                                    │           │
//! │                                                             ▼           │
//! │                               tally_core::ledger::build_ledger(..)      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Rows are written through [`Database::apply_purchase`](crate::Database::apply_purchase)
//! and friends so each event and its stock movement land together.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use crate::repository::transaction::TransactionRepository;
use crate::repository::{decode_decimal, decode_json};
use tally_core::catalog::Catalog;
use tally_core::ledger::{build_ledger, LedgerSources, MovementEntry};
use tally_core::{Money, ProductionComponent, ProductionRecord, Purchase, StockTransfer, Transaction};

// =============================================================================
// Rows
// =============================================================================

#[derive(Debug, FromRow)]
struct PurchaseRow {
    id: String,
    outlet_id: String,
    material_name: String,
    quantity: String,
    total_cost: i64,
    supplier: Option<String>,
    staff: String,
    timestamp: DateTime<Utc>,
}

impl PurchaseRow {
    fn into_purchase(self) -> DbResult<Purchase> {
        Ok(Purchase {
            quantity: decode_decimal("purchases.quantity", &self.quantity)?,
            id: self.id,
            outlet_id: self.outlet_id,
            material_name: self.material_name,
            total_cost: Money::from_minor(self.total_cost),
            supplier: self.supplier,
            staff: self.staff,
            timestamp: self.timestamp,
        })
    }
}

#[derive(Debug, FromRow)]
struct TransferRow {
    id: String,
    from_outlet_id: String,
    to_outlet_id: String,
    material_name: String,
    quantity: String,
    staff: String,
    note: Option<String>,
    timestamp: DateTime<Utc>,
}

impl TransferRow {
    fn into_transfer(self) -> DbResult<StockTransfer> {
        Ok(StockTransfer {
            quantity: decode_decimal("stock_transfers.quantity", &self.quantity)?,
            id: self.id,
            from_outlet_id: self.from_outlet_id,
            to_outlet_id: self.to_outlet_id,
            material_name: self.material_name,
            staff: self.staff,
            note: self.note,
            timestamp: self.timestamp,
        })
    }
}

#[derive(Debug, FromRow)]
struct ProductionRow {
    id: String,
    outlet_id: String,
    result_material_name: String,
    result_quantity: String,
    components: String,
    staff: String,
    timestamp: DateTime<Utc>,
}

impl ProductionRow {
    fn into_record(self) -> DbResult<ProductionRecord> {
        let components: Vec<ProductionComponent> =
            decode_json("production_records.components", &self.components)?;
        Ok(ProductionRecord {
            result_quantity: decode_decimal("production_records.result_quantity", &self.result_quantity)?,
            id: self.id,
            outlet_id: self.outlet_id,
            result_material_name: self.result_material_name,
            components,
            staff: self.staff,
            timestamp: self.timestamp,
        })
    }
}

// =============================================================================
// Connection-Level Inserts
// =============================================================================

pub(crate) async fn insert_purchase_in(conn: &mut SqliteConnection, purchase: &Purchase) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO purchases (
            id, outlet_id, material_name, quantity, total_cost, supplier, staff, timestamp
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
    )
    .bind(&purchase.id)
    .bind(&purchase.outlet_id)
    .bind(purchase.material_name.trim())
    .bind(purchase.quantity.to_string())
    .bind(purchase.total_cost.minor())
    .bind(&purchase.supplier)
    .bind(&purchase.staff)
    .bind(purchase.timestamp)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub(crate) async fn insert_transfer_in(conn: &mut SqliteConnection, transfer: &StockTransfer) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO stock_transfers (
            id, from_outlet_id, to_outlet_id, material_name, quantity, staff, note, timestamp
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
    )
    .bind(&transfer.id)
    .bind(&transfer.from_outlet_id)
    .bind(&transfer.to_outlet_id)
    .bind(transfer.material_name.trim())
    .bind(transfer.quantity.to_string())
    .bind(&transfer.staff)
    .bind(&transfer.note)
    .bind(transfer.timestamp)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub(crate) async fn insert_production_in(conn: &mut SqliteConnection, record: &ProductionRecord) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO production_records (
            id, outlet_id, result_material_name, result_quantity, components, staff, timestamp
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
    )
    .bind(&record.id)
    .bind(&record.outlet_id)
    .bind(record.result_material_name.trim())
    .bind(record.result_quantity.to_string())
    .bind(serde_json::to_string(&record.components)?)
    .bind(&record.staff)
    .bind(record.timestamp)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

// =============================================================================
// Ledger Inputs
// =============================================================================

/// Owned event logs for one outlet, loaded for a ledger build.
#[derive(Debug, Clone, Default)]
pub struct LedgerEvents {
    pub purchases: Vec<Purchase>,
    pub transfers: Vec<StockTransfer>,
    pub productions: Vec<ProductionRecord>,
    pub transactions: Vec<Transaction>,
}

impl LedgerEvents {
    pub fn sources(&self) -> LedgerSources<'_> {
        LedgerSources {
            purchases: &self.purchases,
            transfers: &self.transfers,
            productions: &self.productions,
            transactions: &self.transactions,
        }
    }

    /// Newest-first movement ledger for `outlet_id`.
    pub fn build_ledger(&self, catalog: &Catalog, outlet_id: &str) -> Vec<MovementEntry> {
        build_ledger(catalog, &self.sources(), outlet_id)
    }
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for stock event logs.
#[derive(Debug, Clone)]
pub struct EventRepository {
    pool: SqlitePool,
}

impl EventRepository {
    /// Creates a new EventRepository.
    pub fn new(pool: SqlitePool) -> Self {
        EventRepository { pool }
    }

    /// Purchases at an outlet within `[from, until)`, oldest first.
    pub async fn purchases_for_outlet(
        &self,
        outlet_id: &str,
        from: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> DbResult<Vec<Purchase>> {
        let rows: Vec<PurchaseRow> = sqlx::query_as(
            r#"
            SELECT id, outlet_id, material_name, quantity, total_cost, supplier, staff, timestamp
            FROM purchases
            WHERE outlet_id = ?1
            AND (?2 IS NULL OR timestamp >= ?2)
            AND (?3 IS NULL OR timestamp < ?3)
            ORDER BY timestamp ASC, id ASC
            "#,
        )
        .bind(outlet_id)
        .bind(from)
        .bind(until)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(PurchaseRow::into_purchase).collect()
    }

    /// Transfers sent from or received by an outlet within `[from, until)`.
    pub async fn transfers_for_outlet(
        &self,
        outlet_id: &str,
        from: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> DbResult<Vec<StockTransfer>> {
        let rows: Vec<TransferRow> = sqlx::query_as(
            r#"
            SELECT id, from_outlet_id, to_outlet_id, material_name, quantity, staff, note, timestamp
            FROM stock_transfers
            WHERE (from_outlet_id = ?1 OR to_outlet_id = ?1)
            AND (?2 IS NULL OR timestamp >= ?2)
            AND (?3 IS NULL OR timestamp < ?3)
            ORDER BY timestamp ASC, id ASC
            "#,
        )
        .bind(outlet_id)
        .bind(from)
        .bind(until)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TransferRow::into_transfer).collect()
    }

    /// Production runs at an outlet within `[from, until)`.
    pub async fn productions_for_outlet(
        &self,
        outlet_id: &str,
        from: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> DbResult<Vec<ProductionRecord>> {
        let rows: Vec<ProductionRow> = sqlx::query_as(
            r#"
            SELECT id, outlet_id, result_material_name, result_quantity, components, staff, timestamp
            FROM production_records
            WHERE outlet_id = ?1
            AND (?2 IS NULL OR timestamp >= ?2)
            AND (?3 IS NULL OR timestamp < ?3)
            ORDER BY timestamp ASC, id ASC
            "#,
        )
        .bind(outlet_id)
        .bind(from)
        .bind(until)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ProductionRow::into_record).collect()
    }

    /// Loads every event touching `outlet_id` within `[from, until)`.
    pub async fn load_sources(
        &self,
        outlet_id: &str,
        from: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> DbResult<LedgerEvents> {
        let events = LedgerEvents {
            purchases: self.purchases_for_outlet(outlet_id, from, until).await?,
            transfers: self.transfers_for_outlet(outlet_id, from, until).await?,
            productions: self.productions_for_outlet(outlet_id, from, until).await?,
            transactions: TransactionRepository::new(self.pool.clone())
                .list_for_outlet(outlet_id, from, until)
                .await?,
        };

        debug!(
            outlet_id = %outlet_id,
            purchases = events.purchases.len(),
            transfers = events.transfers.len(),
            productions = events.productions.len(),
            transactions = events.transactions.len(),
            "Ledger sources loaded"
        );
        Ok(events)
    }
}
