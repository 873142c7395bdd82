//! # Inventory Repository
//!
//! Outlet stock rows keyed by outlet + normalized material name, plus the
//! adjustment journal.
//!
//! ## Adjustment Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  adjust_in(conn, "o1", " Flour ", -200, Sale, "txn-1")                  │
//! │       │                                                                 │
//! │       ▼  material_key = "flour"                                         │
//! │  SELECT quantity FROM outlet_inventory_items                            │
//! │       │                                                                 │
//! │       ├── no row?  → Ok(None), nothing written (fail-open)              │
//! │       ▼                                                                 │
//! │  UPDATE quantity = quantity + delta    (Decimal math in Rust)           │
//! │  INSERT INTO inventory_adjustments (..., delta, reason, reference)      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Quantities are TEXT, so the addition happens in Rust inside the caller's
//! SQL transaction. The journal for a row always sums to its quantity.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::repository::decode_decimal;
use tally_core::inventory::{AdjustmentReason, InventoryAdjustment, OutletInventory};
use tally_core::{material_key, Money, OutletInventoryItem};

#[derive(Debug, FromRow)]
struct InventoryRow {
    id: String,
    outlet_id: String,
    material_name: String,
    quantity: String,
    min_stock: String,
    cost_per_unit: i64,
    is_cashier_operated: bool,
}

impl InventoryRow {
    fn into_item(self) -> DbResult<OutletInventoryItem> {
        Ok(OutletInventoryItem {
            quantity: decode_decimal("outlet_inventory_items.quantity", &self.quantity)?,
            min_stock: decode_decimal("outlet_inventory_items.min_stock", &self.min_stock)?,
            id: self.id,
            outlet_id: self.outlet_id,
            material_name: self.material_name,
            cost_per_unit: Money::from_minor(self.cost_per_unit),
            is_cashier_operated: self.is_cashier_operated,
        })
    }
}

#[derive(Debug, FromRow)]
struct AdjustmentRow {
    outlet_id: String,
    material_name: String,
    delta: String,
    reason: AdjustmentReason,
    reference: String,
    recorded_at: DateTime<Utc>,
}

impl AdjustmentRow {
    fn into_adjustment(self) -> DbResult<InventoryAdjustment> {
        Ok(InventoryAdjustment {
            delta: decode_decimal("inventory_adjustments.delta", &self.delta)?,
            outlet_id: self.outlet_id,
            material_name: self.material_name,
            reason: self.reason,
            reference: self.reference,
            recorded_at: self.recorded_at,
        })
    }
}

const ROW_COLUMNS: &str = r#"
    id, outlet_id, material_name, quantity, min_stock, cost_per_unit, is_cashier_operated
"#;

// =============================================================================
// Connection-Level Helpers
// =============================================================================

/// Creates an empty row unless one exists. Returns true when created.
pub(crate) async fn ensure_row_in(
    conn: &mut SqliteConnection,
    outlet_id: &str,
    material_name: &str,
) -> DbResult<bool> {
    let name = material_name.trim();
    let result = sqlx::query(
        r#"
        INSERT INTO outlet_inventory_items (
            id, outlet_id, material_name, material_key, quantity, min_stock,
            cost_per_unit, is_cashier_operated, updated_at
        ) VALUES (?1, ?2, ?3, ?4, '0', '0', 0, 0, ?5)
        ON CONFLICT(outlet_id, material_key) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(outlet_id)
    .bind(name)
    .bind(material_key(name))
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Applies `delta` to a row and journals it.
///
/// Returns the new quantity, or `None` without writing when the row does
/// not exist.
pub(crate) async fn adjust_in(
    conn: &mut SqliteConnection,
    outlet_id: &str,
    material_name: &str,
    delta: Decimal,
    reason: AdjustmentReason,
    reference: &str,
) -> DbResult<Option<Decimal>> {
    let key = material_key(material_name);
    let current: Option<(String, String)> = sqlx::query_as(
        r#"
        SELECT material_name, quantity FROM outlet_inventory_items
        WHERE outlet_id = ?1 AND material_key = ?2
        "#,
    )
    .bind(outlet_id)
    .bind(&key)
    .fetch_optional(&mut *conn)
    .await?;

    let Some((stored_name, quantity)) = current else {
        debug!(outlet_id = %outlet_id, material = %material_name, "No stock row, adjustment skipped");
        return Ok(None);
    };

    let updated = decode_decimal("outlet_inventory_items.quantity", &quantity)? + delta;
    let now = Utc::now();

    sqlx::query(
        r#"
        UPDATE outlet_inventory_items SET quantity = ?3, updated_at = ?4
        WHERE outlet_id = ?1 AND material_key = ?2
        "#,
    )
    .bind(outlet_id)
    .bind(&key)
    .bind(updated.to_string())
    .bind(now)
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO inventory_adjustments (
            outlet_id, material_name, material_key, delta, reason, reference, recorded_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
    )
    .bind(outlet_id)
    .bind(&stored_name)
    .bind(&key)
    .bind(delta.to_string())
    .bind(reason)
    .bind(reference)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(Some(updated))
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for outlet inventory operations.
#[derive(Debug, Clone)]
pub struct InventoryRepository {
    pool: SqlitePool,
}

impl InventoryRepository {
    /// Creates a new InventoryRepository.
    pub fn new(pool: SqlitePool) -> Self {
        InventoryRepository { pool }
    }

    /// Creates or reconfigures a row.
    ///
    /// A new row starts at zero and its quantity is journaled as an
    /// opening balance. An existing row only takes the static settings
    /// (min stock, cost, cashier flag); its quantity moves through
    /// [`adjust`](Self::adjust) alone.
    pub async fn upsert_row(&self, item: &OutletInventoryItem) -> DbResult<OutletInventoryItem> {
        let mut tx = self.pool.begin().await?;

        let created = ensure_row_in(&mut tx, &item.outlet_id, &item.material_name).await?;
        sqlx::query(
            r#"
            UPDATE outlet_inventory_items SET
                min_stock = ?3,
                cost_per_unit = ?4,
                is_cashier_operated = ?5,
                updated_at = ?6
            WHERE outlet_id = ?1 AND material_key = ?2
            "#,
        )
        .bind(&item.outlet_id)
        .bind(material_key(&item.material_name))
        .bind(item.min_stock.to_string())
        .bind(item.cost_per_unit.minor())
        .bind(item.is_cashier_operated)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        if created && !item.quantity.is_zero() {
            adjust_in(
                &mut tx,
                &item.outlet_id,
                &item.material_name,
                item.quantity,
                AdjustmentReason::Opening,
                "opening",
            )
            .await?;
        }
        tx.commit().await?;

        debug!(
            outlet_id = %item.outlet_id,
            material = %item.material_name,
            created,
            "Inventory row upserted"
        );

        self.get_row(&item.outlet_id, &item.material_name)
            .await?
            .ok_or_else(|| DbError::not_found("OutletInventoryItem", &item.material_name))
    }

    /// Row for `material_name` at `outlet_id` (trimmed, case-insensitive).
    pub async fn get_row(&self, outlet_id: &str, material_name: &str) -> DbResult<Option<OutletInventoryItem>> {
        let sql = format!(
            "SELECT {} FROM outlet_inventory_items WHERE outlet_id = ?1 AND material_key = ?2",
            ROW_COLUMNS
        );
        let row: Option<InventoryRow> = sqlx::query_as(&sql)
            .bind(outlet_id)
            .bind(material_key(material_name))
            .fetch_optional(&self.pool)
            .await?;

        row.map(InventoryRow::into_item).transpose()
    }

    pub async fn quantity_of(&self, outlet_id: &str, material_name: &str) -> DbResult<Option<Decimal>> {
        Ok(self.get_row(outlet_id, material_name).await?.map(|r| r.quantity))
    }

    /// All rows for an outlet, ordered by normalized name.
    pub async fn list_for_outlet(&self, outlet_id: &str) -> DbResult<Vec<OutletInventoryItem>> {
        let sql = format!(
            "SELECT {} FROM outlet_inventory_items WHERE outlet_id = ?1 ORDER BY material_key ASC",
            ROW_COLUMNS
        );
        let rows: Vec<InventoryRow> = sqlx::query_as(&sql)
            .bind(outlet_id)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(InventoryRow::into_item).collect()
    }

    /// Rows at or below their minimum stock.
    pub async fn low_stock(&self, outlet_id: &str) -> DbResult<Vec<OutletInventoryItem>> {
        let rows = self.list_for_outlet(outlet_id).await?;
        Ok(rows.into_iter().filter(|r| r.is_low()).collect())
    }

    /// Applies a single journaled adjustment in its own SQL transaction.
    pub async fn adjust(
        &self,
        outlet_id: &str,
        material_name: &str,
        delta: Decimal,
        reason: AdjustmentReason,
        reference: &str,
    ) -> DbResult<Option<Decimal>> {
        let mut tx = self.pool.begin().await?;
        let updated = adjust_in(&mut tx, outlet_id, material_name, delta, reason, reference).await?;
        tx.commit().await?;
        Ok(updated)
    }

    /// Journal entries for one row, oldest first.
    pub async fn journal(&self, outlet_id: &str, material_name: &str) -> DbResult<Vec<InventoryAdjustment>> {
        let rows: Vec<AdjustmentRow> = sqlx::query_as(
            r#"
            SELECT outlet_id, material_name, delta, reason, reference, recorded_at
            FROM inventory_adjustments
            WHERE outlet_id = ?1 AND material_key = ?2
            ORDER BY id ASC
            "#,
        )
        .bind(outlet_id)
        .bind(material_key(material_name))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(AdjustmentRow::into_adjustment).collect()
    }

    /// Journal entries written on behalf of one event id.
    pub async fn adjustments_for(&self, reference: &str) -> DbResult<Vec<InventoryAdjustment>> {
        let rows: Vec<AdjustmentRow> = sqlx::query_as(
            r#"
            SELECT outlet_id, material_name, delta, reason, reference, recorded_at
            FROM inventory_adjustments
            WHERE reference = ?1
            ORDER BY id ASC
            "#,
        )
        .bind(reference)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(AdjustmentRow::into_adjustment).collect()
    }

    /// Sum of journaled deltas for one row.
    pub async fn journaled_total(&self, outlet_id: &str, material_name: &str) -> DbResult<Decimal> {
        Ok(self
            .journal(outlet_id, material_name)
            .await?
            .iter()
            .map(|a| a.delta)
            .sum())
    }

    /// Loads every row into an in-memory store for a terminal.
    pub async fn load_snapshot(&self) -> DbResult<OutletInventory> {
        let sql = format!(
            "SELECT {} FROM outlet_inventory_items ORDER BY outlet_id, material_key",
            ROW_COLUMNS
        );
        let rows: Vec<InventoryRow> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;
        let items = rows
            .into_iter()
            .map(InventoryRow::into_item)
            .collect::<DbResult<Vec<_>>>()?;

        debug!(rows = items.len(), "Inventory snapshot loaded");
        Ok(OutletInventory::from_rows(items))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};
    use rust_decimal_macros::dec;
    use tally_core::inventory::InventoryStore;

    async fn repo() -> InventoryRepository {
        Database::new(DbConfig::in_memory()).await.unwrap().inventory()
    }

    fn flour(quantity: Decimal) -> OutletInventoryItem {
        OutletInventoryItem {
            quantity,
            min_stock: dec!(500),
            ..OutletInventoryItem::new("o1", "Flour")
        }
    }

    #[tokio::test]
    async fn test_upsert_journals_opening_balance() {
        let repo = repo().await;
        let row = repo.upsert_row(&flour(dec!(1000))).await.unwrap();
        assert_eq!(row.quantity, dec!(1000));

        // A second upsert only changes settings.
        let row = repo.upsert_row(&flour(dec!(5))).await.unwrap();
        assert_eq!(row.quantity, dec!(1000));
        assert_eq!(repo.journal("o1", "flour").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_lookup_is_trimmed_and_case_insensitive() {
        let repo = repo().await;
        repo.upsert_row(&flour(dec!(10))).await.unwrap();

        assert_eq!(repo.quantity_of("o1", "  FLOUR ").await.unwrap(), Some(dec!(10)));
        assert_eq!(repo.quantity_of("o2", "Flour").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_adjust_missing_row_is_noop() {
        let repo = repo().await;
        let result = repo
            .adjust("o1", "Sugar", dec!(-5), AdjustmentReason::Sale, "t1")
            .await
            .unwrap();

        assert_eq!(result, None);
        assert!(repo.journal("o1", "Sugar").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_journal_sums_to_quantity_and_negative_allowed() {
        let repo = repo().await;
        repo.upsert_row(&flour(dec!(100))).await.unwrap();
        repo.adjust("o1", "flour", dec!(-150.25), AdjustmentReason::Sale, "t1")
            .await
            .unwrap();
        repo.adjust("o1", "flour", dec!(20), AdjustmentReason::Purchase, "p1")
            .await
            .unwrap();

        let quantity = repo.quantity_of("o1", "flour").await.unwrap().unwrap();
        assert_eq!(quantity, dec!(-30.25));
        assert_eq!(repo.journaled_total("o1", "flour").await.unwrap(), quantity);
        assert_eq!(repo.adjustments_for("t1").await.unwrap()[0].reason, AdjustmentReason::Sale);
        assert_eq!(repo.low_stock("o1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_load_snapshot() {
        let repo = repo().await;
        repo.upsert_row(&flour(dec!(750))).await.unwrap();

        let store = repo.load_snapshot().await.unwrap();
        assert_eq!(store.quantity_of("o1", "Flour"), Some(dec!(750)));
        assert_eq!(store.journaled_total("o1", "Flour"), dec!(750));
    }
}
