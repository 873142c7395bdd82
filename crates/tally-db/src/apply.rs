//! # Idempotent Event Application
//!
//! The durable-store side of the offline sync queue. Each method applies one
//! client-generated event inside a single SQL transaction, guarded by the
//! `applied_commits` table.
//!
//! ## Replay Guard
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  BEGIN                                                                  │
//! │    INSERT INTO applied_commits (commit_id) ... ON CONFLICT DO NOTHING   │
//! │       │                                                                 │
//! │       ├── 0 rows? ──► ROLLBACK, return AlreadyApplied                   │
//! │       ▼                                                                 │
//! │    INSERT INTO transactions / purchases / ...                           │
//! │    adjust_in(...) per deduction      (missing rows skipped)             │
//! │    UPDATE customers SET points = points + delta                         │
//! │  COMMIT                                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A payload delivered twice therefore changes inventory once. A crash
//! between BEGIN and COMMIT leaves nothing behind, and the outbox retries.

use sqlx::SqliteConnection;
use tracing::{debug, info, warn};

use crate::error::{DbError, DbResult};
use crate::pool::Database;
use crate::repository::customer::adjust_points_in;
use crate::repository::events::{insert_production_in, insert_purchase_in, insert_transfer_in};
use crate::repository::inventory::{adjust_in, ensure_row_in};
use crate::repository::transaction::insert_in;
use tally_core::inventory::AdjustmentReason;
use tally_core::{CommitPayload, ProductionRecord, Purchase, StockDeduction, StockTransfer};

/// Result of applying an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// First delivery; all writes happened.
    Applied,
    /// The id was seen before; nothing changed.
    AlreadyApplied,
}

impl ApplyOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, ApplyOutcome::Applied)
    }
}

/// Claims `id` in the replay guard. False when it was already claimed.
async fn claim(conn: &mut SqliteConnection, id: &str, kind: &str) -> DbResult<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO applied_commits (commit_id, kind, applied_at)
        VALUES (?1, ?2, ?3)
        ON CONFLICT(commit_id) DO NOTHING
        "#,
    )
    .bind(id)
    .bind(kind)
    .bind(chrono::Utc::now())
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Applies named deductions; unnamed ones and missing rows are skipped.
async fn deduct_in(
    conn: &mut SqliteConnection,
    outlet_id: &str,
    deductions: &[StockDeduction],
    reason: AdjustmentReason,
    reference: &str,
) -> DbResult<usize> {
    let mut applied = 0;
    for deduction in deductions {
        let Some(name) = deduction.material_name.as_deref() else {
            continue;
        };
        if adjust_in(conn, outlet_id, name, -deduction.quantity, reason, reference)
            .await?
            .is_some()
        {
            applied += 1;
        }
    }
    Ok(applied)
}

impl Database {
    /// Whether an event id has already been applied.
    pub async fn is_applied(&self, id: &str) -> DbResult<bool> {
        let found: Option<String> =
            sqlx::query_scalar("SELECT commit_id FROM applied_commits WHERE commit_id = ?1")
                .bind(id)
                .fetch_optional(self.pool())
                .await?;
        Ok(found.is_some())
    }

    /// Applies a committed sale: the transaction row, its stock deductions
    /// and the customer's point delta, all or nothing.
    ///
    /// ## Errors
    /// `DbError::Payload` for a transaction that is not CLOSED. A
    /// transaction id already stored without a replay-guard row fails with
    /// `UniqueViolation`. See [`DbError::is_transient`] for what is worth
    /// retrying.
    pub async fn apply_commit(&self, payload: &CommitPayload) -> DbResult<ApplyOutcome> {
        let transaction = &payload.transaction;
        if !transaction.is_closed() {
            return Err(DbError::payload(
                "transactions.status",
                format!("transaction {} is not CLOSED", transaction.id),
            ));
        }

        let mut tx = self.pool().begin().await?;
        if !claim(&mut tx, &transaction.id, "COMMIT").await? {
            tx.rollback().await?;
            debug!(transaction_id = %transaction.id, "Commit already applied");
            return Ok(ApplyOutcome::AlreadyApplied);
        }

        insert_in(&mut tx, transaction).await?;
        let deducted = deduct_in(
            &mut tx,
            &transaction.outlet_id,
            &payload.deductions,
            AdjustmentReason::Sale,
            &transaction.id,
        )
        .await?;

        if let Some(customer_id) = &transaction.customer_id {
            if payload.customer_points_delta != 0
                && !adjust_points_in(&mut tx, customer_id, payload.customer_points_delta).await?
            {
                warn!(customer_id = %customer_id, "Unknown customer, points not credited");
            }
        }
        tx.commit().await?;

        info!(
            transaction_id = %transaction.id,
            outlet_id = %transaction.outlet_id,
            total = %transaction.total,
            discounts = %transaction.discount_total(),
            deducted,
            "Commit applied"
        );
        Ok(ApplyOutcome::Applied)
    }

    /// Applies a purchase, creating the stock row on first receipt.
    pub async fn apply_purchase(&self, purchase: &Purchase) -> DbResult<ApplyOutcome> {
        let mut tx = self.pool().begin().await?;
        if !claim(&mut tx, &purchase.id, "PURCHASE").await? {
            tx.rollback().await?;
            return Ok(ApplyOutcome::AlreadyApplied);
        }

        insert_purchase_in(&mut tx, purchase).await?;
        ensure_row_in(&mut tx, &purchase.outlet_id, &purchase.material_name).await?;
        adjust_in(
            &mut tx,
            &purchase.outlet_id,
            &purchase.material_name,
            purchase.quantity,
            AdjustmentReason::Purchase,
            &purchase.id,
        )
        .await?;
        tx.commit().await?;

        info!(purchase_id = %purchase.id, outlet_id = %purchase.outlet_id, "Purchase applied");
        Ok(ApplyOutcome::Applied)
    }

    /// Applies both legs of a transfer. Both rows are created if needed.
    pub async fn apply_transfer(&self, transfer: &StockTransfer) -> DbResult<ApplyOutcome> {
        if transfer.from_outlet_id == transfer.to_outlet_id {
            return Err(DbError::payload(
                "stock_transfers",
                "source and destination outlet are the same",
            ));
        }

        let mut tx = self.pool().begin().await?;
        if !claim(&mut tx, &transfer.id, "TRANSFER").await? {
            tx.rollback().await?;
            return Ok(ApplyOutcome::AlreadyApplied);
        }

        insert_transfer_in(&mut tx, transfer).await?;
        ensure_row_in(&mut tx, &transfer.from_outlet_id, &transfer.material_name).await?;
        ensure_row_in(&mut tx, &transfer.to_outlet_id, &transfer.material_name).await?;
        adjust_in(
            &mut tx,
            &transfer.from_outlet_id,
            &transfer.material_name,
            -transfer.quantity,
            AdjustmentReason::TransferOut,
            &transfer.id,
        )
        .await?;
        adjust_in(
            &mut tx,
            &transfer.to_outlet_id,
            &transfer.material_name,
            transfer.quantity,
            AdjustmentReason::TransferIn,
            &transfer.id,
        )
        .await?;
        tx.commit().await?;

        info!(
            transfer_id = %transfer.id,
            from = %transfer.from_outlet_id,
            to = %transfer.to_outlet_id,
            "Transfer applied"
        );
        Ok(ApplyOutcome::Applied)
    }

    /// Applies a production run: component deductions (already named and
    /// rounded by the terminal) and the result receipt.
    pub async fn apply_production(
        &self,
        record: &ProductionRecord,
        component_deductions: &[StockDeduction],
    ) -> DbResult<ApplyOutcome> {
        let mut tx = self.pool().begin().await?;
        if !claim(&mut tx, &record.id, "PRODUCTION").await? {
            tx.rollback().await?;
            return Ok(ApplyOutcome::AlreadyApplied);
        }

        insert_production_in(&mut tx, record).await?;
        deduct_in(
            &mut tx,
            &record.outlet_id,
            component_deductions,
            AdjustmentReason::ProductionOut,
            &record.id,
        )
        .await?;
        ensure_row_in(&mut tx, &record.outlet_id, &record.result_material_name).await?;
        adjust_in(
            &mut tx,
            &record.outlet_id,
            &record.result_material_name,
            record.result_quantity,
            AdjustmentReason::ProductionIn,
            &record.id,
        )
        .await?;
        tx.commit().await?;

        info!(production_id = %record.id, outlet_id = %record.outlet_id, "Production applied");
        Ok(ApplyOutcome::Applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DbConfig;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use tally_core::{
        Customer, Money, OutletInventoryItem, PaymentMethod, ProductionComponent, Transaction,
        TransactionLine, TransactionStatus,
    };

    async fn seeded() -> Database {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.inventory()
            .upsert_row(&OutletInventoryItem {
                quantity: dec!(1000),
                ..OutletInventoryItem::new("o1", "Flour")
            })
            .await
            .unwrap();
        db.customers()
            .upsert(&Customer { id: "c1".into(), name: "Wulan".into(), tier: None, points: 10 })
            .await
            .unwrap();
        db
    }

    fn payload(id: &str) -> CommitPayload {
        CommitPayload {
            transaction: Transaction {
                id: id.into(),
                outlet_id: "o1".into(),
                timestamp: Utc::now(),
                cashier_id: "u1".into(),
                cashier_name: "Sari".into(),
                lines: vec![TransactionLine {
                    product_id: "bread".into(),
                    name_snapshot: "Bread".into(),
                    unit_price: Money::from_minor(10_000),
                    quantity: 2,
                    line_total: Money::from_minor(20_000),
                }],
                subtotal: Money::from_minor(20_000),
                tier_discount: Money::zero(),
                bulk_discount: Money::zero(),
                point_discount: Money::zero(),
                total: Money::from_minor(20_000),
                payment_method: PaymentMethod::Cash,
                status: TransactionStatus::Closed,
                customer_id: Some("c1".into()),
                points_earned: 2,
                points_redeemed: 0,
            },
            deductions: vec![
                StockDeduction {
                    material_id: "flour".into(),
                    material_name: Some("Flour".into()),
                    quantity: dec!(200),
                },
                StockDeduction {
                    material_id: "yeast".into(),
                    material_name: Some("Yeast".into()),
                    quantity: dec!(4),
                },
                StockDeduction { material_id: "ghost".into(), material_name: None, quantity: dec!(1) },
            ],
            customer_points_delta: 2,
        }
    }

    #[tokio::test]
    async fn test_replay_changes_inventory_once() {
        let db = seeded().await;
        let commit = payload("t1");

        assert_eq!(db.apply_commit(&commit).await.unwrap(), ApplyOutcome::Applied);
        assert_eq!(db.apply_commit(&commit).await.unwrap(), ApplyOutcome::AlreadyApplied);

        assert_eq!(db.inventory().quantity_of("o1", "flour").await.unwrap(), Some(dec!(800)));
        assert_eq!(db.inventory().quantity_of("o1", "yeast").await.unwrap(), None);
        assert_eq!(db.transactions().count_for_outlet("o1").await.unwrap(), 1);
        assert_eq!(db.customers().get("c1").await.unwrap().unwrap().points, 12);
        assert!(db.is_applied("t1").await.unwrap());
    }

    #[tokio::test]
    async fn test_open_transaction_is_rejected_without_writes() {
        let db = seeded().await;
        let mut commit = payload("t1");
        commit.transaction.status = TransactionStatus::Open;

        assert!(matches!(db.apply_commit(&commit).await, Err(DbError::Payload { .. })));
        assert!(!db.is_applied("t1").await.unwrap());
        assert_eq!(db.inventory().quantity_of("o1", "flour").await.unwrap(), Some(dec!(1000)));
    }

    #[tokio::test]
    async fn test_purchase_creates_row_and_is_idempotent() {
        let db = seeded().await;
        let purchase = Purchase {
            id: "p1".into(),
            outlet_id: "o2".into(),
            material_name: "Sugar".into(),
            quantity: dec!(5),
            total_cost: Money::from_minor(50_000),
            supplier: None,
            staff: "Budi".into(),
            timestamp: Utc::now(),
        };

        assert!(db.apply_purchase(&purchase).await.unwrap().is_applied());
        assert!(!db.apply_purchase(&purchase).await.unwrap().is_applied());
        assert_eq!(db.inventory().quantity_of("o2", "sugar").await.unwrap(), Some(dec!(5)));
    }

    #[tokio::test]
    async fn test_transfer_legs_net_to_zero() {
        let db = seeded().await;
        let transfer = StockTransfer {
            id: "x1".into(),
            from_outlet_id: "o1".into(),
            to_outlet_id: "o2".into(),
            material_name: "flour".into(),
            quantity: dec!(300),
            staff: "Budi".into(),
            note: Some("weekend rush".into()),
            timestamp: Utc::now(),
        };

        db.apply_transfer(&transfer).await.unwrap();
        db.apply_transfer(&transfer).await.unwrap();

        let inventory = db.inventory();
        let from = inventory.quantity_of("o1", "Flour").await.unwrap().unwrap();
        let to = inventory.quantity_of("o2", "Flour").await.unwrap().unwrap();
        assert_eq!(from, dec!(700));
        assert_eq!(to, dec!(300));
        assert_eq!(from + to, dec!(1000));

        let deltas: rust_decimal::Decimal =
            inventory.adjustments_for("x1").await.unwrap().iter().map(|a| a.delta).sum();
        assert_eq!(deltas, dec!(0));
    }

    #[tokio::test]
    async fn test_production_consumes_and_yields() {
        let db = seeded().await;
        let record = ProductionRecord {
            id: "r1".into(),
            outlet_id: "o1".into(),
            result_material_name: "Dough".into(),
            result_quantity: dec!(3),
            components: vec![ProductionComponent { material_id: "flour".into(), quantity: dec!(600) }],
            staff: "Ayu".into(),
            timestamp: Utc::now(),
        };
        let deductions = vec![StockDeduction {
            material_id: "flour".into(),
            material_name: Some("Flour".into()),
            quantity: dec!(600),
        }];

        db.apply_production(&record, &deductions).await.unwrap();

        let inventory = db.inventory();
        assert_eq!(inventory.quantity_of("o1", "flour").await.unwrap(), Some(dec!(400)));
        assert_eq!(inventory.quantity_of("o1", "dough").await.unwrap(), Some(dec!(3)));
        assert_eq!(db.events().productions_for_outlet("o1", None, None).await.unwrap().len(), 1);
    }
}
