//! # Transaction Repository
//!
//! Sale records. Written only through [`Database::apply_commit`](crate::Database::apply_commit)
//! so a sale row never exists without its stock deductions; read here for
//! receipts, reports and ledger rebuilds.
//!
//! ## Transaction Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Terminal checkout (in memory)  ──►  CLOSED Transaction + payload       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  sync_outbox  (write-ahead, same device)                                │
//! │       │                                                                 │
//! │       ▼  drain                                                          │
//! │  apply_commit  ──►  INSERT INTO transactions  (this table)              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use crate::repository::decode_json;
use tally_core::{Money, PaymentMethod, Transaction, TransactionLine, TransactionStatus};

#[derive(Debug, FromRow)]
struct TransactionRow {
    id: String,
    outlet_id: String,
    timestamp: DateTime<Utc>,
    cashier_id: String,
    cashier_name: String,
    lines: String,
    subtotal: i64,
    tier_discount: i64,
    bulk_discount: i64,
    point_discount: i64,
    total: i64,
    payment_method: PaymentMethod,
    status: TransactionStatus,
    customer_id: Option<String>,
    points_earned: i64,
    points_redeemed: i64,
}

impl TransactionRow {
    fn into_transaction(self) -> DbResult<Transaction> {
        let lines: Vec<TransactionLine> = decode_json("transactions.lines", &self.lines)?;
        Ok(Transaction {
            id: self.id,
            outlet_id: self.outlet_id,
            timestamp: self.timestamp,
            cashier_id: self.cashier_id,
            cashier_name: self.cashier_name,
            lines,
            subtotal: Money::from_minor(self.subtotal),
            tier_discount: Money::from_minor(self.tier_discount),
            bulk_discount: Money::from_minor(self.bulk_discount),
            point_discount: Money::from_minor(self.point_discount),
            total: Money::from_minor(self.total),
            payment_method: self.payment_method,
            status: self.status,
            customer_id: self.customer_id,
            points_earned: self.points_earned,
            points_redeemed: self.points_redeemed,
        })
    }
}

const SELECT_TRANSACTION: &str = r#"
    SELECT
        id, outlet_id, timestamp, cashier_id, cashier_name, lines,
        subtotal, tier_discount, bulk_discount, point_discount, total,
        payment_method, status, customer_id, points_earned, points_redeemed
    FROM transactions
"#;

/// Inserts a sale row on an open connection.
pub(crate) async fn insert_in(conn: &mut SqliteConnection, transaction: &Transaction) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO transactions (
            id, outlet_id, timestamp, cashier_id, cashier_name, lines,
            subtotal, tier_discount, bulk_discount, point_discount, total,
            payment_method, status, customer_id, points_earned, points_redeemed
        ) VALUES (
            ?1, ?2, ?3, ?4, ?5, ?6,
            ?7, ?8, ?9, ?10, ?11,
            ?12, ?13, ?14, ?15, ?16
        )
        "#,
    )
    .bind(&transaction.id)
    .bind(&transaction.outlet_id)
    .bind(transaction.timestamp)
    .bind(&transaction.cashier_id)
    .bind(&transaction.cashier_name)
    .bind(serde_json::to_string(&transaction.lines)?)
    .bind(transaction.subtotal.minor())
    .bind(transaction.tier_discount.minor())
    .bind(transaction.bulk_discount.minor())
    .bind(transaction.point_discount.minor())
    .bind(transaction.total.minor())
    .bind(transaction.payment_method)
    .bind(transaction.status)
    .bind(&transaction.customer_id)
    .bind(transaction.points_earned)
    .bind(transaction.points_redeemed)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Repository for sale transaction reads.
#[derive(Debug, Clone)]
pub struct TransactionRepository {
    pool: SqlitePool,
}

impl TransactionRepository {
    /// Creates a new TransactionRepository.
    pub fn new(pool: SqlitePool) -> Self {
        TransactionRepository { pool }
    }

    /// Gets a transaction by its client-generated id.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Transaction>> {
        let sql = format!("{} WHERE id = ?1", SELECT_TRANSACTION);
        let row: Option<TransactionRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(TransactionRow::into_transaction).transpose()
    }

    /// Transactions at an outlet, oldest first, optionally within
    /// `[from, until)`.
    pub async fn list_for_outlet(
        &self,
        outlet_id: &str,
        from: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> DbResult<Vec<Transaction>> {
        let sql = format!(
            r#"{}
            WHERE outlet_id = ?1
            AND (?2 IS NULL OR timestamp >= ?2)
            AND (?3 IS NULL OR timestamp < ?3)
            ORDER BY timestamp ASC, id ASC
            "#,
            SELECT_TRANSACTION
        );
        let rows: Vec<TransactionRow> = sqlx::query_as(&sql)
            .bind(outlet_id)
            .bind(from)
            .bind(until)
            .fetch_all(&self.pool)
            .await?;

        debug!(outlet_id = %outlet_id, count = rows.len(), "Transactions loaded");
        rows.into_iter().map(TransactionRow::into_transaction).collect()
    }

    /// Number of stored transactions at an outlet.
    pub async fn count_for_outlet(&self, outlet_id: &str) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM transactions WHERE outlet_id = ?1")
            .bind(outlet_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Sum of CLOSED totals at an outlet.
    pub async fn closed_total(&self, outlet_id: &str) -> DbResult<Money> {
        let total: Option<i64> = sqlx::query_scalar(
            "SELECT SUM(total) FROM transactions WHERE outlet_id = ?1 AND status = 'CLOSED'",
        )
        .bind(outlet_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(Money::from_minor(total.unwrap_or(0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};
    use chrono::Duration;

    fn sale(id: &str, outlet_id: &str, minutes_ago: i64) -> Transaction {
        Transaction {
            id: id.into(),
            outlet_id: outlet_id.into(),
            timestamp: Utc::now() - Duration::minutes(minutes_ago),
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
            customer_id: None,
            points_earned: 0,
            points_redeemed: 0,
        }
    }

    #[tokio::test]
    async fn test_insert_and_query_by_outlet_and_range() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        {
            let mut conn = db.pool().acquire().await.unwrap();
            insert_in(&mut conn, &sale("t1", "o1", 30)).await.unwrap();
            insert_in(&mut conn, &sale("t2", "o1", 5)).await.unwrap();
            insert_in(&mut conn, &sale("t3", "o2", 5)).await.unwrap();
        }

        let repo = db.transactions();
        let loaded = repo.get_by_id("t1").await.unwrap().unwrap();
        assert_eq!(loaded.lines.len(), 1);
        assert_eq!(loaded.status, TransactionStatus::Closed);
        assert_eq!(loaded.payment_method, PaymentMethod::Cash);

        let all = repo.list_for_outlet("o1", None, None).await.unwrap();
        assert_eq!(all.iter().map(|t| t.id.as_str()).collect::<Vec<_>>(), vec!["t1", "t2"]);

        let recent = repo
            .list_for_outlet("o1", Some(Utc::now() - Duration::minutes(10)), None)
            .await
            .unwrap();
        assert_eq!(recent.len(), 1);

        assert_eq!(repo.count_for_outlet("o2").await.unwrap(), 1);
        assert_eq!(repo.closed_total("o1").await.unwrap().minor(), 40_000);
    }
}
