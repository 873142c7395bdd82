//! # Customer Repository
//!
//! Customers, their membership tier and loyalty point balance.

use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use tally_core::{Customer, MembershipTier, Percent};

#[derive(Debug, FromRow)]
struct CustomerRow {
    id: String,
    name: String,
    tier_name: Option<String>,
    tier_discount_bps: Option<i64>,
    points: i64,
}

impl CustomerRow {
    fn into_customer(self) -> DbResult<Customer> {
        let tier = match (self.tier_name, self.tier_discount_bps) {
            (Some(name), Some(bps)) => {
                let bps = u32::try_from(bps).map_err(|e| DbError::payload("customers.tier_discount_bps", e))?;
                Some(MembershipTier {
                    name,
                    discount: Percent::from_bps(bps),
                })
            }
            _ => None,
        };

        Ok(Customer {
            id: self.id,
            name: self.name,
            tier,
            points: self.points,
        })
    }
}

/// Adds `delta` to a customer's points. Returns false for unknown customers.
pub(crate) async fn adjust_points_in(conn: &mut SqliteConnection, customer_id: &str, delta: i64) -> DbResult<bool> {
    let result = sqlx::query("UPDATE customers SET points = points + ?2 WHERE id = ?1")
        .bind(customer_id)
        .bind(delta)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Repository for customer operations.
#[derive(Debug, Clone)]
pub struct CustomerRepository {
    pool: SqlitePool,
}

impl CustomerRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CustomerRepository { pool }
    }

    pub async fn upsert(&self, customer: &Customer) -> DbResult<()> {
        debug!(id = %customer.id, "Upserting customer");

        sqlx::query(
            r#"
            INSERT INTO customers (id, name, tier_name, tier_discount_bps, points)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                tier_name = excluded.tier_name,
                tier_discount_bps = excluded.tier_discount_bps,
                points = excluded.points
            "#,
        )
        .bind(&customer.id)
        .bind(&customer.name)
        .bind(customer.tier.as_ref().map(|t| t.name.clone()))
        .bind(customer.tier.as_ref().map(|t| i64::from(t.discount.bps())))
        .bind(customer.points)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get(&self, id: &str) -> DbResult<Option<Customer>> {
        let row: Option<CustomerRow> = sqlx::query_as(
            "SELECT id, name, tier_name, tier_discount_bps, points FROM customers WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(CustomerRow::into_customer).transpose()
    }

    pub async fn list(&self) -> DbResult<Vec<Customer>> {
        let rows: Vec<CustomerRow> = sqlx::query_as(
            "SELECT id, name, tier_name, tier_discount_bps, points FROM customers ORDER BY name ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(CustomerRow::into_customer).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};

    #[tokio::test]
    async fn test_customer_round_trip_and_points() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.customers();
        let customer = Customer {
            id: "c1".into(),
            name: "Wulan".into(),
            tier: Some(MembershipTier {
                name: "Gold".into(),
                discount: Percent::from_percent(10),
            }),
            points: 120,
        };
        repo.upsert(&customer).await.unwrap();
        assert_eq!(repo.get("c1").await.unwrap(), Some(customer));

        let mut conn = db.pool().acquire().await.unwrap();
        assert!(adjust_points_in(&mut conn, "c1", -20).await.unwrap());
        assert!(!adjust_points_in(&mut conn, "nobody", 5).await.unwrap());
        drop(conn);

        assert_eq!(repo.get("c1").await.unwrap().unwrap().points, 100);
        assert_eq!(repo.list().await.unwrap().len(), 1);
    }
}
