//! # Database Migrations
//!
//! SQL files under `migrations/sqlite/` are embedded at compile time and
//! applied in filename order on connect. Applied versions are recorded in
//! `_sqlx_migrations`; a file is never edited once shipped, only followed
//! by `NNN_description.sql`.
//!
//! ```text
//! migrations/sqlite/
//! └── 001_initial_schema.sql   catalog, outlet inventory + journal,
//!                              event logs, transactions, sync_outbox,
//!                              applied_commits
//! ```

use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations/sqlite");

/// Tables the repositories and the commit applier cannot work without.
pub const REQUIRED_TABLES: &[&str] = &[
    "categories",
    "materials",
    "products",
    "outlet_inventory_items",
    "inventory_adjustments",
    "customers",
    "transactions",
    "purchases",
    "stock_transfers",
    "production_records",
    "sync_outbox",
    "applied_commits",
];

/// Applies pending migrations, then checks the required tables exist.
pub async fn run_migrations(pool: &SqlitePool) -> DbResult<()> {
    let (total, applied) = migration_status(pool).await?;
    debug!(total, applied, "Checking for pending migrations");

    MIGRATOR.run(pool).await?;
    verify_schema(pool).await?;

    info!(total, newly_applied = total.saturating_sub(applied), "Migrations complete");
    Ok(())
}

/// `(embedded, applied)` migration counts.
pub async fn migration_status(pool: &SqlitePool) -> DbResult<(usize, usize)> {
    let total = MIGRATOR.migrations.len();

    // Missing on a fresh file until the first run.
    let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations")
        .fetch_one(pool)
        .await
        .unwrap_or(0);

    Ok((total, applied as usize))
}

/// Fails with [`DbError::MigrationFailed`] naming any missing table.
pub async fn verify_schema(pool: &SqlitePool) -> DbResult<()> {
    let existing: Vec<String> =
        sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type = 'table'")
            .fetch_all(pool)
            .await?;

    let missing: Vec<&str> = REQUIRED_TABLES
        .iter()
        .copied()
        .filter(|table| !existing.iter().any(|name| name == table))
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(DbError::MigrationFailed(format!(
            "missing tables: {}",
            missing.join(", ")
        )))
    }
}
