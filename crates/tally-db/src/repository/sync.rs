//! # Sync Outbox Repository
//!
//! Manages the sync outbox queue for offline-first synchronization.
//!
//! ## The Outbox Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Outbox Pattern Implementation                        │
//! │                                                                         │
//! │  LOCAL OPERATION (checkout committed in memory)                         │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  INSERT INTO sync_outbox (entity_type, entity_id, payload)      │   │
//! │  │  VALUES ('COMMIT', <transaction id>, <CommitPayload JSON>)      │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │            BACKGROUND SYNC WORKER (async)                       │   │
//! │  │                                                                 │   │
//! │  │  1. SELECT * FROM sync_outbox WHERE synced_at IS NULL          │   │
//! │  │                                                                 │   │
//! │  │  2. For each entry, in submission order:                       │   │
//! │  │     a. Apply to the durable store (idempotent)                 │   │
//! │  │     b. On success: UPDATE sync_outbox SET synced_at = NOW()    │   │
//! │  │     c. On failure: UPDATE sync_outbox SET attempts += 1,       │   │
//! │  │                    last_error = ?                              │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  KEY GUARANTEES:                                                       │
//! │  • Sale is never lost (it's in the local outbox)                       │
//! │  • Never duplicated (the store dedups on the transaction id)           │
//! │  • Store unreachable? Entries queue up                                 │
//! │  • Reachable again? Worker drains pending entries                      │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Duration, Utc};
use sqlx::{FromRow, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::DbResult;
use tally_core::SyncOutboxEntry;

#[derive(Debug, FromRow)]
struct OutboxRow {
    id: String,
    entity_type: String,
    entity_id: String,
    payload: String,
    attempts: i64,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
    attempted_at: Option<DateTime<Utc>>,
    synced_at: Option<DateTime<Utc>>,
}

impl From<OutboxRow> for SyncOutboxEntry {
    fn from(row: OutboxRow) -> Self {
        SyncOutboxEntry {
            id: row.id,
            entity_type: row.entity_type,
            entity_id: row.entity_id,
            payload: row.payload,
            attempts: row.attempts,
            last_error: row.last_error,
            created_at: row.created_at,
            attempted_at: row.attempted_at,
            synced_at: row.synced_at,
        }
    }
}

const SELECT_ENTRY: &str = r#"
    SELECT id, entity_type, entity_id, payload, attempts, last_error,
           created_at, attempted_at, synced_at
    FROM sync_outbox
"#;

/// Repository for sync outbox operations.
#[derive(Debug, Clone)]
pub struct SyncOutboxRepository {
    pool: SqlitePool,
}

impl SyncOutboxRepository {
    /// Creates a new SyncOutboxRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SyncOutboxRepository { pool }
    }

    /// Queues an entity for synchronization.
    ///
    /// ## Arguments
    /// * `entity_type` - Type of entity: "COMMIT", "PURCHASE", "TRANSFER", "PRODUCTION"
    /// * `entity_id` - The entity's client-generated UUID
    /// * `payload` - JSON serialization of the full entity
    ///
    /// ## Example
    /// ```rust,ignore
    /// let payload = serde_json::to_string(&commit)?;
    /// repo.queue_for_sync("COMMIT", commit.commit_id(), &payload).await?;
    /// ```
    pub async fn queue_for_sync(
        &self,
        entity_type: &str,
        entity_id: &str,
        payload: &str,
    ) -> DbResult<SyncOutboxEntry> {
        debug!(
            entity_type = %entity_type,
            entity_id = %entity_id,
            "Queuing for sync"
        );

        let entry = SyncOutboxEntry {
            id: Uuid::new_v4().to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            payload: payload.to_string(),
            attempts: 0,
            last_error: None,
            created_at: Utc::now(),
            attempted_at: None,
            synced_at: None,
        };

        sqlx::query(
            r#"
            INSERT INTO sync_outbox (
                id, entity_type, entity_id, payload,
                attempts, last_error, created_at, attempted_at, synced_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.entity_type)
        .bind(&entry.entity_id)
        .bind(&entry.payload)
        .bind(entry.attempts)
        .bind(&entry.last_error)
        .bind(entry.created_at)
        .bind(entry.attempted_at)
        .bind(entry.synced_at)
        .execute(&self.pool)
        .await?;

        Ok(entry)
    }

    pub async fn get(&self, id: &str) -> DbResult<Option<SyncOutboxEntry>> {
        let sql = format!("{} WHERE id = ?1", SELECT_ENTRY);
        let row: Option<OutboxRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(SyncOutboxEntry::from))
    }

    /// Gets pending entries that need to be synced.
    ///
    /// ## Arguments
    /// * `limit` - Maximum entries to return
    ///
    /// ## Returns
    /// Entries where `synced_at IS NULL`, in submission order. Rows queued
    /// within the same clock tick keep their insertion order.
    pub async fn get_pending(&self, limit: u32) -> DbResult<Vec<SyncOutboxEntry>> {
        let sql = format!(
            "{} WHERE synced_at IS NULL ORDER BY created_at ASC, rowid ASC LIMIT ?1",
            SELECT_ENTRY
        );
        let rows: Vec<OutboxRow> = sqlx::query_as(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(SyncOutboxEntry::from).collect())
    }

    /// Marks an entry as successfully synced.
    pub async fn mark_synced(&self, id: &str) -> DbResult<()> {
        sqlx::query(
            r#"
            UPDATE sync_outbox SET
                synced_at = ?2,
                attempted_at = ?2
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Records a sync failure. The entry stays pending.
    ///
    /// ## Returns
    /// The attempt count after this failure.
    pub async fn mark_failed(&self, id: &str, error: &str) -> DbResult<i64> {
        let attempts: i64 = sqlx::query_scalar(
            r#"
            UPDATE sync_outbox SET
                attempts = attempts + 1,
                last_error = ?2,
                attempted_at = ?3
            WHERE id = ?1
            RETURNING attempts
            "#,
        )
        .bind(id)
        .bind(error)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        Ok(attempts)
    }

    /// Counts pending sync entries.
    pub async fn count_pending(&self) -> DbResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM sync_outbox WHERE synced_at IS NULL")
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }

    /// Pending entries that have failed at least `min_attempts` times.
    pub async fn stuck_entries(&self, min_attempts: i64) -> DbResult<Vec<SyncOutboxEntry>> {
        let sql = format!(
            "{} WHERE synced_at IS NULL AND attempts >= ?1 ORDER BY created_at ASC, rowid ASC",
            SELECT_ENTRY
        );
        let rows: Vec<OutboxRow> = sqlx::query_as(&sql)
            .bind(min_attempts)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(SyncOutboxEntry::from).collect())
    }

    /// Deletes old synced entries (cleanup).
    ///
    /// ## Arguments
    /// * `days_old` - Delete entries synced more than this many days ago
    ///
    /// ## Returns
    /// Number of deleted entries.
    pub async fn cleanup_old_entries(&self, days_old: u32) -> DbResult<u64> {
        let cutoff = Utc::now() - Duration::days(i64::from(days_old));
        let result = sqlx::query(
            r#"
            DELETE FROM sync_outbox
            WHERE synced_at IS NOT NULL
            AND synced_at < ?1
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
