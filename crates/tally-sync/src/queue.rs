//! # Sync Queue
//!
//! Write-ahead outbox for committed events and the drain that moves them
//! into the durable store.
//!
//! ## Drain Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    sync_outbox (submission order)                       │
//! │                                                                         │
//! │  id | entity_type | entity_id | payload | attempts | synced_at          │
//! │  ───┼─────────────┼───────────┼─────────┼──────────┼────────────        │
//! │  a  │ COMMIT      │ t-001     │ {...}   │ 0        │ NULL               │
//! │  b  │ PURCHASE    │ p-001     │ {...}   │ 2        │ NULL               │
//! │  c  │ COMMIT      │ t-002     │ {...}   │ 0        │ NULL               │
//! └───────────────────────────────┬─────────────────────────────────────────┘
//!                                 │ get_pending(batch_size)
//!                                 ▼
//!   for each entry, oldest first:
//!     decode ──► DurableStore::apply
//!        Applied / AlreadyApplied  ──► mark_synced
//!        rejected (permanent)      ──► mark_failed, skip, keep going
//!        transient                 ──► mark_failed, STOP (order preserved)
//!     attempts >= escalate_after   ──► Escalation in the report
//! ```

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use tally_core::{CommitPayload, SyncOutboxEntry};
use tally_db::{ApplyOutcome, Database, SyncOutboxRepository};

use crate::config::SyncSettings;
use crate::error::SyncResult;
use crate::store::{DurableStore, SyncPayload};

// =============================================================================
// Drain Report
// =============================================================================

/// An entry that keeps failing and needs an operator's attention.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Escalation {
    pub entry_id: String,
    pub entity_type: String,
    pub entity_id: String,
    pub attempts: i64,
    pub last_error: String,
}

/// Outcome of one drain pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DrainReport {
    /// Applied for the first time.
    pub synced: usize,
    /// Acknowledged as replays; no effect.
    pub already_applied: usize,
    /// Attempts that failed this pass (transient or rejected).
    pub failed: usize,
    pub escalations: Vec<Escalation>,
    /// Message of the most recent failure in this pass.
    pub last_error: Option<String>,
    /// The pass stopped at a transient failure; later entries are untouched.
    pub interrupted: bool,
}

impl DrainReport {
    /// Entries that left the queue.
    pub fn delivered(&self) -> usize {
        self.synced + self.already_applied
    }

    /// True when nothing failed.
    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }
}

// =============================================================================
// Sync Queue
// =============================================================================

/// Outbox writer and drainer. Cheap to clone.
#[derive(Clone)]
pub struct SyncQueue {
    outbox: SyncOutboxRepository,
    store: Arc<dyn DurableStore>,
    batch_size: u32,
    escalate_after: i64,
}

impl SyncQueue {
    /// Queue over `db`'s outbox that drains into `store`.
    pub fn new(db: &Database, store: Arc<dyn DurableStore>, settings: &SyncSettings) -> Self {
        SyncQueue {
            outbox: db.sync_outbox(),
            store,
            batch_size: settings.batch_size.max(1),
            escalate_after: settings.escalate_after_attempts.max(1),
        }
    }

    /// Queue whose durable store is the same local database.
    pub fn local(db: &Database, settings: &SyncSettings) -> Self {
        Self::new(db, Arc::new(db.clone()), settings)
    }

    /// Writes a payload ahead to the outbox.
    pub async fn enqueue(&self, payload: &SyncPayload) -> SyncResult<SyncOutboxEntry> {
        let json = serde_json::to_string(payload)?;
        let entry = self
            .outbox
            .queue_for_sync(payload.entity_type(), payload.entity_id(), &json)
            .await?;

        debug!(
            entry_id = %entry.id,
            entity_type = %entry.entity_type,
            entity_id = %entry.entity_id,
            "Payload queued"
        );
        Ok(entry)
    }

    pub async fn enqueue_commit(&self, commit: &CommitPayload) -> SyncResult<SyncOutboxEntry> {
        self.enqueue(&SyncPayload::Commit(commit.clone())).await
    }

    pub async fn pending_count(&self) -> SyncResult<i64> {
        Ok(self.outbox.count_pending().await?)
    }

    /// Flushes pending entries in submission order.
    ///
    /// Stops at the first transient failure. Rejected entries are recorded
    /// and skipped for the rest of the pass so they cannot block the queue.
    /// Only outbox read/write failures surface as `Err`.
    pub async fn drain(&self) -> SyncResult<DrainReport> {
        let mut report = DrainReport::default();
        let mut skipped: HashSet<String> = HashSet::new();

        loop {
            let limit = self.batch_size.saturating_add(skipped.len() as u32);
            let entries: Vec<SyncOutboxEntry> = self
                .outbox
                .get_pending(limit)
                .await?
                .into_iter()
                .filter(|e| !skipped.contains(&e.id))
                .collect();

            if entries.is_empty() {
                break;
            }

            for entry in entries {
                match self.deliver(&entry).await {
                    Ok(outcome) => {
                        self.outbox.mark_synced(&entry.id).await?;
                        match outcome {
                            ApplyOutcome::Applied => report.synced += 1,
                            ApplyOutcome::AlreadyApplied => report.already_applied += 1,
                        }
                    }
                    Err(err) => {
                        let message = err.to_string();
                        let attempts = self.outbox.mark_failed(&entry.id, &message).await?;
                        report.failed += 1;
                        report.last_error = Some(message.clone());

                        if attempts >= self.escalate_after {
                            warn!(
                                entry_id = %entry.id,
                                entity_id = %entry.entity_id,
                                attempts,
                                error = %message,
                                "Outbox entry escalated"
                            );
                            report.escalations.push(Escalation {
                                entry_id: entry.id.clone(),
                                entity_type: entry.entity_type.clone(),
                                entity_id: entry.entity_id.clone(),
                                attempts,
                                last_error: message.clone(),
                            });
                        }

                        if err.is_retryable() {
                            warn!(entry_id = %entry.id, attempts, error = %message, "Drain interrupted");
                            report.interrupted = true;
                            return Ok(report);
                        }

                        warn!(entry_id = %entry.id, error = %message, "Outbox entry rejected");
                        skipped.insert(entry.id);
                    }
                }
            }
        }

        if report.delivered() > 0 || report.failed > 0 {
            info!(
                synced = report.synced,
                already_applied = report.already_applied,
                failed = report.failed,
                "Drain complete"
            );
        }
        Ok(report)
    }

    async fn deliver(&self, entry: &SyncOutboxEntry) -> SyncResult<ApplyOutcome> {
        let payload = SyncPayload::decode(&entry.id, &entry.entity_type, &entry.payload)?;
        self.store.apply(&payload).await
    }

    /// Entries at or past the escalation threshold that are still queued.
    pub async fn escalated(&self) -> SyncResult<Vec<SyncOutboxEntry>> {
        Ok(self.outbox.stuck_entries(self.escalate_after).await?)
    }

    /// Deletes synced entries older than `retention_days`. 0 disables.
    pub async fn purge_synced(&self, retention_days: u32) -> SyncResult<u64> {
        if retention_days == 0 {
            return Ok(0);
        }
        let purged = self.outbox.cleanup_old_entries(retention_days).await?;
        if purged > 0 {
            info!(purged, retention_days, "Purged synced outbox entries");
        }
        Ok(purged)
    }
}

// =============================================================================
// Tests
// =============================================================================
