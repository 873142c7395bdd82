//! # Durable Store
//!
//! The seam between the outbox drain and wherever payloads are made durable.
//! [`tally_db::Database`] is the production implementation; tests wrap it to
//! simulate outages.
//!
//! ## Outbox Envelope
//! ```text
//! sync_outbox.entity_type   sync_outbox.payload (JSON)
//! ───────────────────────   ──────────────────────────────────────────────
//! COMMIT                    { "kind": "COMMIT", "data": CommitPayload }
//! PURCHASE                  { "kind": "PURCHASE", "data": Purchase }
//! TRANSFER                  { "kind": "TRANSFER", "data": StockTransfer }
//! PRODUCTION                { "kind": "PRODUCTION",
//!                             "data": { "record": ..., "deductions": [...] } }
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use tally_core::{CommitPayload, ProductionRecord, Purchase, StockDeduction, StockTransfer};
use tally_db::{ApplyOutcome, Database};

use crate::error::{SyncError, SyncResult};

/// Every `sync_outbox.entity_type` this build can replay.
pub const ENTITY_TYPES: &[&str] = &["COMMIT", "PURCHASE", "TRANSFER", "PRODUCTION"];

/// A queued event, tagged by kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncPayload {
    Commit(CommitPayload),
    Purchase(Purchase),
    Transfer(StockTransfer),
    /// Component deductions are resolved and rounded on the terminal so the
    /// store needs no catalog.
    Production {
        record: ProductionRecord,
        deductions: Vec<StockDeduction>,
    },
}

impl SyncPayload {
    /// Value stored in `sync_outbox.entity_type`.
    pub fn entity_type(&self) -> &'static str {
        match self {
            SyncPayload::Commit(_) => "COMMIT",
            SyncPayload::Purchase(_) => "PURCHASE",
            SyncPayload::Transfer(_) => "TRANSFER",
            SyncPayload::Production { .. } => "PRODUCTION",
        }
    }

    /// Client-generated id; also the replay dedup key.
    pub fn entity_id(&self) -> &str {
        match self {
            SyncPayload::Commit(commit) => commit.commit_id(),
            SyncPayload::Purchase(purchase) => &purchase.id,
            SyncPayload::Transfer(transfer) => &transfer.id,
            SyncPayload::Production { record, .. } => &record.id,
        }
    }

    /// Decodes an outbox row from its `entity_type` and `payload` columns.
    ///
    /// A row written by a newer build fails with `UnknownEntityType`; a
    /// payload whose tag disagrees with its column fails to deserialize.
    pub fn decode(entry_id: &str, entity_type: &str, raw: &str) -> SyncResult<Self> {
        if !ENTITY_TYPES.contains(&entity_type) {
            return Err(SyncError::UnknownEntityType(entity_type.to_string()));
        }

        let payload: SyncPayload =
            serde_json::from_str(raw).map_err(|e| SyncError::DeserializationFailed {
                id: entry_id.to_string(),
                message: e.to_string(),
            })?;

        if payload.entity_type() != entity_type {
            return Err(SyncError::DeserializationFailed {
                id: entry_id.to_string(),
                message: format!("{} payload queued as {}", payload.entity_type(), entity_type),
            });
        }
        Ok(payload)
    }
}

/// Applies queued payloads durably and idempotently.
///
/// Implementations must treat a second delivery of the same
/// [`SyncPayload::entity_id`] as [`ApplyOutcome::AlreadyApplied`] without
/// side effects.
#[async_trait]
pub trait DurableStore: Send + Sync {
    async fn apply(&self, payload: &SyncPayload) -> SyncResult<ApplyOutcome>;
}

#[async_trait]
impl DurableStore for Database {
    async fn apply(&self, payload: &SyncPayload) -> SyncResult<ApplyOutcome> {
        let outcome = match payload {
            SyncPayload::Commit(commit) => self.apply_commit(commit).await?,
            SyncPayload::Purchase(purchase) => self.apply_purchase(purchase).await?,
            SyncPayload::Transfer(transfer) => self.apply_transfer(transfer).await?,
            SyncPayload::Production { record, deductions } => {
                self.apply_production(record, deductions).await?
            }
        };
        Ok(outcome)
    }
}
