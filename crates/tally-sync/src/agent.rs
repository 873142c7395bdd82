//! # Sync Agent
//!
//! Background task that drains the [`SyncQueue`] on start, on every poll
//! interval and whenever it is triggered (for example after reconnecting).
//!
//! ## Agent Loop
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        SyncAgent Loop                                   │
//! │                                                                         │
//! │   tokio::select! {                                                     │
//! │       interval.tick()     ──► drain (skipped while backing off,        │
//! │                               or when mode = offline)                  │
//! │       trigger.notified()  ──► drain now, ignoring backoff              │
//! │       shutdown_rx.recv()  ──► stop                                     │
//! │   }                                                                    │
//! │                                                                         │
//! │   drain clean       ──► backoff.reset(), purge old synced entries      │
//! │   drain interrupted ──► retry_at = now + backoff.next_backoff()        │
//! │   escalations       ──► emitter.emit_escalation(..)                    │
//! │                                                                         │
//! │  STATUS EVENTS (to the UI):                                            │
//! │  "sync://status"     - { pending, lastSync, consecutiveFailures }      │
//! │  "sync://progress"   - { pending: 5, synced: 100 }                     │
//! │  "sync://error"      - { message, retryable }                          │
//! │  "sync://escalation" - { entryId, entityId, attempts, lastError }      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, Notify, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::{SyncConfig, SyncMode};
use crate::error::{SyncError, SyncResult};
use crate::queue::{DrainReport, Escalation, SyncQueue};

/// Minimum time between purges of old synced entries.
const PURGE_INTERVAL: Duration = Duration::from_secs(60 * 60);

// =============================================================================
// Sync Status
// =============================================================================

/// Current sync status for external queries.
#[derive(Debug, Clone)]
pub struct SyncStatus {
    pub mode: SyncMode,

    /// Whether the background loop is running.
    pub is_running: bool,

    /// Entries still waiting in the outbox.
    pub pending_count: i64,

    /// Last drain that finished without a transient failure.
    pub last_sync: Option<DateTime<Utc>>,

    pub last_error: Option<String>,

    /// Interrupted drains since the last clean one.
    pub consecutive_failures: u32,
}

impl Default for SyncStatus {
    fn default() -> Self {
        SyncStatus {
            mode: SyncMode::Auto,
            is_running: false,
            pending_count: 0,
            last_sync: None,
            last_error: None,
            consecutive_failures: 0,
        }
    }
}

// =============================================================================
// Event Emitter Trait
// =============================================================================

/// Trait for emitting sync events to the UI layer.
pub trait SyncEventEmitter: Send + Sync {
    fn emit_status(&self, status: &SyncStatus);

    fn emit_progress(&self, pending: i64, synced: usize);

    fn emit_error(&self, message: &str, retryable: bool);

    /// An entry has failed often enough that an operator should look at it.
    fn emit_escalation(&self, escalation: &Escalation);
}

/// No-op event emitter for testing.
pub struct NoOpEmitter;

impl SyncEventEmitter for NoOpEmitter {
    fn emit_status(&self, _status: &SyncStatus) {}
    fn emit_progress(&self, _pending: i64, _synced: usize) {}
    fn emit_error(&self, _message: &str, _retryable: bool) {}
    fn emit_escalation(&self, _escalation: &Escalation) {}
}

// =============================================================================
// Sync Agent
// =============================================================================

/// Drives the sync queue in the background.
pub struct SyncAgent {
    config: Arc<SyncConfig>,
    queue: SyncQueue,
    status: Arc<RwLock<SyncStatus>>,
    emitter: Arc<dyn SyncEventEmitter>,
}

impl SyncAgent {
    pub fn new(config: SyncConfig, queue: SyncQueue) -> Self {
        Self::with_emitter(config, queue, Arc::new(NoOpEmitter))
    }

    /// Creates a new sync agent with a custom event emitter.
    pub fn with_emitter(
        config: SyncConfig,
        queue: SyncQueue,
        emitter: Arc<dyn SyncEventEmitter>,
    ) -> Self {
        let status = SyncStatus {
            mode: config.sync.mode,
            ..Default::default()
        };

        SyncAgent {
            config: Arc::new(config),
            queue,
            status: Arc::new(RwLock::new(status)),
            emitter,
        }
    }

    pub async fn status(&self) -> SyncStatus {
        self.status.read().await.clone()
    }

    /// Runs one drain pass and publishes the result.
    pub async fn drain_now(&self) -> SyncResult<DrainReport> {
        let result = self.queue.drain().await;
        let pending = self.queue.pending_count().await;

        let snapshot = {
            let mut s = self.status.write().await;
            if let Ok(pending) = &pending {
                s.pending_count = *pending;
            }

            match &result {
                Ok(report) if !report.interrupted => {
                    s.consecutive_failures = 0;
                    s.last_sync = Some(Utc::now());
                    s.last_error = report.last_error.clone();
                }
                Ok(report) => {
                    s.consecutive_failures += 1;
                    s.last_error = report.last_error.clone();
                }
                Err(e) => {
                    s.consecutive_failures += 1;
                    s.last_error = Some(e.to_string());
                }
            }
            s.clone()
        };

        match &result {
            Ok(report) => {
                for escalation in &report.escalations {
                    self.emitter.emit_escalation(escalation);
                }
                if let Some(message) = &report.last_error {
                    self.emitter.emit_error(message, report.interrupted);
                }
                self.emitter.emit_progress(snapshot.pending_count, report.delivered());
            }
            Err(e) => {
                error!(?e, "Drain failed");
                self.emitter.emit_error(&e.to_string(), e.is_retryable());
            }
        }
        self.emitter.emit_status(&snapshot);

        result
    }

    /// Spawns the background loop.
    pub fn start(self) -> SyncAgentHandle {
        let trigger = Arc::new(Notify::new());
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let status = self.status.clone();

        info!(
            terminal_id = %self.config.terminal_id(),
            outlet_id = %self.config.outlet_id(),
            mode = %self.config.mode(),
            "Starting sync agent"
        );

        let task = tokio::spawn(self.run(trigger.clone(), shutdown_rx));

        SyncAgentHandle {
            trigger,
            shutdown_tx,
            status,
            task,
        }
    }

    async fn run(self, trigger: Arc<Notify>, mut shutdown_rx: mpsc::Receiver<()>) {
        self.status.write().await.is_running = true;

        let mut interval = tokio::time::interval(self.config.sync.poll_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut backoff = self.create_backoff();
        let mut retry_at: Option<Instant> = None;
        let mut last_purge: Option<Instant> = None;

        loop {
            let forced = tokio::select! {
                _ = interval.tick() => false,
                _ = trigger.notified() => true,
                _ = shutdown_rx.recv() => {
                    info!("Sync agent received shutdown");
                    break;
                }
            };

            if !forced {
                if !self.config.is_sync_enabled() {
                    continue;
                }
                if retry_at.is_some_and(|at| Instant::now() < at) {
                    debug!("Backing off, skipping scheduled drain");
                    continue;
                }
            }

            match self.drain_now().await {
                Ok(report) if !report.interrupted => {
                    backoff.reset();
                    retry_at = None;

                    let purge_due = last_purge.map_or(true, |at| at.elapsed() >= PURGE_INTERVAL);
                    if purge_due {
                        last_purge = Some(Instant::now());
                        if let Err(e) = self.queue.purge_synced(self.config.sync.retention_days).await {
                            warn!(?e, "Failed to purge synced entries");
                        }
                    }
                }
                _ => {
                    if let Some(delay) = backoff.next_backoff() {
                        debug!(?delay, "Scheduling drain retry");
                        retry_at = Some(Instant::now() + delay);
                    }
                }
            }
        }

        self.status.write().await.is_running = false;
        info!("Sync agent stopped");
    }

    fn create_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.config.sync.initial_backoff(),
            max_interval: self.config.sync.max_backoff(),
            multiplier: 2.0,
            max_elapsed_time: None,
            ..Default::default()
        }
    }
}

// =============================================================================
// Agent Handle (for external control)
// =============================================================================

/// Handle for controlling a running [`SyncAgent`].
pub struct SyncAgentHandle {
    trigger: Arc<Notify>,
    shutdown_tx: mpsc::Sender<()>,
    status: Arc<RwLock<SyncStatus>>,
    task: JoinHandle<()>,
}

impl SyncAgentHandle {
    /// Requests an immediate drain, e.g. after the network comes back.
    pub fn trigger(&self) {
        self.trigger.notify_one();
    }

    /// The trigger itself, for components that request drains on their own.
    pub fn trigger_handle(&self) -> Arc<Notify> {
        self.trigger.clone()
    }

    pub async fn status(&self) -> SyncStatus {
        self.status.read().await.clone()
    }

    /// Signals the agent to stop and waits for the loop to exit.
    pub async fn shutdown(self) -> SyncResult<()> {
        // The loop may already be gone; the join below still reports it.
        let _ = self.shutdown_tx.send(()).await;
        self.task
            .await
            .map_err(|e| SyncError::Internal(format!("sync agent task failed: {}", e)))
    }
}
