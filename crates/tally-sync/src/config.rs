//! # Sync Configuration
//!
//! Configuration management for the terminal and its sync queue.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     TALLY_SYNC_MODE=offline                                            │
//! │     TALLY_TERMINAL_ID=till-2                                           │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/tally-pos/sync.toml (Linux)                              │
//! │     ~/Library/Application Support/com.tally.pos/sync.toml (macOS)      │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     SyncMode::Auto, auto-generated terminal id                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # sync.toml
//! [terminal]
//! id = "550e8400-e29b-41d4-a716-446655440000"
//! name = "Front Till"
//!
//! [outlet]
//! id = "outlet-central"
//! name = "Central Bakery"
//!
//! [sync]
//! mode = "auto"  # auto | offline
//! batch_size = 100
//! poll_interval_secs = 5
//! escalate_after_attempts = 5
//! retention_days = 30
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{SyncError, SyncResult};

// =============================================================================
// Sync Mode
// =============================================================================

/// Whether the background agent drains on its own.
///
/// ```text
/// AUTO (Default)                       OFFLINE
/// ──────────────                       ───────
/// • Drains on start, on every poll     • Commits still queue locally
///   interval and on explicit trigger   • Drains only on explicit trigger
/// • Backs off after failed drains      • For isolated or test setups
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    #[default]
    Auto,
    Offline,
}

impl SyncMode {
    /// Returns true if the agent drains on its poll interval.
    pub fn is_sync_enabled(&self) -> bool {
        !matches!(self, SyncMode::Offline)
    }
}

impl std::fmt::Display for SyncMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncMode::Auto => write!(f, "auto"),
            SyncMode::Offline => write!(f, "offline"),
        }
    }
}

impl std::str::FromStr for SyncMode {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" | "online" => Ok(SyncMode::Auto),
            "offline" | "disabled" => Ok(SyncMode::Offline),
            other => Err(SyncError::InvalidConfig(format!(
                "Unknown sync mode: '{}'. Valid options: auto, offline",
                other
            ))),
        }
    }
}

// =============================================================================
// Terminal Configuration
// =============================================================================

/// Identity of this terminal (one cashier station).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerminalConfig {
    /// Unique terminal identifier. Auto-generated on first run.
    pub id: String,

    /// Human-readable name, e.g. "Front Till".
    #[serde(default = "default_terminal_name")]
    pub name: String,
}

fn default_terminal_name() -> String {
    "POS Terminal".to_string()
}

impl Default for TerminalConfig {
    fn default() -> Self {
        TerminalConfig {
            id: Uuid::new_v4().to_string(),
            name: default_terminal_name(),
        }
    }
}

// =============================================================================
// Outlet Configuration
// =============================================================================

/// The outlet this terminal sells from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutletConfig {
    pub id: String,

    #[serde(default)]
    pub name: String,
}

impl Default for OutletConfig {
    fn default() -> Self {
        OutletConfig {
            id: "default-outlet".to_string(),
            name: "Default Outlet".to_string(),
        }
    }
}

// =============================================================================
// Sync Settings
// =============================================================================

/// Drain behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    #[serde(default)]
    pub mode: SyncMode,

    /// Outbox entries fetched per drain batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// Interval between background drains (seconds).
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// First retry delay after a failed drain (milliseconds).
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Ceiling for the retry delay (seconds).
    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,

    /// Failed attempts after which an entry is escalated to the operator.
    #[serde(default = "default_escalate_after")]
    pub escalate_after_attempts: i64,

    /// Synced entries older than this are purged. 0 keeps them forever.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

fn default_batch_size() -> u32 {
    100
}
fn default_poll_interval() -> u64 {
    5
}
fn default_initial_backoff() -> u64 {
    500
}
fn default_max_backoff() -> u64 {
    60
}
fn default_escalate_after() -> i64 {
    5
}
fn default_retention_days() -> u32 {
    30
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            mode: SyncMode::default(),
            batch_size: default_batch_size(),
            poll_interval_secs: default_poll_interval(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_secs: default_max_backoff(),
            escalate_after_attempts: default_escalate_after(),
            retention_days: default_retention_days(),
        }
    }
}

impl SyncSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_secs)
    }
}

// =============================================================================
// Main Sync Configuration
// =============================================================================

/// Complete terminal configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub terminal: TerminalConfig,

    #[serde(default)]
    pub outlet: OutletConfig,

    #[serde(default)]
    pub sync: SyncSettings,
}

impl SyncConfig {
    /// Creates a new config with defaults and a generated terminal ID.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (sync.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading sync config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load sync config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> SyncResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| SyncError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Sync config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        if self.terminal.id.trim().is_empty() {
            return Err(SyncError::MissingTerminalId);
        }

        if self.outlet.id.trim().is_empty() {
            return Err(SyncError::InvalidConfig("outlet id must not be empty".into()));
        }

        if self.sync.batch_size == 0 {
            return Err(SyncError::InvalidConfig(
                "batch_size must be greater than 0".into(),
            ));
        }

        if self.sync.poll_interval_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "poll_interval_secs must be greater than 0".into(),
            ));
        }

        if self.sync.escalate_after_attempts < 1 {
            return Err(SyncError::InvalidConfig(
                "escalate_after_attempts must be at least 1".into(),
            ));
        }

        if self.sync.initial_backoff() > self.sync.max_backoff() {
            return Err(SyncError::InvalidConfig(format!(
                "initial_backoff_ms ({}) exceeds max_backoff_secs ({})",
                self.sync.initial_backoff_ms, self.sync.max_backoff_secs
            )));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(id) = std::env::var("TALLY_TERMINAL_ID") {
            debug!(terminal_id = %id, "Overriding terminal ID from environment");
            self.terminal.id = id;
        }

        if let Ok(name) = std::env::var("TALLY_TERMINAL_NAME") {
            self.terminal.name = name;
        }

        if let Ok(id) = std::env::var("TALLY_OUTLET_ID") {
            debug!(outlet_id = %id, "Overriding outlet ID from environment");
            self.outlet.id = id;
        }

        if let Ok(mode) = std::env::var("TALLY_SYNC_MODE") {
            match mode.parse() {
                Ok(parsed) => self.sync.mode = parsed,
                Err(_) => warn!(mode = %mode, "Unknown sync mode in environment"),
            }
        }

        if let Ok(size) = std::env::var("TALLY_BATCH_SIZE") {
            if let Ok(n) = size.parse::<u32>() {
                self.sync.batch_size = n;
            }
        }

        if let Ok(secs) = std::env::var("TALLY_POLL_INTERVAL_SECS") {
            if let Ok(n) = secs.parse::<u64>() {
                self.sync.poll_interval_secs = n;
            }
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "tally", "pos").map(|dirs| {
            let config_dir = dirs.config_dir();
            config_dir.join("sync.toml")
        })
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    pub fn terminal_id(&self) -> &str {
        &self.terminal.id
    }

    pub fn outlet_id(&self) -> &str {
        &self.outlet.id
    }

    pub fn mode(&self) -> SyncMode {
        self.sync.mode
    }

    pub fn is_sync_enabled(&self) -> bool {
        self.sync.mode.is_sync_enabled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_mode_parsing() {
        assert_eq!("auto".parse::<SyncMode>().unwrap(), SyncMode::Auto);
        assert_eq!("OFFLINE".parse::<SyncMode>().unwrap(), SyncMode::Offline);
        assert_eq!("disabled".parse::<SyncMode>().unwrap(), SyncMode::Offline);
        assert!("primary".parse::<SyncMode>().is_err());
    }

    #[test]
    fn test_default_config() {
        let config = SyncConfig::default();
        assert!(!config.terminal.id.is_empty());
        assert_eq!(config.mode(), SyncMode::Auto);
        assert_eq!(config.sync.batch_size, 100);
        assert_eq!(config.sync.escalate_after_attempts, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = SyncConfig::default();

        config.terminal.id = String::new();
        assert!(matches!(config.validate(), Err(SyncError::MissingTerminalId)));

        config.terminal.id = "till-1".to_string();
        config.outlet.id = " ".to_string();
        assert!(config.validate().unwrap_err().is_config_error());

        config.outlet.id = "outlet-1".to_string();
        config.sync.batch_size = 0;
        assert!(config.validate().is_err());

        config.sync.batch_size = 10;
        config.sync.initial_backoff_ms = 120_000;
        config.sync.max_backoff_secs = 60;
        assert!(config.validate().is_err());

        config.sync.initial_backoff_ms = 500;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: SyncConfig = toml::from_str(
            r#"
            [terminal]
            id = "till-2"

            [outlet]
            id = "outlet-harbour"

            [sync]
            mode = "offline"
            retention_days = 7
            "#,
        )
        .unwrap();

        assert_eq!(config.terminal_id(), "till-2");
        assert_eq!(config.terminal.name, "POS Terminal");
        assert_eq!(config.outlet_id(), "outlet-harbour");
        assert!(!config.is_sync_enabled());
        assert_eq!(config.sync.retention_days, 7);
        assert_eq!(config.sync.poll_interval(), Duration::from_secs(5));
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let path = std::env::temp_dir()
            .join(format!("tally-sync-{}", Uuid::new_v4()))
            .join("sync.toml");

        let mut config = SyncConfig::default();
        config.outlet.id = "outlet-central".into();
        config.save(Some(path.clone())).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("[terminal]"));
        assert!(contents.contains("[sync]"));

        let loaded: SyncConfig = toml::from_str(&contents).unwrap();
        assert_eq!(loaded.terminal_id(), config.terminal_id());
        assert_eq!(loaded.outlet_id(), "outlet-central");

        if let Some(dir) = path.parent() {
            let _ = std::fs::remove_dir_all(dir);
        }
    }
}
