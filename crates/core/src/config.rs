//! Poller Configuration
//!
//! Manages the in-process settings of the transport poller:
//! - Poll period
//! - Worker thread naming
//! - Logging

use std::path::{Path, PathBuf};
use std::time::Duration;
use serde::{Deserialize, Serialize};
use directories::ProjectDirs;
use tracing::{info, debug};

use crate::error::{Result, TransportError};

/// Default poll period in milliseconds
pub const DEFAULT_POLL_PERIOD_MS: u64 = 250;

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default level filter, overridden by `RUST_LOG`
    pub level: String,
    /// Include file and line in log lines
    pub file_line: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file_line: true,
        }
    }
}

/// Main poller configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollerConfig {
    /// Configuration version for migrations
    pub version: u32,
    /// Period between poll cycles in milliseconds
    pub poll_period_ms: u64,
    /// Name given to each poller's scheduler thread
    pub thread_name: String,
    /// Logging settings
    pub log: LogConfig,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            version: 1,
            poll_period_ms: DEFAULT_POLL_PERIOD_MS,
            thread_name: "transport-event-poller".to_string(),
            log: LogConfig::default(),
        }
    }
}

impl PollerConfig {
    /// Get the configuration directory path
    pub fn config_dir() -> Option<PathBuf> {
        ProjectDirs::from("com", "rdroid", "DroidTransport")
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the configuration file path
    pub fn config_file() -> Option<PathBuf> {
        Self::config_dir().map(|dir| dir.join("transport.toml"))
    }

    /// Poll period as a duration
    pub fn poll_period(&self) -> Duration {
        Duration::from_millis(self.poll_period_ms)
    }

    /// Reject settings the scheduler cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.poll_period_ms == 0 {
            return Err(TransportError::Config("poll_period_ms must be greater than zero".into()));
        }
        if self.thread_name.trim().is_empty() {
            return Err(TransportError::Config("thread_name must not be empty".into()));
        }
        Ok(())
    }

    /// Load configuration from the default location, writing defaults if absent
    pub fn load() -> Result<Self> {
        let config_file = Self::config_file()
            .ok_or_else(|| TransportError::Config("Cannot determine config path".into()))?;

        if config_file.exists() {
            Self::load_from(&config_file)
        } else {
            info!("Config file not found, using defaults");
            let config = PollerConfig::default();
            config.save_to(&config_file)?;
            Ok(config)
        }
    }

    /// Load and validate configuration from an explicit path
    pub fn load_from(path: &Path) -> Result<Self> {
        debug!("Loading config from {:?}", path);
        let contents = std::fs::read_to_string(path)?;
        let config: PollerConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        let config_file = Self::config_file()
            .ok_or_else(|| TransportError::Config("Cannot determine config path".into()))?;
        self.save_to(&config_file)
    }

    /// Save configuration to an explicit path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;

        debug!("Config saved to {:?}", path);
        Ok(())
    }
}
