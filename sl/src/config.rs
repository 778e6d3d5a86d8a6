//! Configuration for singlelaunch

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::coordinator::Coordinator;
use crate::liveness::LivenessOracle;
use crate::store::RecordStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path to the coordination record file
    #[serde(rename = "record-path")]
    pub record_path: PathBuf,

    /// Settle delay after closing a previous surface, in milliseconds
    #[serde(rename = "settle-delay-ms")]
    pub settle_delay_ms: u64,

    /// Hold an advisory lock across read-check-write sequences
    pub lock: bool,

    /// Log level (trace, debug, info, warn, error)
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,
}

/// Default record location: beneath the user's documents, like app-private storage
pub fn default_record_path() -> PathBuf {
    dirs::document_dir()
        .or_else(dirs::data_local_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("singlelaunch")
        .join(crate::RECORD_FILE_NAME)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            record_path: default_record_path(),
            settle_delay_ms: crate::DEFAULT_SETTLE_DELAY_MS,
            lock: true,
            log_level: None,
        }
    }
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // An explicit config path must load
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        let mut candidates = vec![PathBuf::from(".singlelaunch.yml")];
        if let Some(config_dir) = dirs::config_dir() {
            candidates.push(config_dir.join("singlelaunch").join("singlelaunch.yml"));
        }

        for candidate in candidates {
            if candidate.exists() {
                match Self::load_from_file(&candidate) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", candidate.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Save config to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_yaml::to_string(self)?;
        fs::write(path, content).context(format!("Failed to write config to {}", path.display()))?;
        Ok(())
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Record store for the configured path and locking mode
    pub fn record_store(&self) -> RecordStore {
        RecordStore::new(&self.record_path).with_locking(self.lock)
    }

    /// Coordinator for `app_name` using this configuration
    pub fn coordinator(&self, app_name: impl Into<String>, oracle: Arc<dyn LivenessOracle>) -> Coordinator {
        Coordinator::new(app_name, self.record_store(), oracle).with_settle_delay(self.settle_delay())
    }
}
