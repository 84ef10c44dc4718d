//! `heightscan.toml` configuration file.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use heightscan_core::builder::{DEFAULT_BATCH_SIZE, DEFAULT_CONCURRENCY};

use crate::logging::LogConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite database file (or `sqlite:` URL).
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String {
    "./heightscan.db".into()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Defaults applied to tasks created with `add-task`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScannerDefaults {
    #[serde(default = "default_batch_size")]
    pub batch_size: u64,
    #[serde(default = "default_concurrency")]
    pub concurrency: u64,
}

fn default_batch_size() -> u64 {
    DEFAULT_BATCH_SIZE
}
fn default_concurrency() -> u64 {
    DEFAULT_CONCURRENCY
}

impl Default for ScannerDefaults {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub scanner: ScannerDefaults,
    #[serde(default)]
    pub log: LogConfig,
}

impl ConfigFile {
    /// Read `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: ConfigFile =
            toml::from_str(&text).with_context(|| format!("parsing config {}", path.display()))?;
        if config.scanner.batch_size == 0 || config.scanner.concurrency == 0 {
            anyhow::bail!("scanner.batch_size and scanner.concurrency must be > 0");
        }
        Ok(config)
    }

    pub fn example() -> Self {
        let mut config = Self::default();
        config
            .log
            .components
            .insert("heightscan_core".into(), "info".into());
        config.log.components.insert("sqlx".into(), "warn".into());
        config
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("serializing config")
    }
}
