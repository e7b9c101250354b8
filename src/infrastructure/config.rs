//! Configuration infrastructure
//!
//! Import-run configuration with file-based overrides. Defaults are chosen
//! so the binary runs against a local SQLite file with no config file
//! present; a JSON config overrides individual sections.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Complete importer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// SQLite database URL (e.g. `sqlite:data/catalog.db`).
    pub database_url: String,

    /// Batch processing configuration.
    pub batch: BatchConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,

    /// Acquire timeout for database connections, in seconds.
    pub acquire_timeout_seconds: u64,
}

/// Batch processing configuration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Number of upsert operations committed per transaction.
    pub batch_size: usize,

    /// Maximum number of rejected records retained in the report sample.
    pub rejected_sample_limit: usize,
}

/// Logging configuration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (trace, debug, info, warn, error). `RUST_LOG`
    /// overrides this when set.
    pub level: String,

    /// Also write logs to a file under `log_directory`.
    pub file_output: bool,

    /// Directory for log files when `file_output` is enabled.
    pub log_directory: String,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite:data/catalog.db".to_string(),
            batch: BatchConfig::default(),
            logging: LoggingConfig::default(),
            acquire_timeout_seconds: 30,
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 200,
            rejected_sample_limit: 25,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file_output: false,
            log_directory: "logs".to_string(),
        }
    }
}

impl ImportConfig {
    /// Load configuration from a JSON file, or fall back to defaults when
    /// the file does not exist. A present-but-broken file is an error, not
    /// a silent fallback.
    pub async fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        Ok(config)
    }
}
