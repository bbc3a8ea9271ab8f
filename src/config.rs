//! Runtime settings.
//!
//! Settings come from an optional JSON file, then `LEDGER_*` environment
//! variables, then command-line flags, each layer overriding the previous:
//!
//! ```json
//! { "lockTimeoutMs": 5000, "transferTimeoutMs": 30000, "dbPath": "data", "logFormat": "json" }
//! ```

use crate::application::engine::EngineOptions;
use crate::error::{LedgerError, Result};
use crate::infrastructure::StoreOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    pub lock_timeout_ms: u64,
    /// `None` disables the per-transfer deadline.
    pub transfer_timeout_ms: Option<u64>,
    pub db_path: Option<PathBuf>,
    pub log_format: LogFormat,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            lock_timeout_ms: 5_000,
            transfer_timeout_ms: Some(30_000),
            db_path: None,
            log_format: LogFormat::Text,
        }
    }
}

impl Settings {
    /// Reads a settings file. Missing fields keep their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Applies `LEDGER_*` overrides from the process environment.
    pub fn with_env(self) -> Result<Self> {
        self.with_vars(|key| std::env::var(key).ok())
    }

    fn with_vars(mut self, var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(value) = var("LEDGER_LOCK_TIMEOUT_MS") {
            self.lock_timeout_ms = parse_millis("LEDGER_LOCK_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = var("LEDGER_TRANSFER_TIMEOUT_MS") {
            self.transfer_timeout_ms = match value.trim() {
                "" | "none" | "off" => None,
                millis => Some(parse_millis("LEDGER_TRANSFER_TIMEOUT_MS", millis)?),
            };
        }
        if let Some(value) = var("LEDGER_DB_PATH") {
            self.db_path = Some(PathBuf::from(value));
        }
        if let Some(value) = var("LEDGER_LOG_FORMAT") {
            self.log_format = match value.trim().to_ascii_lowercase().as_str() {
                "text" => LogFormat::Text,
                "json" => LogFormat::Json,
                other => {
                    return Err(LedgerError::Config(format!(
                        "LEDGER_LOG_FORMAT must be text or json, got {other}"
                    )));
                }
            };
        }
        Ok(self)
    }

    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            lock_timeout: Duration::from_millis(self.lock_timeout_ms),
        }
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            transfer_timeout: self.transfer_timeout_ms.map(Duration::from_millis),
        }
    }
}

fn parse_millis(key: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse()
        .map_err(|_| LedgerError::Config(format!("{key} must be a number of milliseconds")))
}
