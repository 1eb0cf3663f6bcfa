//! TOML configuration loading and validation.

use std::path::Path;

use serde::Deserialize;

use crate::error::{Error, Result};

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Kite Connect session credentials. The access token is minted daily by the
/// external authentication flow; this tool only consumes it.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub api_key: String,
    pub access_token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionConfig {
    /// Pause between consecutive order submissions within one batch.
    #[serde(default = "default_interval")]
    pub order_interval_ms: u64,
    /// Fixed retry delay while the exchange has not opened yet.
    #[serde(default = "default_preopen_retry")]
    pub preopen_retry_secs: u64,
    /// Exponential backoff after the open: base, multiplier, cap.
    #[serde(default = "default_backoff_base")]
    pub retry_base_secs: f64,
    #[serde(default = "default_backoff_multiplier")]
    pub retry_multiplier: f64,
    #[serde(default = "default_backoff_cap")]
    pub retry_cap_secs: f64,
}

fn default_interval() -> u64 {
    1000
}
fn default_preopen_retry() -> u64 {
    3
}
fn default_backoff_base() -> f64 {
    2.0
}
fn default_backoff_multiplier() -> f64 {
    1.7
}
fn default_backoff_cap() -> f64 {
    60.0
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            order_interval_ms: default_interval(),
            preopen_retry_secs: default_preopen_retry(),
            retry_base_secs: default_backoff_base(),
            retry_multiplier: default_backoff_multiplier(),
            retry_cap_secs: default_backoff_cap(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_dir")]
    pub dir: String,
    #[serde(default = "default_audit_file")]
    pub audit_file: String,
}

fn default_log_dir() -> String {
    "./logs".into()
}
fn default_audit_file() -> String {
    "audit.jsonl".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: default_log_dir(),
            audit_file: default_audit_file(),
        }
    }
}

impl Config {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::ConfigRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate config invariants.
    fn validate(&self) -> Result<()> {
        if self.api.api_key.is_empty() {
            return Err(Error::Config("api_key must not be empty".into()));
        }
        if self.api.access_token.is_empty() {
            return Err(Error::Config(
                "access_token must not be empty — run the authentication flow first".into(),
            ));
        }
        if self.execution.retry_base_secs <= 0.0 {
            return Err(Error::Config("retry_base_secs must be > 0".into()));
        }
        if self.execution.retry_multiplier <= 1.0 {
            return Err(Error::Config("retry_multiplier must be > 1.0".into()));
        }
        if self.execution.retry_cap_secs < self.execution.retry_base_secs {
            return Err(Error::Config(
                "retry_cap_secs must be >= retry_base_secs".into(),
            ));
        }
        Ok(())
    }

    /// Full path to the audit log file.
    pub fn audit_path(&self) -> std::path::PathBuf {
        Path::new(&self.logging.dir).join(&self.logging.audit_file)
    }
}
