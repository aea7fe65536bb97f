//! Reconciler configuration.

use std::time::Duration;

use srcache_storage::DEFAULT_FILE_MODE;

/// Tunables shared by every reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilerConfig {
    /// Fixed delay before retrying a transient failure.
    pub retry_interval: Duration,
    /// Fetch deadline when the resource spec sets none.
    pub fetch_timeout: Duration,
    /// Permission bits for written artifacts.
    pub file_mode: u32,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            retry_interval: Duration::from_secs(10),
            fetch_timeout: Duration::from_secs(60),
            file_mode: DEFAULT_FILE_MODE,
        }
    }
}

impl ReconcilerConfig {
    /// Load configuration from environment variables.
    ///
    /// Variables:
    /// - `SRCACHE_RETRY_INTERVAL_SECS` (default: 10)
    /// - `SRCACHE_FETCH_TIMEOUT_SECS` (default: 60)
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            retry_interval: secs_from_env("SRCACHE_RETRY_INTERVAL_SECS", defaults.retry_interval)?,
            fetch_timeout: secs_from_env("SRCACHE_FETCH_TIMEOUT_SECS", defaults.fetch_timeout)?,
            file_mode: defaults.file_mode,
        })
    }
}

fn secs_from_env(var: &str, default: Duration) -> Result<Duration, ConfigError> {
    match std::env::var(var) {
        Ok(raw) => parse_secs(var, &raw),
        Err(_) => Ok(default),
    }
}

fn parse_secs(var: &str, raw: &str) -> Result<Duration, ConfigError> {
    match raw.trim().parse::<u64>() {
        Ok(0) | Err(_) => Err(ConfigError::InvalidDuration {
            var: var.to_string(),
            value: raw.to_string(),
        }),
        Ok(secs) => Ok(Duration::from_secs(secs)),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} must be a positive number of seconds, got {value:?}")]
    InvalidDuration { var: String, value: String },
}
