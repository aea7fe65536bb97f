//! Storage configuration.
//!
//! The storage root and the public hostname are process-level settings
//! owned by the host. Both can be loaded from the environment or passed
//! explicitly.

use std::path::PathBuf;

use srcache_core::Hostname;

/// Where artifacts live on disk and how they are addressed publicly.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Root directory of the artifact cache.
    pub base_path: PathBuf,
    /// Public base address prefixed to every artifact path.
    pub hostname: Hostname,
}

impl StorageConfig {
    /// Build a configuration from explicit values.
    pub fn new(base_path: impl Into<PathBuf>, hostname: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            base_path: base_path.into(),
            hostname: parse_hostname("hostname", hostname)?,
        })
    }

    /// Load configuration from environment variables.
    ///
    /// Variables:
    /// - `SRCACHE_STORAGE_PATH` (default: `/data`)
    /// - `SRCACHE_STORAGE_ADDR` (default: `localhost`)
    pub fn from_env() -> Result<Self, ConfigError> {
        let base_path = std::env::var("SRCACHE_STORAGE_PATH").unwrap_or_else(|_| "/data".into());
        if base_path.trim().is_empty() {
            return Err(ConfigError::EmptyPath("SRCACHE_STORAGE_PATH".into()));
        }
        let addr = std::env::var("SRCACHE_STORAGE_ADDR").unwrap_or_else(|_| "localhost".into());
        Ok(Self {
            base_path: PathBuf::from(base_path),
            hostname: parse_hostname("SRCACHE_STORAGE_ADDR", &addr)?,
        })
    }
}

fn parse_hostname(var: &str, raw: &str) -> Result<Hostname, ConfigError> {
    Hostname::parse(raw).map_err(|e| ConfigError::InvalidHostname(var.to_string(), e.to_string()))
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must not be empty")]
    EmptyPath(String),
    #[error("invalid hostname for {0}: {1}")]
    InvalidHostname(String, String),
}
