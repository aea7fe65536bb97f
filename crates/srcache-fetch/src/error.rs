//! Fetch error types.

use std::time::Duration;

/// Credential resolution failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CredentialError {
    /// The referenced secret does not exist.
    #[error("secrets \"{name}\" not found")]
    NotFound { namespace: String, name: String },
    /// The secret exists but its content cannot be turned into fetch options.
    #[error("invalid secret '{name}': {reason}")]
    Malformed { name: String, reason: String },
}

/// Transport failures from a source fetch.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The source URL could not be parsed.
    #[error("{reason}")]
    InvalidUrl { url: String, reason: String },
    /// No getter is registered for the URL scheme.
    #[error("scheme \"{scheme}\" not supported")]
    UnsupportedScheme { scheme: String },
    /// TLS client configuration or handshake failed.
    #[error("TLS error: {0}")]
    Tls(String),
    /// Connection or protocol failure.
    #[error("failed to fetch {url}: {reason}")]
    Network { url: String, reason: String },
    /// The server answered with a non-success status.
    #[error("failed to fetch {url}: server returned {status}")]
    Status { url: String, status: u16 },
    /// The fetch did not complete within its deadline.
    #[error("timed out after {after:?} fetching {url}")]
    Timeout { url: String, after: Duration },
}

impl TransportError {
    /// Whether retrying the same request later can succeed. Malformed URLs
    /// and unsupported schemes need a spec change instead.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::InvalidUrl { .. } | Self::UnsupportedScheme { .. })
    }
}

/// Chart index failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IndexError {
    #[error("failed to parse repository index: {0}")]
    Parse(String),
    #[error("repository index has no chart entries")]
    Empty,
    #[error("chart '{name}' could not be found")]
    NoChartName { name: String },
    #[error("no chart with version '{version}' found for '{name}'")]
    NoChartVersion { name: String, version: String },
    #[error("chart '{name}' has no downloadable URLs")]
    NoUrls { name: String },
}
