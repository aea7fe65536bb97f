//! # Artifact Record and Path Resolution
//!
//! An [`Artifact`] is one persisted, checksummed revision of a resource's
//! fetched content. Its location is fully determined by
//! [`artifact_path()`]:
//!
//! ```text
//! <kind>/<namespace>/<name>/<revision-qualified-filename>
//! ```
//!
//! and its public address by [`artifact_url()`]:
//!
//! ```text
//! <hostname>/<path>
//! ```
//!
//! ## URL Invariant
//!
//! The `url` field is a cache of `artifact_url(hostname, path)` and is only
//! valid for the hostname that produced it. Callers holding a [`Hostname`]
//! must re-derive it through [`Artifact::with_url()`] rather than trust a
//! stored value.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::identity::{ObjectKey, ResourceKind};

/// A normalized public base address, e.g. `http://source-cache.svc`.
///
/// A bare `host[:port]` gets an `http://` scheme. Trailing slashes are
/// stripped so joining with a path never doubles them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Hostname(String);

impl Hostname {
    /// Parse and normalize a configured hostname.
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        let trimmed = raw.trim();
        let reject = |reason: &str| CoreError::InvalidHostname {
            value: raw.to_string(),
            reason: reason.to_string(),
        };
        if trimmed.chars().any(char::is_whitespace) {
            return Err(reject("must not contain whitespace"));
        }
        let (scheme, host) = trimmed.split_once("://").unwrap_or(("http", trimmed));
        let host = host.trim_end_matches('/');
        if scheme.is_empty() {
            return Err(reject("missing scheme before '://'"));
        }
        if host.is_empty() {
            return Err(reject("missing host"));
        }
        Ok(Self(format!("{scheme}://{host}")))
    }

    /// The normalized base, without a trailing slash.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Hostname {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn validate_filename(filename: &str) -> Result<(), CoreError> {
    let bad = filename.is_empty()
        || filename.starts_with('.')
        || filename.contains(|c| matches!(c, '/' | '\\' | '\0'));
    if bad {
        return Err(CoreError::InvalidFilename(filename.to_string()));
    }
    Ok(())
}

/// The storage-relative directory holding every revision of one resource.
pub fn artifact_dir(kind: ResourceKind, key: &ObjectKey) -> String {
    format!("{}/{}/{}", kind.as_str(), key.namespace(), key.name())
}

/// Resolve the storage-relative path of a resource's artifact file.
///
/// Rejects filenames that are empty, hidden (reserved for in-flight
/// temporary files), or contain a path separator.
pub fn artifact_path(
    kind: ResourceKind,
    key: &ObjectKey,
    filename: &str,
) -> Result<String, CoreError> {
    validate_filename(filename)?;
    Ok(format!("{}/{filename}", artifact_dir(kind, key)))
}

/// Derive the public URL of a storage-relative path.
pub fn artifact_url(hostname: &Hostname, path: &str) -> String {
    format!("{}/{}", hostname.as_str(), path.trim_start_matches('/'))
}

/// One persisted revision of a resource's content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    /// Storage-relative location, POSIX separators.
    pub path: String,
    /// Opaque content-version identifier.
    pub revision: String,
    /// SHA-256 hex of the bytes at `path`. Empty until written.
    #[serde(default)]
    pub checksum: String,
    /// Public address derived from `path` and the configured hostname.
    #[serde(default)]
    pub url: String,
    /// When this revision was last successfully persisted.
    pub last_update_time: DateTime<Utc>,
}

impl Artifact {
    /// Create a record for a path that has not been written yet.
    pub fn new(path: impl Into<String>, revision: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            revision: revision.into(),
            checksum: String::new(),
            url: String::new(),
            last_update_time: Utc::now(),
        }
    }

    /// The final path segment.
    pub fn filename(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    /// The storage-relative directory containing this artifact.
    pub fn dir(&self) -> &str {
        self.path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
    }

    /// Return a copy whose `url` is re-derived for `hostname`.
    pub fn with_url(mut self, hostname: &Hostname) -> Self {
        self.url = artifact_url(hostname, &self.path);
        self
    }

    /// Whether the stored `url` is what `hostname` would produce today.
    pub fn url_matches(&self, hostname: &Hostname) -> bool {
        self.url == artifact_url(hostname, &self.path)
    }

    /// Whether two records describe identical content.
    ///
    /// An empty checksum never matches, so an unwritten record is always
    /// considered different.
    pub fn has_checksum(&self, checksum: &str) -> bool {
        !self.checksum.is_empty() && self.checksum == checksum
    }
}
