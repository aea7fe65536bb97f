//! # Resource Identity
//!
//! Newtypes naming a managed resource: its [`ResourceKind`] and its
//! namespaced [`ObjectKey`]. Both are validated at construction and are
//! the only inputs the path resolver accepts, so every storage path
//! segment derived from them is a single, safe directory name.
//!
//! ## Identifier Rules
//!
//! - Namespace: `^[a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?$`
//! - Name: `^[a-z0-9]([a-z0-9.-]{0,251}[a-z0-9])?$`

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// The kinds of source resource the cache manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceKind {
    /// A chart repository; its artifact is the repository index.
    HelmRepository,
    /// A packaged chart pulled from a repository's index.
    HelmChart,
}

impl ResourceKind {
    /// The lowercase kind name used as the first storage path segment.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HelmRepository => "helmrepository",
            Self::HelmChart => "helmchart",
        }
    }

    /// File extension of this kind's artifacts, without the dot.
    pub fn artifact_extension(&self) -> &'static str {
        match self {
            Self::HelmRepository => "yaml",
            Self::HelmChart => "tgz",
        }
    }

    /// The stable-name link placed next to this kind's revisioned files.
    pub fn latest_link_name(&self) -> String {
        format!("{}-latest.{}", self.as_str(), self.artifact_extension())
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn validate_segment(
    field: &'static str,
    value: &str,
    max_len: usize,
    allow_dot: bool,
) -> Result<String, CoreError> {
    let reject = |reason: String| CoreError::InvalidIdentifier {
        field,
        value: value.to_string(),
        reason,
    };
    if value.is_empty() {
        return Err(reject("must not be empty".into()));
    }
    if value.len() > max_len {
        return Err(reject(format!("{} chars exceeds max {max_len}", value.len())));
    }
    let alnum = |c: char| c.is_ascii_lowercase() || c.is_ascii_digit();
    for c in value.chars() {
        if !(alnum(c) || c == '-' || (allow_dot && c == '.')) {
            return Err(reject(format!("contains invalid character {c:?}")));
        }
    }
    let first = value.chars().next();
    let last = value.chars().last();
    if !first.is_some_and(alnum) || !last.is_some_and(alnum) {
        return Err(reject("must start and end with [a-z0-9]".into()));
    }
    Ok(value.to_string())
}

/// The namespaced name of a managed resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
    namespace: String,
    name: String,
}

impl ObjectKey {
    /// Create a validated key.
    pub fn new(namespace: &str, name: &str) -> Result<Self, CoreError> {
        Ok(Self {
            namespace: validate_segment("namespace", namespace, 63, false)?,
            name: validate_segment("name", name, 253, true)?,
        })
    }

    /// The resource namespace.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The resource name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// A sibling key in the same namespace.
    pub fn sibling(&self, name: &str) -> Result<Self, CoreError> {
        Self::new(&self.namespace, name)
    }
}

impl std::fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}
