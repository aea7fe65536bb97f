//! # Managed Resource Model
//!
//! The externally owned object a reconciliation pass reads and reports on.
//! The cache never creates or deletes a [`ManagedResource`]; it reads
//! `spec` and replaces `status`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::artifact::Artifact;
use crate::condition::Conditions;
use crate::identity::{ObjectKey, ResourceKind};

/// Which chart a `HelmChart` resource pulls, and from where.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartSelector {
    /// Name of a `HelmRepository` in the same namespace.
    pub repository: String,
    /// Chart name within the repository index.
    pub name: String,
    /// Chart version or semver range; `None` selects the highest version.
    #[serde(default)]
    pub version: Option<String>,
}

/// Desired state of a managed resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSpec {
    /// Remote source location. Empty for charts, which inherit the
    /// repository's location.
    #[serde(default)]
    pub url: String,
    /// Polling interval between successful passes.
    pub interval: Duration,
    /// Name of a credential secret in the resource's namespace.
    #[serde(default)]
    pub secret_ref: Option<String>,
    /// Fetch timeout; the reconciler default applies when absent.
    #[serde(default)]
    pub timeout: Option<Duration>,
    /// Chart selection, for `HelmChart` resources.
    #[serde(default)]
    pub chart: Option<ChartSelector>,
}

impl ResourceSpec {
    /// Spec for a repository polled at `interval`.
    pub fn repository(url: impl Into<String>, interval: Duration) -> Self {
        Self {
            url: url.into(),
            interval,
            secret_ref: None,
            timeout: None,
            chart: None,
        }
    }

    /// Spec for a chart pulled from a sibling repository.
    pub fn chart(selector: ChartSelector, interval: Duration) -> Self {
        Self {
            url: String::new(),
            interval,
            secret_ref: None,
            timeout: None,
            chart: Some(selector),
        }
    }

    pub fn with_secret_ref(mut self, name: impl Into<String>) -> Self {
        self.secret_ref = Some(name.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Observed state written back by each pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceStatus {
    /// The current artifact, if any.
    #[serde(default)]
    pub artifact: Option<Artifact>,
    #[serde(default)]
    pub conditions: Conditions,
    /// Generation of the spec the last completed pass observed.
    #[serde(default)]
    pub observed_generation: i64,
    /// Public URL of the stable-name link.
    #[serde(default)]
    pub url: Option<String>,
}

/// A declared remote source plus its observed status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedResource {
    pub kind: ResourceKind,
    pub key: ObjectKey,
    /// Incremented by the resource store on every spec change.
    pub generation: i64,
    pub spec: ResourceSpec,
    #[serde(default)]
    pub status: ResourceStatus,
}

impl ManagedResource {
    /// A freshly declared resource with empty status.
    pub fn new(kind: ResourceKind, key: ObjectKey, spec: ResourceSpec) -> Self {
        Self {
            kind,
            key,
            generation: 1,
            spec,
            status: ResourceStatus::default(),
        }
    }
}
