//! # Sources
//!
//! A [`Source`] knows how to fetch one kind of resource and what the
//! fetched bytes mean. It produces a [`Candidate`]: the bytes, their
//! checksum, and the revision and filename they would be stored under.
//! The reconciler decides whether and how to persist it.

mod chart;
mod repository;

pub use chart::ChartSource;
pub use repository::RepositorySource;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use srcache_core::condition::reason;
use srcache_core::{ManagedResource, ObjectKey, ResourceKind};
use srcache_fetch::{ChartIndex, CredentialResolver, FetchOptions};

use crate::error::ReconcileError;

/// What the fetched bytes are.
#[derive(Debug, Clone)]
pub enum Payload {
    /// A repository index.
    Index(ChartIndex),
    /// A packaged chart.
    Chart { name: String, version: String },
}

/// Fetched content that may become the resource's next artifact.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub revision: String,
    pub filename: String,
    pub data: Bytes,
    /// SHA-256 hex of `data`.
    pub checksum: String,
    pub payload: Payload,
}

impl Candidate {
    /// Refuse content that must never be stored, such as an index with no
    /// chart entries.
    pub fn ensure_persistable(&self) -> Result<(), ReconcileError> {
        match &self.payload {
            Payload::Index(index) => index
                .ensure_not_empty()
                .map_err(|e| ReconcileError::content(reason::INDEXATION_FAILED, e.to_string())),
            Payload::Chart { .. } if self.data.is_empty() => Err(ReconcileError::content(
                reason::CHART_PULL_FAILED,
                format!("chart package for revision '{}' is empty", self.revision),
            )),
            Payload::Chart { .. } => Ok(()),
        }
    }
}

/// Fetches candidates for one resource kind.
#[async_trait]
pub trait Source: Send + Sync {
    fn kind(&self) -> ResourceKind;

    /// Fetch the remote content for `resource`, honoring `timeout`.
    async fn fetch(
        &self,
        resource: &ManagedResource,
        timeout: Duration,
    ) -> Result<Candidate, ReconcileError>;
}

/// Resolve fetch options for a secret reference in `key`'s namespace.
pub(crate) async fn resolve_options(
    credentials: &Arc<dyn CredentialResolver>,
    key: &ObjectKey,
    secret_ref: Option<&str>,
) -> Result<FetchOptions, ReconcileError> {
    match secret_ref.filter(|s| !s.is_empty()) {
        Some(name) => Ok(credentials.resolve(key.namespace(), name).await?),
        None => Ok(FetchOptions::anonymous()),
    }
}
