use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use srcache_core::condition::reason;
use srcache_core::{sha256_hex, ManagedResource, ResourceKind};
use srcache_fetch::{repository_index_url, ChartIndex, CredentialResolver, Getters};

use super::{resolve_options, Candidate, Payload, Source};
use crate::error::ReconcileError;

/// Fetches a chart repository's `index.yaml`.
///
/// The revision is the checksum of the index bytes, so any change to the
/// published index yields a new artifact.
#[derive(Clone)]
pub struct RepositorySource {
    getters: Getters,
    credentials: Arc<dyn CredentialResolver>,
}

impl RepositorySource {
    pub fn new(getters: Getters, credentials: Arc<dyn CredentialResolver>) -> Self {
        Self {
            getters,
            credentials,
        }
    }
}

#[async_trait]
impl Source for RepositorySource {
    fn kind(&self) -> ResourceKind {
        ResourceKind::HelmRepository
    }

    async fn fetch(
        &self,
        resource: &ManagedResource,
        timeout: Duration,
    ) -> Result<Candidate, ReconcileError> {
        let options = resolve_options(
            &self.credentials,
            &resource.key,
            resource.spec.secret_ref.as_deref(),
        )
        .await?;
        let url = repository_index_url(&resource.spec.url)?;
        let data = self.getters.get(&url, &options, timeout).await?;

        let index = ChartIndex::parse(&data)
            .map_err(|e| ReconcileError::content(reason::INDEXATION_FAILED, e.to_string()))?;
        let checksum = sha256_hex(&data);
        Ok(Candidate {
            revision: checksum.clone(),
            filename: format!("index-{checksum}.yaml"),
            data,
            checksum,
            payload: Payload::Index(index),
        })
    }
}

impl std::fmt::Debug for RepositorySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepositorySource")
            .field("getters", &self.getters)
            .finish_non_exhaustive()
    }
}
