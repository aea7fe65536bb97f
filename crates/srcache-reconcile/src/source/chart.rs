use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use srcache_core::condition::reason;
use srcache_core::{sha256_hex, Artifact, ManagedResource, ResourceKind};
use srcache_fetch::{resolve_chart_url, ChartIndex, CredentialResolver, Getters, IndexError};
use srcache_storage::{Storage, StorageError};

use super::{resolve_options, Candidate, Payload, Source};
use crate::error::ReconcileError;
use crate::store::ResourceStore;

/// Pulls a packaged chart listed in a sibling repository's stored index.
///
/// The repository must already have an artifact; its index is read from
/// storage, not re-fetched. The chart is downloaded with the repository's
/// credentials. The revision is the chart version; the file is named
/// `<chart>-<version>-<checksum>.tgz`.
#[derive(Clone)]
pub struct ChartSource {
    getters: Getters,
    credentials: Arc<dyn CredentialResolver>,
    storage: Storage,
    store: Arc<dyn ResourceStore>,
}

impl ChartSource {
    pub fn new(
        getters: Getters,
        credentials: Arc<dyn CredentialResolver>,
        storage: Storage,
        store: Arc<dyn ResourceStore>,
    ) -> Self {
        Self {
            getters,
            credentials,
            storage,
            store,
        }
    }

    async fn read_index(&self, artifact: Artifact) -> Result<ChartIndex, ReconcileError> {
        let storage = self.storage.clone();
        let data = tokio::task::spawn_blocking(move || storage.read(&artifact))
            .await
            .map_err(|e| {
                StorageError::Io {
                    op: "read repository index",
                    path: Default::default(),
                    source: std::io::Error::other(e.to_string()),
                }
            })??;
        ChartIndex::parse(&data)
            .map_err(|e| ReconcileError::content(reason::INDEXATION_FAILED, e.to_string()))
    }
}

#[async_trait]
impl Source for ChartSource {
    fn kind(&self) -> ResourceKind {
        ResourceKind::HelmChart
    }

    async fn fetch(
        &self,
        resource: &ManagedResource,
        timeout: Duration,
    ) -> Result<Candidate, ReconcileError> {
        let selector = resource.spec.chart.as_ref().ok_or_else(|| {
            ReconcileError::content(reason::CHART_PULL_FAILED, "no chart selector given")
        })?;
        if selector.repository.is_empty() {
            return Err(ReconcileError::content(
                reason::CHART_PULL_FAILED,
                "no HelmRepository reference given",
            ));
        }
        let repo_key = resource
            .key
            .sibling(&selector.repository)
            .map_err(|e| ReconcileError::content(reason::CHART_PULL_FAILED, e.to_string()))?;

        let repository = self
            .store
            .get(ResourceKind::HelmRepository, &repo_key)
            .await?
            .ok_or_else(|| {
                ReconcileError::DependencyNotReady(format!(
                    "failed to get HelmRepository '{repo_key}': not found"
                ))
            })?;
        let repo_artifact = repository.status.artifact.clone().ok_or_else(|| {
            ReconcileError::DependencyNotReady(format!(
                "no repository index artifact found in HelmRepository '{}'",
                repo_key.name()
            ))
        })?;

        let index = self.read_index(repo_artifact).await?;
        let version = index
            .get(&selector.name, selector.version.as_deref())
            .map_err(|e| {
                let message = match &e {
                    IndexError::NoChartName { name } => format!(
                        "chart '{name}' could not be found in Helm repository '{}'",
                        repo_key.name()
                    ),
                    other => other.to_string(),
                };
                ReconcileError::content(reason::CHART_PULL_FAILED, message)
            })?;
        let reference = version
            .first_url()
            .map_err(|e| ReconcileError::content(reason::CHART_PULL_FAILED, e.to_string()))?;
        let url = resolve_chart_url(&repository.spec.url, reference)?;

        let options = resolve_options(
            &self.credentials,
            &repo_key,
            repository.spec.secret_ref.as_deref(),
        )
        .await?;
        let data = self.getters.get(&url, &options, timeout).await?;

        // The checksum in the filename keeps a republished version from
        // overwriting the file the current record points at.
        let checksum = sha256_hex(&data);
        Ok(Candidate {
            revision: version.version.clone(),
            filename: format!("{}-{}-{checksum}.tgz", version.name, version.version),
            data,
            checksum,
            payload: Payload::Chart {
                name: version.name.clone(),
                version: version.version.clone(),
            },
        })
    }
}

impl std::fmt::Debug for ChartSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChartSource")
            .field("getters", &self.getters)
            .field("storage", &self.storage)
            .finish_non_exhaustive()
    }
}
