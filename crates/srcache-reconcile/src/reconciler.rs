//! # Reconciler
//!
//! Runs one pass for one resource: read it from the store, thread its
//! status through the [`phase`](crate::phase) functions while performing
//! each phase's I/O, write the final status back, and return when to run
//! again.
//!
//! ## Persistence
//!
//! The persistence sequence runs on a blocking thread under the
//! resource's directory lock:
//!
//! 1. create the directory,
//! 2. write the candidate through a temporary file and rename,
//! 3. repoint the stable-name link,
//! 4. release the lock.
//!
//! Garbage collection runs afterwards, takes the lock itself, and only
//! logs failures.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use srcache_core::{Artifact, ManagedResource, ObjectKey, ResourceKind, ResourceStatus};
use srcache_fetch::TransportError;
use srcache_storage::{Storage, StorageError};

use crate::config::ReconcilerConfig;
use crate::error::{NextRun, ReconcileError};
use crate::phase::{self, PhaseOutcome, Persisted};
use crate::source::{Candidate, Source};
use crate::store::ResourceStore;

/// Drives reconciliation passes for resources of one kind.
pub struct Reconciler<S> {
    source: S,
    storage: Storage,
    store: Arc<dyn ResourceStore>,
    config: ReconcilerConfig,
}

impl<S: Source> Reconciler<S> {
    pub fn new(
        source: S,
        storage: Storage,
        store: Arc<dyn ResourceStore>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            source,
            storage,
            store,
            config,
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.source.kind()
    }

    /// Run one pass for `key`.
    ///
    /// `Ok` carries the scheduling decision. `Err` means the pass failed in
    /// a way the caller should see; the status has already been written
    /// and [`ReconcileError::next_run()`] gives the delay.
    pub async fn reconcile(&self, key: &ObjectKey) -> Result<NextRun, ReconcileError> {
        let kind = self.kind();
        let Some(resource) = self.store.get(kind, key).await? else {
            tracing::debug!(%kind, namespace = key.namespace(), name = key.name(), "resource gone; skipping");
            return Ok(NextRun::OnChange);
        };

        let (mut status, result) = self.run_phases(&resource).await;
        status.observed_generation = resource.generation;
        self.store.update_status(kind, key, status).await?;

        match &result {
            Ok(next) => tracing::debug!(%kind, namespace = key.namespace(), name = key.name(), next = ?next, "reconciliation finished"),
            Err(e) => tracing::error!(%kind, namespace = key.namespace(), name = key.name(), error = %e, "reconciliation failed"),
        }
        result
    }

    /// Remove every stored artifact of a deleted resource.
    pub async fn reconcile_delete(&self, key: &ObjectKey) -> Result<(), ReconcileError> {
        let storage = self.storage.clone();
        let kind = self.kind();
        let owned = key.clone();
        blocking(move || storage.remove_all(kind, &owned)).await?;
        tracing::info!(%kind, namespace = key.namespace(), name = key.name(), "removed stored artifacts");
        Ok(())
    }

    async fn run_phases(
        &self,
        resource: &ManagedResource,
    ) -> (ResourceStatus, Result<NextRun, ReconcileError>) {
        let retry = self.config.retry_interval;
        let link_name = resource.kind.latest_link_name();
        let status = phase::initialize(resource.status.clone());

        let intact = match &status.artifact {
            Some(artifact) => self.artifact_intact(artifact.clone()).await,
            None => false,
        };
        let status = match phase::check_storage(status, intact, self.storage.hostname(), &link_name) {
            PhaseOutcome::Continue(status, ()) => status,
            PhaseOutcome::Stop(status, result) => {
                tracing::warn!(
                    kind = %resource.kind,
                    namespace = resource.key.namespace(),
                    name = resource.key.name(),
                    "recorded artifact missing or altered in storage"
                );
                return (status, result);
            }
        };
        if let Some(current) = &status.artifact {
            self.collect_garbage(current.clone()).await;
        }

        let fetched = self.fetch(resource).await;
        let (status, candidate) = match phase::check_fetch(status, fetched, retry) {
            PhaseOutcome::Continue(status, candidate) => (status, candidate),
            PhaseOutcome::Stop(status, result) => return (status, result),
        };

        let (status, candidate) =
            match phase::check_outdated(status, candidate, resource.spec.interval) {
                PhaseOutcome::Continue(status, candidate) => (status, candidate),
                PhaseOutcome::Stop(status, result) => return (status, result),
            };

        let persisted = self.persist(resource, candidate, link_name).await;
        match phase::check_persist(status, persisted, retry) {
            PhaseOutcome::Continue(status, artifact) => {
                tracing::info!(
                    kind = %resource.kind,
                    namespace = resource.key.namespace(),
                    name = resource.key.name(),
                    revision = %artifact.revision,
                    "stored artifact"
                );
                self.collect_garbage(artifact).await;
                (status, Ok(NextRun::After(resource.spec.interval)))
            }
            PhaseOutcome::Stop(status, result) => (status, result),
        }
    }

    async fn fetch(&self, resource: &ManagedResource) -> Result<Candidate, ReconcileError> {
        let timeout = resource.spec.timeout.unwrap_or(self.config.fetch_timeout);
        match tokio::time::timeout(timeout, self.source.fetch(resource, timeout)).await {
            Ok(result) => result,
            Err(_) => Err(timeout_error(resource, timeout).into()),
        }
    }

    async fn persist(
        &self,
        resource: &ManagedResource,
        candidate: Candidate,
        link_name: String,
    ) -> Result<Persisted, ReconcileError> {
        candidate.ensure_persistable()?;

        let storage = self.storage.clone();
        let kind = resource.kind;
        let key = resource.key.clone();
        let mode = self.config.file_mode;
        let persisted = blocking(move || {
            let mut artifact =
                storage.artifact_for(kind, &key, &candidate.revision, &candidate.filename)?;
            let lock = storage.lock(&artifact)?;
            storage.mkdir_all(&artifact)?;
            storage.atomic_write(&artifact, candidate.data.as_ref(), mode)?;
            let url = storage.symlink(&artifact, &link_name)?;
            lock.release();
            artifact.checksum = candidate.checksum;
            Ok(Persisted { artifact, url })
        })
        .await?;
        Ok(persisted)
    }

    /// Whether a regular file backs `artifact` and its bytes still hash to
    /// the recorded checksum.
    async fn artifact_intact(&self, artifact: Artifact) -> bool {
        let storage = self.storage.clone();
        let path = artifact.path.clone();
        let checked = blocking(move || {
            if !storage.artifact_exists(&artifact) {
                return Ok(false);
            }
            storage.verify(&artifact).map(|()| true)
        })
        .await;
        match checked {
            Ok(intact) => intact,
            Err(e) => {
                tracing::warn!(path = %path, error = %e, "stored artifact failed verification");
                false
            }
        }
    }

    async fn collect_garbage(&self, current: Artifact) {
        let storage = self.storage.clone();
        let dir = current.dir().to_string();
        match blocking(move || storage.remove_all_but_current(&current)).await {
            Ok(removed) if !removed.is_empty() => {
                tracing::debug!(dir = %dir, count = removed.len(), "removed superseded artifacts");
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(dir = %dir, error = %e, "garbage collection failed"),
        }
    }
}

impl<S: std::fmt::Debug> std::fmt::Debug for Reconciler<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("source", &self.source)
            .field("storage", &self.storage)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Deadline error for a fetch. Resources without a URL of their own are
/// named by kind and key.
fn timeout_error(resource: &ManagedResource, after: Duration) -> TransportError {
    let url = if resource.spec.url.is_empty() {
        format!("{} '{}'", resource.kind, resource.key)
    } else {
        resource.spec.url.clone()
    };
    TransportError::Timeout { url, after }
}

/// Run a storage operation on the blocking pool.
async fn blocking<T, F>(op: F) -> Result<T, StorageError>
where
    F: FnOnce() -> Result<T, StorageError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(op)
        .await
        .map_err(|e| StorageError::Io {
            op: "run storage task",
            path: Default::default(),
            source: io::Error::other(e.to_string()),
        })?
}
