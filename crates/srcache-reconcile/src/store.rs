//! # Resource Store
//!
//! Where desired and observed state lives. The reconciler reads a resource
//! at the start of a pass and replaces its status at the end
//! (last writer wins). It never creates or deletes resources.
//!
//! [`InMemoryResourceStore`] backs tests and single-process hosts.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use srcache_core::{ManagedResource, ObjectKey, ResourceKind, ResourceStatus};

/// Resource store failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("{kind} '{key}' not found")]
    NotFound { kind: ResourceKind, key: ObjectKey },
    #[error("resource store unavailable: {0}")]
    Unavailable(String),
}

/// Read desired state and write observed state by namespaced name.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Fetch a resource. `Ok(None)` when it does not exist.
    async fn get(
        &self,
        kind: ResourceKind,
        key: &ObjectKey,
    ) -> Result<Option<ManagedResource>, StoreError>;

    /// Replace a resource's status.
    async fn update_status(
        &self,
        kind: ResourceKind,
        key: &ObjectKey,
        status: ResourceStatus,
    ) -> Result<(), StoreError>;
}

/// A resource store held in memory.
#[derive(Debug, Default)]
pub struct InMemoryResourceStore {
    resources: DashMap<(ResourceKind, ObjectKey), ManagedResource>,
    status_writes: AtomicU64,
}

impl InMemoryResourceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a resource, or replace its spec. A changed spec bumps the
    /// generation. Existing status is kept.
    pub fn apply(&self, resource: ManagedResource) {
        let key = (resource.kind, resource.key.clone());
        match self.resources.get_mut(&key) {
            Some(mut existing) => {
                if existing.spec != resource.spec {
                    existing.spec = resource.spec;
                    existing.generation += 1;
                }
            }
            None => {
                self.resources.insert(key, resource);
            }
        }
    }

    pub fn delete(&self, kind: ResourceKind, key: &ObjectKey) -> Option<ManagedResource> {
        self.resources
            .remove(&(kind, key.clone()))
            .map(|(_, r)| r)
    }

    /// Snapshot of a resource.
    pub fn snapshot(&self, kind: ResourceKind, key: &ObjectKey) -> Option<ManagedResource> {
        self.resources
            .get(&(kind, key.clone()))
            .map(|r| r.value().clone())
    }

    /// Number of status updates accepted so far.
    pub fn status_writes(&self) -> u64 {
        self.status_writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ResourceStore for InMemoryResourceStore {
    async fn get(
        &self,
        kind: ResourceKind,
        key: &ObjectKey,
    ) -> Result<Option<ManagedResource>, StoreError> {
        Ok(self.snapshot(kind, key))
    }

    async fn update_status(
        &self,
        kind: ResourceKind,
        key: &ObjectKey,
        status: ResourceStatus,
    ) -> Result<(), StoreError> {
        let mut resource = self
            .resources
            .get_mut(&(kind, key.clone()))
            .ok_or_else(|| StoreError::NotFound {
                kind,
                key: key.clone(),
            })?;
        resource.status = status;
        self.status_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
