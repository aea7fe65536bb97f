//! Credential resolution.
//!
//! A resource names a secret in its own namespace; a [`CredentialResolver`]
//! turns that reference into [`FetchOptions`] or a typed error. The backing
//! secret store belongs to the host.

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::CredentialError;
use crate::options::{options_from_secret, FetchOptions, Secret};

/// Resolves a secret reference into fetch options.
#[async_trait]
pub trait CredentialResolver: Send + Sync {
    async fn resolve(&self, namespace: &str, name: &str) -> Result<FetchOptions, CredentialError>;
}

/// Secret store held in memory, keyed by namespace and name.
#[derive(Debug, Default)]
pub struct InMemorySecrets {
    secrets: DashMap<(String, String), Secret>,
}

impl InMemorySecrets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a secret.
    pub fn insert(&self, namespace: &str, secret: Secret) {
        self.secrets
            .insert((namespace.to_string(), secret.name.clone()), secret);
    }

    pub fn remove(&self, namespace: &str, name: &str) -> Option<Secret> {
        self.secrets
            .remove(&(namespace.to_string(), name.to_string()))
            .map(|(_, s)| s)
    }
}

#[async_trait]
impl CredentialResolver for InMemorySecrets {
    async fn resolve(&self, namespace: &str, name: &str) -> Result<FetchOptions, CredentialError> {
        let key = (namespace.to_string(), name.to_string());
        let secret = self
            .secrets
            .get(&key)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| CredentialError::NotFound {
                namespace: namespace.to_string(),
                name: name.to_string(),
            })?;
        options_from_secret(&secret)
    }
}
