//! # Source Getters
//!
//! A [`Getter`] retrieves the bytes behind one URL. [`Getters`] selects a
//! getter by URL scheme; an unknown scheme is a non-retryable
//! [`TransportError::UnsupportedScheme`].
//!
//! [`HttpGetter`] serves `http` and `https` with `reqwest`. Requests that
//! carry TLS material get a dedicated client; everything else shares one
//! pooled client.
//!
//! Retries are not built into getters. The reconciler decides when to try
//! again from [`TransportError::is_retryable()`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use url::Url;
use zeroize::Zeroizing;

use crate::error::TransportError;
use crate::options::{FetchOptions, TlsOptions};

/// Fetches the content at a URL.
#[async_trait]
pub trait Getter: Send + Sync {
    async fn get(
        &self,
        url: &Url,
        options: &FetchOptions,
        timeout: Duration,
    ) -> Result<Bytes, TransportError>;
}

/// Getter registry keyed by URL scheme.
#[derive(Clone, Default)]
pub struct Getters {
    by_scheme: HashMap<String, Arc<dyn Getter>>,
}

impl Getters {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry serving `http` and `https`.
    pub fn http() -> Result<Self, TransportError> {
        let http: Arc<dyn Getter> = Arc::new(HttpGetter::new()?);
        Ok(Self::new()
            .with("http", http.clone())
            .with("https", http))
    }

    /// Register `getter` for `scheme`, replacing any previous one.
    pub fn with(mut self, scheme: &str, getter: Arc<dyn Getter>) -> Self {
        self.by_scheme.insert(scheme.to_ascii_lowercase(), getter);
        self
    }

    pub fn by_scheme(&self, scheme: &str) -> Result<Arc<dyn Getter>, TransportError> {
        self.by_scheme
            .get(&scheme.to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| TransportError::UnsupportedScheme {
                scheme: scheme.to_string(),
            })
    }

    /// Fetch `url` with the getter registered for its scheme.
    pub async fn get(
        &self,
        url: &Url,
        options: &FetchOptions,
        timeout: Duration,
    ) -> Result<Bytes, TransportError> {
        let getter = self.by_scheme(url.scheme())?;
        getter.get(url, options, timeout).await
    }
}

impl std::fmt::Debug for Getters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut schemes: Vec<_> = self.by_scheme.keys().collect();
        schemes.sort();
        f.debug_struct("Getters").field("schemes", &schemes).finish()
    }
}

/// Parse a user-supplied source URL.
pub fn parse_source_url(raw: &str) -> Result<Url, TransportError> {
    Url::parse(raw.trim()).map_err(|e| TransportError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })
}

/// The index location of a chart repository: `<url>/index.yaml`.
pub fn repository_index_url(repository_url: &str) -> Result<Url, TransportError> {
    parse_source_url(repository_url)?;
    parse_source_url(&format!(
        "{}/index.yaml",
        repository_url.trim().trim_end_matches('/')
    ))
}

/// Resolve a chart reference from an index. Relative references are
/// resolved against the repository URL.
pub fn resolve_chart_url(repository_url: &str, reference: &str) -> Result<Url, TransportError> {
    match Url::parse(reference) {
        Ok(url) => Ok(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            let base = parse_source_url(&format!(
                "{}/",
                repository_url.trim().trim_end_matches('/')
            ))?;
            base.join(reference).map_err(|e| TransportError::InvalidUrl {
                url: reference.to_string(),
                reason: format!("invalid chart URL format '{reference}': {e}"),
            })
        }
        Err(e) => Err(TransportError::InvalidUrl {
            url: reference.to_string(),
            reason: format!("invalid chart URL format '{reference}': {e}"),
        }),
    }
}

/// `http`/`https` getter.
#[derive(Debug, Clone)]
pub struct HttpGetter {
    client: reqwest::Client,
}

impl HttpGetter {
    pub fn new() -> Result<Self, TransportError> {
        let client = Self::builder()
            .build()
            .map_err(|e| TransportError::Tls(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    fn builder() -> reqwest::ClientBuilder {
        reqwest::Client::builder()
            .use_rustls_tls()
            .user_agent(concat!("srcache/", env!("CARGO_PKG_VERSION")))
    }

    fn client_for(&self, tls: Option<&TlsOptions>) -> Result<reqwest::Client, TransportError> {
        let tls = match tls {
            Some(tls) if !tls.is_empty() => tls,
            _ => return Ok(self.client.clone()),
        };
        let mut builder = Self::builder();
        if let Some(ca) = &tls.ca {
            for cert in reqwest::Certificate::from_pem_bundle(ca).map_err(|e| {
                TransportError::Tls(format!("can't create TLS config for client: {e}"))
            })? {
                builder = builder.add_root_certificate(cert);
            }
        }
        if let (Some(cert), Some(key)) = (&tls.cert, &tls.key) {
            let mut pem = Zeroizing::new(cert.clone());
            pem.push(b'\n');
            pem.extend_from_slice(key);
            let identity = reqwest::Identity::from_pem(&pem).map_err(|e| {
                TransportError::Tls(format!("can't create TLS config for client: {e}"))
            })?;
            builder = builder.identity(identity);
        }
        builder
            .build()
            .map_err(|e| TransportError::Tls(format!("can't create TLS config for client: {e}")))
    }
}

#[async_trait]
impl Getter for HttpGetter {
    async fn get(
        &self,
        url: &Url,
        options: &FetchOptions,
        timeout: Duration,
    ) -> Result<Bytes, TransportError> {
        let client = self.client_for(options.tls.as_ref())?;
        let mut request = client.get(url.clone()).timeout(timeout);
        if let Some(auth) = &options.basic_auth {
            request = request.basic_auth(&auth.username, Some(auth.password.as_str()));
        }

        let map_err = |e: reqwest::Error| {
            if e.is_timeout() {
                TransportError::Timeout {
                    url: url.to_string(),
                    after: timeout,
                }
            } else {
                TransportError::Network {
                    url: url.to_string(),
                    reason: e.to_string(),
                }
            }
        };

        let response = request.send().await.map_err(map_err)?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let body = response.bytes().await.map_err(map_err)?;
        tracing::debug!(url = %url, bytes = body.len(), "fetched source");
        Ok(body)
    }
}
