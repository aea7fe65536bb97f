//! # Fetch Options
//!
//! Connection options a getter applies to one request, and their
//! derivation from a credential secret.
//!
//! ## Secret Keys
//!
//! | Key | Meaning |
//! |---|---|
//! | `username`, `password` | HTTP basic auth. Both or neither. |
//! | `certFile`, `keyFile` | PEM client certificate and key. Both or neither. |
//! | `caFile` | PEM bundle of additional trusted roots. |
//!
//! TLS material is parsed with [`reqwest::Certificate`] and
//! [`reqwest::Identity`] here, so an unusable secret is reported as
//! malformed before any request is made. Key material is held in
//! [`Zeroizing`] buffers and never printed.

use std::collections::BTreeMap;

use zeroize::Zeroizing;

use crate::error::CredentialError;

/// HTTP basic-auth credentials.
#[derive(Clone)]
pub struct BasicAuth {
    pub username: String,
    pub password: Zeroizing<String>,
}

impl std::fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicAuth")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// TLS material for a request.
#[derive(Clone, Default)]
pub struct TlsOptions {
    /// PEM client certificate chain.
    pub cert: Option<Vec<u8>>,
    /// PEM private key for `cert`.
    pub key: Option<Zeroizing<Vec<u8>>>,
    /// PEM bundle of extra trusted roots.
    pub ca: Option<Vec<u8>>,
}

impl TlsOptions {
    pub fn is_empty(&self) -> bool {
        self.cert.is_none() && self.key.is_none() && self.ca.is_none()
    }
}

impl std::fmt::Debug for TlsOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsOptions")
            .field("cert", &self.cert.as_ref().map(|c| c.len()))
            .field("key", &self.key.as_ref().map(|_| "[REDACTED]"))
            .field("ca", &self.ca.as_ref().map(|c| c.len()))
            .finish()
    }
}

/// Options applied by a [`Getter`](crate::Getter) to one fetch.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    pub basic_auth: Option<BasicAuth>,
    pub tls: Option<TlsOptions>,
}

impl FetchOptions {
    /// No credentials.
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn with_basic_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.basic_auth = Some(BasicAuth {
            username: username.into(),
            password: Zeroizing::new(password.into()),
        });
        self
    }
}

/// A named bag of secret data, as stored by the credential backend.
#[derive(Clone, Default)]
pub struct Secret {
    pub name: String,
    pub data: BTreeMap<String, Vec<u8>>,
}

impl Secret {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<Vec<u8>>) -> Self {
        self.data.insert(key.to_string(), value.into());
        self
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secret")
            .field("name", &self.name)
            .field("keys", &self.data.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Derive fetch options from a credential secret.
pub fn options_from_secret(secret: &Secret) -> Result<FetchOptions, CredentialError> {
    let malformed = |reason: &str| CredentialError::Malformed {
        name: secret.name.clone(),
        reason: reason.to_string(),
    };
    let get = |key: &str| secret.data.get(key).filter(|v| !v.is_empty());

    let mut options = FetchOptions::default();

    match (get("username"), get("password")) {
        (None, None) => {}
        (Some(user), Some(pass)) => {
            let username = String::from_utf8(user.clone())
                .map_err(|_| malformed("'username' is not valid UTF-8"))?;
            let password = Zeroizing::new(
                String::from_utf8(pass.clone())
                    .map_err(|_| malformed("'password' is not valid UTF-8"))?,
            );
            options.basic_auth = Some(BasicAuth { username, password });
        }
        _ => return Err(malformed("required fields 'username' and 'password'")),
    }

    let mut tls = TlsOptions::default();
    match (get("certFile"), get("keyFile")) {
        (None, None) => {}
        (Some(cert), Some(key)) => {
            let mut pem = Zeroizing::new(Vec::with_capacity(cert.len() + key.len() + 1));
            pem.extend_from_slice(cert);
            pem.push(b'\n');
            pem.extend_from_slice(key);
            reqwest::Identity::from_pem(&pem).map_err(|e| {
                malformed(&format!("'certFile' and 'keyFile' are not a usable PEM key pair: {e}"))
            })?;
            tls.cert = Some(cert.clone());
            tls.key = Some(Zeroizing::new(key.clone()));
        }
        _ => return Err(malformed("required fields 'certFile' and 'keyFile'")),
    }
    if let Some(ca) = get("caFile") {
        let roots = reqwest::Certificate::from_pem_bundle(ca).unwrap_or_default();
        if roots.is_empty() {
            return Err(malformed(
                "can't create TLS config for client: failed to append certificates from file",
            ));
        }
        tls.ca = Some(ca.clone());
    }
    if !tls.is_empty() {
        options.tls = Some(tls);
    }

    Ok(options)
}
