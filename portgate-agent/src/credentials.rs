//! Credential resolution: opaque provider-config material into a typed
//! [`Credentials`] value.
//!
//! The blob is parsed once per connect and never persisted. An empty
//! payload is valid and yields an unauthenticated client.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use portgate_http::AuthKind;

/// Request timeout applied when the blob does not set one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Where credential material for a provider config comes from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "camelCase")]
pub enum CredentialSource {
    /// No credential material at all.
    #[default]
    None,
    /// Blob embedded directly in the provider config.
    Inline,
    /// Blob fetched from the backing secret store.
    Secret { name: String, key: String },
}

/// Typed credential configuration, resolved once per connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub auth: AuthKind,
    /// Opaque secret for the auth scheme (token, key, encoded pair).
    pub secret: String,
    /// Headers attached to every request made with these credentials.
    pub headers: HashMap<String, String>,
    pub timeout: Duration,
}

impl Default for Credentials {
    fn default() -> Self {
        Self {
            auth: AuthKind::None,
            secret: String::new(),
            headers: HashMap::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

#[derive(Debug, Error)]
pub enum CredentialError {
    /// Backing store unreachable, or the named secret is missing.
    #[error("cannot fetch credentials: {0}")]
    Fetch(String),
    /// Payload present but not well-formed.
    #[error("cannot parse credentials: {0}")]
    Parse(String),
}

#[derive(Debug, Error)]
#[error("secret store unavailable: {0}")]
pub struct SecretStoreError(pub String);

/// Read-only boundary to the backing secret store.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// `Ok(None)` means the secret does not exist; transport problems with
    /// the store itself are `Err`.
    async fn get(&self, name: &str, key: &str) -> Result<Option<Vec<u8>>, SecretStoreError>;
}

/// In-memory secret store, used by tests and by deployments that load
/// secrets from a local file at startup.
#[derive(Debug, Default)]
pub struct InMemorySecretStore {
    entries: HashMap<(String, String), Vec<u8>>,
}

impl InMemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, key: impl Into<String>, value: Vec<u8>) {
        self.entries.insert((name.into(), key.into()), value);
    }
}

#[async_trait]
impl SecretStore for InMemorySecretStore {
    async fn get(&self, name: &str, key: &str) -> Result<Option<Vec<u8>>, SecretStoreError> {
        Ok(self
            .entries
            .get(&(name.to_string(), key.to_string()))
            .cloned())
    }
}

/// Wire shape of the opaque credential blob. Unknown fields are tolerated.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CredentialBlob {
    #[serde(default)]
    auth_type: Option<String>,
    #[serde(default)]
    credentials: Option<String>,
    #[serde(default)]
    headers: HashMap<String, String>,
    #[serde(default)]
    timeout: Option<String>,
}

/// Parse an opaque credential payload. Empty input yields defaults.
pub fn parse_credentials(data: &[u8]) -> Result<Credentials, CredentialError> {
    if data.is_empty() {
        return Ok(Credentials::default());
    }

    let blob: CredentialBlob =
        serde_json::from_slice(data).map_err(|e| CredentialError::Parse(e.to_string()))?;

    let auth = match blob.auth_type.as_deref() {
        None => AuthKind::None,
        Some(s) => s
            .parse::<AuthKind>()
            .map_err(|e| CredentialError::Parse(e.to_string()))?,
    };

    let secret = blob.credentials.unwrap_or_default();
    if auth != AuthKind::None && secret.is_empty() {
        return Err(CredentialError::Parse(format!(
            "auth type {auth:?} requires credential material"
        )));
    }

    let timeout = match blob.timeout.as_deref() {
        None | Some("") => DEFAULT_TIMEOUT,
        Some(s) => humantime::parse_duration(s)
            .map_err(|e| CredentialError::Parse(format!("invalid timeout {s:?}: {e}")))?,
    };

    Ok(Credentials {
        auth,
        secret,
        headers: blob.headers,
        timeout,
    })
}

/// Resolve credential material for a provider config: fetch the blob per
/// the source kind, then parse it.
pub async fn resolve(
    source: &CredentialSource,
    inline: Option<&serde_json::Value>,
    store: &dyn SecretStore,
) -> Result<Credentials, CredentialError> {
    let data: Vec<u8> = match source {
        CredentialSource::None => Vec::new(),
        CredentialSource::Inline => match inline {
            Some(value) => serde_json::to_vec(value)
                .map_err(|e| CredentialError::Parse(e.to_string()))?,
            None => Vec::new(),
        },
        CredentialSource::Secret { name, key } => store
            .get(name, key)
            .await
            .map_err(|e| CredentialError::Fetch(e.to_string()))?
            .ok_or_else(|| {
                CredentialError::Fetch(format!("secret {name:?} key {key:?} not found"))
            })?,
    };

    parse_credentials(&data)
}
