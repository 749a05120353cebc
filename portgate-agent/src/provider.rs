//! Provider configurations: the explicit registry resources connect
//! through, and usage tracking for operator tooling.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::credentials::CredentialSource;
use crate::resource::ResourceMeta;

/// How to reach and authenticate against the ordering API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    pub name: String,
    #[serde(default)]
    pub credentials: CredentialSource,
    /// Inline credential blob; only read when the source is `Inline`.
    #[serde(default)]
    pub credential_data: Option<serde_json::Value>,
    /// Skip TLS verification for the ordering endpoint. Lab use only.
    #[serde(default)]
    pub insecure_skip_tls_verify: bool,
}

/// Explicit registry of provider configs, built at startup and handed to
/// the driver. There is no process-global registration.
#[derive(Debug, Default)]
pub struct ProviderRegistry {
    configs: HashMap<String, ProviderConfig>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_configs(configs: impl IntoIterator<Item = ProviderConfig>) -> Self {
        let mut registry = Self::new();
        for config in configs {
            registry.insert(config);
        }
        registry
    }

    pub fn insert(&mut self, config: ProviderConfig) {
        self.configs.insert(config.name.clone(), config);
    }

    pub fn get(&self, name: &str) -> Option<&ProviderConfig> {
        self.configs.get(name)
    }

    pub fn len(&self) -> usize {
        self.configs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }
}

#[derive(Debug, Error)]
#[error("cannot track provider config usage for {resource:?}: {reason}")]
pub struct UsageError {
    pub resource: String,
    pub reason: String,
}

/// Records which resources use which provider config so configs in use can
/// be protected from removal.
pub trait UsageTracker: Send + Sync {
    fn track(&self, resource: &ResourceMeta, config_name: &str) -> Result<(), UsageError>;
}

/// In-memory tracker keeping unique (resource, config) pairs.
#[derive(Debug, Default)]
pub struct InMemoryUsageTracker {
    seen: Mutex<HashSet<(Uuid, String)>>,
}

impl InMemoryUsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn usages(&self) -> usize {
        self.seen.lock().map(|s| s.len()).unwrap_or(0)
    }
}

impl UsageTracker for InMemoryUsageTracker {
    fn track(&self, resource: &ResourceMeta, config_name: &str) -> Result<(), UsageError> {
        let mut seen = self.seen.lock().map_err(|_| UsageError {
            resource: resource.name.clone(),
            reason: "usage set poisoned".to_string(),
        })?;
        seen.insert((resource.uid, config_name.to_string()));
        Ok(())
    }
}
