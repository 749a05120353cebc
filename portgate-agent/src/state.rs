//! Local desired-state and config files.
//!
//! The agent's storage boundary: desired resources are read from a JSON
//! manifest and the observed status is written back after every sweep.
//! Writes go through a temp file and rename so a crash never leaves a
//! half-written manifest.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::credentials::InMemorySecretStore;
use crate::provider::{ProviderConfig, ProviderRegistry};
use crate::scheduler::ManagedResource;

/// Load the declared resources from a manifest file.
pub fn load_resources(path: impl AsRef<Path>) -> Result<Vec<ManagedResource>> {
    let path = path.as_ref();
    let data = fs::read_to_string(path)
        .with_context(|| format!("cannot read manifest {}", path.display()))?;
    serde_json::from_str(&data)
        .with_context(|| format!("cannot parse manifest {}", path.display()))
}

/// Persist resources (with their updated status) back to the manifest.
pub fn save_resources(path: impl AsRef<Path>, resources: &[ManagedResource]) -> Result<()> {
    let path = path.as_ref();
    let data = serde_json::to_string_pretty(resources).context("cannot serialize manifest")?;

    let tmp = path.with_extension("tmp");
    fs::write(&tmp, data).with_context(|| format!("cannot write {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .with_context(|| format!("cannot replace manifest {}", path.display()))?;
    Ok(())
}

/// Load provider configs into an explicit registry.
pub fn load_providers(path: impl AsRef<Path>) -> Result<ProviderRegistry> {
    let path = path.as_ref();
    let data = fs::read_to_string(path)
        .with_context(|| format!("cannot read provider configs {}", path.display()))?;
    let configs: Vec<ProviderConfig> = serde_json::from_str(&data)
        .with_context(|| format!("cannot parse provider configs {}", path.display()))?;
    Ok(ProviderRegistry::from_configs(configs))
}

/// Secrets file shape: secret name -> key -> value string.
#[derive(Debug, Deserialize)]
struct SecretsFile(std::collections::HashMap<String, std::collections::HashMap<String, String>>);

/// Load a secrets file into the in-memory store backing `Secret`
/// credential sources.
pub fn load_secrets(path: impl AsRef<Path>) -> Result<InMemorySecretStore> {
    let path = path.as_ref();
    let data = fs::read_to_string(path)
        .with_context(|| format!("cannot read secrets {}", path.display()))?;
    let file: SecretsFile = serde_json::from_str(&data)
        .with_context(|| format!("cannot parse secrets {}", path.display()))?;

    let mut store = InMemorySecretStore::new();
    for (name, entries) in file.0 {
        for (key, value) in entries {
            store.insert(name.clone(), key, value.into_bytes());
        }
    }
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::SecretStore;
    use crate::resource::{PortOrder, PortOrderSpec, PortSpec, Protocol, ResourceMeta};
    use uuid::Uuid;

    fn sample_resources() -> Vec<ManagedResource> {
        vec![ManagedResource::PortOrder(PortOrder {
            meta: ResourceMeta {
                uid: Uuid::new_v4(),
                name: "db-to-app".to_string(),
                external_name: None,
                provider_config: "default".to_string(),
            },
            spec: PortOrderSpec {
                source: "10.0.0.0/24".to_string(),
                destination: "10.1.0.0/24".to_string(),
                ports: vec![PortSpec {
                    protocol: Protocol::Tcp,
                    number: 443,
                }],
                api_endpoint: "http://127.0.0.1:1/orders".to_string(),
            },
            status: Default::default(),
        })]
    }

    #[test]
    fn manifest_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let resources = sample_resources();
        save_resources(&path, &resources).unwrap();
        let loaded = load_resources(&path).unwrap();

        assert_eq!(loaded, resources);
    }

    #[test]
    fn missing_manifest_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_resources(dir.path().join("absent.json")).is_err());
    }

    #[test]
    fn providers_file_loads_into_registry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("providers.json");
        fs::write(
            &path,
            r#"[
                {"name": "default"},
                {"name": "prod", "credentials": {"source": "secret", "name": "orders-api", "key": "creds"}}
            ]"#,
        )
        .unwrap();

        let registry = load_providers(&path).unwrap();
        assert_eq!(registry.len(), 2);
        assert!(registry.get("prod").is_some());
    }

    #[tokio::test]
    async fn secrets_file_loads_into_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secrets.json");
        fs::write(
            &path,
            r#"{"orders-api": {"creds": "{\"authType\":\"bearer\",\"credentials\":\"t\"}"}}"#,
        )
        .unwrap();

        let store = load_secrets(&path).unwrap();
        let blob = store.get("orders-api", "creds").await.unwrap().unwrap();
        assert!(blob.starts_with(b"{\"authType\""));
    }
}
