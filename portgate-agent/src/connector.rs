//! Connector: resolves a resource's provider config into a per-pass
//! external client.

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use portgate_http::{AuthKind, AuthMiddleware, HttpClient, JsonMiddleware, LoggingMiddleware};

use crate::controller::OrderClient;
use crate::credentials::{self, CredentialError, SecretStore};
use crate::provider::{ProviderRegistry, UsageError, UsageTracker};
use crate::resource::PortOrder;

/// Each step of connect has its own failure mode; the driver retries the
/// whole pass later, so none of these are retried here.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("cannot track provider config usage for {name:?}")]
    TrackUsage {
        name: String,
        #[source]
        source: UsageError,
    },

    #[error("provider config {name:?} not found")]
    ConfigNotFound { name: String },

    #[error("cannot resolve credentials for provider config {name:?}")]
    Credentials {
        name: String,
        #[source]
        source: CredentialError,
    },

    #[error("cannot build HTTP client for provider config {name:?}")]
    BuildClient {
        name: String,
        #[source]
        source: portgate_http::Error,
    },
}

/// Wires credential resolution into a configured execution client.
pub struct Connector {
    registry: Arc<ProviderRegistry>,
    usage: Arc<dyn UsageTracker>,
    secrets: Arc<dyn SecretStore>,
}

impl Connector {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        usage: Arc<dyn UsageTracker>,
        secrets: Arc<dyn SecretStore>,
    ) -> Self {
        Self {
            registry,
            usage,
            secrets,
        }
    }

    /// Produce an external client for one reconcile pass.
    ///
    /// The client is scoped to this resource and pass; it must not be
    /// shared with concurrent passes for other resources.
    pub async fn connect(&self, order: &PortOrder) -> Result<OrderClient, ConnectError> {
        let config_name = order.meta.provider_config.clone();

        self.usage
            .track(&order.meta, &config_name)
            .map_err(|source| ConnectError::TrackUsage {
                name: config_name.clone(),
                source,
            })?;

        let config = self
            .registry
            .get(&config_name)
            .ok_or_else(|| ConnectError::ConfigNotFound {
                name: config_name.clone(),
            })?;

        let creds = credentials::resolve(
            &config.credentials,
            config.credential_data.as_ref(),
            self.secrets.as_ref(),
        )
        .await
        .map_err(|source| ConnectError::Credentials {
            name: config_name.clone(),
            source,
        })?;

        let mut builder = HttpClient::builder()
            .timeout(creds.timeout)
            .danger_accept_invalid_certs(config.insecure_skip_tls_verify)
            .middleware(LoggingMiddleware)
            .middleware(JsonMiddleware);
        if creds.auth != AuthKind::None {
            builder = builder.middleware(AuthMiddleware::new(creds.auth, creds.secret.clone()));
        }
        let http = builder
            .build()
            .map_err(|source| ConnectError::BuildClient {
                name: config_name.clone(),
                source,
            })?;

        debug!(
            resource = %order.meta.name,
            provider_config = %config_name,
            "connected"
        );

        Ok(OrderClient::new(http, creds.headers))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::{CredentialSource, InMemorySecretStore};
    use crate::provider::{InMemoryUsageTracker, ProviderConfig};
    use crate::resource::{PortOrderSpec, PortSpec, Protocol, ResourceMeta};
    use uuid::Uuid;

    fn order(provider_config: &str) -> PortOrder {
        PortOrder {
            meta: ResourceMeta {
                uid: Uuid::new_v4(),
                name: "db-to-app".to_string(),
                external_name: None,
                provider_config: provider_config.to_string(),
            },
            spec: PortOrderSpec {
                source: "10.0.0.0/24".to_string(),
                destination: "10.1.0.0/24".to_string(),
                ports: vec![PortSpec {
                    protocol: Protocol::Tcp,
                    number: 5432,
                }],
                api_endpoint: "http://127.0.0.1:1/orders".to_string(),
            },
            status: Default::default(),
        }
    }

    fn connector(registry: ProviderRegistry) -> (Connector, Arc<InMemoryUsageTracker>) {
        let usage = Arc::new(InMemoryUsageTracker::new());
        let connector = Connector::new(
            Arc::new(registry),
            usage.clone(),
            Arc::new(InMemorySecretStore::new()),
        );
        (connector, usage)
    }

    #[tokio::test]
    async fn connect_tracks_usage_and_builds_client() {
        let registry = ProviderRegistry::from_configs([ProviderConfig {
            name: "default".to_string(),
            credentials: CredentialSource::None,
            credential_data: None,
            insecure_skip_tls_verify: false,
        }]);
        let (connector, usage) = connector(registry);

        connector.connect(&order("default")).await.unwrap();
        assert_eq!(usage.usages(), 1);
    }

    #[tokio::test]
    async fn unknown_provider_config_fails() {
        let (connector, _) = connector(ProviderRegistry::new());

        let err = connector.connect(&order("missing")).await.unwrap_err();
        assert!(matches!(err, ConnectError::ConfigNotFound { name } if name == "missing"));
    }

    #[tokio::test]
    async fn missing_secret_surfaces_as_credential_error() {
        let registry = ProviderRegistry::from_configs([ProviderConfig {
            name: "prod".to_string(),
            credentials: CredentialSource::Secret {
                name: "orders-api".to_string(),
                key: "creds".to_string(),
            },
            credential_data: None,
            insecure_skip_tls_verify: false,
        }]);
        let (connector, _) = connector(registry);

        let err = connector.connect(&order("prod")).await.unwrap_err();
        assert!(matches!(err, ConnectError::Credentials { .. }));
    }
}
