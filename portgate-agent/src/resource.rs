//! Port-order resource model: identity, desired spec, observed status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Ordering endpoint used when the spec does not name one.
pub const DEFAULT_API_ENDPOINT: &str = "https://api.example.com/orders";

/// Transport protocol for an ordered port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    /// Uppercase form the ordering API expects.
    pub fn as_api_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "TCP",
            Protocol::Udp => "UDP",
        }
    }
}

/// One port to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortSpec {
    #[serde(rename = "type")]
    pub protocol: Protocol,
    pub number: u16,
}

/// Desired state: what to order. Immutable input to reconciliation; owned
/// by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortOrderSpec {
    /// Source network CIDR.
    pub source: String,
    /// Destination network CIDR.
    pub destination: String,
    /// Ports to open, in the order they should appear in the request.
    pub ports: Vec<PortSpec>,
    #[serde(default = "default_api_endpoint")]
    pub api_endpoint: String,
}

fn default_api_endpoint() -> String {
    DEFAULT_API_ENDPOINT.to_string()
}

/// Observed state persisted between passes. An empty `order_id` means the
/// order has not been placed externally yet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PortOrderStatus {
    pub order_id: String,
    /// Free-form status string reported by the ordering API.
    pub status: String,
    /// When the last placement attempt received a response.
    pub last_request_time: Option<DateTime<Utc>>,
    /// HTTP status of the last received response.
    pub last_response_status: Option<u16>,
}

/// Identity of a managed resource instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceMeta {
    pub uid: Uuid,
    pub name: String,
    /// Externally-visible name; bound to the order ID once placed.
    #[serde(default)]
    pub external_name: Option<String>,
    /// Provider config this resource connects through.
    pub provider_config: String,
}

/// A declared port order together with its identity and last known status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortOrder {
    pub meta: ResourceMeta,
    pub spec: PortOrderSpec,
    #[serde(default)]
    pub status: PortOrderStatus,
}

impl PortOrder {
    /// Idempotency key sent as `X-Request-ID`. Deterministic per resource
    /// so the remote side can deduplicate retried creates.
    pub fn request_id(&self) -> String {
        format!("portgate-{}", self.meta.uid)
    }
}
