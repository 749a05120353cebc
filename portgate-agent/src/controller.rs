//! External-resource controller for port orders.
//!
//! Two states: absent (no persisted order ID) and created (ID persisted,
//! terminal). Observe infers existence purely from the persisted ID; there
//! is no live check against the ordering API. Orders are immutable once
//! placed, so Update does nothing, and the remote order is never cancelled,
//! so Delete only discards local state.

use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info};

use portgate_http::{HttpClient, Payload, Request, RetryPolicy};

use crate::resource::{PortOrder, PortSpec};

/// Retry schedule for order placement. Transport-level only; domain
/// rejections are final.
const CREATE_RETRY: RetryPolicy = RetryPolicy::new(3, 2);

/// Wire format of a placement request.
#[derive(Debug, Serialize)]
struct OrderRequest<'a> {
    order: OrderBody<'a>,
}

#[derive(Debug, Serialize)]
struct OrderBody<'a> {
    source: &'a str,
    destination: &'a str,
    ports: Vec<ApiPort>,
}

#[derive(Debug, PartialEq, Eq, Serialize)]
struct ApiPort {
    protocol: &'static str,
    port: u16,
}

/// Wire format of a placement response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderResponse {
    order_id: String,
    status: String,
}

/// What Observe concluded about a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    pub exists: bool,
    pub up_to_date: bool,
}

#[derive(Debug, Error)]
pub enum ControllerError {
    /// Request body did not marshal. Not retried; retrying cannot fix it.
    #[error("cannot marshal order request for {name:?}")]
    BuildRequest {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    /// The execution client gave up (transport exhausted, deadline, or a
    /// malformed request).
    #[error("order request for {name:?} failed")]
    Request {
        name: String,
        #[source]
        source: portgate_http::Error,
    },

    /// The API answered with something other than 200/201. Terminal for
    /// this pass; carries the body for diagnostics.
    #[error("unexpected status {status} creating order {name:?}: {body}")]
    UnexpectedStatus {
        name: String,
        status: u16,
        body: String,
    },

    /// A success status whose body did not parse as an order response.
    #[error("cannot parse order response for {name:?}")]
    ParseResponse {
        name: String,
        #[source]
        source: serde_json::Error,
    },
}

/// External client for one reconcile pass: the execution client plus the
/// provider's default headers. The header map is treated as immutable;
/// every request gets its own copy.
#[derive(Debug)]
pub struct OrderClient {
    http: HttpClient,
    default_headers: HashMap<String, String>,
}

impl OrderClient {
    pub fn new(http: HttpClient, default_headers: HashMap<String, String>) -> Self {
        Self {
            http,
            default_headers,
        }
    }

    /// Report existence from the persisted order ID alone. No side
    /// effects, no network call.
    pub fn observe(&self, order: &PortOrder) -> Observation {
        if order.status.order_id.is_empty() {
            return Observation {
                exists: false,
                up_to_date: false,
            };
        }
        // One-shot orders: once placed they are treated as final.
        Observation {
            exists: true,
            up_to_date: true,
        }
    }

    /// Place the order. Only valid while the resource is absent.
    ///
    /// Identifier fields are updated atomically and only after a parsed
    /// success; `last_request_time` and `last_response_status` record every
    /// received response, successful or not.
    pub async fn create(
        &self,
        order: &mut PortOrder,
        deadline: Option<Instant>,
    ) -> Result<(), ControllerError> {
        let name = order.meta.name.clone();
        debug!(resource = %name, endpoint = %order.spec.api_endpoint, "creating port order");

        let body = serde_json::to_vec(&OrderRequest {
            order: OrderBody {
                source: &order.spec.source,
                destination: &order.spec.destination,
                ports: api_ports(&order.spec.ports),
            },
        })
        .map_err(|source| ControllerError::BuildRequest {
            name: name.clone(),
            source,
        })?;

        let mut request = Request::post(order.spec.api_endpoint.as_str())
            .with_body(Payload::clear(body))
            .with_retry(CREATE_RETRY);
        for (header, value) in &self.default_headers {
            request = request.with_header(header.clone(), value.clone());
        }
        request = request.with_header("X-Request-ID", order.request_id());

        let response = self
            .http
            .execute(request, deadline)
            .await
            .map_err(|source| ControllerError::Request {
                name: name.clone(),
                source,
            })?;

        // A response was received; record the attempt before judging it.
        order.status.last_request_time = Some(Utc::now());
        order.status.last_response_status = Some(response.status);

        if response.status != 200 && response.status != 201 {
            return Err(ControllerError::UnexpectedStatus {
                name,
                status: response.status,
                body: String::from_utf8_lossy(&response.body).into_owned(),
            });
        }

        let parsed: OrderResponse = serde_json::from_slice(&response.body).map_err(|source| {
            ControllerError::ParseResponse {
                name: name.clone(),
                source,
            }
        })?;

        info!(
            resource = %name,
            order_id = %parsed.order_id,
            status = %parsed.status,
            "order placed"
        );
        order.status.order_id = parsed.order_id.clone();
        order.status.status = parsed.status;
        order.meta.external_name = Some(parsed.order_id);

        Ok(())
    }

    /// Orders are immutable once placed; spec drift is ignored by design.
    pub async fn update(&self, order: &PortOrder) -> Result<(), ControllerError> {
        debug!(resource = %order.meta.name, "update is a no-op for placed orders");
        Ok(())
    }

    /// No cancellation request is sent; deletion only discards local
    /// state. The remote order, if any, stays in place.
    pub async fn delete(&self, order: &PortOrder) -> Result<(), ControllerError> {
        debug!(resource = %order.meta.name, "delete is local-only for port orders");
        Ok(())
    }
}

/// Convert spec ports to the API format, preserving input order.
fn api_ports(ports: &[PortSpec]) -> Vec<ApiPort> {
    ports
        .iter()
        .map(|p| ApiPort {
            protocol: p.protocol.as_api_str(),
            port: p.number,
        })
        .collect()
}
