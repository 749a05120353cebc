//! Reconcile driver: one serialized pass per resource.
//!
//! The driver relies on exclusive ownership of each resource for the
//! at-most-one-pass guarantee: a resource is only ever handed to one
//! `reconcile` call at a time, so no per-resource locking is needed.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, error};

use crate::connector::{ConnectError, Connector};
use crate::controller::ControllerError;
use crate::resource::PortOrder;

/// Closed set of resource kinds the driver reconciles. Dispatch is by
/// variant; there is no runtime type assertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ManagedResource {
    PortOrder(PortOrder),
}

impl ManagedResource {
    pub fn name(&self) -> &str {
        match self {
            ManagedResource::PortOrder(order) => &order.meta.name,
        }
    }
}

/// What a pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    /// Resource already exists externally; nothing was sent.
    UpToDate,
    /// The order was placed this pass.
    Created,
}

#[derive(Debug, Error)]
pub enum PassError {
    #[error(transparent)]
    Connect(#[from] ConnectError),
    #[error(transparent)]
    Controller(#[from] ControllerError),
}

/// Totals for one sweep over the declared resources.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub created: usize,
    pub up_to_date: usize,
    pub failed: usize,
}

/// Runs reconcile passes through a [`Connector`].
pub struct Driver {
    connector: Connector,
    /// Upper bound for one pass, including retries and backoff.
    pass_timeout: Duration,
}

impl Driver {
    pub fn new(connector: Connector, pass_timeout: Duration) -> Self {
        Self {
            connector,
            pass_timeout,
        }
    }

    /// Run one reconcile pass for a single resource.
    ///
    /// A failed pass leaves the resource's identifier fields untouched;
    /// only the attempt-tracking fields may have moved.
    pub async fn reconcile(&self, resource: &mut ManagedResource) -> Result<PassOutcome, PassError> {
        match resource {
            ManagedResource::PortOrder(order) => self.reconcile_port_order(order).await,
        }
    }

    async fn reconcile_port_order(&self, order: &mut PortOrder) -> Result<PassOutcome, PassError> {
        let deadline = Instant::now() + self.pass_timeout;
        let client = self.connector.connect(order).await?;

        let observation = client.observe(order);
        if observation.exists {
            client.update(order).await?;
            debug!(
                resource = %order.meta.name,
                order_id = %order.status.order_id,
                "up to date"
            );
            return Ok(PassOutcome::UpToDate);
        }

        client.create(order, Some(deadline)).await?;
        Ok(PassOutcome::Created)
    }

    /// Reconcile every declared resource in turn. One resource's failure
    /// never blocks the others; failures are logged and counted.
    pub async fn sweep(&self, resources: &mut [ManagedResource]) -> SweepReport {
        let mut report = SweepReport::default();
        for resource in resources.iter_mut() {
            match self.reconcile(resource).await {
                Ok(PassOutcome::Created) => report.created += 1,
                Ok(PassOutcome::UpToDate) => report.up_to_date += 1,
                Err(e) => {
                    error!(resource = %resource.name(), error = %format_chain(&e), "reconcile pass failed");
                    report.failed += 1;
                }
            }
        }
        report
    }
}

/// Render an error with its source chain, so a failed pass can be logged
/// without further lookups.
fn format_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str(": ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}
