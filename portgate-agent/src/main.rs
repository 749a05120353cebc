//! portgate-agent: reconciles declared port orders with a remote ordering
//! API.
//!
//! The agent loads desired state from a local manifest, runs one serialized
//! reconcile pass per resource (connect, observe, create when absent), and
//! writes observed status back for the next pass. Placed orders are
//! terminal: they are never updated or cancelled remotely.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use portgate_agent::connector::Connector;
use portgate_agent::credentials::InMemorySecretStore;
use portgate_agent::provider::InMemoryUsageTracker;
use portgate_agent::scheduler::Driver;
use portgate_agent::state;

/// portgate Agent
#[derive(Parser, Debug)]
#[command(name = "portgate-agent", version, about)]
struct Args {
    /// Desired-state manifest (JSON list of resources)
    #[arg(long, default_value = "portgate-state.json")]
    state_file: String,

    /// Provider config file (JSON list of provider configs)
    #[arg(long, default_value = "portgate-providers.json")]
    provider_file: String,

    /// Secrets file backing secret-sourced credentials
    #[arg(long)]
    secrets_file: Option<String>,

    /// Seconds between reconcile sweeps
    #[arg(long, default_value = "60")]
    poll_interval: u64,

    /// Upper bound in seconds for a single reconcile pass
    #[arg(long, default_value = "30")]
    pass_timeout: u64,

    /// Run a single sweep and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "portgate_agent=info,portgate_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    info!("Starting portgate-agent");
    info!("Manifest: {}", args.state_file);

    let registry = Arc::new(
        state::load_providers(&args.provider_file).context("Failed to load provider configs")?,
    );
    let secrets = Arc::new(match &args.secrets_file {
        Some(path) => state::load_secrets(path).context("Failed to load secrets")?,
        None => InMemorySecretStore::new(),
    });
    let usage = Arc::new(InMemoryUsageTracker::new());

    let connector = Connector::new(registry, usage, secrets);
    let driver = Driver::new(connector, Duration::from_secs(args.pass_timeout));

    // Manifest I/O failures inside the loop are transient (editor mid-save,
    // NFS hiccup): log and try again next tick. Only --once propagates them.
    let mut interval = tokio::time::interval(Duration::from_secs(args.poll_interval));
    loop {
        interval.tick().await;

        let mut resources = match state::load_resources(&args.state_file) {
            Ok(resources) => resources,
            Err(e) => {
                if args.once {
                    return Err(e.context("Failed to load desired state"));
                }
                error!("Failed to load desired state: {e:#}");
                continue;
            }
        };

        let report = driver.sweep(&mut resources).await;
        info!(
            created = report.created,
            up_to_date = report.up_to_date,
            failed = report.failed,
            "sweep complete"
        );

        if let Err(e) = state::save_resources(&args.state_file, &resources) {
            if args.once {
                return Err(e.context("Failed to persist status"));
            }
            error!("Failed to persist status: {e:#}");
        }

        if args.once {
            break;
        }
    }

    Ok(())
}
