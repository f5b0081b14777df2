//! LedgerLink credential service.
//!
//! Composition root: loads configuration, wires the configured credential
//! backend to the upstream authorization server, and runs the background
//! health-probe and reconciliation tasks until Ctrl-C or SIGTERM.
//!
//! Run with: cargo run --bin ledgerlink-server
//! Metrics: http://localhost:9090/metrics

use anyhow::Context;
use ledgerlink_auth::config::{
    AuthorizationServerConfig, CredentialConfig, HealthConfig, ReconciliationConfig, StoreConfig,
};
use ledgerlink_auth::environment::CredentialEnvironment;
use ledgerlink_auth::providers::HttpAuthorizationServer;
use ledgerlink_auth::{CredentialBackend, CredentialService};
use ledgerlink_runtime::metrics::MetricsServer;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const DEFAULT_METRICS_ADDR: &str = "0.0.0.0:9090";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file (if present)
    let _ = dotenvy::dotenv();

    init_tracing()?;
    info!("Starting LedgerLink credential service");

    // Metrics
    let metrics_addr: SocketAddr = std::env::var("METRICS_ADDR")
        .unwrap_or_else(|_| DEFAULT_METRICS_ADDR.to_string())
        .parse()
        .context("METRICS_ADDR is not a socket address")?;
    let mut metrics = MetricsServer::new(metrics_addr);
    metrics.start().context("Failed to start metrics exporter")?;

    // Configuration
    let authorization_config =
        AuthorizationServerConfig::from_env().context("Invalid authorization server configuration")?;
    let store_config = StoreConfig::from_env().context("Invalid credential store configuration")?;
    info!(?authorization_config, ?store_config, "Configuration loaded");

    // Credential backend (Redis is contacted lazily)
    let backend = CredentialBackend::from_config(&store_config, HealthConfig::default())
        .context("Failed to build credential backend")?;
    let tasks = backend.start_background_tasks(&ReconciliationConfig::default());
    info!(tasks = tasks.len(), "Background tasks started");

    // Credential service
    let authorization = HttpAuthorizationServer::new(authorization_config)
        .context("Failed to build authorization server client")?;
    let service = Arc::new(CredentialService::new(
        CredentialEnvironment::new(backend, authorization),
        CredentialConfig::default(),
    ));
    info!(?service, "Credential service ready");

    wait_for_shutdown().await;
    info!("Shutdown signal received, stopping background tasks");

    for task in tasks {
        let name = task.name();
        task.shutdown().await;
        info!(task = name, "Background task stopped");
    }

    drop(service);
    info!("LedgerLink credential service stopped");
    Ok(())
}

fn init_tracing() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init()
        .context("Failed to initialize tracing")
}

async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Unable to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Unable to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
