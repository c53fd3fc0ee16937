//! Storefront Auxiliary Backend
//!
//! Card payment settlement plus the storefront's small relay endpoints
//! (email confirmation, password reset, landing info).

mod api;
mod config;
mod server;
mod shutdown;
mod state;

use clap::Parser;
use config::ConfigLoader;
use server::{build_router, run_server};
use state::AppState;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use storeaux_core::backend::GraphqlClient;
use storeaux_core::gateway::StripeGateway;
use storeaux_core::reconcile::{ReconcileHandle, ReconcileWorker};
use storeaux_core::settlement::{RetryPolicy, SettlementService};
use tokio::sync::watch;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Storefront auxiliary backend - payment settlement and account relays
#[derive(Parser, Debug)]
#[command(name = "storeaux-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "./storeaux-config.toml")]
    config: PathBuf,

    /// Override the listen address (e.g., 0.0.0.0:3000)
    #[arg(short, long)]
    listen: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let args = Args::parse();

    tracing::info!("Starting storeaux-server v{}", env!("CARGO_PKG_VERSION"));

    let config_loader = ConfigLoader::new(&args.config, args.listen);
    let config = config_loader.load().map_err(|e| {
        tracing::error!("Failed to load configuration: {}", e);
        e
    })?;
    tracing::info!("Configuration loaded from {:?}", args.config);

    let listen_addr = config.server.listen;

    // Outbound clients, one shared reqwest client each.
    let gateway = Arc::new(StripeGateway::new(config.gateway)?);
    let backend = Arc::new(GraphqlClient::new(config.backend)?);

    // Reconciliation worker for charged-but-unsettled orders.
    let (reconcile, reconcile_rx) = ReconcileHandle::channel(64);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = ReconcileWorker::new(backend.clone(), reconcile_rx, shutdown_rx);
    let worker_handle = tokio::spawn(worker.run());

    let settlement = SettlementService::new(
        gateway,
        backend.clone(),
        RetryPolicy::default(),
        reconcile,
    );

    let state = AppState {
        settlement,
        backend,
        pages: config.pages,
    };

    let router = build_router(state);

    tracing::info!("Starting HTTP server on {}", listen_addr);
    let result = run_server(router, listen_addr).await;

    // Stop the reconciliation worker and wait for it to drain.
    let _ = shutdown_tx.send(true);
    let _ = worker_handle.await;

    tracing::info!("Server shutdown complete");
    result.map_err(Into::into)
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
