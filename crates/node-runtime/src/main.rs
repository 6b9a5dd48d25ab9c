//! # Ledger Node
//!
//! Startup sequence:
//!
//! 1. Initialize logging (`RUST_LOG`, default `info`)
//! 2. Load configuration (defaults, `LC_CONFIG` file, `LC_*` overrides)
//! 3. Open the data directory and build the ledger
//! 4. Start settlement and maintenance tasks
//! 5. Wait for Ctrl+C, then drain and stop

use std::sync::Arc;

use anyhow::{Context, Result};
use node_runtime::{load_config, LedgerContainer, NodeRuntime};
use shared_types::SystemTimeSource;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .with_thread_ids(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = load_config().context("loading configuration")?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        data_dir = %config.storage.data_dir.display(),
        "starting ledger node"
    );

    let container = LedgerContainer::open(config, Arc::new(SystemTimeSource))?;
    let mut runtime = NodeRuntime::new(container);
    runtime.start();

    info!("Node is running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;

    runtime.shutdown().await
}
