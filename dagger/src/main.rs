//! DAGGER — benign IOC simulator for detection-rule testing
//!
//! Generates observable host artifacts on operator request:
//! DNS lookups, TCP connects, HTTP GETs, registry queries, file drops and
//! named mutexes. Every outcome is appended to a timestamped event log.
//! Outbound network traffic is restricted to loopback unless the operator
//! explicitly allows external targets for the session.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::io::BufReader;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod console;
mod dispatcher;
mod error;
mod event_log;
mod files;
mod mutex;
mod net;
mod policy;
mod registry;

#[tokio::main]
async fn main() -> Result<()> {
    let config = config::load_config()?;
    init_logging(&config.logging.level)?;

    info!("DAGGER IOC simulator v{} starting...", env!("CARGO_PKG_VERSION"));
    match &config.source {
        Some(path) => info!("Configuration loaded from {}", path.display()),
        None => warn!("Config file not found, using defaults"),
    }

    let log = Arc::new(event_log::EventLog::new(&config.logging.log_file)?);
    info!("Event log: {}", log.path().display());

    let store = registry::open_store(&config.registry)?;
    let locks = mutex::open_locks(&config.locks)?;
    let (dispatcher, completions) = dispatcher::Dispatcher::new(
        log,
        store,
        locks,
        &config.network,
        config.files.default_folder.clone(),
    );

    println!("DAGGER - IOC Simulator (external network blocked). Type 'help' for commands.");
    console::Console::new(dispatcher, completions)
        .run(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
        .await
}

/// Operator output goes to stdout; diagnostics go to stderr so piped
/// sessions stay clean. `RUST_LOG` overrides the configured level.
fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .compact()
        .try_init()
        .map_err(|e| anyhow::anyhow!(e))
        .context("Failed to set tracing subscriber")
}
