//! Marea ledger server binary
//!
//! Opens the ledger from environment configuration and keeps it running
//! until interrupted.

use anyhow::Context;
use marea_ledger::{Config, InMemoryReferenceData, Ledger};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    tracing::info!("Starting Marea Ledger Server");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;

    // Load reference data
    let reference = match &config.reference_data_path {
        Some(path) => InMemoryReferenceData::from_file(path)
            .with_context(|| format!("Failed to load reference data from {}", path.display()))?,
        None => {
            tracing::warn!("No reference data configured; every lookup will miss");
            InMemoryReferenceData::new()
        }
    };

    // Open ledger
    let ledger = Ledger::open(config, Arc::new(reference))
        .await
        .context("Failed to open ledger")?;

    let stats = ledger.stats()?;
    tracing::info!(
        trips = stats.trips,
        quota_entries = stats.quota_entries,
        production_records = stats.production_records,
        operations = stats.operations,
        "Ledger opened successfully"
    );

    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down ledger server");
    ledger.shutdown().await?;
    Ok(())
}

/// `MAREA_LOG_FORMAT=json` switches to JSON lines
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::INFO.into());

    if std::env::var("MAREA_LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
