//! mdb-router - Main entry point.
//!
//! Loads the databases file, registers every database (directly listed ones first,
//! then those described by catalog data sources) and serves the HTTP API.

use clap::Parser;
use mdb_router::config::{Config, DatabasesFile};
use mdb_router::db::{DatabaseStore, resolve_data_sources};
use mdb_router::transport::{HttpTransport, Transport};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber.with(fmt::layer().json()).init();
    } else {
        subscriber
            .with(fmt::layer().with_target(true).with_thread_ids(false))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse configuration from command line and environment
    let config = Config::parse();

    // Initialize logging
    init_tracing(&config);

    info!(
        config_path = %config.config_path.display(),
        "Starting mdb-router v{}",
        env!("CARGO_PKG_VERSION")
    );

    let databases = DatabasesFile::load(&config.config_path)?.decode();
    for e in &databases.errors {
        warn!(error = %e, "Skipping invalid entry in databases file");
    }

    let store = DatabaseStore::new();

    info!(
        count = databases.database_configs.len(),
        "Registering configured databases"
    );
    store.add_databases(databases.database_configs).await;

    if !databases.data_sources.is_empty() {
        info!(
            count = databases.data_sources.len(),
            "Resolving data sources"
        );
        let (configs, errors) = resolve_data_sources(databases.data_sources).await;
        for e in &errors {
            warn!(error = %e, "Failed to resolve data source");
        }
        store.add_databases(configs).await;
    }

    info!(registered = store.len().await, "Databases ready");

    let transport = HttpTransport::new(
        store,
        &config.host,
        config.port,
        config.query_timeout(),
    );
    info!(transport = transport.name(), address = %config.bind_addr(), "Using HTTP transport");

    if let Err(e) = transport.run().await {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("Server shutdown complete");
    Ok(())
}
