//! keepr controller entry point.
//!
//! Boots the caching controller and serves the message protocol as
//! newline-delimited JSON on stdio. Logging goes to stderr to avoid
//! interfering with the protocol on stdout.

use std::sync::Arc;

use anyhow::Result;
use tokio::io::BufReader;
use tracing_subscriber::EnvFilter;

use keepr_client::{HttpNetwork, NetworkConfig};
use keepr_core::{AppConfig, StoreDb, VersionedStores};
use keepr_server::{Controller, ControllerSettings, transport};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;
    let names = config.store_names();

    tracing::info!(
        origin = %config.origin,
        db_path = %config.db_path.display(),
        body_store = %names.body,
        meta_store = %names.meta,
        "Starting keepr controller on stdio transport"
    );

    let db = StoreDb::open(&config.db_path).await?;
    let source = Arc::new(VersionedStores::new(db, names));
    let network = Arc::new(HttpNetwork::new(NetworkConfig::from_app_config(&config)?)?);
    let settings = ControllerSettings::from_app_config(&config)?;

    let controller = Controller::start(source, network, settings).await?;
    transport::serve(&controller, BufReader::new(tokio::io::stdin()), tokio::io::stdout()).await?;

    tracing::info!("input closed; keepr controller stopped");
    Ok(())
}
