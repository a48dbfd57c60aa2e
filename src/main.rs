// Binary for the FPGA service lifecycle manager plugin
// Compile: cargo build --bin haizea-fpga-lm
// Run: cargo run --bin haizea-fpga-lm

use haizea_application::LifecycleManager;
use haizea_infrastructure::{HttpRecordRepository, NatsMessageBus};
use haizea_shared::config::ConfigLoader;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const REPOSITORY_TIMEOUT_SECS: u64 = 5;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("starting Haizea FPGA lifecycle manager");

    // Pick up a local .env when present, otherwise the process environment.
    let env_file = PathBuf::from(".env");
    let loader = ConfigLoader::new(env_file.exists().then_some(env_file));
    let config = loader.load_plugin_config()?;

    let bus = Arc::new(NatsMessageBus::connect(&config.nats, &config.plugin_name).await?);
    let repository = Arc::new(HttpRecordRepository::new(
        &config.repository_url,
        REPOSITORY_TIMEOUT_SECS,
    )?);

    let manager = LifecycleManager::new(bus, repository, &config);

    if let Err(e) = manager.announce().await {
        // The plugin manager may come up later; the plugin is still usable.
        warn!(error = %e, "plugin announcement failed");
    }

    manager.run().await?;

    tokio::signal::ctrl_c().await?;

    info!("shutdown signal received");
    if let Err(e) = manager.deregister().await {
        warn!(error = %e, "plugin deregistration failed");
    }

    Ok(())
}
