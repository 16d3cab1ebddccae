//! Processor controller
//!
//! Converges Processors into Workloads. The standalone binary runs against
//! in-memory stores seeded from an optional JSON manifest.

use std::sync::Arc;

use anyhow::Result;
use procon_controller::{
    config,
    controller::ProcessorController,
    manifest::Manifest,
    materialize::Materializer,
    store::MemoryStores,
};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = config::Config::from_env()?;

    // Initialize tracing (prefer RUST_LOG, fallback to PROCON_LOG_LEVEL)
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting processor controller");
    info!(
        workers = config.workers,
        processor_image = %config.processor_image,
        "Configuration loaded"
    );

    let stores = MemoryStores::new();
    if let Some(path) = &config.manifest {
        match Manifest::from_path(path) {
            Ok(manifest) => {
                info!(
                    path = %path.display(),
                    functions = manifest.functions.len(),
                    streams = manifest.streams.len(),
                    processors = manifest.processors.len(),
                    "Manifest loaded"
                );
                manifest.load_into(&stores);
            }
            Err(e) => {
                error!(error = ?e, "Failed to load manifest");
                return Err(e);
            }
        }
    }

    // Create shutdown channel for graceful shutdown
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let controller = Arc::new(ProcessorController::new(
        stores.stores(),
        Materializer::new(config.processor_image.clone()),
        config.controller_config(),
    ));
    let controller_handle = tokio::spawn(controller.run(shutdown_rx));

    // Wait for shutdown signal (Ctrl+C)
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
    }
    info!("Received shutdown signal");

    // Signal shutdown to the controller
    let _ = shutdown_tx.send(true);

    info!("Waiting for controller to shut down...");
    let shutdown_timeout = std::time::Duration::from_secs(10);
    match tokio::time::timeout(shutdown_timeout, controller_handle).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "Controller task failed"),
        Err(e) => warn!(error = %e, "Controller did not shut down in time"),
    }

    info!("Processor controller shutdown complete");
    Ok(())
}
