// Module declarations for the application's core components
pub mod channels; // Inter-component broadcast channels
pub mod config; // Configuration management
pub mod coordinator; // Frame dispatch and power flow reporting
pub mod lxp; // LuxPower TCP protocol implementation
pub mod options; // Command line options parsing
pub mod prelude; // Common imports and types
pub mod scheduler; // Periodic register polling
pub mod utils; // Utility functions

// Get the package version from Cargo.toml
const CARGO_PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

use crate::prelude::*;
use std::sync::Arc;

/// Main application entry point
///
/// Wires up the channels and starts the coordinator, scheduler and one
/// connection task per enabled inverter, then waits for a shutdown signal.
pub async fn app(
    mut shutdown_rx: tokio::sync::broadcast::Receiver<()>,
    config: Arc<Config>,
) -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(config.loglevel()))
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {} {}] {}",
                chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f"),
                record.level(),
                record.module_path().unwrap_or(""),
                record.args()
            )
        })
        .write_style(env_logger::WriteStyle::Never)
        .init();

    info!("lux-monitor {} starting", CARGO_PKG_VERSION);

    let channels = Channels::new();

    let coordinator = Coordinator::new(channels.clone());
    let coordinator_clone = coordinator.clone();
    let coordinator_handle = tokio::spawn(async move {
        if let Err(e) = coordinator_clone.start().await {
            error!("coordinator task failed: {}", e);
        }
    });

    let scheduler =
        crate::scheduler::Scheduler::new(config.clone(), channels.clone(), coordinator.stats.clone());
    let scheduler_handle = tokio::spawn(async move {
        if let Err(e) = scheduler.start().await {
            error!("scheduler task failed: {}", e);
        }
    });

    let mut inverter_handles = Vec::new();
    for inverter in config
        .enabled_inverters()
        .into_iter()
        .map(|inverter| lxp::inverter::Inverter::new(inverter, channels.clone()))
    {
        let handle = tokio::spawn(async move {
            if let Err(e) = inverter.start().await {
                error!("inverter task failed: {}", e);
            }
        });
        inverter_handles.push(handle);
    }

    let _ = shutdown_rx.recv().await;

    info!("shutdown signal received, stopping");
    scheduler_handle.abort();
    coordinator.stop();

    if let Err(e) = coordinator_handle.await {
        error!("error waiting for coordinator task: {}", e);
    }
    for handle in inverter_handles {
        if let Err(e) = handle.await {
            error!("error waiting for inverter task: {}", e);
        }
    }

    if let Ok(stats) = coordinator.stats.lock() {
        stats.print_summary();
    }

    info!("shutdown complete");
    Ok(())
}
