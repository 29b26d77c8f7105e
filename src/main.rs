use std::sync::Arc;

use lux_monitor::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    let options = Options::new();

    let config = Arc::new(Config::new(options.config_file.clone())?);

    // Create a channel for shutdown signaling
    let (shutdown_tx, _) = broadcast::channel(1);

    // Handle Ctrl+C
    let shutdown_tx_clone = shutdown_tx.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for ctrl+c: {}", e);
        }
        if let Err(e) = shutdown_tx_clone.send(()) {
            error!("failed to send shutdown signal: {}", e);
        }
    });

    // Optional runtime limit, mostly used when smoke-testing against a
    // live datalogger
    if let Some(secs) = options.runtime {
        let shutdown_tx_clone = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_secs(secs)).await;
            let _ = shutdown_tx_clone.send(());
        });
    }

    lux_monitor::app(shutdown_tx.subscribe(), config).await
}
