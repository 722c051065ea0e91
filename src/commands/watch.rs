// ABOUTME: Watch command - replicates the configured tables on an interval
// ABOUTME: Runs the SyncDaemon until Ctrl+C

use anyhow::Result;

use crate::config::ReplicatorConfig;
use crate::sync::{DaemonConfig, SyncDaemon};
use crate::utils::sanitize_url;

/// Run copy cycles every `interval_secs` until Ctrl+C.
pub async fn watch(config: &ReplicatorConfig) -> Result<()> {
    config.validate()?;
    let source_url = config.source_url.clone().unwrap_or_default();
    let target_url = config.target_url.clone().unwrap_or_default();

    tracing::info!(
        "Watching {} tables from {} to {}",
        config.tables.len(),
        sanitize_url(&source_url),
        sanitize_url(&target_url)
    );

    let daemon = SyncDaemon::new(
        source_url,
        target_url,
        DaemonConfig {
            interval: config.interval(),
            jobs: config.jobs(),
            options: config.copy_options(),
        },
    );

    let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel::<()>(1);

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            return;
        }
        tracing::info!("Received shutdown signal");
        let _ = shutdown_tx.send(());
    });

    daemon.run(shutdown_rx).await
}
