//! Relay command implementation.

use anyhow::Result;
use tabrelay_core::engine::RelayEngine;
use tabrelay_core::Config;
use tracing::info;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

/// Run the consumer-side relay engine until a shutdown signal arrives.
pub async fn run(
    mut config: Config,
    bootstrap_servers: Option<String>,
    topic: Option<String>,
    consumer_group: Option<String>,
) -> Result<()> {
    // Apply CLI overrides
    if let Some(servers) = bootstrap_servers {
        config.kafka.bootstrap_servers = servers.split(',').map(String::from).collect();
    }
    if let Some(t) = topic {
        config.kafka.topic = t;
    }
    if let Some(g) = consumer_group {
        config.kafka.consumer_group = g;
    }

    info!(
        topic = %config.kafka.topic,
        group = %config.kafka.consumer_group,
        table = %config.storage.table,
        "Starting relay engine"
    );

    let engine = RelayEngine::new(&config).await?;
    let shutdown_tx = engine.shutdown_signal();

    // Handle SIGINT and SIGTERM
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            let mut sigterm =
                signal(SignalKind::terminate()).expect("Failed to install SIGTERM handler");

            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Received SIGINT (Ctrl+C), initiating graceful shutdown");
                }
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, initiating graceful shutdown");
                }
            }
        }

        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
            info!("Received Ctrl+C, initiating graceful shutdown");
        }

        let _ = shutdown_tx.send(());
    });

    engine.run().await?;

    info!("Relay engine stopped");
    Ok(())
}
