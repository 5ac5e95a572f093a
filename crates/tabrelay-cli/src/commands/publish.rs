//! Publish command implementation.

use anyhow::Result;
use tabrelay_core::engine::PublishEngine;
use tabrelay_core::Config;
use tracing::info;

/// Fetch the source document once and publish every extractable table.
pub async fn run(
    mut config: Config,
    url: Option<String>,
    bootstrap_servers: Option<String>,
    topic: Option<String>,
) -> Result<()> {
    // Apply CLI overrides
    if let Some(u) = url {
        config.source.url = u;
    }
    if let Some(servers) = bootstrap_servers {
        config.kafka.bootstrap_servers = servers.split(',').map(String::from).collect();
    }
    if let Some(t) = topic {
        config.kafka.topic = t;
    }

    info!(
        url = %config.source.url,
        topic = %config.kafka.topic,
        "Starting publish run"
    );

    let engine = PublishEngine::new(&config)?;
    let summary = engine.run_once().await?;

    println!(
        "Published {} rows across {} tables ({} skipped)",
        summary.rows_published, summary.tables_published, summary.tables_skipped
    );

    Ok(())
}
