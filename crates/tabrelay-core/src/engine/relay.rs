//! Consumer-side engine: dispatch loop, interval timer, drain on shutdown.
//!
//! Message delivery runs on a single-threaded dispatch loop, so the size
//! trigger cannot overlap other unit handling on the same instance. The
//! interval timer is an independent task with no inherent mutual exclusion
//! against that loop; the flush controller's single-flight guard is what
//! resolves the race, not any ordering assumption.

use crate::buffer::{FlushController, FlushTrigger};
use crate::config::Config;
use crate::kafka::UnitConsumer;
use crate::metrics::PipelineMetrics;
use crate::sink::MySqlSink;
use crate::{Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

const POLL_TIMEOUT: Duration = Duration::from_millis(500);
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Consumer-side engine for one consumer-group member.
///
/// Each instance owns its own buffer, cached schema, and state machine;
/// multiple instances in one process never interfere.
pub struct RelayEngine {
    consumer: Arc<UnitConsumer>,
    controller: Arc<FlushController>,
    flush_interval: Duration,
    shutdown_tx: broadcast::Sender<()>,
    metrics: Arc<PipelineMetrics>,
}

impl RelayEngine {
    /// Build the engine: connect the sink (fatal on failure), subscribe the
    /// consumer, and wire the flush controller.
    pub async fn new(config: &Config) -> Result<Self> {
        let sink = Arc::new(MySqlSink::connect(&config.storage).await?);
        let consumer = Arc::new(UnitConsumer::new(&config.kafka)?);
        let controller = Arc::new(FlushController::new(
            sink,
            consumer.clone(),
            config.flush.batch_size,
        ));

        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Self {
            consumer,
            controller,
            flush_interval: config.flush.interval(),
            shutdown_tx,
            metrics: Arc::new(PipelineMetrics::new()),
        })
    }

    /// Sender for requesting shutdown from another task.
    pub fn shutdown_signal(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    /// Counters for this engine instance.
    pub fn metrics(&self) -> &PipelineMetrics {
        &self.metrics
    }

    /// Run the dispatch loop until shutdown, then drain.
    pub async fn run(&self) -> Result<()> {
        info!("Relay engine started");

        let timer = self.spawn_interval_timer();
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut loop_error: Option<Error> = None;

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }

                polled = self.consumer.poll(POLL_TIMEOUT) => {
                    match polled {
                        Some(Ok(received)) => {
                            self.metrics.record_consumed();
                            match self.controller.handle_unit(received).await {
                                Ok(Some(crate::buffer::FlushOutcome::Flushed(rows))) => {
                                    self.metrics.record_flush(rows as u64);
                                }
                                Ok(_) => {}
                                Err(Error::Shutdown) => break,
                                Err(e) => {
                                    // Storage failure is terminal for the
                                    // flush and for this instance.
                                    error!(error = %e, "Unit handling failed");
                                    self.metrics.record_error();
                                    loop_error = Some(e);
                                    break;
                                }
                            }
                        }
                        Some(Err(e)) => {
                            warn!(error = %e, "Dropping undecodable or failed poll");
                            self.metrics.record_error();
                        }
                        None => {} // Poll timeout
                    }
                }
            }
        }

        // Stop the timer before draining so drain contends with at most one
        // in-flight flush.
        let _ = self.shutdown_tx.send(());
        let _ = timer.await;

        self.shutdown().await;
        info!("Relay engine stopped");

        match loop_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn spawn_interval_timer(&self) -> tokio::task::JoinHandle<()> {
        let controller = self.controller.clone();
        let metrics = self.metrics.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let period = self.flush_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = ticker.tick() => {
                        match controller.try_flush(FlushTrigger::Interval).await {
                            Ok(outcome) => {
                                if let crate::buffer::FlushOutcome::Flushed(rows) = outcome {
                                    metrics.record_flush(rows as u64);
                                }
                            }
                            Err(e) => {
                                warn!(error = %e, "Interval flush failed");
                                metrics.record_error();
                            }
                        }
                    }
                }
            }
        })
    }

    async fn shutdown(&self) {
        match tokio::time::timeout(SHUTDOWN_TIMEOUT, self.controller.drain()).await {
            Ok(Ok(rows)) => {
                if rows > 0 {
                    self.metrics.record_flush(rows as u64);
                }
                info!(rows = rows, "Drain flushed remaining rows");
            }
            Ok(Err(e)) => {
                error!(error = %e, "Drain failed, buffered rows will be redelivered");
                self.metrics.record_error();
            }
            Err(_) => {
                error!("Drain timed out, buffered rows will be redelivered");
                self.metrics.record_error();
            }
        }
    }
}
