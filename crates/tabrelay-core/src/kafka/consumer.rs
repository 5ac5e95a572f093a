//! Consumer-group wrapper over the broker channel.
//!
//! Manual offset commits only: the flush state machine acknowledges offsets
//! after the storage write succeeds, so a crash between write and commit
//! causes redelivery rather than loss.

use crate::config::{KafkaConfig, OffsetReset};
use crate::error::{DeliveryError, Error, Result};
use crate::kafka::{OffsetAck, PartitionOffset};
use crate::transport::TransportUnit;
use async_trait::async_trait;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::{ClientConfig, TopicPartitionList};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// A decoded transport unit together with its broker position.
#[derive(Debug, Clone)]
pub struct ReceivedUnit {
    /// The decoded unit
    pub unit: TransportUnit,
    /// Position the unit was consumed from
    pub position: PartitionOffset,
}

/// Consumer-group Kafka consumer for transport units.
pub struct UnitConsumer {
    consumer: Arc<StreamConsumer>,
    topic: String,
}

impl UnitConsumer {
    /// Create a consumer subscribed to the configured topic.
    pub fn new(config: &KafkaConfig) -> Result<Self> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", config.bootstrap_servers.join(","))
            .set("group.id", &config.consumer_group)
            // Manual commits only - we commit after the sink write
            .set("enable.auto.commit", "false")
            .set("enable.auto.offset.store", "false")
            .set(
                "auto.offset.reset",
                match config.auto_offset_reset {
                    OffsetReset::Earliest => "earliest",
                    OffsetReset::Latest => "latest",
                },
            )
            .set("session.timeout.ms", config.session_timeout_ms.to_string())
            // Must exceed the longest flush time or the group kicks us out
            .set(
                "max.poll.interval.ms",
                config.max_poll_interval_ms.to_string(),
            )
            .create()
            .map_err(|e| Error::Delivery(DeliveryError::Consumer(e.to_string())))?;

        consumer
            .subscribe(&[&config.topic])
            .map_err(|e| Error::Delivery(DeliveryError::Consumer(e.to_string())))?;

        info!(
            topic = %config.topic,
            group = %config.consumer_group,
            servers = %config.bootstrap_servers.join(","),
            "Consumer subscribed"
        );

        Ok(Self {
            consumer: Arc::new(consumer),
            topic: config.topic.clone(),
        })
    }

    /// Poll for the next unit, waiting up to `timeout`.
    ///
    /// Returns `None` on timeout. A payload that fails to decode is an
    /// error carrying its broker position for reporting.
    pub async fn poll(&self, timeout: Duration) -> Option<Result<ReceivedUnit>> {
        use futures::StreamExt;

        let stream = self.consumer.stream();
        tokio::pin!(stream);

        match tokio::time::timeout(timeout, stream.next()).await {
            Ok(Some(Ok(msg))) => {
                let position =
                    PartitionOffset::new(msg.topic().to_string(), msg.partition(), msg.offset());
                let payload = msg.payload().unwrap_or_default();
                let result = TransportUnit::decode(payload)
                    .map(|unit| ReceivedUnit {
                        unit,
                        position: position.clone(),
                    })
                    .map_err(|e| {
                        Error::Delivery(DeliveryError::UnitDecode {
                            topic: position.topic.clone(),
                            partition: position.partition,
                            offset: position.offset,
                            message: e.to_string(),
                        })
                    });
                Some(result)
            }
            Ok(Some(Err(e))) => Some(Err(Error::Delivery(DeliveryError::Consumer(e.to_string())))),
            Ok(None) => None,
            Err(_) => None, // Timeout
        }
    }

    /// Topic this consumer reads from.
    pub fn topic(&self) -> &str {
        &self.topic
    }
}

#[async_trait]
impl OffsetAck for UnitConsumer {
    async fn ack(&self, offsets: &[PartitionOffset]) -> Result<()> {
        if offsets.is_empty() {
            return Ok(());
        }

        // One entry per partition, at the highest offset seen
        let mut latest: BTreeMap<(&str, i32), i64> = BTreeMap::new();
        for po in offsets {
            let entry = latest.entry((po.topic.as_str(), po.partition)).or_insert(po.offset);
            *entry = (*entry).max(po.offset);
        }

        let mut tpl = TopicPartitionList::new();
        for ((topic, partition), offset) in latest {
            // Kafka convention: the committed offset is the next one to read
            tpl.add_partition_offset(topic, partition, rdkafka::Offset::Offset(offset + 1))
                .map_err(|e| Error::Delivery(DeliveryError::OffsetCommit(e.to_string())))?;
        }

        self.consumer
            .commit(&tpl, rdkafka::consumer::CommitMode::Async)
            .map_err(|e| Error::Delivery(DeliveryError::OffsetCommit(e.to_string())))?;

        debug!(offsets = offsets.len(), "Offsets committed");
        Ok(())
    }
}
