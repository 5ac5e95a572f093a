//! Kafka channel integration: producer batcher and consumer wrapper.

pub mod consumer;
pub mod producer;

pub use consumer::{ReceivedUnit, UnitConsumer};
pub use producer::UnitProducer;

use crate::Result;
use async_trait::async_trait;

/// A consumed position on one partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionOffset {
    /// Topic name
    pub topic: String,
    /// Partition number
    pub partition: i32,
    /// Offset within the partition
    pub offset: i64,
}

impl PartitionOffset {
    /// Create a partition offset.
    pub fn new(topic: impl Into<String>, partition: i32, offset: i64) -> Self {
        Self {
            topic: topic.into(),
            partition,
            offset,
        }
    }
}

/// Acknowledgement of consumed offsets back to the broker.
///
/// The flush state machine commits through this seam only after a durable
/// sink write, which keeps redelivery (not loss) as the crash-recovery mode.
#[async_trait]
pub trait OffsetAck: Send + Sync {
    /// Acknowledge the given consumed offsets.
    async fn ack(&self, offsets: &[PartitionOffset]) -> Result<()>;
}
