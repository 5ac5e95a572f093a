//! Pipeline orchestration: producer-side publishing and consumer-side relay.

pub mod publish;
pub mod relay;

pub use publish::{PublishEngine, PublishSummary};
pub use relay::RelayEngine;
