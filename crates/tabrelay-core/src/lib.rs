//! tabrelay core - table extraction and typed replication engine
//!
//! This library extracts tabular data embedded in markup documents, infers
//! a typed relational schema for it, and replicates the typed rows into
//! MySQL through a Kafka channel that decouples extraction from storage:
//!
//! - Lattice-style type inference whose result is row-order independent
//! - Schema snapshots embedded in every transport unit for stateless
//!   consumer bootstrap
//! - Dual-trigger consumer flushing behind a single-flight guard
//! - At-least-once delivery: offsets commit only after durable writes

pub mod buffer;
pub mod config;
pub mod engine;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod infer;
pub mod kafka;
pub mod metrics;
pub mod schema;
pub mod sink;
pub mod transport;

// Re-export commonly used types
pub use config::Config;
pub use error::{DeliveryError, FetchError, ParseError, StorageError};
pub use error::{Error, Result};
