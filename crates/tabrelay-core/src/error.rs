//! Error types for the tabrelay core library.
//!
//! Uses hierarchical domain-specific errors following the thiserror pattern.
//! Every error carries its originating pipeline stage so callers can tell
//! transport-retryable conditions apart from terminal schema/storage ones.

use thiserror::Error;

/// Result type alias for tabrelay operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for tabrelay.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Document retrieval error
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Table extraction / inference error
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// Broker delivery error
    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    /// Storage sink error
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Shutdown requested
    #[error("Shutdown requested")]
    Shutdown,
}

/// Document retrieval errors.
///
/// Only `ClientError` is non-retryable; the fetch wrapper retries the rest
/// with linear backoff up to its configured attempt budget.
#[derive(Error, Debug)]
pub enum FetchError {
    /// Connection-level failure
    #[error("Network error fetching {url}: {message}")]
    Network { url: String, message: String },

    /// Request exceeded its deadline
    #[error("Timeout fetching {url}")]
    Timeout { url: String },

    /// 5xx or 429 response
    #[error("Server error {status} fetching {url}")]
    ServerError { url: String, status: u16 },

    /// Non-retryable 4xx response
    #[error("Client error {status} fetching {url}")]
    ClientError { url: String, status: u16 },

    /// Retry budget exhausted; carries the last underlying cause
    #[error("Retries exhausted for {url} after {attempts} attempts: {last}")]
    RetriesExhausted {
        url: String,
        attempts: u32,
        #[source]
        last: Box<FetchError>,
    },
}

impl FetchError {
    /// Whether the fetch policy retries this failure.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            FetchError::ClientError { .. } | FetchError::RetriesExhausted { .. }
        )
    }
}

/// Table extraction and conversion errors.
#[derive(Error, Debug)]
pub enum ParseError {
    /// Document is not decodable markup
    #[error("Malformed document: {0}")]
    MalformedDocument(String),

    /// A single table could not be processed
    #[error("Malformed table at index {index}: {message}")]
    MalformedTable { index: usize, message: String },

    /// A cell value could not be converted to its resolved column type
    #[error("Conversion failed for column '{column}': {message}")]
    Conversion { column: String, message: String },
}

/// Broker delivery errors.
#[derive(Error, Debug)]
pub enum DeliveryError {
    /// Producer could not be created
    #[error("Producer creation failed: {0}")]
    ProducerCreate(String),

    /// Broker rejected or dropped a unit after its own retry policy
    #[error("Send failed for key {key}: {message}")]
    SendFailed { key: String, message: String },

    /// Consumer group / subscription failure
    #[error("Consumer error: {0}")]
    Consumer(String),

    /// Offset acknowledgement failed
    #[error("Offset commit failed: {0}")]
    OffsetCommit(String),

    /// Received unit could not be decoded
    #[error("Unit decode failed at {topic}[{partition}]@{offset}: {message}")]
    UnitDecode {
        topic: String,
        partition: i32,
        offset: i64,
        message: String,
    },
}

/// Storage sink errors.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Connection could not be established (fatal at consumer startup)
    #[error("Connection failed to {url}: {message}")]
    ConnectionFailed { url: String, message: String },

    /// DDL execution failed during provisioning
    #[error("Provisioning failed for table '{table}': {message}")]
    Provision { table: String, message: String },

    /// Batched write failed (terminal for the in-progress flush)
    #[error("Batch write failed for table '{table}': {message}")]
    WriteFailed { table: String, message: String },

    /// Sink used before provisioning
    #[error("Sink not provisioned")]
    NotProvisioned,
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Config("invalid value".into());
        assert_eq!(err.to_string(), "Configuration error: invalid value");

        let fetch_err = FetchError::ServerError {
            url: "http://example.com".into(),
            status: 503,
        };
        let err: Error = fetch_err.into();
        assert!(err.to_string().contains("Server error 503"));
    }

    #[test]
    fn test_fetch_retryability() {
        assert!(FetchError::Network {
            url: "u".into(),
            message: "refused".into()
        }
        .is_retryable());
        assert!(FetchError::Timeout { url: "u".into() }.is_retryable());
        assert!(FetchError::ServerError {
            url: "u".into(),
            status: 429
        }
        .is_retryable());
        assert!(!FetchError::ClientError {
            url: "u".into(),
            status: 404
        }
        .is_retryable());
    }

    #[test]
    fn test_exhausted_carries_cause() {
        let err = FetchError::RetriesExhausted {
            url: "http://example.com".into(),
            attempts: 3,
            last: Box::new(FetchError::Timeout {
                url: "http://example.com".into(),
            }),
        };
        let rendered = err.to_string();
        assert!(rendered.contains("after 3 attempts"));
        assert!(rendered.contains("Timeout"));
    }
}
