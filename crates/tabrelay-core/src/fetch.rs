//! Resilient document retrieval.
//!
//! Network errors, timeouts, and 5xx/429 responses are retried with linear
//! backoff (`delay = base_delay * attempt`); other 4xx responses fail
//! immediately. Exhausting the retry budget raises a terminal error carrying
//! the last underlying cause.

use crate::config::FetchConfig;
use crate::error::{Error, FetchError, Result};
use tracing::{debug, warn};

/// HTTP fetch wrapper with bounded retries.
pub struct Fetcher {
    client: reqwest::Client,
    config: FetchConfig,
}

impl Fetcher {
    /// Create a fetcher with the given retry policy.
    pub fn new(config: FetchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| Error::Config(format!("HTTP client build failed: {}", e)))?;

        Ok(Self { client, config })
    }

    /// Fetch the raw bytes of a document.
    pub async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            match self.fetch_once(url).await {
                Ok(bytes) => {
                    debug!(url = %url, attempt = attempt, bytes = bytes.len(), "Fetch succeeded");
                    return Ok(bytes);
                }
                Err(e) if !e.is_retryable() => {
                    warn!(url = %url, error = %e, "Fetch failed, not retryable");
                    return Err(Error::Fetch(e));
                }
                Err(e) => {
                    if attempt > self.config.max_retries {
                        warn!(
                            url = %url,
                            attempts = attempt,
                            error = %e,
                            "Fetch retries exhausted"
                        );
                        return Err(Error::Fetch(FetchError::RetriesExhausted {
                            url: url.to_string(),
                            attempts: attempt,
                            last: Box::new(e),
                        }));
                    }

                    let delay = self.config.delay_for_attempt(attempt);
                    warn!(
                        url = %url,
                        attempt = attempt,
                        delay_ms = delay.as_millis(),
                        error = %e,
                        "Fetch failed, retrying with backoff"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn fetch_once(&self, url: &str) -> std::result::Result<Vec<u8>, FetchError> {
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout {
                    url: url.to_string(),
                }
            } else {
                FetchError::Network {
                    url: url.to_string(),
                    message: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        if status.is_server_error() || status.as_u16() == 429 {
            return Err(FetchError::ServerError {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        if status.is_client_error() {
            return Err(FetchError::ClientError {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let bytes = response.bytes().await.map_err(|e| FetchError::Network {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        Ok(bytes.to_vec())
    }
}
