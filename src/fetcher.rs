//! Feed Fetcher: one HTTP GET per source URL.
//!
//! Requests carry a fixed browser User-Agent (several news sites refuse the
//! default one) and a fixed timeout. There are no retries: a failed source is
//! skipped for this run.

use crate::error::FetchError;
use reqwest::Client;
use std::time::{Duration, Instant};
use tracing::{debug, instrument};

/// User-Agent sent with every feed request.
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Downloads raw feed bodies.
///
/// Cloning is cheap; clones share the underlying connection pool.
#[derive(Debug, Clone)]
pub struct FeedFetcher {
    client: Client,
}

impl FeedFetcher {
    /// Build a fetcher with its own client using the given timeout.
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }

    /// Download `url` and return the body as text.
    ///
    /// # Errors
    ///
    /// - [`FetchError::Timeout`] when the request exceeds the timeout
    /// - [`FetchError::Network`] for connection, DNS, or TLS failures
    /// - [`FetchError::HttpStatus`] for any non-2xx response
    /// - [`FetchError::Body`] when the body cannot be read
    #[instrument(level = "debug", skip(self))]
    pub async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let t0 = Instant::now();
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout
            } else {
                FetchError::Body(e)
            }
        })?;
        debug!(
            bytes = body.len(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Fetched source"
        );
        Ok(body)
    }
}
