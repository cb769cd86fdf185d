use crate::feed::parser::{parse_document, ParsedDocument};
use futures::StreamExt;
use std::time::Duration;
use thiserror::Error;

const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Default per-request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors that can occur while retrieving and parsing a feed.
///
/// Any of these ends the current tick for the feed; the scheduler logs it
/// and moves on.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Request exceeded the configured timeout
    #[error("Request timed out")]
    Timeout,
    /// Body could not be parsed as an RSS document
    #[error("Parse error: {0}")]
    Parse(String),
    /// Response body exceeded the 10MB size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
}

/// HTTP retrieval of feed documents.
///
/// Holds one `reqwest::Client` for the lifetime of the aggregator so
/// connections are pooled across ticks.
#[derive(Clone)]
pub struct FeedFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl FeedFetcher {
    /// Build a fetcher that identifies itself with `user_agent`.
    ///
    /// `timeout` bounds the whole request, body included.
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;
        Ok(Self { client, timeout })
    }

    /// GET `url` and parse the body as RSS. No retries.
    ///
    /// # Errors
    ///
    /// - [`FetchError::Network`] - Connection or TLS errors
    /// - [`FetchError::Timeout`] - Request exceeded the timeout
    /// - [`FetchError::HttpStatus`] - Non-2xx HTTP response
    /// - [`FetchError::ResponseTooLarge`] - Response exceeded 10MB
    /// - [`FetchError::IncompleteResponse`] - Body shorter than Content-Length
    /// - [`FetchError::Parse`] - Invalid XML or not an RSS document
    pub async fn fetch(&self, url: &str) -> Result<ParsedDocument, FetchError> {
        let response = tokio::time::timeout(self.timeout, self.client.get(url).send())
            .await
            .map_err(|_| FetchError::Timeout)?
            .map_err(map_request_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        let bytes = read_limited_bytes(response, MAX_FEED_SIZE).await?;
        tracing::debug!(url = %url, bytes = bytes.len(), "Feed downloaded");

        parse_document(&bytes).map_err(|e| FetchError::Parse(e.to_string()))
    }
}

/// reqwest reports its own timeout as a generic error; surface it as `Timeout`.
fn map_request_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout
    } else {
        FetchError::Network(err)
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let expected_length = response.content_length();

    // Fast path: check Content-Length header
    if let Some(len) = expected_length {
        if len > limit as u64 {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(map_request_error)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    // A connection dropped mid-body yields fewer bytes than advertised.
    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}
