//! Shared error type for API access and image downloads.

use thiserror::Error;

/// API error covering network transport, HTTP status, body reads, and
/// payload decoding.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Network error: could not reach {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP {status} when fetching: {url}")]
    HttpStatus {
        status: u16,
        url: String,
        /// Optional context (e.g. "blog", "post list page 3") for programmatic use.
        context: Option<String>,
    },

    #[error("Failed to read response body: {source}")]
    BodyRead {
        #[source]
        source: reqwest::Error,
    },

    #[error("Could not decode API response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}
