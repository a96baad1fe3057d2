//! Error types for the Horde client.

use thiserror::Error;

/// Errors returned by [`crate::HordeApi`] implementations.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Transport-level failure (connection refused, timeout, TLS).
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("server returned {status} for {url}")]
    Status { status: u16, url: String },

    /// The requested resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The response body could not be decoded.
    #[error("invalid response: {0}")]
    Decode(#[from] serde_json::Error),

    /// The configured server URL is not usable.
    #[error("invalid server url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The server could not be reached or refused the request.
    #[error("service unavailable: {0}")]
    Unavailable(String),
}

/// Result type alias for API calls.
pub type Result<T> = std::result::Result<T, ApiError>;
