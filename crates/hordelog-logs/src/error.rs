//! Error types for log sources.

use hordelog_api::ApiError;
use thiserror::Error;

/// Errors that can occur while driving a log source.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The remote data client failed.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// The log's owning job or lease could not be resolved.
    #[error("{0}")]
    Unresolved(String),

    /// The operation needs an initialized source.
    #[error("log source is not initialized")]
    NotInitialized,

    /// A log reference could not be parsed.
    #[error("invalid log reference: {0}")]
    InvalidTarget(String),

    /// Writing a download failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for log source operations.
pub type Result<T> = std::result::Result<T, SourceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let err = SourceError::Unresolved("unable to find step or batch for log abc".to_string());
        assert_eq!(err.to_string(), "unable to find step or batch for log abc");

        let err = SourceError::NotInitialized;
        assert_eq!(err.to_string(), "log source is not initialized");

        let err: SourceError = ApiError::NotFound("log 1".to_string()).into();
        assert_eq!(err.to_string(), "not found: log 1");
    }
}
