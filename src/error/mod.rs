//! Error types and handlers for image stream resolution

pub mod handlers;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SourceError>;

/// Errors surfaced by the metadata client and the image stream source.
///
/// Payloads are plain strings so that a failure can be cloned into the
/// resolution state when permanent failures are cached.
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    /// Network, TLS or authentication failure reaching the metadata API
    #[error("Transport error: {0}")]
    Transport(String),
    /// Image stream or image object does not exist
    #[error("Not found: {0}")]
    NotFound(String),
    /// Non-2xx response other than 404
    #[error("Unexpected status {status}: {message}")]
    UnexpectedStatus { status: u16, message: String },
    /// Response body is not the JSON we expect
    #[error("Decode error: {0}")]
    Decode(String),
    /// No tag status for the requested tag, or it has no events
    #[error("No matching tag found: {stream}:{tag}")]
    TagNotFound { stream: String, tag: String },
    /// Pull spec or reference string does not have the expected shape
    #[error("Malformed reference: {0}")]
    MalformedReference(String),
    /// Parsing the resolved reference or opening the delegate failed
    #[error("Failed to open registry source for {reference}: {message}")]
    DelegateOpen { reference: String, message: String },
    #[error("Operation cancelled")]
    Cancelled,
    /// The source was used after `close()`
    #[error("Image source is closed")]
    Closed,
    /// Invalid client configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl SourceError {
    /// Whether retrying the same call can never succeed.
    ///
    /// Transport failures, unexpected statuses, undecodable bodies, delegate
    /// open failures and cancellations may clear up on their own.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            SourceError::NotFound(_)
                | SourceError::TagNotFound { .. }
                | SourceError::MalformedReference(_)
        )
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, SourceError::Cancelled)
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        SourceError::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(err: serde_json::Error) -> Self {
        SourceError::Decode(err.to_string())
    }
}

impl From<url::ParseError> for SourceError {
    fn from(err: url::ParseError) -> Self {
        SourceError::Config(err.to_string())
    }
}
