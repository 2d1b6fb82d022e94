//! Error types for wikichat-api

use thiserror::Error;

/// Result type alias using wikichat-api Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when talking to the chat backend
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Backend answered with a non-success status
    #[error("API error: {message} (status: {status})")]
    Api { status: u16, message: String },

    /// Server-sent events transport error
    #[error("SSE error: {0}")]
    Sse(String),

    /// A single pushed message could not be decoded
    #[error("Malformed stream event: {source} (payload: {data})")]
    Decode {
        data: String,
        #[source]
        source: serde_json::Error,
    },

    /// Unexpected response format
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Create an API error from a status code and message
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Whether this error marks one malformed event rather than a broken stream
    pub fn is_decode(&self) -> bool {
        matches!(self, Error::Decode { .. })
    }

    /// Check if this error is worth retrying.
    ///
    /// Nothing in this crate retries on its own; callers that implement a
    /// retry policy can use this as a hint.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Http(e) => e.is_timeout() || e.is_connect(),
            Error::Sse(_) => true,
            Error::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}
