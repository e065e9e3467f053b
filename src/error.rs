//! Error types for osnova-likes
//!
//! A single crate-wide [`Error`] covers every failure the pipeline can observe:
//! - HTTP-level API errors carrying the response status as a machine-readable code
//! - Transport and decoding failures raised below the HTTP layer
//! - Queue lifecycle outcomes (cancelled by `clear()`, queue shut down)
//! - User input and configuration problems

use thiserror::Error;

/// Result type alias for osnova-likes operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for osnova-likes
#[derive(Debug, Error)]
pub enum Error {
    /// The API answered with a status in `[400, 600)`
    #[error("{message} (HTTP {code})")]
    Http {
        /// HTTP status code of the response
        code: u16,
        /// Human-readable description
        message: String,
    },

    /// Transport-level failure (connection refused, timeout, TLS, ...)
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Response body could not be decoded
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Endpoint url could not be built
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),

    /// The task was discarded before it settled (queue cleared or shut down)
    #[error("task cancelled before completion")]
    Cancelled,

    /// The queue actor is gone and no longer accepts tasks
    #[error("queue is closed")]
    QueueClosed,

    /// Input did not look like a supported profile link
    #[error("invalid profile url: {0}")]
    InvalidProfileUrl(String),

    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "queue.period")
        key: Option<String>,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Build an [`Error::Http`] from a status code and its reason phrase.
    pub fn http(code: u16, status_text: &str) -> Self {
        Error::Http {
            code,
            message: format!("Bad response from server: {status_text}"),
        }
    }

    /// HTTP status code, if this error came from an HTTP response.
    pub fn code(&self) -> Option<u16> {
        match self {
            Error::Http { code, .. } => Some(*code),
            Error::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// True when the API rejected the request as unauthorized (401).
    ///
    /// Unauthorized responses are never retried by the queue; the caller is
    /// expected to refresh credentials and re-submit.
    pub fn is_unauthorized(&self) -> bool {
        self.code() == Some(401)
    }
}
