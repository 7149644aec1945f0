//! Error types for the fetch engine.
//!
//! Per-request failures are never surfaced through this type: they are captured as
//! [`FetchError`](crate::request::FetchError) values inside each result. `VolleyError` covers
//! the operations that are allowed to abort a whole call, such as building the shared client or
//! loading configuration, plus the transport-level errors a [`HttpClient`](crate::HttpClient)
//! reports for a single attempt.

use thiserror::Error;

/// Result type alias using the volley error type.
pub type Result<T> = std::result::Result<T, VolleyError>;

/// Main error type for the fetch engine.
#[derive(Error, Debug)]
pub enum VolleyError {
    /// The shared HTTP client could not be constructed
    #[error("Failed to initialize HTTP client: {0}")]
    ClientInit(String),

    /// Configuration could not be loaded or failed validation
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// A request descriptor could not be built from its input
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Transport-level failure reported by a non-reqwest client
    /// (connection refused, DNS failure, timeout)
    #[error("Transport error: {0}")]
    Transport(String),

    /// HTTP client error
    #[error("HTTP request failed: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// General error from anyhow
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl VolleyError {
    /// Returns true if this error came from the network rather than from the request itself.
    ///
    /// Builder errors (a header value that cannot be encoded, a URL that does not parse) are
    /// reported by reqwest through the same error type but never reached the wire.
    pub fn is_transport(&self) -> bool {
        match self {
            VolleyError::Transport(_) => true,
            VolleyError::HttpClient(e) => !e.is_builder() && !e.is_decode(),
            _ => false,
        }
    }
}
