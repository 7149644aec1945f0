//! Per-attempt and per-request outcomes.
//!
//! Failures are data here, not errors: an [`AttemptOutcome`] is produced for every attempt and
//! exactly one [`FetchResult`] for every descriptor, whatever happened to it.

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;
use thiserror::Error;

use crate::error::VolleyError;
use crate::http::HttpResponse;

/// Failure taxonomy used for retry decisions and error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The resource does not exist (HTTP 404). Never retried.
    NotFound,
    /// Network error or timeout.
    Transient,
    /// Any other non-2xx status.
    ServerError,
    /// The response could not be decoded, or something else unexpected happened.
    Malformed,
    /// The request could not be built (bad template, bad input). Never dispatched.
    ConfigurationError,
    /// The batch was cancelled before this request finished.
    Cancelled,
}

impl FailureKind {
    /// Returns true if an attempt failing this way should be retried.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            FailureKind::Transient | FailureKind::ServerError | FailureKind::Malformed
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::NotFound => "not_found",
            FailureKind::Transient => "transient",
            FailureKind::ServerError => "server_error",
            FailureKind::Malformed => "malformed",
            FailureKind::ConfigurationError => "configuration_error",
            FailureKind::Cancelled => "cancelled",
        }
    }
}

/// What a single attempt produced.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    /// 2xx with a decodable body
    Success(Value),
    /// Non-2xx status
    HttpFailure { status: u16, body: String },
    /// Connection refused, DNS failure, timeout
    NetworkFailure { cause: String },
    /// Anything else, including a 2xx body that is not valid JSON
    UnexpectedFailure { cause: String },
}

impl AttemptOutcome {
    /// Classify a response that made it back from the transport.
    pub fn from_response(response: HttpResponse) -> Self {
        if !(200..300).contains(&response.status) {
            return AttemptOutcome::HttpFailure {
                status: response.status,
                body: response.body,
            };
        }

        if response.body.trim().is_empty() {
            return AttemptOutcome::Success(Value::Null);
        }

        match serde_json::from_str(&response.body) {
            Ok(payload) => AttemptOutcome::Success(payload),
            Err(e) => AttemptOutcome::UnexpectedFailure {
                cause: format!("failed to decode response body: {}", e),
            },
        }
    }

    /// Classify an error returned by the transport.
    pub fn from_error(error: &VolleyError) -> Self {
        if error.is_transport() {
            AttemptOutcome::NetworkFailure {
                cause: error.to_string(),
            }
        } else {
            AttemptOutcome::UnexpectedFailure {
                cause: error.to_string(),
            }
        }
    }

    /// Failure kind of this attempt, or `None` for a success.
    pub fn kind(&self) -> Option<FailureKind> {
        match self {
            AttemptOutcome::Success(_) => None,
            AttemptOutcome::HttpFailure { status: 404, .. } => Some(FailureKind::NotFound),
            AttemptOutcome::HttpFailure { .. } => Some(FailureKind::ServerError),
            AttemptOutcome::NetworkFailure { .. } => Some(FailureKind::Transient),
            AttemptOutcome::UnexpectedFailure { .. } => Some(FailureKind::Malformed),
        }
    }

    /// Short label used in log events and metric labels.
    pub fn class(&self) -> &'static str {
        match self {
            AttemptOutcome::Success(_) => "success",
            AttemptOutcome::HttpFailure { status: 404, .. } => "not_found",
            AttemptOutcome::HttpFailure { .. } => "http_error",
            AttemptOutcome::NetworkFailure { .. } => "network_error",
            AttemptOutcome::UnexpectedFailure { .. } => "unexpected_error",
        }
    }

    /// The decoded payload, or the error this attempt would end the request with.
    pub fn into_result(self) -> Result<Value, FetchError> {
        match self {
            AttemptOutcome::Success(payload) => Ok(payload),
            AttemptOutcome::HttpFailure { status, body } => Err(FetchError::Http { status, body }),
            AttemptOutcome::NetworkFailure { cause } => Err(FetchError::Network { cause }),
            AttemptOutcome::UnexpectedFailure { cause } => Err(FetchError::Unexpected { cause }),
        }
    }
}

/// Terminal failure of a request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("HTTP request returned error status code: {status} - {body}")]
    Http { status: u16, body: String },

    #[error("Network error: {cause}")]
    Network { cause: String },

    #[error("Unexpected error: {cause}")]
    Unexpected { cause: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Request cancelled before completion")]
    Cancelled,
}

impl FetchError {
    pub fn kind(&self) -> FailureKind {
        match self {
            FetchError::Http { status: 404, .. } => FailureKind::NotFound,
            FetchError::Http { .. } => FailureKind::ServerError,
            FetchError::Network { .. } => FailureKind::Transient,
            FetchError::Unexpected { .. } => FailureKind::Malformed,
            FetchError::Configuration { .. } => FailureKind::ConfigurationError,
            FetchError::Cancelled => FailureKind::Cancelled,
        }
    }
}

/// Final outcome of one descriptor.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Success { payload: Value },
    Skipped { reason: String },
    Failed(FetchError),
}

/// Result of one descriptor, in the same position as the descriptor was submitted.
///
/// Serializes to the flat record collaborators consume:
///
/// ```json
/// { "id": "page-2", "status": "failed", "attempts": 3,
///   "error": "Network error: ...", "kind": "transient" }
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResult {
    pub id: String,
    /// Number of attempts started (0 if the request was never dispatched)
    pub attempts: u32,
    pub outcome: FetchOutcome,
}

impl FetchResult {
    pub fn success(id: impl Into<String>, attempts: u32, payload: Value) -> Self {
        Self {
            id: id.into(),
            attempts,
            outcome: FetchOutcome::Success { payload },
        }
    }

    pub fn skipped(id: impl Into<String>, attempts: u32, reason: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            attempts,
            outcome: FetchOutcome::Skipped {
                reason: reason.into(),
            },
        }
    }

    pub fn failed(id: impl Into<String>, attempts: u32, error: FetchError) -> Self {
        Self {
            id: id.into(),
            attempts,
            outcome: FetchOutcome::Failed(error),
        }
    }

    /// A request that was never dispatched because it could not be built.
    pub fn misconfigured(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::failed(
            id,
            0,
            FetchError::Configuration {
                message: message.into(),
            },
        )
    }

    /// `"success"`, `"skipped"` or `"failed"`.
    pub fn status(&self) -> &'static str {
        match self.outcome {
            FetchOutcome::Success { .. } => "success",
            FetchOutcome::Skipped { .. } => "skipped",
            FetchOutcome::Failed(_) => "failed",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, FetchOutcome::Success { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self.outcome, FetchOutcome::Skipped { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, FetchOutcome::Failed(_))
    }

    pub fn payload(&self) -> Option<&Value> {
        match &self.outcome {
            FetchOutcome::Success { payload } => Some(payload),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&FetchError> {
        match &self.outcome {
            FetchOutcome::Failed(error) => Some(error),
            _ => None,
        }
    }
}

impl Serialize for FetchResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("id", &self.id)?;
        map.serialize_entry("status", self.status())?;
        map.serialize_entry("attempts", &self.attempts)?;
        match &self.outcome {
            FetchOutcome::Success { payload } => map.serialize_entry("payload", payload)?,
            FetchOutcome::Skipped { reason } => map.serialize_entry("reason", reason)?,
            FetchOutcome::Failed(error) => {
                map.serialize_entry("error", &error.to_string())?;
                map.serialize_entry("kind", error.kind().as_str())?;
            }
        }
        map.end()
    }
}
