//! Client error taxonomy
//!
//! - `Session`: the session is gone (refresh failed or impossible). Local
//!   state has already been cleared and the navigator redirected.
//! - `Api`: the backend answered with a non-success status; page-level code
//!   turns the payload into a message via `messages::error_message`.
//! - `Network`: no response at all.

use std::fmt;

/// Why a session could not be recovered after a 401.
///
/// `Clone` because one refresh outcome fans out to every queued request.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SessionError {
    #[error("no refresh token stored")]
    MissingRefreshToken,

    #[error("token refresh failed: {0}")]
    RefreshFailed(#[from] forge_auth::Error),

    /// The refresh never ran to completion. Waiters join again instead of
    /// surfacing this, so callers don't see it.
    #[error("token refresh was abandoned before it completed")]
    RefreshAbandoned,
}

/// Body of a non-success response, parsed as JSON when possible.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiErrorBody {
    Json(serde_json::Value),
    Text(String),
}

impl ApiErrorBody {
    pub fn parse(raw: &str) -> Self {
        match serde_json::from_str(raw) {
            Ok(value) => ApiErrorBody::Json(value),
            Err(_) => ApiErrorBody::Text(raw.to_string()),
        }
    }
}

impl fmt::Display for ApiErrorBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiErrorBody::Json(value) => write!(f, "{value}"),
            ApiErrorBody::Text(text) => f.write_str(text),
        }
    }
}

/// Errors surfaced by `AuthenticatedClient` and the APIs built on it.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("session ended: {0}")]
    Session(#[from] SessionError),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: ApiErrorBody },

    #[error("authentication error: {0}")]
    Auth(#[from] forge_auth::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Configuration(String),
}

impl ClientError {
    /// HTTP status behind the error, if the backend answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            ClientError::Auth(forge_auth::Error::Rejected { status, .. }) => Some(*status),
            ClientError::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Whether the caller has been signed out as a consequence of this error.
    pub fn is_session_fatal(&self) -> bool {
        matches!(self, ClientError::Session(_))
    }
}

/// Result alias for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
