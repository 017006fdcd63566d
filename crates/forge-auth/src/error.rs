//! Error types for token endpoint and session storage operations

/// Errors from authentication operations.
///
/// `Clone` so a single refresh failure can be handed to every request that
/// was waiting on it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("token endpoint rejected the request ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("token exchange failed: {0}")]
    TokenExchange(String),

    #[error("session parse error: {0}")]
    SessionParse(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("invalid token: {0}")]
    InvalidToken(String),
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;
