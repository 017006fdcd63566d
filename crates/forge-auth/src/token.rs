//! Token endpoint calls
//!
//! Handles the two unauthenticated token interactions:
//! 1. Password login (`POST /token/`)
//! 2. Access token refresh (`POST /token/refresh/`)
//!
//! Both are sent on a bare `reqwest::Client`, never through the
//! authenticated client, so a failing refresh can't recurse into another
//! refresh.

use common::Secret;
use serde::Deserialize;
use tracing::debug;

use crate::constants::{TOKEN_PATH, TOKEN_REFRESH_PATH};
use crate::error::{Error, Result};
use crate::user::User;

/// Response from the login endpoint.
#[derive(Debug, Deserialize)]
pub struct LoginResponse {
    pub access: Secret<String>,
    pub refresh: Secret<String>,
    pub user: User,
}

/// Response from the refresh endpoint.
///
/// Backends that rotate refresh tokens also return a new `refresh`; it is
/// absent otherwise.
#[derive(Debug, Deserialize)]
pub struct RefreshResponse {
    pub access: Secret<String>,
    #[serde(default)]
    pub refresh: Option<Secret<String>>,
}

/// Join the API base URL and a path that starts with `/`.
pub fn endpoint_url(base_url: &str, path: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), path)
}

/// Exchange email and password for an access/refresh token pair.
pub async fn login(
    client: &reqwest::Client,
    base_url: &str,
    email: &str,
    password: &Secret<String>,
) -> Result<LoginResponse> {
    let response = client
        .post(endpoint_url(base_url, TOKEN_PATH))
        .json(&serde_json::json!({
            "email": email,
            "password": password.expose(),
        }))
        .send()
        .await
        .map_err(|e| Error::Http(format!("login request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));

        // 400/401 carry the backend's explanation (wrong password, inactive account)
        if matches!(status.as_u16(), 400 | 401 | 403) {
            return Err(Error::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        return Err(Error::TokenExchange(format!(
            "login endpoint returned {status}: {body}"
        )));
    }

    debug!("login accepted");
    response
        .json::<LoginResponse>()
        .await
        .map_err(|e| Error::TokenExchange(format!("invalid login response: {e}")))
}

/// Mint a new access token from a refresh token.
///
/// Called by the authenticated client when a request comes back 401. Any
/// error here ends the session; the caller does not retry.
pub async fn refresh_access(
    client: &reqwest::Client,
    base_url: &str,
    refresh: &str,
) -> Result<RefreshResponse> {
    let response = client
        .post(endpoint_url(base_url, TOKEN_REFRESH_PATH))
        .json(&serde_json::json!({ "refresh": refresh }))
        .send()
        .await
        .map_err(|e| Error::Http(format!("token refresh request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));

        // 401/403 means the refresh token is expired, blacklisted or revoked
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(Error::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        return Err(Error::TokenExchange(format!(
            "token refresh returned {status}: {body}"
        )));
    }

    response
        .json::<RefreshResponse>()
        .await
        .map_err(|e| Error::TokenExchange(format!("invalid refresh response: {e}")))
}
