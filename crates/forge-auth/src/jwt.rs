//! JWT payload inspection
//!
//! Decodes the claims segment of an access token for display (time left,
//! token type). The signature is not verified; the backend does that. The
//! client never refreshes based on these claims, only on a 401.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::Deserialize;

use crate::error::{Error, Result};

/// Subset of the claims the backend puts in its tokens.
#[derive(Debug, Clone, Deserialize)]
pub struct Claims {
    /// Expiry as unix seconds
    #[serde(default)]
    pub exp: Option<u64>,
    #[serde(default)]
    pub user_id: Option<String>,
    /// "access" or "refresh"
    #[serde(default)]
    pub token_type: Option<String>,
}

impl Claims {
    /// Seconds until expiry relative to `now_secs`; negative once expired.
    pub fn expires_in(&self, now_secs: u64) -> Option<i64> {
        self.exp.map(|exp| exp as i64 - now_secs as i64)
    }

    pub fn is_expired(&self, now_secs: u64) -> bool {
        matches!(self.expires_in(now_secs), Some(secs) if secs <= 0)
    }
}

/// Decode the payload segment of a compact JWT.
pub fn decode_claims(token: &str) -> Result<Claims> {
    let mut segments = token.split('.');
    let payload = match (segments.next(), segments.next(), segments.next()) {
        (Some(_), Some(payload), Some(_)) => payload,
        _ => {
            return Err(Error::InvalidToken(
                "expected three dot-separated segments".into(),
            ));
        }
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| Error::InvalidToken(format!("payload is not base64url: {e}")))?;

    serde_json::from_slice(&bytes)
        .map_err(|e| Error::InvalidToken(format!("payload is not a claims object: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token_with(payload: &serde_json::Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let body = URL_SAFE_NO_PAD.encode(payload.to_string());
        format!("{header}.{body}.signature")
    }

    #[test]
    fn decodes_simplejwt_access_claims() {
        let token = token_with(&serde_json::json!({
            "token_type": "access",
            "exp": 1_900_000_000u64,
            "user_id": "u-1"
        }));
        let claims = decode_claims(&token).unwrap();
        assert_eq!(claims.token_type.as_deref(), Some("access"));
        assert_eq!(claims.user_id.as_deref(), Some("u-1"));
        assert_eq!(claims.expires_in(1_899_999_400), Some(600));
        assert!(!claims.is_expired(1_899_999_400));
    }

    #[test]
    fn expired_token_reports_negative_time_left() {
        let token = token_with(&serde_json::json!({ "exp": 1000 }));
        let claims = decode_claims(&token).unwrap();
        assert_eq!(claims.expires_in(1300), Some(-300));
        assert!(claims.is_expired(1300));
    }

    #[test]
    fn missing_exp_never_counts_as_expired() {
        let token = token_with(&serde_json::json!({}));
        let claims = decode_claims(&token).unwrap();
        assert!(claims.expires_in(0).is_none());
        assert!(!claims.is_expired(u64::MAX));
    }

    #[test]
    fn opaque_token_is_rejected() {
        assert!(matches!(
            decode_claims("not-a-jwt"),
            Err(Error::InvalidToken(_))
        ));
        assert!(decode_claims("a.%%%.c").is_err());
    }
}
