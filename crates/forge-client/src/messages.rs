//! User-facing messages for client errors
//!
//! Payload fields are consulted in a fixed order: `erro`, `detail`,
//! `message`, `non_field_errors`, then the first field-level validation
//! error. Without a usable payload the HTTP status picks the message.

use serde_json::Value;

use crate::error::{ApiErrorBody, ClientError};

pub const CONNECTIVITY_MESSAGE: &str =
    "Connection error. Check your internet connection and try again.";
pub const SESSION_EXPIRED_MESSAGE: &str = "Your session has expired. Please log in again.";
pub const FALLBACK_MESSAGE: &str = "An unexpected error occurred. Please try again.";

/// Keys that carry a whole-request message rather than a field error.
const MESSAGE_KEYS: &[&str] = &["erro", "detail", "message"];

/// Message to show for any client error.
pub fn error_message(err: &ClientError) -> String {
    match err {
        ClientError::Api { status, body } => {
            body_message(body).unwrap_or_else(|| status_message(*status))
        }
        ClientError::Auth(forge_auth::Error::Rejected { status, body }) => {
            body_message(&ApiErrorBody::parse(body)).unwrap_or_else(|| status_message(*status))
        }
        ClientError::Auth(forge_auth::Error::Http(_)) => CONNECTIVITY_MESSAGE.to_string(),
        ClientError::Network(e) if e.is_connect() || e.is_timeout() || e.is_request() => {
            CONNECTIVITY_MESSAGE.to_string()
        }
        ClientError::Network(e) => match e.status() {
            Some(status) => status_message(status.as_u16()),
            None => e.to_string(),
        },
        ClientError::Session(_) => SESSION_EXPIRED_MESSAGE.to_string(),
        ClientError::Auth(other) => other.to_string(),
        ClientError::Serialization(_) | ClientError::Configuration(_) => {
            FALLBACK_MESSAGE.to_string()
        }
    }
}

/// Message carried in an error payload, if any.
pub fn body_message(body: &ApiErrorBody) -> Option<String> {
    let ApiErrorBody::Json(Value::Object(fields)) = body else {
        return None;
    };

    for key in MESSAGE_KEYS {
        if let Some(value) = fields.get(*key)
            && is_present(value)
        {
            return Some(display_value(value));
        }
    }

    if let Some(first) = fields
        .get("non_field_errors")
        .and_then(Value::as_array)
        .and_then(|errors| errors.first())
    {
        return Some(display_value(first));
    }

    fields
        .iter()
        .find(|(key, _)| !MESSAGE_KEYS.contains(&key.as_str()))
        .map(|(key, value)| match value {
            Value::Array(items) => match items.first() {
                Some(first) => format!("{key}: {}", display_value(first)),
                None => format!("{key}: invalid"),
            },
            other => format!("{key}: {}", display_value(other)),
        })
}

/// Message for a bare HTTP status.
pub fn status_message(status: u16) -> String {
    match status {
        400 => "Invalid data. Check the fields you filled in.".to_string(),
        401 => SESSION_EXPIRED_MESSAGE.to_string(),
        403 => "You don't have permission to perform this action.".to_string(),
        404 => "Resource not found.".to_string(),
        500 => "Internal server error. Please try again later.".to_string(),
        503 => "Service temporarily unavailable. Please try again later.".to_string(),
        other => format!("Error {other}. Please try again."),
    }
}

/// Refinement for the login screen.
pub fn auth_error_message(err: &ClientError) -> String {
    let message = error_message(err);
    let lower = message.to_lowercase();

    if lower.contains("invalid")
        || lower.contains("incorrect")
        || lower.contains("no active account")
    {
        return "Incorrect email or password. Check your credentials.".to_string();
    }
    if lower.contains("token") || lower.contains("expired") {
        return SESSION_EXPIRED_MESSAGE.to_string();
    }
    if lower.contains("inactive") || lower.contains("disabled") {
        return "Your account is deactivated. Contact your administrator.".to_string();
    }
    message
}

/// Refinement for database connection tests.
pub fn connection_error_message(err: &ClientError) -> String {
    let message = error_message(err);
    let lower = message.to_lowercase();

    if lower.contains("timeout") {
        return "Connection timed out. Check that the server is reachable and the port is correct."
            .to_string();
    }
    if lower.contains("authentication") || lower.contains("login failed") {
        return "Invalid credentials. Check the database user and password.".to_string();
    }
    if lower.contains("database") && lower.contains("not found") {
        return "Database not found. Check the database name.".to_string();
    }
    if lower.contains("server") && lower.contains("not found") {
        return "Server not found. Check the host and port.".to_string();
    }
    if lower.contains("driver") || lower.contains("odbc") {
        return "ODBC driver not found. Install the driver for this database.".to_string();
    }
    message
}

/// Null, false, zero and "" don't count as a message.
fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
