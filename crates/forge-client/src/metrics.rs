//! Client-side metrics
//!
//! Emitted through the `metrics` facade; the embedding application decides
//! whether a recorder is installed. Without one these calls are no-ops.
//!
//! - `forge_client_requests_total` (counter): labels `status`, `method`
//! - `forge_client_request_duration_seconds` (histogram): label `status`
//! - `forge_client_token_refresh_total` (counter): label `outcome`
//! - `forge_client_session_cleared_total` (counter): label `reason`

/// Record one HTTP exchange with the backend (original or replayed).
pub fn record_request(status: u16, method: &str, duration_secs: f64) {
    let status_str = status.to_string();
    metrics::counter!("forge_client_requests_total", "status" => status_str.clone(), "method" => method.to_string())
        .increment(1);
    metrics::histogram!("forge_client_request_duration_seconds", "status" => status_str)
        .record(duration_secs);
}

/// Record the end of a refresh cycle: `success`, `failure`, `missing_token` or `skipped`.
pub fn record_refresh(outcome: &'static str) {
    metrics::counter!("forge_client_token_refresh_total", "outcome" => outcome).increment(1);
}

/// Record a session wipe: `logout`, `refresh_failed`, `missing_refresh_token` or `inactivity`.
pub fn record_session_cleared(reason: &'static str) {
    metrics::counter!("forge_client_session_cleared_total", "reason" => reason).increment(1);
}
