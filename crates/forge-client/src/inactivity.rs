//! Idle-session logout
//!
//! Every request through the client marks activity. A background task
//! checks periodically and logs the user out once nothing has happened for
//! the configured timeout while a session is active.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

use crate::session::AuthSession;

/// Idle time after which the session is ended.
pub const DEFAULT_INACTIVITY_TIMEOUT: Duration = Duration::from_secs(15 * 60);

/// Shared "last seen" timestamp.
#[derive(Debug, Clone)]
pub struct ActivityTracker {
    last: Arc<Mutex<Instant>>,
}

impl Default for ActivityTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ActivityTracker {
    pub fn new() -> Self {
        Self {
            last: Arc::new(Mutex::new(Instant::now())),
        }
    }

    /// Mark activity now.
    pub fn touch(&self) {
        *self
            .last
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Instant::now();
    }

    /// Time since the last recorded activity.
    pub fn idle_for(&self) -> Duration {
        let last = *self
            .last
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Instant::now().saturating_duration_since(last)
    }
}

/// Spawn a task that logs out after `timeout` of inactivity.
///
/// Checks every `check_every`. Only fires while a session is active; after
/// firing, the tracker is reset so a later login starts a fresh window.
pub fn spawn_inactivity_watchdog(
    session: Arc<AuthSession>,
    timeout: Duration,
    check_every: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(check_every);
        // Skip the immediate first tick
        ticker.tick().await;

        loop {
            ticker.tick().await;
            check_idle(&session, timeout).await;
        }
    })
}

async fn check_idle(session: &AuthSession, timeout: Duration) {
    let tracker = session.client().activity();
    let idle = tracker.idle_for();
    if idle < timeout {
        return;
    }
    if !session.is_authenticated().await {
        debug!(idle_secs = idle.as_secs(), "idle without a session, nothing to do");
        return;
    }

    info!(
        idle_secs = idle.as_secs(),
        timeout_secs = timeout.as_secs(),
        "session idle past timeout, logging out"
    );
    session.end("inactivity").await;
    tracker.touch();
}
