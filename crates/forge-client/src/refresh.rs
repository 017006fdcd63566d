//! Single-flight coordination for access-token refresh
//!
//! One `RefreshCoordinator` lives inside each `AuthenticatedClient`. The
//! first request to see a 401 becomes the leader and performs the refresh;
//! requests that see a 401 while the leader is working get a oneshot
//! receiver and wait for the leader's outcome.
//!
//! The guard is owned, so the leader can move it into a spawned task and the
//! refresh settles the queue even if the request that started it is dropped.
//!
//! The `std::sync::Mutex` guarding the state is only ever held for a flag
//! check or a queue push/drain, never across an `.await`. Resetting the flag
//! and draining the queue happen under the same lock acquisition, so a
//! request can't enqueue itself after the drain and be left waiting.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::oneshot;
use tracing::debug;

use crate::error::SessionError;

/// What every queued request receives: the new access token or the reason
/// the session ended.
pub(crate) type RefreshOutcome = Result<String, SessionError>;

#[derive(Default)]
struct RefreshState {
    is_refreshing: bool,
    queue: Vec<oneshot::Sender<RefreshOutcome>>,
}

/// Per-client refresh flag plus waiting queue.
#[derive(Clone, Default)]
pub(crate) struct RefreshCoordinator {
    state: Arc<Mutex<RefreshState>>,
}

/// Role a request takes after hitting a 401.
pub(crate) enum Ticket {
    /// Perform the refresh; the guard must be settled with the outcome.
    Leader(LeaderGuard),
    /// Another request is refreshing; await its outcome.
    Follower(oneshot::Receiver<RefreshOutcome>),
}

impl RefreshCoordinator {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn is_refreshing(&self) -> bool {
        self.lock().is_refreshing
    }

    /// Number of requests currently parked behind the leader.
    #[cfg(test)]
    pub(crate) fn queued(&self) -> usize {
        self.lock().queue.len()
    }

    /// Check-and-set the refresh flag, or join the queue if it is already set.
    pub(crate) fn join(&self) -> Ticket {
        let mut state = self.lock();
        if state.is_refreshing {
            let (tx, rx) = oneshot::channel();
            state.queue.push(tx);
            debug!(queued = state.queue.len(), "refresh in flight, request queued");
            Ticket::Follower(rx)
        } else {
            state.is_refreshing = true;
            Ticket::Leader(LeaderGuard {
                coordinator: self.clone(),
                settled: false,
            })
        }
    }

    /// Clear the flag, take the queue, and hand the outcome to every waiter.
    fn finish(&self, outcome: RefreshOutcome) -> usize {
        let waiters = {
            let mut state = self.lock();
            state.is_refreshing = false;
            std::mem::take(&mut state.queue)
        };
        let count = waiters.len();
        for waiter in waiters {
            // A waiter whose request future was dropped has nobody to tell
            let _ = waiter.send(outcome.clone());
        }
        count
    }

    fn lock(&self) -> MutexGuard<'_, RefreshState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Held for the duration of one refresh.
///
/// Dropping it without `settle` (cancelled before the refresh was handed
/// off, or the refresh task panicked) still resets the flag and wakes the
/// queue with `RefreshAbandoned`, which waiters answer by joining again.
pub(crate) struct LeaderGuard {
    coordinator: RefreshCoordinator,
    settled: bool,
}

impl LeaderGuard {
    /// Queue a receiver for this refresh's outcome, for the leader itself.
    pub(crate) fn waiter(&self) -> oneshot::Receiver<RefreshOutcome> {
        let (tx, rx) = oneshot::channel();
        self.coordinator.lock().queue.push(tx);
        rx
    }

    /// Publish the refresh outcome. Returns how many queued requests were woken.
    pub(crate) fn settle(mut self, outcome: RefreshOutcome) -> usize {
        self.settled = true;
        self.coordinator.finish(outcome)
    }
}

impl Drop for LeaderGuard {
    fn drop(&mut self) {
        if !self.settled {
            self.coordinator
                .finish(Err(SessionError::RefreshAbandoned));
        }
    }
}
