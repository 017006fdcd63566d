//! Forced navigation when a session ends
//!
//! The client never decides how "go to the login page" happens. A desktop
//! shell swaps its root view, a CLI prints a hint, tests record the route.

use std::sync::Mutex;

use tracing::warn;

/// Receives the route the user must be sent to after the session is wiped.
pub trait Navigator: Send + Sync {
    fn redirect(&self, route: &str);
}

impl<F> Navigator for F
where
    F: Fn(&str) + Send + Sync,
{
    fn redirect(&self, route: &str) {
        self(route)
    }
}

/// Logs the forced navigation and does nothing else.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNavigator;

impl Navigator for LogNavigator {
    fn redirect(&self, route: &str) {
        warn!(route, "session ended, navigating to login");
    }
}

/// Remembers every route it was sent to.
#[derive(Debug, Default)]
pub struct RecordingNavigator {
    routes: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn routes(&self) -> Vec<String> {
        self.routes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn last(&self) -> Option<String> {
        self.routes().pop()
    }
}

impl Navigator for RecordingNavigator {
    fn redirect(&self, route: &str) {
        self.routes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(route.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn recording_navigator_keeps_order() {
        let nav = RecordingNavigator::new();
        assert!(nav.last().is_none());
        nav.redirect("/login");
        nav.redirect("/relatorios");
        assert_eq!(nav.routes(), vec!["/login", "/relatorios"]);
        assert_eq!(nav.last().as_deref(), Some("/relatorios"));
    }

    #[test]
    fn closures_are_navigators() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let nav: Arc<dyn Navigator> = Arc::new(move |route: &str| {
            assert_eq!(route, "/login");
            counter.fetch_add(1, Ordering::SeqCst);
        });
        nav.redirect("/login");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
