//! Authenticated API client for the Forge Reports backend
//!
//! Wraps `reqwest` with bearer-token attachment and transparent recovery
//! from access-token expiry. When a request comes back 401 the client runs
//! exactly one refresh against the token endpoint, parks every other request
//! that hits a 401 meanwhile, and replays all of them with the new token.
//! If the refresh can't happen the session is cleared and the injected
//! `Navigator` is sent to the login route.
//!
//! Request lifecycle:
//! 1. Attach `Authorization: Bearer <access>` from the `SessionStore`
//! 2. Non-401 responses return to the caller untouched
//! 3. First 401 with no refresh running: become the leader, refresh, replay
//! 4. First 401 while a refresh runs: queue, wait for the leader, replay
//! 5. A replayed request is never retried again, whatever its status

pub mod client;
pub mod error;
pub mod inactivity;
pub mod messages;
pub mod metrics;
pub mod navigator;
mod refresh;
pub mod session;
pub mod users;

pub use client::{AuthenticatedClient, AuthenticatedClientBuilder, RequestOptions};
pub use error::{ApiErrorBody, ClientError, Result, SessionError};
pub use inactivity::{ActivityTracker, DEFAULT_INACTIVITY_TIMEOUT, spawn_inactivity_watchdog};
pub use messages::{auth_error_message, connection_error_message, error_message};
pub use navigator::{LogNavigator, Navigator, RecordingNavigator};
pub use session::AuthSession;
pub use users::{CreateUser, ManagedUser, UpdateUser, UserStatus, UsersApi};
