//! Forge Reports authentication library
//!
//! Talks to the backend's token endpoints and owns the persisted session
//! state. Nothing here attaches bearer tokens to resource requests; that is
//! the job of `forge-client`, which builds on these pieces.
//!
//! Session flow:
//! 1. `token::login()` exchanges email + password for an access/refresh pair
//! 2. `SessionStore::store_login()` persists access token, refresh token and user
//! 3. On a 401 the client calls `token::refresh_access()` once per expiry event
//! 4. `SessionStore::set_access_token()` records the fresh access token
//! 5. Logout or an unrecoverable refresh failure calls `SessionStore::clear()`

pub mod constants;
pub mod error;
pub mod jwt;
pub mod session;
pub mod token;
pub mod user;

pub use constants::*;
pub use error::{Error, Result};
pub use jwt::{Claims, decode_claims};
pub use session::SessionStore;
pub use token::{LoginResponse, RefreshResponse, endpoint_url, login, refresh_access};
pub use user::{Role, User};
