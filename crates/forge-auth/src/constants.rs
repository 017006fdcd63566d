//! Backend endpoint paths, session storage keys and routing constants
//!
//! All paths are relative to the configured API base URL, which already
//! carries the `/api` prefix.

/// Base URL used when neither config nor environment provide one.
pub const DEFAULT_API_URL: &str = "http://localhost:8000/api";

/// Environment variable overriding the API base URL.
pub const API_URL_ENV: &str = "FORGE_API_URL";

/// Password login: `{email, password}` -> `{access, refresh, user}`
pub const TOKEN_PATH: &str = "/token/";

/// Access token refresh: `{refresh}` -> `{access}`
pub const TOKEN_REFRESH_PATH: &str = "/token/refresh/";

/// Route the client is sent to when the session cannot be recovered.
pub const LOGIN_ROUTE: &str = "/login";

/// Session storage key holding the bearer access token.
pub const ACCESS_TOKEN_KEY: &str = "access_token";

/// Session storage key holding the refresh token.
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";

/// Session storage key holding the serialized user profile.
pub const USER_KEY: &str = "user";

/// Every key that makes up a session. Cleared together, never individually.
pub const SESSION_KEYS: [&str; 3] = [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, USER_KEY];

/// Resource collection roots served by the backend.
pub mod paths {
    pub const REPORTS: &str = "/relatorios/";
    pub const USERS: &str = "/usuarios/";
    pub const SCHEDULES: &str = "/agendamentos/";
    pub const FOLDERS: &str = "/pastas/";
    pub const FAVORITES: &str = "/favoritos/";
    pub const HISTORY: &str = "/historico/";
    pub const SETTINGS: &str = "/configuracoes/";
    pub const CONNECTIONS: &str = "/conexoes/";
}
