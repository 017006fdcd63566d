//! Persisted session state
//!
//! Holds the three session entries (access token, refresh token, serialized
//! user profile) in a flat string map, optionally mirrored to a JSON file.
//! File writes use atomic temp-file + rename, and a tokio Mutex serializes
//! writers so a refresh persisting a new access token can't interleave with
//! a logout clearing the session.
//!
//! The three keys are written together on login and removed together on
//! logout or an unrecoverable refresh failure.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::constants::{ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, SESSION_KEYS, USER_KEY};
use crate::error::{Error, Result};
use crate::user::User;

/// Session storage with optional file persistence.
pub struct SessionStore {
    path: Option<PathBuf>,
    state: Mutex<HashMap<String, String>>,
}

impl SessionStore {
    /// A store that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: Mutex::new(HashMap::new()),
        }
    }

    /// Load the session from the given file path.
    ///
    /// If the file doesn't exist it is created as `{}` (signed out).
    pub async fn load(path: PathBuf) -> Result<Self> {
        let state = if path.exists() {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::Io(format!("reading session file: {e}")))?;
            let entries: HashMap<String, String> = serde_json::from_str(&contents)
                .map_err(|e| Error::SessionParse(format!("parsing session file: {e}")))?;
            info!(path = %path.display(), entries = entries.len(), "loaded session");
            entries
        } else {
            info!(path = %path.display(), "session file not found, starting signed out");
            let entries = HashMap::new();
            write_atomic(&path, &entries).await?;
            entries
        };

        Ok(Self {
            path: Some(path),
            state: Mutex::new(state),
        })
    }

    /// Raw value stored under `key`.
    pub async fn get(&self, key: &str) -> Option<String> {
        self.state.lock().await.get(key).cloned()
    }

    pub async fn access_token(&self) -> Option<String> {
        self.get(ACCESS_TOKEN_KEY).await
    }

    pub async fn refresh_token(&self) -> Option<String> {
        self.get(REFRESH_TOKEN_KEY).await
    }

    /// Cached user profile, if one is stored.
    pub async fn user(&self) -> Result<Option<User>> {
        match self.get(USER_KEY).await {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| Error::SessionParse(format!("parsing stored user: {e}"))),
            None => Ok(None),
        }
    }

    /// A session counts as restored when both the access token and the user
    /// profile are present.
    pub async fn is_authenticated(&self) -> bool {
        let state = self.state.lock().await;
        state.contains_key(ACCESS_TOKEN_KEY) && state.contains_key(USER_KEY)
    }

    /// Record a freshly minted access token.
    pub async fn set_access_token(&self, access: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.insert(ACCESS_TOKEN_KEY.to_string(), access.to_string());
        debug!("updated access token");
        self.persist(&state).await
    }

    /// Record a rotated refresh token.
    pub async fn set_refresh_token(&self, refresh: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.insert(REFRESH_TOKEN_KEY.to_string(), refresh.to_string());
        debug!("updated refresh token");
        self.persist(&state).await
    }

    /// Store all three session entries after a successful login.
    pub async fn store_login(&self, access: &str, refresh: &str, user: &User) -> Result<()> {
        let user_json = serde_json::to_string(user)
            .map_err(|e| Error::SessionParse(format!("serializing user: {e}")))?;
        let mut state = self.state.lock().await;
        state.insert(ACCESS_TOKEN_KEY.to_string(), access.to_string());
        state.insert(REFRESH_TOKEN_KEY.to_string(), refresh.to_string());
        state.insert(USER_KEY.to_string(), user_json);
        debug!(user_id = %user.id, "stored session");
        self.persist(&state).await
    }

    /// Remove every session entry.
    pub async fn clear(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        for key in SESSION_KEYS {
            state.remove(key);
        }
        debug!("cleared session");
        self.persist(&state).await
    }

    async fn persist(&self, state: &HashMap<String, String>) -> Result<()> {
        match &self.path {
            Some(path) => write_atomic(path, state).await,
            None => Ok(()),
        }
    }
}

/// Write the session map to a file atomically.
///
/// Writes to a temporary file in the same directory, then renames it over
/// the target. Permissions are 0600 since the file holds bearer tokens.
async fn write_atomic(path: &Path, data: &HashMap<String, String>) -> Result<()> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| Error::SessionParse(format!("serializing session: {e}")))?;

    let dir = path
        .parent()
        .ok_or_else(|| Error::Io("session path has no parent directory".into()))?;

    let tmp_path = dir.join(format!(".session.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Io(format!("writing temp session file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting session file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp session file: {e}")))?;

    debug!(path = %path.display(), "persisted session");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::user::Role;

    fn test_user() -> User {
        User {
            id: "u-1".into(),
            name: "Ana".into(),
            email: "ana@acme.com.br".into(),
            role: Role::Admin,
            company_id: "c-1".into(),
            company_name: Some("Acme".into()),
            phone: None,
            job_title: None,
            department: None,
        }
    }

    #[tokio::test]
    async fn login_roundtrips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let store = SessionStore::load(path.clone()).await.unwrap();
        store
            .store_login("at_1", "rt_1", &test_user())
            .await
            .unwrap();

        let reloaded = SessionStore::load(path).await.unwrap();
        assert_eq!(reloaded.access_token().await.as_deref(), Some("at_1"));
        assert_eq!(reloaded.refresh_token().await.as_deref(), Some("rt_1"));
        assert_eq!(reloaded.user().await.unwrap(), Some(test_user()));
        assert!(reloaded.is_authenticated().await);
    }

    #[tokio::test]
    async fn cold_start_creates_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        assert!(!path.exists());
        let store = SessionStore::load(path.clone()).await.unwrap();
        assert!(!store.is_authenticated().await);
        assert!(path.exists());

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let parsed: HashMap<String, String> = serde_json::from_str(&contents).unwrap();
        assert!(parsed.is_empty());
    }

    #[tokio::test]
    async fn user_is_stored_as_serialized_json_string() {
        let store = SessionStore::in_memory();
        store
            .store_login("at_1", "rt_1", &test_user())
            .await
            .unwrap();

        let raw = store.get(USER_KEY).await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["nome"], "Ana");
        assert_eq!(value["empresa_id"], "c-1");
    }

    #[tokio::test]
    async fn clear_removes_all_three_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let store = SessionStore::load(path.clone()).await.unwrap();
        store
            .store_login("at_1", "rt_1", &test_user())
            .await
            .unwrap();

        store.clear().await.unwrap();

        for key in SESSION_KEYS {
            assert!(store.get(key).await.is_none(), "{key} should be cleared");
        }
        let reloaded = SessionStore::load(path).await.unwrap();
        assert!(reloaded.access_token().await.is_none());
    }

    #[tokio::test]
    async fn access_token_alone_is_not_a_restored_session() {
        let store = SessionStore::in_memory();
        store.set_access_token("at_1").await.unwrap();
        assert!(!store.is_authenticated().await);
        assert!(store.refresh_token().await.is_none());
    }

    #[tokio::test]
    async fn corrupt_user_entry_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        tokio::fs::write(&path, r#"{"user":"{not json"}"#)
            .await
            .unwrap();

        let store = SessionStore::load(path).await.unwrap();
        assert!(matches!(store.user().await, Err(Error::SessionParse(_))));
    }

    #[tokio::test]
    async fn corrupt_file_fails_to_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        tokio::fs::write(&path, "not json").await.unwrap();

        let result = SessionStore::load(path).await;
        assert!(matches!(result, Err(Error::SessionParse(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn file_permissions_are_0600() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let store = SessionStore::load(path.clone()).await.unwrap();
        store.set_access_token("at_1").await.unwrap();

        let metadata = tokio::fs::metadata(&path).await.unwrap();
        let mode = metadata.permissions().mode() & 0o777;
        assert_eq!(mode, 0o600, "session file must be 0600, got {mode:o}");
    }
}
