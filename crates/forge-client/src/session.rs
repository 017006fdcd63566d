//! Login, logout and session restore on top of the authenticated client

use std::sync::Arc;

use common::Secret;
use forge_auth::User;
use tracing::info;

use crate::client::AuthenticatedClient;
use crate::error::Result;

/// Signed-in state for one client.
pub struct AuthSession {
    client: Arc<AuthenticatedClient>,
}

impl AuthSession {
    pub fn new(client: Arc<AuthenticatedClient>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Arc<AuthenticatedClient> {
        &self.client
    }

    /// Exchange credentials for a token pair and store the whole session.
    pub async fn login(&self, email: &str, password: &Secret<String>) -> Result<User> {
        let response = forge_auth::login(
            self.client.http(),
            self.client.base_url(),
            email,
            password,
        )
        .await?;

        self.client
            .store()
            .store_login(
                response.access.expose(),
                response.refresh.expose(),
                &response.user,
            )
            .await?;
        self.client.activity().touch();

        info!(user_id = %response.user.id, role = %response.user.role, "logged in");
        Ok(response.user)
    }

    /// Clear all session state and navigate to the login route.
    pub async fn logout(&self) {
        info!("logging out");
        self.end("logout").await;
    }

    pub(crate) async fn end(&self, reason: &'static str) {
        self.client.end_session(reason).await;
    }

    /// The user restored from storage, when a session is present.
    pub async fn current_user(&self) -> Result<Option<User>> {
        if !self.client.store().is_authenticated().await {
            return Ok(None);
        }
        Ok(self.client.store().user().await?)
    }

    pub async fn is_authenticated(&self) -> bool {
        self.client.store().is_authenticated().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClientError;
    use crate::navigator::RecordingNavigator;
    use forge_auth::{Role, SESSION_KEYS, SessionStore};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn session_for(
        server: &MockServer,
    ) -> (AuthSession, Arc<SessionStore>, Arc<RecordingNavigator>) {
        let store = Arc::new(SessionStore::in_memory());
        let navigator = Arc::new(RecordingNavigator::new());
        let client = AuthenticatedClient::builder()
            .base_url(format!("{}/api", server.uri()))
            .store(store.clone())
            .navigator(navigator.clone())
            .build()
            .unwrap();
        (AuthSession::new(Arc::new(client)), store, navigator)
    }

    #[tokio::test]
    async fn login_stores_all_three_keys() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/token/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access": "at_1",
                "refresh": "rt_1",
                "user": {
                    "id": "u-1",
                    "nome": "Ana",
                    "email": "ana@acme.com.br",
                    "role": "TECNICO",
                    "empresa_id": "c-1"
                }
            })))
            .mount(&server)
            .await;

        let (session, store, _) = session_for(&server).await;
        let user = session
            .login("ana@acme.com.br", &Secret::new("pw".to_string()))
            .await
            .unwrap();

        assert_eq!(user.role, Role::Technician);
        assert_eq!(store.access_token().await.as_deref(), Some("at_1"));
        assert_eq!(store.refresh_token().await.as_deref(), Some("rt_1"));
        assert_eq!(session.current_user().await.unwrap(), Some(user));
    }

    #[tokio::test]
    async fn failed_login_leaves_store_empty() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/token/"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "detail": "No active account found with the given credentials"
            })))
            .mount(&server)
            .await;

        let (session, store, navigator) = session_for(&server).await;
        let err = session
            .login("ana@acme.com.br", &Secret::new("wrong".to_string()))
            .await
            .unwrap_err();

        assert!(matches!(err, ClientError::Auth(_)));
        assert!(!store.is_authenticated().await);
        // A rejected login is not a session ending
        assert!(navigator.routes().is_empty());
    }

    #[tokio::test]
    async fn logout_clears_and_redirects() {
        let server = MockServer::start().await;
        let (session, store, navigator) = session_for(&server).await;
        store.set_access_token("at_1").await.unwrap();
        store.set_refresh_token("rt_1").await.unwrap();

        session.logout().await;

        for key in SESSION_KEYS {
            assert!(store.get(key).await.is_none());
        }
        assert_eq!(navigator.routes(), vec!["/login"]);
        assert_eq!(session.current_user().await.unwrap(), None);
    }
}
