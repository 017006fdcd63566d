//! User administration endpoints (`/usuarios/`)

use common::Secret;
use forge_auth::Role;
use forge_auth::paths::USERS;
use serde::{Deserialize, Serialize};

use crate::client::AuthenticatedClient;
use crate::error::Result;

/// Lifecycle of a managed account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserStatus {
    #[serde(rename = "ativo")]
    Active,
    #[serde(rename = "pendente")]
    Pending,
    #[serde(rename = "inativo")]
    Inactive,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Active => "active",
            UserStatus::Pending => "pending",
            UserStatus::Inactive => "inactive",
        }
    }
}

/// Id + name pair for job titles and departments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedRef {
    pub id: String,
    #[serde(rename = "nome")]
    pub name: String,
}

/// A user as seen from the administration screens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagedUser {
    pub id: String,
    #[serde(rename = "nome")]
    pub name: String,
    pub email: String,
    pub role: Role,
    #[serde(rename = "ativo")]
    pub active: bool,
    pub status: UserStatus,
    #[serde(rename = "ativado_em", default)]
    pub activated_at: Option<String>,
    #[serde(rename = "criado_em")]
    pub created_at: String,
    #[serde(rename = "atualizado_em", default)]
    pub updated_at: Option<String>,
    #[serde(rename = "criado_por_nome", default)]
    pub created_by: Option<String>,
    #[serde(rename = "telefone", default)]
    pub phone: Option<String>,
    #[serde(rename = "cargo", default)]
    pub job_title: Option<NamedRef>,
    #[serde(rename = "departamento", default)]
    pub department: Option<NamedRef>,
    /// Flattened names sent by the list endpoint
    #[serde(rename = "cargo_nome", default)]
    pub job_title_name: Option<String>,
    #[serde(rename = "departamento_nome", default)]
    pub department_name: Option<String>,
}

/// Body for inviting a new user.
#[derive(Debug, Clone, Serialize)]
pub struct CreateUser {
    #[serde(rename = "nome")]
    pub name: String,
    pub email: String,
    pub role: Role,
    #[serde(rename = "telefone", skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    /// Job title id
    #[serde(rename = "cargo", skip_serializing_if = "Option::is_none")]
    pub job_title: Option<String>,
    /// Department id
    #[serde(rename = "departamento", skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
}

/// Body for a partial update. Email can't be changed.
#[derive(Debug, Clone, Serialize)]
pub struct UpdateUser {
    #[serde(rename = "nome")]
    pub name: String,
    pub role: Role,
    #[serde(rename = "telefone", skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(rename = "cargo", skip_serializing_if = "Option::is_none")]
    pub job_title: Option<String>,
    #[serde(rename = "departamento", skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
}

/// Borrowed view of the client scoped to `/usuarios/`.
pub struct UsersApi<'a> {
    client: &'a AuthenticatedClient,
}

impl<'a> UsersApi<'a> {
    pub fn new(client: &'a AuthenticatedClient) -> Self {
        Self { client }
    }

    pub async fn list(&self) -> Result<Vec<ManagedUser>> {
        self.client.get_json(USERS).await
    }

    pub async fn get(&self, id: &str) -> Result<ManagedUser> {
        self.client.get_json(&user_path(id, None)).await
    }

    pub async fn create(&self, user: &CreateUser) -> Result<ManagedUser> {
        self.client.post_json(USERS, user).await
    }

    pub async fn update(&self, id: &str, changes: &UpdateUser) -> Result<ManagedUser> {
        self.client.patch_json(&user_path(id, None), changes).await
    }

    pub async fn deactivate(&self, id: &str) -> Result<ManagedUser> {
        self.client
            .post_json(&user_path(id, Some("desativar")), &serde_json::json!({}))
            .await
    }

    pub async fn reactivate(&self, id: &str) -> Result<ManagedUser> {
        self.client
            .post_json(&user_path(id, Some("reativar")), &serde_json::json!({}))
            .await
    }

    /// Send the invitation email again for a pending user.
    pub async fn resend_invite(&self, id: &str) -> Result<()> {
        self.client
            .post_action(&user_path(id, Some("reenviar_convite")), None)
            .await
    }

    /// Admin-initiated password reset.
    pub async fn reset_password(&self, id: &str, password: &Secret<String>) -> Result<()> {
        let body = serde_json::json!({ "senha": password.expose() });
        self.client
            .post_action(&user_path(id, Some("redefinir_senha")), Some(&body))
            .await
    }
}

fn user_path(id: &str, action: Option<&str>) -> String {
    match action {
        Some(action) => format!("{USERS}{id}/{action}/"),
        None => format!("{USERS}{id}/"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClientError;
    use forge_auth::SessionStore;
    use std::sync::Arc;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn managed_user_json(status: &str, active: bool) -> serde_json::Value {
        serde_json::json!({
            "id": "u-2",
            "nome": "Bruno",
            "email": "bruno@acme.com.br",
            "role": "USUARIO",
            "ativo": active,
            "status": status,
            "ativado_em": null,
            "criado_em": "2025-01-10T12:00:00Z",
            "cargo": { "id": "cg-1", "nome": "Analista" }
        })
    }

    async fn client_for(server: &MockServer) -> AuthenticatedClient {
        let store = Arc::new(SessionStore::in_memory());
        store.set_access_token("at_1").await.unwrap();
        AuthenticatedClient::builder()
            .base_url(server.uri())
            .store(store)
            .build()
            .unwrap()
    }

    #[test]
    fn action_paths_end_with_slash() {
        assert_eq!(user_path("u-2", None), "/usuarios/u-2/");
        assert_eq!(
            user_path("u-2", Some("reenviar_convite")),
            "/usuarios/u-2/reenviar_convite/"
        );
    }

    #[test]
    fn create_body_omits_missing_optionals() {
        let body = serde_json::to_value(CreateUser {
            name: "Bruno".into(),
            email: "bruno@acme.com.br".into(),
            role: Role::Member,
            phone: None,
            job_title: Some("cg-1".into()),
            department: None,
        })
        .unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "nome": "Bruno",
                "email": "bruno@acme.com.br",
                "role": "USUARIO",
                "cargo": "cg-1"
            })
        );
    }

    #[tokio::test]
    async fn list_sends_bearer_and_decodes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/usuarios/"))
            .and(header("authorization", "Bearer at_1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!([managed_user_json("pendente", true)])),
            )
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let users = client.users().list().await.unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].status, UserStatus::Pending);
        assert_eq!(users[0].job_title.as_ref().unwrap().name, "Analista");
    }

    #[tokio::test]
    async fn deactivate_returns_updated_user() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/usuarios/u-2/desativar/"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(managed_user_json("inativo", false)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let user = client.users().deactivate("u-2").await.unwrap();
        assert!(!user.active);
        assert_eq!(user.status, UserStatus::Inactive);
    }

    #[tokio::test]
    async fn reset_password_posts_senha() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/usuarios/u-2/redefinir_senha/"))
            .and(body_json(serde_json::json!({ "senha": "Nova#2025" })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        client
            .users()
            .reset_password("u-2", &Secret::new("Nova#2025".to_string()))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn validation_errors_surface_as_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/usuarios/"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "email": ["Usuário com este email já existe."]
            })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client
            .users()
            .create(&CreateUser {
                name: "Bruno".into(),
                email: "bruno@acme.com.br".into(),
                role: Role::Member,
                phone: None,
                job_title: None,
                department: None,
            })
            .await
            .unwrap_err();

        match err {
            ClientError::Api { status, .. } => assert_eq!(status, 400),
            other => panic!("expected Api error, got {other:?}"),
        }
    }
}
