//! Signed-in user profile as returned by the login endpoint

use std::fmt;

use serde::{Deserialize, Serialize};

/// Access level of a user within their company.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "ADMIN")]
    Admin,
    #[serde(rename = "TECNICO")]
    Technician,
    #[serde(rename = "USUARIO")]
    Member,
}

impl Role {
    /// Wire name of the role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::Technician => "TECNICO",
            Role::Member => "USUARIO",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Profile cached in the session under the `user` key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(rename = "nome")]
    pub name: String,
    pub email: String,
    pub role: Role,
    #[serde(rename = "empresa_id")]
    pub company_id: String,
    #[serde(rename = "empresa_nome", default, skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    #[serde(rename = "telefone", default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(rename = "cargo_nome", default, skip_serializing_if = "Option::is_none")]
    pub job_title: Option<String>,
    #[serde(
        rename = "departamento_nome",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub department: Option<String>,
}
