//! CLI commands

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, anyhow, bail};
use clap::{Args, Subcommand};
use common::Secret;
use forge_auth::{Role, SessionStore};
use forge_client::{
    ApiErrorBody, AuthSession, AuthenticatedClient, ClientError, CreateUser, Navigator,
    RequestOptions, UpdateUser, auth_error_message, error_message, spawn_inactivity_watchdog,
};
use reqwest::Method;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};

use crate::config::Config;

/// How often the shell checks for inactivity
const WATCHDOG_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Subcommand)]
pub enum Commands {
    /// Sign in and store the session
    Login {
        #[arg(long, env = "FORGE_EMAIL")]
        email: String,

        /// Prompted for without echo when omitted
        #[arg(long, env = "FORGE_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Clear the stored session
    Logout,

    /// Print the signed-in user
    Whoami,

    /// Show session and token state
    Status,

    /// Send one authenticated request and print the response
    Request {
        #[arg(value_parser = parse_method)]
        method: Method,

        /// Path below the API base URL, e.g. /relatorios/
        path: String,

        /// JSON request body
        #[arg(long)]
        data: Option<String>,

        /// Query parameter as key=value, repeatable
        #[arg(long = "query", value_parser = parse_query)]
        query: Vec<(String, String)>,
    },

    /// User administration
    Users {
        #[command(subcommand)]
        command: UsersCommands,
    },

    /// Download a file endpoint, e.g. a report export
    Export {
        path: String,

        #[arg(long)]
        out: PathBuf,

        #[arg(long = "query", value_parser = parse_query)]
        query: Vec<(String, String)>,
    },

    /// Interactive request loop; idle sessions are logged out
    Shell,
}

#[derive(Subcommand)]
pub enum UsersCommands {
    /// List users of the company
    List,
    /// Show one user
    Show { id: String },
    /// Deactivate a user
    Deactivate { id: String },
    /// Reactivate a user
    Reactivate { id: String },
    /// Invite a new user
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        /// ADMIN, TECNICO or USUARIO
        #[arg(long, value_parser = parse_role)]
        role: Role,
        #[command(flatten)]
        profile: ProfileArgs,
    },
    /// Change name, role or profile fields
    Update {
        id: String,
        #[arg(long)]
        name: String,
        #[arg(long, value_parser = parse_role)]
        role: Role,
        #[command(flatten)]
        profile: ProfileArgs,
    },
    /// Set a new password for a user
    ResetPassword {
        id: String,
        /// Prompted for without echo when omitted
        #[arg(long, env = "FORGE_NEW_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// Send the invitation email again
    ResendInvite { id: String },
}

/// Optional profile fields shared by create and update.
#[derive(Args)]
pub struct ProfileArgs {
    #[arg(long)]
    phone: Option<String>,
    /// Job title id
    #[arg(long)]
    job_title: Option<String>,
    /// Department id
    #[arg(long)]
    department: Option<String>,
}

/// Tells the operator how to get a new session.
struct HintNavigator;

impl Navigator for HintNavigator {
    fn redirect(&self, route: &str) {
        debug!(route, "session ended");
        eprintln!("Signed out. Run `forge login` to sign in again.");
    }
}

/// Everything a command needs.
pub struct App {
    pub config: Config,
    pub session: Arc<AuthSession>,
}

impl App {
    pub async fn connect(config: Config) -> Result<Self> {
        let store = SessionStore::load(config.session.file.clone())
            .await
            .with_context(|| {
                format!(
                    "failed to load session from {}",
                    config.session.file.display()
                )
            })?;

        let client = AuthenticatedClient::builder()
            .base_url(config.api.base_url.clone())
            .timeout(config.timeout())
            .store(Arc::new(store))
            .navigator(Arc::new(HintNavigator))
            .build()?;

        Ok(Self {
            config,
            session: Arc::new(AuthSession::new(Arc::new(client))),
        })
    }

    fn client(&self) -> &AuthenticatedClient {
        self.session.client()
    }
}

impl Commands {
    pub async fn execute(self, app: &App) -> Result<()> {
        match self {
            Commands::Login { email, password } => {
                let password = match password {
                    Some(p) => Secret::new(p),
                    None => prompt_password("Password: ").await?,
                };
                let user = app
                    .session
                    .login(&email, &password)
                    .await
                    .map_err(|e| anyhow!(auth_error_message(&e)))?;
                println!("Signed in as {} <{}> ({})", user.name, user.email, user.role);
            }
            Commands::Logout => {
                app.session.logout().await;
            }
            Commands::Whoami => {
                let Some(user) = app.session.current_user().await? else {
                    bail!("Not signed in. Run `forge login`.");
                };
                println!("{}", serde_json::to_string_pretty(&user)?);
            }
            Commands::Status => status(app).await?,
            Commands::Request {
                method,
                path,
                data,
                query,
            } => {
                let body = parse_body(data.as_deref())?;
                let options = query_options(query);
                let text = send(app.client(), method, &path, body.as_ref(), &options).await?;
                println!("{text}");
            }
            Commands::Users { command } => command.execute(app).await?,
            Commands::Export { path, out, query } => {
                let bytes = app
                    .client()
                    .download(&path, &query_options(query))
                    .await?;
                tokio::fs::write(&out, &bytes)
                    .await
                    .with_context(|| format!("failed to write {}", out.display()))?;
                info!(path = %out.display(), bytes = bytes.len(), "export written");
                println!("Wrote {} bytes to {}", bytes.len(), out.display());
            }
            Commands::Shell => shell(app).await?,
        }
        Ok(())
    }
}

impl UsersCommands {
    async fn execute(self, app: &App) -> Result<()> {
        let users = app.client().users();
        match self {
            UsersCommands::List => {
                for user in users.list().await? {
                    println!(
                        "{}\t{}\t{}\t{}\t{}",
                        user.id,
                        user.name,
                        user.email,
                        user.role,
                        user.status.as_str()
                    );
                }
            }
            UsersCommands::Show { id } => {
                println!("{}", serde_json::to_string_pretty(&users.get(&id).await?)?);
            }
            UsersCommands::Deactivate { id } => {
                let user = users.deactivate(&id).await?;
                println!("{} is now {}", user.email, user.status.as_str());
            }
            UsersCommands::Reactivate { id } => {
                let user = users.reactivate(&id).await?;
                println!("{} is now {}", user.email, user.status.as_str());
            }
            UsersCommands::Create {
                name,
                email,
                role,
                profile,
            } => {
                let user = users
                    .create(&CreateUser {
                        name,
                        email,
                        role,
                        phone: profile.phone,
                        job_title: profile.job_title,
                        department: profile.department,
                    })
                    .await?;
                println!("Invited {} ({})", user.email, user.id);
            }
            UsersCommands::Update {
                id,
                name,
                role,
                profile,
            } => {
                let user = users
                    .update(
                        &id,
                        &UpdateUser {
                            name,
                            role,
                            phone: profile.phone,
                            job_title: profile.job_title,
                            department: profile.department,
                        },
                    )
                    .await?;
                println!("Updated {} ({})", user.email, user.role);
            }
            UsersCommands::ResetPassword { id, password } => {
                let password = match password {
                    Some(p) => Secret::new(p),
                    None => prompt_password("New password: ").await?,
                };
                users.reset_password(&id, &password).await?;
                println!("Password updated");
            }
            UsersCommands::ResendInvite { id } => {
                users.resend_invite(&id).await?;
                println!("Invitation sent");
            }
        }
        Ok(())
    }
}

async fn status(app: &App) -> Result<()> {
    let store = app.client().store();
    println!("API:        {}", app.client().base_url());

    let Some(user) = app.session.current_user().await? else {
        println!("Signed in:  no");
        return Ok(());
    };
    println!("Signed in:  {} ({})", user.email, user.role);

    let now = now_secs();
    if let Some(access) = store.access_token().await {
        println!("Access:     {}", token_expiry(&access, now));
    }
    if let Some(refresh) = store.refresh_token().await {
        println!("Refresh:    {}", token_expiry(&refresh, now));
    }
    Ok(())
}

/// Run the request and return the body text, failing on non-2xx.
async fn send(
    client: &AuthenticatedClient,
    method: Method,
    path: &str,
    body: Option<&Value>,
    options: &RequestOptions,
) -> Result<String> {
    let response = client.request_with(method, path, body, options).await?;
    let status = response.status();
    let text = response.text().await.map_err(ClientError::from)?;

    if !status.is_success() {
        return Err(ClientError::Api {
            status: status.as_u16(),
            body: ApiErrorBody::parse(&text),
        }
        .into());
    }

    Ok(match serde_json::from_str::<Value>(&text) {
        Ok(json) => serde_json::to_string_pretty(&json)?,
        Err(_) => text,
    })
}

async fn shell(app: &App) -> Result<()> {
    if !app.session.is_authenticated().await {
        bail!("Not signed in. Run `forge login`.");
    }

    app.client().activity().touch();
    let watchdog = spawn_inactivity_watchdog(
        app.session.clone(),
        app.config.inactivity_timeout(),
        WATCHDOG_INTERVAL,
    );

    eprintln!("Enter METHOD PATH [JSON]. `exit` to quit.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        eprint!("forge> ");
        std::io::stderr().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "exit" || line == "quit" {
            break;
        }

        let (method, path, body) = match parse_shell_line(line) {
            Ok(parts) => parts,
            Err(e) => {
                eprintln!("{e}");
                continue;
            }
        };
        match send(app.client(), method, &path, body.as_ref(), &RequestOptions::new()).await {
            Ok(text) => println!("{text}"),
            Err(e) => eprintln!("error: {}", user_message(&e)),
        }
    }

    watchdog.abort();
    Ok(())
}

/// Message shown to the operator for a failed command.
pub fn user_message(err: &anyhow::Error) -> String {
    match err.downcast_ref::<ClientError>() {
        Some(client_err) => error_message(client_err),
        None => format!("{err:#}"),
    }
}

/// Read a password from the terminal without echoing it.
async fn prompt_password(prompt: &'static str) -> Result<Secret<String>> {
    let password = tokio::task::spawn_blocking(move || rpassword::prompt_password(prompt))
        .await
        .context("password prompt task failed")?
        .context("failed to read password")?;
    Ok(Secret::new(password))
}

fn parse_role(raw: &str) -> std::result::Result<Role, String> {
    match raw.to_ascii_uppercase().as_str() {
        "ADMIN" => Ok(Role::Admin),
        "TECNICO" | "TECHNICIAN" => Ok(Role::Technician),
        "USUARIO" | "MEMBER" => Ok(Role::Member),
        _ => Err(format!(
            "unknown role {raw}, expected ADMIN, TECNICO or USUARIO"
        )),
    }
}

fn parse_method(raw: &str) -> std::result::Result<Method, String> {
    Method::from_bytes(raw.to_ascii_uppercase().as_bytes())
        .map_err(|_| format!("invalid HTTP method: {raw}"))
}

fn parse_query(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected key=value, got: {raw}")),
    }
}

fn parse_body(raw: Option<&str>) -> Result<Option<Value>> {
    raw.map(serde_json::from_str)
        .transpose()
        .context("--data must be valid JSON")
}

fn query_options(query: Vec<(String, String)>) -> RequestOptions {
    query
        .into_iter()
        .fold(RequestOptions::new(), |options, (key, value)| {
            options.query(key, value)
        })
}

/// `METHOD PATH [JSON]`
fn parse_shell_line(line: &str) -> std::result::Result<(Method, String, Option<Value>), String> {
    let mut parts = line.splitn(3, char::is_whitespace);
    let method = parse_method(parts.next().unwrap_or_default())?;
    let path = match parts.next() {
        Some(path) if !path.is_empty() => path.to_string(),
        _ => return Err("expected METHOD PATH [JSON]".to_string()),
    };
    let body = match parts.next().map(str::trim).filter(|rest| !rest.is_empty()) {
        Some(rest) => Some(serde_json::from_str(rest).map_err(|e| format!("invalid JSON body: {e}"))?),
        None => None,
    };
    Ok((method, path, body))
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

fn token_expiry(token: &str, now: u64) -> String {
    let Ok(claims) = forge_auth::decode_claims(token) else {
        return "not a JWT".to_string();
    };
    if claims.is_expired(now) {
        return "expired".to_string();
    }
    match claims.expires_in(now) {
        Some(secs) => format!("expires in {}m {}s", secs / 60, secs % 60),
        None => "no expiry claim".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_is_case_insensitive() {
        assert_eq!(parse_method("get").unwrap(), Method::GET);
        assert_eq!(parse_method("PATCH").unwrap(), Method::PATCH);
        assert!(parse_method("not a method").is_err());
    }

    #[test]
    fn query_needs_key_and_equals() {
        assert_eq!(
            parse_query("pasta=12").unwrap(),
            ("pasta".to_string(), "12".to_string())
        );
        assert_eq!(
            parse_query("q=a=b").unwrap(),
            ("q".to_string(), "a=b".to_string())
        );
        assert!(parse_query("pasta").is_err());
        assert!(parse_query("=12").is_err());
    }

    #[test]
    fn role_accepts_wire_and_english_names() {
        assert_eq!(parse_role("tecnico").unwrap(), Role::Technician);
        assert_eq!(parse_role("ADMIN").unwrap(), Role::Admin);
        assert_eq!(parse_role("member").unwrap(), Role::Member);
        assert!(parse_role("root").is_err());
    }

    #[test]
    fn body_must_be_json() {
        assert_eq!(parse_body(None).unwrap(), None);
        assert_eq!(
            parse_body(Some(r#"{"nome":"Vendas"}"#)).unwrap(),
            Some(serde_json::json!({ "nome": "Vendas" }))
        );
        assert!(parse_body(Some("{nope")).is_err());
    }

    #[test]
    fn shell_line_with_and_without_body() {
        let (method, path, body) = parse_shell_line("get /relatorios/").unwrap();
        assert_eq!(method, Method::GET);
        assert_eq!(path, "/relatorios/");
        assert!(body.is_none());

        let (method, path, body) =
            parse_shell_line(r#"POST /pastas/ {"nome": "Financeiro"}"#).unwrap();
        assert_eq!(method, Method::POST);
        assert_eq!(path, "/pastas/");
        assert_eq!(body, Some(serde_json::json!({ "nome": "Financeiro" })));

        assert!(parse_shell_line("GET").is_err());
        assert!(parse_shell_line("POST /pastas/ {broken").is_err());
    }

    #[test]
    fn token_expiry_reads_exp_claim() {
        // {"exp":1000,"token_type":"access"}
        let token = "eyJhbGciOiJIUzI1NiJ9.eyJleHAiOjEwMDAsInRva2VuX3R5cGUiOiJhY2Nlc3MifQ.sig";
        assert_eq!(token_expiry(token, 1000 - 125), "expires in 2m 5s");
        assert_eq!(token_expiry(token, 1000), "expired");
        assert_eq!(token_expiry("opaque", 0), "not a JWT");
    }

    #[test]
    fn client_errors_get_user_facing_messages() {
        let err: anyhow::Error = ClientError::Api {
            status: 404,
            body: ApiErrorBody::Text(String::new()),
        }
        .into();
        assert_eq!(user_message(&err), "Resource not found.");

        let other = anyhow!("plain failure");
        assert_eq!(user_message(&other), "plain failure");
    }
}
