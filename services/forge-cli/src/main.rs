//! Forge Reports command-line client
//!
//! Thin shell over `forge-client`:
//! 1. Resolves configuration (flag, env, file, defaults)
//! 2. Restores the session from the session file
//! 3. Runs one command, refreshing the access token as needed
//! 4. Prints the user-facing message and exits non-zero on failure

mod commands;
mod config;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::commands::{App, Commands, user_message};
use crate::config::Config;

#[derive(Parser)]
#[command(name = "forge")]
#[command(about = "Command-line client for the Forge Reports API")]
#[command(version)]
struct Cli {
    /// Config file (defaults to FORGE_CONFIG, then ./forge.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> ExitCode {
    // JSON logs on stderr so stdout stays clean for command output
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr),
        )
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let detail = format!("{e:#}");
            error!(error = %detail, "command failed");
            eprintln!("error: {}", user_message(&e));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = Config::resolve_path(cli.config.as_deref());
    let config = Config::load_or_default(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        path = %config_path.display(),
        base_url = %config.api.base_url,
        session_file = %config.session.file.display(),
        "configuration loaded"
    );

    let app = App::connect(config).await?;
    cli.command.execute(&app).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use reqwest::Method;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_request_with_repeated_query() {
        let cli = Cli::try_parse_from([
            "forge",
            "request",
            "get",
            "/relatorios/",
            "--query",
            "pasta=3",
            "--query",
            "page=2",
        ])
        .unwrap();

        match cli.command {
            Commands::Request {
                method,
                path,
                data,
                query,
            } => {
                assert_eq!(method, Method::GET);
                assert_eq!(path, "/relatorios/");
                assert!(data.is_none());
                assert_eq!(query.len(), 2);
                assert_eq!(query[1], ("page".to_string(), "2".to_string()));
            }
            _ => panic!("expected request command"),
        }
    }

    #[test]
    fn config_flag_is_global() {
        let cli = Cli::try_parse_from(["forge", "status", "--config", "/etc/forge.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/etc/forge.toml")));
    }

    #[test]
    fn users_subcommands_take_ids() {
        let cli = Cli::try_parse_from(["forge", "users", "resend-invite", "u-9"]).unwrap();
        match cli.command {
            Commands::Users {
                command: commands::UsersCommands::ResendInvite { id },
            } => assert_eq!(id, "u-9"),
            _ => panic!("expected users resend-invite"),
        }
    }

    #[test]
    fn users_create_takes_role_and_profile() {
        let cli = Cli::try_parse_from([
            "forge",
            "users",
            "create",
            "--name",
            "Bruno",
            "--email",
            "bruno@acme.com.br",
            "--role",
            "usuario",
            "--job-title",
            "cg-1",
        ])
        .unwrap();
        match cli.command {
            Commands::Users {
                command: commands::UsersCommands::Create { email, role, .. },
            } => {
                assert_eq!(email, "bruno@acme.com.br");
                assert_eq!(role, forge_auth::Role::Member);
            }
            _ => panic!("expected users create"),
        }
        let bad_role = Cli::try_parse_from([
            "forge", "users", "create", "--name", "x", "--email", "y", "--role", "root",
        ]);
        assert!(bad_role.is_err());
    }

    #[test]
    fn login_password_is_optional() {
        let cli = Cli::try_parse_from(["forge", "login", "--email", "ana@acme.com.br"]).unwrap();
        match cli.command {
            Commands::Login { email, .. } => assert_eq!(email, "ana@acme.com.br"),
            _ => panic!("expected login"),
        }
    }

    #[test]
    fn rejects_malformed_query() {
        assert!(Cli::try_parse_from(["forge", "request", "GET", "/x/", "--query", "nope"]).is_err());
    }
}
