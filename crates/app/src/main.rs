//! SyncLane command-line tool
//!
//! # Commands
//!
//! - `register` - Register a client integration
//! - `list` - Print every registered client as JSON
//! - `activate` / `deactivate` - Toggle whether a client accepts triggers
//! - `trigger` - Start a sync cycle for a client
//! - `status` - Print a client's sync status as JSON
//! - `worker` - Execute scheduled retries until Ctrl-C
//! - `health` - Check that the database is reachable

#![allow(clippy::print_stdout)]

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use synclane_app::commands::{self, RegisterArgs};
use synclane_app::{logging, AppContext};
use synclane_domain::ClientId;
use synclane_infra::config;
use tracing::{debug, info};

/// Integration sync engine.
#[derive(Parser, Debug)]
#[command(name = "synclane")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to a TOML or JSON config file
    #[arg(global = true, short, long, env = "SYNCLANE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Register a client integration
    Register {
        /// Display name
        #[arg(long)]
        name: String,

        /// Base URL of the client's external API
        #[arg(long)]
        base_url: String,

        /// Client id (generated when omitted)
        #[arg(long)]
        id: Option<String>,

        /// Path appended to the base URL
        #[arg(long)]
        endpoint: Option<String>,

        /// HTTP method
        #[arg(long)]
        method: Option<String>,

        /// Per-call timeout in seconds
        #[arg(long)]
        timeout_secs: Option<u64>,

        /// Key used to resolve credentials from the environment
        #[arg(long)]
        credentials_ref: Option<String>,

        /// Query parameter as key=value (repeatable)
        #[arg(long = "param", value_parser = parse_key_value)]
        params: Vec<(String, String)>,
    },

    /// Print every registered client as JSON
    List,

    /// Allow triggers for a client again
    Activate { client_id: String },

    /// Reject new triggers for a client
    Deactivate { client_id: String },

    /// Start a sync cycle for a client
    Trigger {
        client_id: String,

        /// Keep running scheduled retries until the cycle finishes
        #[arg(short, long)]
        wait: bool,
    },

    /// Print a client's sync status as JSON
    Status { client_id: String },

    /// Execute scheduled retries until Ctrl-C
    Worker,

    /// Check that the database is reachable
    Health,
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| format!("expected key=value, got {raw:?}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let dotenv = dotenvy::dotenv();
    let cli = Cli::parse();

    let config = config::load(cli.config.clone()).context("failed to load configuration")?;
    logging::init(&config.logging)?;

    match dotenv {
        Ok(path) => info!(path = %path.display(), "loaded .env"),
        Err(err) => debug!(error = %err, "no .env file loaded"),
    }

    let mut ctx = AppContext::new(config).context("failed to initialize application")?;

    match cli.command {
        Commands::Register {
            name,
            base_url,
            id,
            endpoint,
            method,
            timeout_secs,
            credentials_ref,
            params,
        } => {
            let args = RegisterArgs {
                id,
                name,
                base_url,
                endpoint,
                method,
                timeout_secs,
                credentials_ref,
                params,
            };
            print_json(&commands::register(&ctx, args).await?)?;
        }
        Commands::List => print_json(&commands::list(&ctx).await?)?,
        Commands::Activate { client_id } => {
            print_json(&commands::set_active(&ctx, &ClientId::new(client_id), true).await?)?;
        }
        Commands::Deactivate { client_id } => {
            print_json(&commands::set_active(&ctx, &ClientId::new(client_id), false).await?)?;
        }
        Commands::Trigger { client_id, wait } => {
            let result = commands::trigger(&mut ctx, &ClientId::new(client_id), wait).await?;
            print_json(&result)?;
        }
        Commands::Status { client_id } => {
            print_json(&commands::status(&ctx, &ClientId::new(client_id)).await?)?;
        }
        Commands::Worker => commands::worker(&mut ctx).await?,
        Commands::Health => print_json(&commands::health(&ctx)?)?,
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_trigger_with_wait_and_global_config() {
        let cli =
            Cli::try_parse_from(["synclane", "trigger", "acme", "--wait", "--config", "x.toml"])
                .expect("valid args");
        assert_eq!(cli.config, Some(PathBuf::from("x.toml")));
        assert!(matches!(
            cli.command,
            Commands::Trigger { ref client_id, wait: true } if client_id == "acme"
        ));
    }

    #[test]
    fn parses_repeatable_params() {
        let cli = Cli::try_parse_from([
            "synclane", "register", "--name", "Acme", "--base-url", "https://x.test",
            "--param", "userId=1", "--param", "page = 2",
        ])
        .expect("valid args");
        match cli.command {
            Commands::Register { params, .. } => assert_eq!(
                params,
                vec![("userId".to_string(), "1".to_string()), ("page".to_string(), "2".to_string())]
            ),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn parses_activation_commands() {
        let cli = Cli::try_parse_from(["synclane", "deactivate", "acme"]).expect("valid args");
        assert!(matches!(
            cli.command,
            Commands::Deactivate { ref client_id } if client_id == "acme"
        ));
        let cli = Cli::try_parse_from(["synclane", "list"]).expect("valid args");
        assert!(matches!(cli.command, Commands::List));
    }

    #[test]
    fn rejects_param_without_separator() {
        assert!(parse_key_value("novalue").is_err());
        assert!(parse_key_value("=1").is_err());
    }
}
