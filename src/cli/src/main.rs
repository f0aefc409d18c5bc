//! Actions CLI - command-line interface for the trainee actions service.
//!
//! Provides commands for listing, completing and moving trainee actions,
//! plus health and configuration management.

mod client;
mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{action, config, health};
use output::OutputFormat;

/// Trainee Actions CLI
#[derive(Parser)]
#[command(
    name = "actions",
    version = "0.1.0",
    about = "Trainee actions service CLI",
    long_about = "CLI tool for querying and managing trainee actions.",
    propagate_version = true
)]
pub struct Cli {
    /// Output format
    #[arg(short, long, global = true, default_value = "table")]
    output: OutputFormat,

    /// API server URL
    #[arg(long, global = true, env = "ACTIONS_API_URL")]
    api_url: Option<String>,

    /// Bearer token identifying the trainee (for trainee-scoped commands)
    #[arg(long, global = true, env = "ACTIONS_API_TOKEN")]
    token: Option<String>,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Action queries and commands
    #[command(subcommand)]
    Action(action::ActionCommands),

    /// Check service health
    Health,

    /// Configuration management
    #[command(subcommand)]
    Config(config::ConfigCommands),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    let api_url = cli
        .api_url
        .clone()
        .or_else(config::load_api_url)
        .unwrap_or_else(|| "http://localhost:8080".to_string());

    let client = client::ApiClient::new(&api_url, cli.token.clone())?;
    let format = cli.output;

    let result = match cli.command {
        Commands::Action(cmd) => action::execute(cmd, &client, format).await,
        Commands::Health => health::execute(&client, format).await,
        Commands::Config(cmd) => config::execute(cmd, format).await,
    };

    if let Err(e) = result {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }

    Ok(())
}
