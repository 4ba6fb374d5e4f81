//! Dialectic CLI: the main entry point.
//!
//! Commands:
//! - `preflight`: validate a fixture job and print its budget plan
//! - `run`: execute a fixture job against in-memory services
//! - `config`: show, locate or validate the worker configuration

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use dialectic_config::{LogFormat, WorkerConfig};

mod commands;
mod fixture;

#[derive(Parser)]
#[command(
    name = "dialectic",
    about = "Dialectic worker: budget preflight and local job runs",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the budget plan for a fixture job without calling the model
    Preflight {
        /// Path to a JSON fixture
        #[arg(short, long)]
        fixture: PathBuf,
    },

    /// Execute a fixture job and print the outcome and side effects
    Run {
        /// Path to a JSON fixture
        #[arg(short, long)]
        fixture: PathBuf,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
    /// Print the configuration file path
    Path,
    /// Validate the configuration file
    Validate,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter))
    };

    // The log format lives in the config, so loading runs under a plain stderr subscriber
    let bootstrap = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .with_target(false)
        .finish();
    let config = tracing::subscriber::with_default(bootstrap, WorkerConfig::load)?;

    // stdout is reserved for command output
    let env_filter = env_filter();
    match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init(),
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .init(),
    }

    match cli.command {
        Commands::Preflight { fixture } => commands::preflight::run(&config, &fixture).await?,
        Commands::Run { fixture } => commands::run::run(&config, &fixture).await?,
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_cmd::show(&config)?,
            ConfigAction::Path => commands::config_cmd::path(),
            ConfigAction::Validate => commands::config_cmd::validate(&config),
        },
    }

    Ok(())
}
