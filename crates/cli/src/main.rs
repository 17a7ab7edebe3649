//! membound CLI — the main entry point.
//!
//! Commands:
//! - `simulate` — Replay a transcript under one retention policy
//! - `compare`  — Replay a transcript under every policy side by side
//! - `config`   — Show, validate or locate the configuration

use clap::{Parser, Subcommand};
use membound_config::PolicyKind;
use std::path::PathBuf;

mod commands;
mod transcript;

#[derive(Parser)]
#[command(
    name = "membound",
    about = "membound — bounded-memory context manager",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to ~/.membound/config.toml)
    #[arg(short, long, global = true, env = "MEMBOUND_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a transcript through one context buffer
    Simulate {
        /// Transcript file, or `-` for stdin
        transcript: PathBuf,

        /// Override the configured policy
        #[arg(short, long)]
        policy: Option<PolicyKind>,

        /// Override the token budget
        #[arg(short, long)]
        max_tokens: Option<usize>,

        /// Print the assembled context after the last turn
        #[arg(long)]
        show_context: bool,

        /// Emit the full report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Replay a transcript under every policy and compare the outcome
    Compare {
        /// Transcript file, or `-` for stdin
        transcript: PathBuf,

        /// Override the token budget
        #[arg(short, long)]
        max_tokens: Option<usize>,

        /// Emit the reports as JSON
        #[arg(long)]
        json: bool,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Print the default configuration
    Default,
    /// Validate the configuration file
    Validate,
    /// Print the config file path
    Path,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Simulate {
            transcript,
            policy,
            max_tokens,
            show_context,
            json,
        } => {
            let opts = commands::simulate::SimulateOptions {
                policy,
                max_tokens,
                show_context,
                json,
                verbose: cli.verbose,
            };
            commands::simulate::run(config_path, &transcript, opts).await?
        }
        Commands::Compare {
            transcript,
            max_tokens,
            json,
        } => commands::compare::run(config_path, &transcript, max_tokens, json).await?,
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_cmd::show(config_path)?,
            ConfigAction::Default => commands::config_cmd::default(),
            ConfigAction::Validate => commands::config_cmd::validate(config_path)?,
            ConfigAction::Path => commands::config_cmd::path(config_path),
        },
    }

    Ok(())
}
