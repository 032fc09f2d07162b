//! Nexus - operator gateway with a human-approval interlock.
//!
//! `nexus run` serves the JSON-RPC API. Every other subcommand is a thin
//! client of a running gateway, except `config`, which works locally.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use nexus_gateway::config_bridge;

mod commands;

/// Nexus - operator gateway for Titan Grid
#[derive(Parser)]
#[command(name = "nexus")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file (overrides `NEXUS_CONFIG`)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Gateway URL for client commands (default: `ws://<gateway.bind_addr>`)
    #[arg(long, global = true)]
    url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway
    Run {
        /// Address to bind (overrides `gateway.bind_addr`)
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// List available tools
    Tools,

    /// Call a tool
    Call {
        /// Tool name
        name: String,

        /// Arguments as a JSON object
        #[arg(short, long)]
        args: Option<String>,
    },

    /// Approve a pending action
    Approve {
        /// Approval token
        token: String,
    },

    /// List actions awaiting approval
    Pending,

    /// Show gateway status
    Status,

    /// View configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the resolved configuration with the source of each value
    Show {
        /// Output format: toml or json
        #[arg(short, long, default_value = "toml")]
        format: String,

        /// Only show one section
        #[arg(short, long)]
        section: Option<String>,
    },
    /// Validate the configuration and list the files it came from
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let resolved = nexus_config::Config::load(cli.config.as_deref())
        .context("Failed to load configuration")?;

    let mut log_config = config_bridge::to_log_config(&resolved.config);
    if cli.verbose {
        log_config.level = "debug".to_string();
    } else if !matches!(cli.command, Commands::Run { .. }) {
        // Keep client output readable.
        log_config.level = "warn".to_string();
        log_config.directives.clear();
    }
    nexus_telemetry::setup_logging(&log_config).context("Failed to initialize logging")?;

    let url = cli
        .url
        .unwrap_or_else(|| format!("ws://{}", resolved.config.gateway.bind_addr));

    match cli.command {
        Commands::Run { bind } => commands::run(&resolved.config, bind).await,
        Commands::Tools => commands::tools(&url).await,
        Commands::Call { name, args } => commands::call(&url, &name, args.as_deref()).await,
        Commands::Approve { token } => commands::approve(&url, &token).await,
        Commands::Pending => commands::pending(&url).await,
        Commands::Status => commands::status(&url).await,
        Commands::Config { command } => match command {
            ConfigCommands::Show { format, section } => {
                commands::config_show(&resolved, &format, section.as_deref())
            },
            ConfigCommands::Validate => {
                commands::config_validate(&resolved);
                Ok(())
            },
        },
    }
}
