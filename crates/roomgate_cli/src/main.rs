//! Roomgate CLI
//!
//! Command-line tools for operating the roomgate gateway.
//!
//! # Commands
//!
//! - `config` - Load, validate and print the effective configuration
//! - `pipeline` - Show extension priorities and hook dispatch order
//! - `policy` - Evaluate the read-only/capacity policy for given permissions

mod commands;

use clap::{Parser, Subcommand};
use roomgate_gateway::GatewayConfig;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Roomgate gateway tools.
#[derive(Parser)]
#[command(name = "roomgate")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the gateway configuration file (JSON)
    #[arg(global = true, short, long)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the effective configuration, with secrets masked
    Config {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show extension priorities and hook dispatch order
    Pipeline {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Evaluate the read-only/capacity policy
    Policy {
        /// The user cannot open the document
        #[arg(long)]
        no_read: bool,

        /// The user cannot change the document
        #[arg(long)]
        no_update: bool,

        /// The document accepts a single editor
        #[arg(long)]
        single_user: bool,

        /// Maximum number of concurrent editors
        #[arg(short, long, default_value = "10")]
        max_collaborators: u32,

        /// Editors already in the room
        #[arg(short = 'n', long, default_value = "0")]
        collaborators: usize,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => GatewayConfig::from_file(path)?,
        None => GatewayConfig::default(),
    };
    init_logging(&config, cli.verbose);
    tracing::debug!(path = ?cli.config, production = config.production, "configuration loaded");

    match cli.command {
        Commands::Config { format } => {
            commands::config::run(&config, &format)?;
        }
        Commands::Pipeline { format } => {
            commands::pipeline::run(&config, &format)?;
        }
        Commands::Policy {
            no_read,
            no_update,
            single_user,
            max_collaborators,
            collaborators,
            format,
        } => {
            let permissions = roomgate_protocol::DocumentPermissions {
                can_read: !no_read,
                can_update: !no_update,
                is_multi_user: !single_user,
                max_collaborators,
            };
            commands::policy::run(&permissions, collaborators, &format)?;
        }
        Commands::Version => {
            println!("roomgate CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}

/// `RUST_LOG` wins over the configured level; `--verbose` wins over both.
fn init_logging(config: &GatewayConfig, verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level))
    };
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if config.logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}
