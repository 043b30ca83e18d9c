//! Torpor - operator CLI for the passivating session store
//!
//! Main entry point for the Torpor CLI.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use torpor_config::{CONFIG_DIR_PROPERTY, CapabilityMode, PropertyRegistry};

mod commands;

use commands::{attribute, config, store};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// Torpor - operator CLI for the passivating session store
#[derive(Parser)]
#[command(name = "torpor")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    /// Config file to use instead of the discovered layers
    #[arg(long, global = true, env = "TORPOR_CONFIG")]
    pub config: Option<PathBuf>,

    /// User config directory (overrides TORPOR_CONFIG_DIR)
    #[arg(long, global = true)]
    pub config_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Configuration management
    Config(config::ConfigArgs),

    /// Read, write, or undefine a runtime attribute
    Attribute(attribute::AttributeArgs),

    /// Inspect the passivated record store
    Store(store::StoreArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(ref dir) = cli.config_dir {
        PropertyRegistry::global().set(
            CONFIG_DIR_PROPERTY,
            &dir.display().to_string(),
            CapabilityMode::Checking,
        );
    }

    // Console (human-readable, stderr) + rotating JSON file
    let filter = if cli.verbose {
        "torpor=debug,torpor_config=debug,torpor_session=debug,info"
    } else {
        "torpor=info,torpor_config=info,torpor_session=info,warn"
    };

    let log_dir = torpor_config::config_dir()
        .map(|d| d.join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs"));
    let file_appender = tracing_appender::rolling::daily(&log_dir, "torpor.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    use tracing_subscriber::prelude::*;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_filter(tracing_subscriber::EnvFilter::new(filter)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(tracing_subscriber::EnvFilter::new(
                    "torpor=trace,torpor_config=trace,torpor_session=trace,info",
                )),
        )
        .init();

    let ctx = commands::Context {
        config_path: cli.config,
        json_output: cli.json,
        verbose: cli.verbose,
    };

    match cli.command {
        Commands::Config(args) => config::run(args, &ctx).await,
        Commands::Attribute(args) => attribute::run(args, &ctx).await,
        Commands::Store(args) => store::run(args, &ctx).await,
    }
}
