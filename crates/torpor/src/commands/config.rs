//! Config command - configuration management.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Subcommand};
use console::{Style, style};
use serde::Serialize;

use super::Context;

/// Arguments for the config command.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show resolved settings and which config files were loaded
    Show,

    /// Show the config file that writes go to
    Path,

    /// Initialize a config file with defaults
    Init {
        /// Create project-local config (./torpor.toml) instead of user config
        #[arg(long)]
        local: bool,
    },
}

/// Run the config command.
pub async fn run(args: ConfigArgs, ctx: &Context) -> Result<()> {
    match args.command {
        ConfigCommand::Show => cmd_show(ctx).await,
        ConfigCommand::Path => cmd_path(ctx).await,
        ConfigCommand::Init { local } => cmd_init(ctx, local).await,
    }
}

#[derive(Debug, Serialize)]
struct SourceOutput {
    path: PathBuf,
    loaded: bool,
}

#[derive(Debug, Serialize)]
struct ShowOutput {
    sources: Vec<SourceOutput>,
    max_size: usize,
    idle_timeout_secs: u64,
    default_store: String,
    sweep_interval_ms: u64,
    persistent_store: PathBuf,
    stores: BTreeMap<String, bool>,
    warnings: Vec<String>,
}

async fn cmd_show(ctx: &Context) -> Result<()> {
    let loaded = ctx.load()?;
    let config = &loaded.config;
    let settings = config.store_settings()?;
    let profiles = config.profiles();

    if ctx.json_output {
        let output = ShowOutput {
            sources: loaded
                .sources
                .iter()
                .map(|s| SourceOutput {
                    path: s.path.clone(),
                    loaded: s.loaded,
                })
                .collect(),
            max_size: settings.max_size,
            idle_timeout_secs: settings.idle_timeout.as_secs(),
            default_store: settings.default_store.clone(),
            sweep_interval_ms: config.sweep_interval().as_millis() as u64,
            persistent_store: config.persistent_store_path(),
            stores: profiles
                .names()
                .into_iter()
                .filter_map(|name| profiles.get(&name).map(|p| (name, p.passivation)))
                .collect(),
            warnings: loaded.warnings.clone(),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    let dim = Style::new().dim();
    println!("{}", style("Torpor Configuration").bold());
    println!("{}", dim.apply_to("─".repeat(40)));
    println!();

    let sources = loaded.loaded_from();
    if sources.is_empty() {
        println!("No config files loaded (using defaults)\n");
    } else {
        println!("Config files:");
        for source in &sources {
            println!("  {}", source.display());
        }
        println!();
    }

    println!("Passivation:");
    println!("  {} {}", dim.apply_to("max-size:"), settings.max_size);
    println!(
        "  {} {}s",
        dim.apply_to("idle-timeout:"),
        settings.idle_timeout.as_secs()
    );
    println!(
        "  {} {}ms",
        dim.apply_to("sweep-interval:"),
        config.sweep_interval().as_millis()
    );
    println!(
        "  {} {}",
        dim.apply_to("store:"),
        config.persistent_store_path().display()
    );
    println!();

    println!("Store profiles:");
    for name in profiles.names() {
        let Some(profile) = profiles.get(&name) else {
            continue;
        };
        let marker = if name == settings.default_store { "*" } else { " " };
        let kind = if profile.passivation {
            "passivating"
        } else {
            "non-passivating"
        };
        println!("  {} {:<14} {}", marker, name, dim.apply_to(kind));
    }
    println!();

    if !loaded.warnings.is_empty() {
        println!("Warnings:");
        for w in &loaded.warnings {
            println!("  ⚠ {}", w);
        }
        println!();
    }

    if ctx.verbose {
        println!("---\nRaw config:\n");
        if let Ok(toml_str) = config.to_toml() {
            println!("{}", toml_str);
        }
    }

    Ok(())
}

async fn cmd_path(ctx: &Context) -> Result<()> {
    let path = ctx.target_path()?;
    if ctx.json_output {
        println!(
            "{}",
            serde_json::json!({ "path": path, "exists": path.is_file() })
        );
    } else {
        println!("{}", path.display());
    }
    Ok(())
}

const TEMPLATE: &str = r#"# Torpor Configuration

# Store profile for newly created sessions ("simple" or "passivating")
default_store = "passivating"

[passivation]
# Entry count ceiling before least recently used entries are passivated (0 = unbounded)
max_size = 10000
# Seconds of inactivity before an entry is passivated (0 = disabled)
idle_timeout_secs = 0
# Interval between background sweeps
sweep_interval_ms = 1000

# [persistent_store]
# path = "/var/lib/torpor/passivated"

# Custom store profiles (uncomment to use)
# [stores.distributable]
# passivation = true
"#;

async fn cmd_init(ctx: &Context, local: bool) -> Result<()> {
    let path = if local {
        PathBuf::from("torpor.toml")
    } else {
        ctx.target_path()?
    };

    if path.exists() {
        println!("Config file already exists: {}", path.display());
        return Ok(());
    }

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, TEMPLATE)?;
    println!("{} Created {}", style("✓").green(), path.display());
    Ok(())
}
