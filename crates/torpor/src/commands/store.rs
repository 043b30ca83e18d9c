//! Store command - passivated record inspection.

use anyhow::{Context as _, Result};
use clap::{Args, Subcommand};
use console::{Style, style};
use serde::Serialize;
use serde_json::Value;
use torpor_session::{FilePersistentStore, PassivatedRecord, decode_record};

use super::Context;

/// Arguments for the store command.
#[derive(Args, Debug)]
pub struct StoreArgs {
    #[command(subcommand)]
    pub command: StoreCommand,
}

#[derive(Subcommand, Debug)]
pub enum StoreCommand {
    /// List passivated records
    List,

    /// Show one passivated record
    Show {
        /// Key of the passivated entry
        key: String,
    },

    /// Delete a passivated record (terminates the entry)
    Purge {
        /// Key of the passivated entry
        key: String,
    },
}

/// Run the store command.
pub async fn run(args: StoreArgs, ctx: &Context) -> Result<()> {
    let config = ctx.load()?.config;
    let dir = config.persistent_store_path();
    let store = FilePersistentStore::open(&dir)
        .with_context(|| format!("Failed to open persistent store at {}", dir.display()))?;

    match args.command {
        StoreCommand::List => cmd_list(&store, ctx),
        StoreCommand::Show { key } => cmd_show(&store, &key, ctx),
        StoreCommand::Purge { key } => cmd_purge(&store, &key, ctx),
    }
}

#[derive(Debug, Serialize)]
struct RecordSummary {
    key: String,
    bytes: usize,
    passivated_at: Option<String>,
}

fn summarize(store: &FilePersistentStore, key: String) -> Result<Option<RecordSummary>> {
    let Some(bytes) = store.read_named(&key)? else {
        return Ok(None);
    };
    let passivated_at = decode_record::<Value>(&bytes)
        .ok()
        .map(|record| record.passivated_at.to_rfc3339());
    Ok(Some(RecordSummary {
        key,
        bytes: bytes.len(),
        passivated_at,
    }))
}

fn cmd_list(store: &FilePersistentStore, ctx: &Context) -> Result<()> {
    let mut records = Vec::new();
    for key in store.names()? {
        // Restored between listing and reading
        if let Some(summary) = summarize(store, key)? {
            records.push(summary);
        }
    }

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    let dim = Style::new().dim();
    if records.is_empty() {
        println!("No passivated records in {}", store.dir().display());
        return Ok(());
    }

    println!(
        "{}",
        style(format!("Passivated records ({})", records.len())).bold()
    );
    println!("{}", dim.apply_to("─".repeat(40)));
    for record in &records {
        let when = record.passivated_at.as_deref().unwrap_or("unreadable");
        println!(
            "  {:<38} {:>8}  {}",
            record.key,
            format!("{}B", record.bytes),
            dim.apply_to(when)
        );
    }
    if ctx.verbose {
        println!();
        println!("  {} {}", dim.apply_to("Directory:"), store.dir().display());
    }
    Ok(())
}

fn cmd_show(store: &FilePersistentStore, key: &str, ctx: &Context) -> Result<()> {
    let bytes = store
        .read_named(key)?
        .ok_or_else(|| anyhow::anyhow!("No passivated record for '{}'", key))?;
    let record: PassivatedRecord<Value> = decode_record(&bytes)
        .with_context(|| format!("Record for '{}' is unreadable", key))?;

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&record)?);
        return Ok(());
    }

    let dim = Style::new().dim();
    println!("  {} {}", dim.apply_to("Key:"), record.key);
    println!(
        "  {} {}",
        dim.apply_to("Passivated:"),
        record.passivated_at.to_rfc3339()
    );
    println!("  {}", dim.apply_to("Value:"));
    for line in serde_json::to_string_pretty(&record.value)?.lines() {
        println!("    {}", line);
    }
    Ok(())
}

fn cmd_purge(store: &FilePersistentStore, key: &str, ctx: &Context) -> Result<()> {
    if !store.delete_named(key)? {
        anyhow::bail!("No passivated record for '{}'", key);
    }
    tracing::info!(key = %key, "Passivated record purged");

    if ctx.json_output {
        println!("{}", serde_json::json!({ "key": key, "purged": true }));
    } else {
        println!("{} Purged {}", style("✓").green(), key);
    }
    Ok(())
}
