//! Attribute command - runtime attribute management.
//!
//! Requests are evaluated against settings resolved from the loaded config.
//! Successful writes and undefines are persisted to the target config file.

use anyhow::Result;
use clap::{Args, Subcommand};
use console::style;
use serde_json::Value;
use torpor_config::{Address, Attribute, ManagementRequest, ManagementResponse, Operation};

use super::Context;

/// Arguments for the attribute command.
#[derive(Args, Debug)]
pub struct AttributeArgs {
    #[command(subcommand)]
    pub command: AttributeCommand,
}

#[derive(Subcommand, Debug)]
pub enum AttributeCommand {
    /// Read an attribute's current value
    Read {
        /// Resource address, e.g. /subsystem=torpor/passivation-store=file
        address: String,
        /// Attribute name: max-size, idle-timeout, default-store
        name: String,
    },

    /// Write an attribute
    Write {
        /// Resource address, e.g. /subsystem=torpor
        address: String,
        /// Attribute name: max-size, idle-timeout, default-store
        name: String,
        /// New value (JSON, or a bare string)
        #[arg(allow_hyphen_values = true)]
        value: String,
    },

    /// Reset an attribute to its default
    Undefine {
        /// Resource address
        address: String,
        /// Attribute name
        name: String,
    },
}

/// Run the attribute command.
pub async fn run(args: AttributeArgs, ctx: &Context) -> Result<()> {
    let (operation, address, name, value) = match args.command {
        AttributeCommand::Read { address, name } => {
            (Operation::ReadAttribute, address, name, None)
        }
        AttributeCommand::Write {
            address,
            name,
            value,
        } => (
            Operation::WriteAttribute,
            address,
            name,
            Some(parse_value(&value)),
        ),
        AttributeCommand::Undefine { address, name } => {
            (Operation::UndefineAttribute, address, name, None)
        }
    };

    let response = match address.parse::<Address>() {
        Ok(address) => {
            let request = ManagementRequest {
                operation: operation.name().to_string(),
                address,
                name: name.clone(),
                value,
            };
            execute(ctx, operation, &request)?
        }
        Err(e) => ManagementResponse::failure(&e),
    };

    print_response(ctx, &response)?;
    if let Some(ref description) = response.failure_description {
        anyhow::bail!("{}", description);
    }
    Ok(())
}

/// Evaluate the request and persist a successful change.
fn execute(
    ctx: &Context,
    operation: Operation,
    request: &ManagementRequest,
) -> Result<ManagementResponse> {
    let loaded = ctx.load()?;
    let handle = match loaded.config.settings_handle() {
        Ok(handle) => handle,
        Err(e) => return Ok(ManagementResponse::failure(&e)),
    };

    let response = torpor_config::execute(&handle, request);
    if !response.is_success() || operation == Operation::ReadAttribute {
        return Ok(response);
    }

    // The request resolved, so the name is a known attribute
    let attribute: Attribute = request.name.parse()?;
    let path = ctx.target_path()?;
    let mut target = ctx.load_target()?;
    target.set_attribute(attribute, &handle.snapshot());
    if let Err(e) = torpor_config::save_config(&target, &path) {
        return Ok(ManagementResponse::failure(&e));
    }
    tracing::debug!(
        attribute = attribute.name(),
        path = %path.display(),
        "Attribute persisted"
    );
    Ok(response)
}

/// Interpret a command-line value: JSON if it parses, otherwise a string.
fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn print_response(ctx: &Context, response: &ManagementResponse) -> Result<()> {
    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(response)?);
        return Ok(());
    }

    // Failures are reported by the returned error
    match response.result {
        _ if !response.is_success() => {}
        Some(Value::String(ref s)) => println!("{}", s),
        Some(ref value) => println!("{}", value),
        None => println!("{} {}", style("✓").green(), response.outcome),
    }
    Ok(())
}
