//! Attribute management protocol.
//!
//! A thin request/response adapter over [`SettingsHandle`]. Requests carry an
//! operation name, a hierarchical address, an attribute name, and an optional
//! value; responses carry an outcome plus either a result or a failure
//! description.
//!
//! ```text
//! /subsystem=torpor                            default-store
//! /subsystem=torpor/passivation-store=file     max-size, idle-timeout
//! ```

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{ConfigError, Result};
use crate::settings::{Attribute, SettingsHandle, SettingsUpdate, StoreSettings};

/// Subsystem name at the root of every address.
pub const SUBSYSTEM_NAME: &str = "torpor";

/// Name of the filesystem passivation store resource.
pub const PASSIVATION_STORE_NAME: &str = "file";

const SUBSYSTEM_TYPE: &str = "subsystem";
const PASSIVATION_STORE_TYPE: &str = "passivation-store";

// ─────────────────────────────────────────────────────────────────────────────
// Address
// ─────────────────────────────────────────────────────────────────────────────

/// Hierarchical resource address: ordered `(type, name)` pairs.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Address(Vec<(String, String)>);

impl Address {
    /// Empty (root) address.
    pub fn root() -> Self {
        Self::default()
    }

    /// Append a path element.
    pub fn add(mut self, kind: impl Into<String>, name: impl Into<String>) -> Self {
        self.0.push((kind.into(), name.into()));
        self
    }

    /// Address of the subsystem resource.
    pub fn subsystem() -> Self {
        Self::root().add(SUBSYSTEM_TYPE, SUBSYSTEM_NAME)
    }

    /// Address of the filesystem passivation store resource.
    pub fn passivation_store() -> Self {
        Self::subsystem().add(PASSIVATION_STORE_TYPE, PASSIVATION_STORE_NAME)
    }

    /// Address where an attribute is defined.
    pub fn of(attribute: Attribute) -> Self {
        match attribute {
            Attribute::DefaultStore => Self::subsystem(),
            Attribute::MaxSize | Attribute::IdleTimeout => Self::passivation_store(),
        }
    }

    /// Path elements.
    pub fn elements(&self) -> &[(String, String)] {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("/");
        }
        for (kind, name) in &self.0 {
            write!(f, "/{kind}={name}")?;
        }
        Ok(())
    }
}

impl FromStr for Address {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        let mut address = Address::root();
        for segment in s.split('/').filter(|seg| !seg.is_empty()) {
            let (kind, name) = segment
                .split_once('=')
                .filter(|(k, n)| !k.is_empty() && !n.is_empty())
                .ok_or_else(|| ConfigError::InvalidAddress {
                    address: s.to_string(),
                    reason: format!("segment '{segment}' is not of the form type=name"),
                })?;
            address = address.add(kind, name);
        }
        Ok(address)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Request / response
// ─────────────────────────────────────────────────────────────────────────────

/// Supported management operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    ReadAttribute,
    WriteAttribute,
    UndefineAttribute,
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::ReadAttribute => "read-attribute",
            Operation::WriteAttribute => "write-attribute",
            Operation::UndefineAttribute => "undefine-attribute",
        }
    }
}

impl FromStr for Operation {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "read-attribute" => Ok(Operation::ReadAttribute),
            "write-attribute" => Ok(Operation::WriteAttribute),
            "undefine-attribute" => Ok(Operation::UndefineAttribute),
            other => Err(ConfigError::UnknownOperation(other.to_string())),
        }
    }
}

/// A management request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagementRequest {
    /// Operation name, e.g. `write-attribute`.
    pub operation: String,
    /// Target resource.
    pub address: Address,
    /// Attribute name, e.g. `max-size`.
    pub name: String,
    /// New value for `write-attribute`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl ManagementRequest {
    /// Build a `read-attribute` request.
    pub fn read(address: Address, name: impl Into<String>) -> Self {
        Self {
            operation: Operation::ReadAttribute.name().to_string(),
            address,
            name: name.into(),
            value: None,
        }
    }

    /// Build a `write-attribute` request.
    pub fn write(address: Address, name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            operation: Operation::WriteAttribute.name().to_string(),
            address,
            name: name.into(),
            value: Some(value.into()),
        }
    }

    /// Build an `undefine-attribute` request.
    pub fn undefine(address: Address, name: impl Into<String>) -> Self {
        Self {
            operation: Operation::UndefineAttribute.name().to_string(),
            address,
            name: name.into(),
            value: None,
        }
    }
}

/// Operation outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Failure,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Success => write!(f, "success"),
            Outcome::Failure => write!(f, "failure"),
        }
    }
}

/// A management response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagementResponse {
    pub outcome: Outcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(
        default,
        rename = "failure-description",
        skip_serializing_if = "Option::is_none"
    )]
    pub failure_description: Option<String>,
}

impl ManagementResponse {
    pub fn success(result: Option<Value>) -> Self {
        Self {
            outcome: Outcome::Success,
            result,
            failure_description: None,
        }
    }

    pub fn failure(error: &ConfigError) -> Self {
        Self {
            outcome: Outcome::Failure,
            result: None,
            failure_description: Some(error.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Success
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Execution
// ─────────────────────────────────────────────────────────────────────────────

/// Execute a management request against the settings handle.
///
/// Never panics and never partially applies a write: any validation problem
/// yields a `failure` outcome and leaves the settings untouched.
pub fn execute(handle: &SettingsHandle, request: &ManagementRequest) -> ManagementResponse {
    match try_execute(handle, request) {
        Ok(result) => {
            debug!(
                operation = %request.operation,
                address = %request.address,
                name = %request.name,
                "Management operation succeeded"
            );
            ManagementResponse::success(result)
        }
        Err(e) => {
            warn!(
                operation = %request.operation,
                address = %request.address,
                name = %request.name,
                error = %e,
                "Management operation failed"
            );
            ManagementResponse::failure(&e)
        }
    }
}

fn try_execute(handle: &SettingsHandle, request: &ManagementRequest) -> Result<Option<Value>> {
    let operation: Operation = request.operation.parse()?;
    let attribute = resolve_attribute(&request.address, &request.name)?;

    match operation {
        Operation::ReadAttribute => Ok(Some(read_value(&handle.snapshot(), attribute))),
        Operation::WriteAttribute => {
            let value = request
                .value
                .as_ref()
                .ok_or_else(|| ConfigError::InvalidAttribute {
                    name: attribute.name().to_string(),
                    reason: "write-attribute requires a value".to_string(),
                })?;
            handle.apply(parse_update(attribute, value)?)?;
            Ok(None)
        }
        Operation::UndefineAttribute => {
            handle.reset(attribute)?;
            Ok(None)
        }
    }
}

/// Check that `name` is an attribute defined at `address`.
fn resolve_attribute(address: &Address, name: &str) -> Result<Attribute> {
    if *address != Address::subsystem() && *address != Address::passivation_store() {
        return Err(ConfigError::InvalidAddress {
            address: address.to_string(),
            reason: "no such resource".to_string(),
        });
    }

    let attribute: Attribute = name.parse()?;
    if Address::of(attribute) != *address {
        return Err(ConfigError::WrongAddress {
            name: name.to_string(),
            address: address.to_string(),
        });
    }
    Ok(attribute)
}

/// Current value of an attribute, in wire form.
pub fn read_value(settings: &StoreSettings, attribute: Attribute) -> Value {
    match attribute {
        Attribute::MaxSize => Value::from(settings.max_size as u64),
        Attribute::IdleTimeout => Value::from(settings.idle_timeout.as_secs()),
        Attribute::DefaultStore => Value::from(settings.default_store.clone()),
    }
}

/// Parse a wire value into a typed update.
///
/// Numeric attributes accept JSON integers or decimal strings.
pub fn parse_update(attribute: Attribute, value: &Value) -> Result<SettingsUpdate> {
    match attribute {
        Attribute::MaxSize => {
            let n = parse_non_negative(attribute, value)?;
            let n = usize::try_from(n).map_err(|_| invalid(attribute, "value is too large"))?;
            Ok(SettingsUpdate::MaxSize(n))
        }
        Attribute::IdleTimeout => {
            let secs = parse_non_negative(attribute, value)?;
            Ok(SettingsUpdate::IdleTimeout(Duration::from_secs(secs)))
        }
        Attribute::DefaultStore => match value {
            Value::String(s) if !s.trim().is_empty() => {
                Ok(SettingsUpdate::DefaultStore(s.trim().to_string()))
            }
            _ => Err(invalid(attribute, "expected a non-empty store name")),
        },
    }
}

fn parse_non_negative(attribute: Attribute, value: &Value) -> Result<u64> {
    match value {
        Value::Number(n) => {
            if let Some(v) = n.as_u64() {
                Ok(v)
            } else if n.as_i64().is_some_and(|v| v < 0) {
                Err(invalid(attribute, "must be non-negative"))
            } else {
                Err(invalid(attribute, "expected an integer"))
            }
        }
        Value::String(s) => {
            let s = s.trim();
            if s.starts_with('-') {
                return Err(invalid(attribute, "must be non-negative"));
            }
            s.parse::<u64>()
                .map_err(|_| invalid(attribute, &format!("'{s}' is not an integer")))
        }
        _ => Err(invalid(attribute, "expected an integer")),
    }
}

fn invalid(attribute: Attribute, reason: &str) -> ConfigError {
    ConfigError::InvalidAttribute {
        name: attribute.name().to_string(),
        reason: reason.to_string(),
    }
}
