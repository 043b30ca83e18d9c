//! Configuration error types.

/// Result type alias for config operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur while loading, validating, or updating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read a config file.
    #[error("failed to read config file '{path}': {source}")]
    ReadFile {
        path: String,
        source: std::io::Error,
    },

    /// Failed to write a config file.
    #[error("failed to write config file '{path}': {source}")]
    WriteFile {
        path: String,
        source: std::io::Error,
    },

    /// Failed to parse TOML.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Failed to serialize config.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A store profile name does not match any configured profile.
    #[error("store profile '{name}' not found (known: {known})")]
    UnknownStore { name: String, known: String },

    /// An attribute value failed validation.
    #[error("invalid value for attribute '{name}': {reason}")]
    InvalidAttribute { name: String, reason: String },

    /// Attribute name is not recognized.
    #[error("unknown attribute '{0}'")]
    UnknownAttribute(String),

    /// Attribute exists but not at the requested address.
    #[error("attribute '{name}' is not defined at address '{address}'")]
    WrongAddress { name: String, address: String },

    /// Management operation name is not recognized.
    #[error("unknown operation '{0}'")]
    UnknownOperation(String),

    /// Address could not be parsed or does not name a known resource.
    #[error("invalid address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    /// Other error.
    #[error("{0}")]
    Other(String),
}
