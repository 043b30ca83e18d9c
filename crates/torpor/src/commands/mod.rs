//! CLI command handlers.

use std::path::PathBuf;

use anyhow::Result;
use torpor_config::{ConfigSource, LoadedConfig, TorporConfig};

pub mod attribute;
pub mod config;
pub mod store;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Explicit config file, bypassing discovery.
    pub config_path: Option<PathBuf>,
    /// Output as JSON for scripting.
    pub json_output: bool,
    /// Verbose output enabled.
    pub verbose: bool,
}

impl Context {
    /// Load the effective configuration.
    ///
    /// With `--config`, only that file is read (a missing file means
    /// defaults). Otherwise all discovered layers are merged.
    pub fn load(&self) -> Result<LoadedConfig> {
        match self.config_path {
            Some(ref path) => {
                let loaded = path.is_file();
                let config = if loaded {
                    torpor_config::load_config_file(path)?
                } else {
                    TorporConfig::new()
                };
                Ok(LoadedConfig {
                    config,
                    sources: vec![ConfigSource {
                        path: path.clone(),
                        loaded,
                    }],
                    warnings: Vec::new(),
                })
            }
            None => Ok(torpor_config::load_config(None)?),
        }
    }

    /// File that configuration writes go to.
    pub fn target_path(&self) -> Result<PathBuf> {
        match self.config_path {
            Some(ref path) => Ok(path.clone()),
            None => torpor_config::user_config_path()
                .ok_or_else(|| anyhow::anyhow!("Could not determine config directory")),
        }
    }

    /// Contents of the target file alone, or defaults if it does not exist.
    pub fn load_target(&self) -> Result<TorporConfig> {
        let path = self.target_path()?;
        if path.is_file() {
            Ok(torpor_config::load_config_file(&path)?)
        } else {
            Ok(TorporConfig::new())
        }
    }
}
