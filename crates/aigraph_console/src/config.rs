// SPDX-License-Identifier: MIT OR Apache-2.0
//! Console configuration, stored as RON.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Config file looked up in the working directory when `--config` is absent
pub const CONFIG_FILE_NAME: &str = "aigraph.ron";

/// Error reading or writing the configuration file
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read or written
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// File is not valid RON for [`ConsoleConfig`]
    #[error("Invalid config: {0}")]
    Parse(#[from] ron::error::SpannedError),

    /// Config could not be serialized
    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] ron::Error),
}

/// Settings for the text console
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    /// Node type catalog (JSON); the built-in catalog when unset
    pub catalog: Option<PathBuf>,
    /// Graph opened at startup
    pub autoload: Option<PathBuf>,
    /// Extension added to `save`/`load` paths that have none
    pub save_extension: String,
    /// Default `tracing` filter, overridden by `RUST_LOG`
    pub log_filter: String,
    /// Prompt printed before each command
    pub prompt: String,
    /// Number of commands kept for `history`
    pub history_limit: usize,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            catalog: None,
            autoload: None,
            save_extension: aigraph_graph::persist::BINARY_EXTENSION.to_string(),
            log_filter: "warn,aigraph_graph=info,aigraph_console=info".to_string(),
            prompt: "> ".to_string(),
            history_limit: 100,
        }
    }
}

impl ConsoleConfig {
    /// Load a config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(ron::from_str(&content)?)
    }

    /// Save the config file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let config = ron::ser::PrettyConfig::default().struct_names(true);
        let content = ron::ser::to_string_pretty(self, config)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Path with the default extension added when it has none
    pub fn with_default_extension(&self, path: &str) -> PathBuf {
        let path = PathBuf::from(path);
        if path.extension().is_none() && !self.save_extension.is_empty() {
            path.with_extension(&self.save_extension)
        } else {
            path
        }
    }
}
