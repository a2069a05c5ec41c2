//! Bridge configuration.
//!
//! Loaded from a TOML file or built in code. Every field has a default, so an
//! empty file is a valid configuration:
//!
//! ```toml
//! max_depth = 32
//! state_bookkeeping = true
//! log_outbound = false
//!
//! [logging]
//! filter = "bridge_runtime=debug"
//! json = false
//! ```

use std::path::{Path, PathBuf};

use bridge_types::DEFAULT_MAX_DEPTH;
use serde::{Deserialize, Serialize};
use tokio::fs;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config file does not exist: {0}")]
    PathNotFound(PathBuf),

    #[error("Failed to read file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    TomlParseError(#[from] toml::de::Error),

    #[error("max_depth must be at least 1")]
    InvalidMaxDepth,
}

/// Settings for one bridge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Maximum nesting depth for value conversion
    pub max_depth: usize,
    /// Add `callbackNames` and `rpcInterfaces` to every pushed state
    pub state_bookkeeping: bool,
    /// Log every outbound message at debug level
    pub log_outbound: bool,
    pub logging: LoggingConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            state_bookkeeping: true,
            log_outbound: false,
            logging: LoggingConfig::default(),
        }
    }
}

/// Logging setup used by [`crate::init_tracing`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directives, overridden by `RUST_LOG`
    pub filter: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "bridge_runtime=info,bridge_types=info".to_string(),
            json: false,
        }
    }
}

impl BridgeConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: BridgeConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::PathNotFound(path.to_path_buf()));
        }

        tracing::info!("Loading bridge config from {:?}", path);
        let content = fs::read_to_string(path).await?;
        Self::from_toml_str(&content)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_depth == 0 {
            return Err(ConfigError::InvalidMaxDepth);
        }
        Ok(())
    }
}
