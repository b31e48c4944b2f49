//! Error types for the core layer.

use std::path::PathBuf;

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, DimError>;

/// Errors raised while loading configuration or driving background services.
#[derive(Debug, thiserror::Error)]
pub enum DimError {
    /// Reading a configuration file failed.
    #[error("Failed to read config '{path}': {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration text is not valid TOML for [`DimConfig`](crate::DimConfig).
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// A configuration value is out of range.
    #[error("Invalid value for '{key}': {message}")]
    InvalidConfig { key: &'static str, message: String },

    /// A socket or thread operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DimError {
    /// Create a config I/O error.
    pub fn config_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::ConfigIo {
            path: path.into(),
            source,
        }
    }

    /// Create an invalid-value error.
    pub fn invalid_config(key: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            key,
            message: message.into(),
        }
    }
}
