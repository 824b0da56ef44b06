//! Configuration errors

use thiserror::Error;

/// Result alias for configuration loading
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors from loading or validating a pipeline config
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML for the expected shape
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Structurally invalid pipeline description
    #[error("invalid config: {0}")]
    Invalid(String),
}
