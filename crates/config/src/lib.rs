//! Sluice Configuration
//!
//! TOML-based pipeline description: a `[log]` section plus an ordered
//! array of plugin records. Each record names the dotted plugin type and
//! carries that plugin's option map verbatim; option typing is the
//! plugin's business, not the loader's.
//!
//! # Example
//!
//! ```toml
//! [log]
//! level = "info"
//!
//! [[plugin]]
//! type = "consumer.Console"
//! Stream = "console"
//!
//! [[plugin]]
//! type = "producer.Spooling"
//! ID = "spool"
//! Stream = "spool"
//! Path = "/var/spool/sluice"
//! ```
//!
//! # Parsing
//!
//! ```
//! use sluice_config::Config;
//! use std::str::FromStr;
//!
//! let config = Config::from_str(
//!     "[[plugin]]\ntype = \"producer.Null\"\n"
//! ).unwrap();
//! assert_eq!(config.plugins.len(), 1);
//! ```

mod error;
mod logging;

pub use error::{ConfigError, Result};
pub use logging::LogConfig;

use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;

/// One plugin record: dotted type plus its raw option table
#[derive(Debug, Clone, Deserialize)]
pub struct PluginRecord {
    /// Dotted plugin type (`producer.Spooling`)
    #[serde(rename = "type")]
    pub type_name: String,

    /// Everything else in the record, handed to the plugin untyped
    #[serde(flatten)]
    pub options: toml::Table,
}

/// Full pipeline configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub log: LogConfig,

    /// Ordered plugin records
    #[serde(rename = "plugin")]
    pub plugins: Vec<PluginRecord>,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_str(&contents)
    }

    /// Validate structural properties the loader can check
    ///
    /// Option typing stays with the plugins; this catches records that can
    /// never instantiate.
    fn validate(&self) -> Result<()> {
        for (index, record) in self.plugins.iter().enumerate() {
            if record.type_name.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "plugin record #{index} has an empty type"
                )));
            }
            if !record.type_name.contains('.') {
                return Err(ConfigError::Invalid(format!(
                    "plugin record #{index}: '{}' is not a dotted plugin type",
                    record.type_name
                )));
            }
        }
        Ok(())
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        let config: Config = toml::from_str(s).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }
}
