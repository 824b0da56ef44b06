//! Plugin configuration binding
//!
//! Each plugin record is a dotted type name plus a free-form option table.
//! `PluginConfig` carries the table through construction and offers typed
//! lookups with defaults, plus forced overrides for options a plugin does
//! not allow the user to choose (the spooling producer pins its formatter).

use std::collections::HashMap;
use std::time::Duration;

use toml::Value;

use crate::error::{CoreError, Result};
use crate::stream::StreamId;

/// Typed view over one plugin record's options
#[derive(Debug, Clone, Default)]
pub struct PluginConfig {
    /// Dotted plugin type (`producer.Spooling`)
    type_name: String,

    /// User-assigned instance id; empty means "do not register"
    id: String,

    /// Instantiate only if true
    enable: bool,

    /// Stream names this plugin binds to
    streams: Vec<String>,

    /// User-supplied options
    options: toml::Table,

    /// Forced values, consulted before user options
    overrides: toml::Table,
}

impl PluginConfig {
    /// Create an empty config for `type_name`
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            id: String::new(),
            enable: true,
            streams: Vec::new(),
            options: toml::Table::new(),
            overrides: toml::Table::new(),
        }
    }

    /// Build from a raw record table
    ///
    /// `Enable`, `ID` and `Stream`/`Streams` are lifted out of the table;
    /// everything else stays available through the typed getters.
    pub fn from_record(type_name: &str, mut table: toml::Table) -> Result<Self> {
        let enable = match table.remove("Enable") {
            None => true,
            Some(Value::Boolean(b)) => b,
            Some(_) => {
                return Err(CoreError::BadOption {
                    plugin: type_name.to_string(),
                    key: "Enable".into(),
                    expected: "a boolean",
                })
            }
        };

        let id = match table.remove("ID") {
            None => String::new(),
            Some(Value::String(s)) => s,
            Some(_) => {
                return Err(CoreError::BadOption {
                    plugin: type_name.to_string(),
                    key: "ID".into(),
                    expected: "a string",
                })
            }
        };

        let raw_streams = table.remove("Stream").or_else(|| table.remove("Streams"));
        let streams = match raw_streams {
            None => Vec::new(),
            Some(Value::String(s)) => vec![s],
            Some(Value::Array(items)) => {
                let mut names = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        Value::String(s) => names.push(s),
                        _ => {
                            return Err(CoreError::BadOption {
                                plugin: type_name.to_string(),
                                key: "Stream".into(),
                                expected: "a stream name or list of names",
                            })
                        }
                    }
                }
                names
            }
            Some(_) => {
                return Err(CoreError::BadOption {
                    plugin: type_name.to_string(),
                    key: "Stream".into(),
                    expected: "a stream name or list of names",
                })
            }
        };

        Ok(Self {
            type_name: type_name.to_string(),
            id,
            enable,
            streams,
            options: table,
            overrides: toml::Table::new(),
        })
    }

    /// The dotted plugin type this config belongs to
    #[inline]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// User-assigned instance id; empty means unregistered
    #[inline]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether the record asked for instantiation
    #[inline]
    pub fn enabled(&self) -> bool {
        self.enable
    }

    /// Stream names this plugin binds to
    #[inline]
    pub fn streams(&self) -> &[String] {
        &self.streams
    }

    /// Stream names, defaulting to the wildcard when none were configured
    pub fn streams_or_wildcard(&self) -> Vec<String> {
        if self.streams.is_empty() {
            vec![StreamId::WILDCARD_NAME.to_string()]
        } else {
            self.streams.clone()
        }
    }

    /// Forcibly replace an option, shadowing any user value
    pub fn override_option(&mut self, key: &str, value: impl Into<Value>) {
        self.overrides.insert(key.to_string(), value.into());
    }

    /// Whether a key is present (override or user value)
    pub fn has(&self, key: &str) -> bool {
        self.overrides.contains_key(key) || self.options.contains_key(key)
    }

    fn lookup(&self, key: &str) -> Option<&Value> {
        self.overrides.get(key).or_else(|| self.options.get(key))
    }

    /// Integer option with default
    pub fn get_int(&self, key: &str, default: i64) -> Result<i64> {
        match self.lookup(key) {
            None => Ok(default),
            Some(Value::Integer(v)) => Ok(*v),
            Some(_) => Err(self.bad_option(key, "an integer")),
        }
    }

    /// Unsigned integer option with default; negative values are rejected
    pub fn get_uint(&self, key: &str, default: u64) -> Result<u64> {
        match self.lookup(key) {
            None => Ok(default),
            Some(Value::Integer(v)) if *v >= 0 => Ok(*v as u64),
            Some(_) => Err(self.bad_option(key, "a non-negative integer")),
        }
    }

    /// Boolean option with default
    pub fn get_bool(&self, key: &str, default: bool) -> Result<bool> {
        match self.lookup(key) {
            None => Ok(default),
            Some(Value::Boolean(v)) => Ok(*v),
            Some(_) => Err(self.bad_option(key, "a boolean")),
        }
    }

    /// String option with default
    pub fn get_string(&self, key: &str, default: &str) -> Result<String> {
        match self.lookup(key) {
            None => Ok(default.to_string()),
            Some(Value::String(v)) => Ok(v.clone()),
            Some(_) => Err(self.bad_option(key, "a string")),
        }
    }

    /// String-list option; a bare string reads as a one-element list
    pub fn get_string_list(&self, key: &str) -> Result<Vec<String>> {
        match self.lookup(key) {
            None => Ok(Vec::new()),
            Some(Value::String(v)) => Ok(vec![v.clone()]),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| match item {
                    Value::String(s) => Ok(s.clone()),
                    _ => Err(self.bad_option(key, "a list of strings")),
                })
                .collect(),
            Some(_) => Err(self.bad_option(key, "a list of strings")),
        }
    }

    /// Millisecond option as a `Duration`; `None` when the value is ≤ 0
    ///
    /// Channel timeouts use 0 to mean "wait forever".
    pub fn get_timeout_ms(&self, key: &str, default_ms: i64) -> Result<Option<Duration>> {
        let ms = self.get_int(key, default_ms)?;
        if ms <= 0 {
            Ok(None)
        } else {
            Ok(Some(Duration::from_millis(ms as u64)))
        }
    }

    /// Stream-name-keyed table resolved to ids
    ///
    /// The table maps stream names to strings; the wildcard name is allowed
    /// and acts as a fallback entry. When `default` is non-empty and no
    /// wildcard entry exists, one is added with that value.
    pub fn get_stream_map(&self, key: &str, default: &str) -> Result<HashMap<StreamId, String>> {
        let mut map = HashMap::new();

        if !default.is_empty() {
            map.insert(StreamId::WILDCARD, default.to_string());
        }

        match self.lookup(key) {
            None => Ok(map),
            Some(Value::Table(table)) => {
                for (stream_name, value) in table {
                    match value {
                        Value::String(s) => {
                            map.insert(StreamId::from_name(stream_name), s.clone());
                        }
                        _ => return Err(self.bad_option(key, "a table of stream → string")),
                    }
                }
                Ok(map)
            }
            Some(_) => Err(self.bad_option(key, "a table of stream → string")),
        }
    }

    fn bad_option(&self, key: &str, expected: &'static str) -> CoreError {
        CoreError::BadOption {
            plugin: self.type_name.clone(),
            key: key.to_string(),
            expected,
        }
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;
