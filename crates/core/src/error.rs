//! Core error types

use thiserror::Error;

/// Result alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors raised by the message plane and plugin runtime
#[derive(Debug, Error)]
pub enum CoreError {
    /// No registered type matches the requested name
    #[error("unknown plugin type '{name}', available: [{available}]")]
    UnknownPlugin { name: String, available: String },

    /// A short name matches more than one registered type
    #[error("ambiguous plugin type '{name}', candidates: [{candidates}]")]
    AmbiguousPlugin { name: String, candidates: String },

    /// The type exists but does not provide the requested capability
    #[error("plugin type '{name}' is a {actual}, expected a {expected}")]
    TypeMismatch {
        name: String,
        expected: &'static str,
        actual: &'static str,
    },

    /// `register_unique` found the id already taken
    #[error("plugin id '{0}' is already registered")]
    DuplicateId(String),

    /// A config option had the wrong type
    #[error("plugin '{plugin}': option '{key}' expects {expected}")]
    BadOption {
        plugin: String,
        key: String,
        expected: &'static str,
    },

    /// Configuration problem outside a single option
    #[error("configuration error: {0}")]
    Config(String),

    /// A spool segment did not decode as a message record
    #[error("corrupt message record: {0}")]
    CorruptRecord(String),

    /// Underlying I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
