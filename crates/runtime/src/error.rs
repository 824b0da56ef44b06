//! Runtime errors

use thiserror::Error;

/// Result alias for pipeline assembly and supervision
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Errors from building or running a pipeline
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// A plugin failed to instantiate or configure
    #[error("plugin '{type_name}': {source}")]
    Plugin {
        type_name: String,
        #[source]
        source: sluice_core::CoreError,
    },

    /// A record asked for something the runtime cannot wire
    #[error("invalid pipeline: {0}")]
    Invalid(String),

    /// Core-level failure outside a specific plugin
    #[error(transparent)]
    Core(#[from] sluice_core::CoreError),
}
