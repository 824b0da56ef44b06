//! Type registry - dotted plugin names to factory functions
//!
//! The registry maps identifiers like `producer.Spooling` to factories,
//! enabling configuration-driven instantiation. There is no reflection:
//! every plugin crate exposes a `register` function that fills the table at
//! program start.
//!
//! Lookups accept the full dotted form or any unambiguous suffix
//! (`Spooling`, `producer.Spooling`); exact matches win, ambiguous short
//! names and unknown names error with the candidate list.

use std::collections::HashMap;
use std::sync::Arc;

use sluice_metrics::MetricsRegistry;

use crate::config::PluginConfig;
use crate::consumer::Consumer;
use crate::error::{CoreError, Result};
use crate::format::{Filter, Formatter};
use crate::producer::Producer;
use crate::stream::{StreamPlugin, StreamRegistry};

/// Shared handles every factory receives
///
/// The registries are process-wide by convention: the runtime builds one
/// set and threads it through every plugin. Tests build their own.
#[derive(Clone)]
pub struct PluginContext {
    /// Routing fabric (stream name↔id mapping and dispatch)
    pub streams: Arc<StreamRegistry>,
    /// Metric registry plugins feed
    pub metrics: Arc<MetricsRegistry>,
}

impl PluginContext {
    /// Build a fresh context with its own registries
    pub fn new() -> Self {
        let metrics = Arc::new(MetricsRegistry::new());
        Self {
            streams: Arc::new(StreamRegistry::new(Arc::clone(&metrics))),
            metrics,
        }
    }
}

impl Default for PluginContext {
    fn default() -> Self {
        Self::new()
    }
}

/// A constructed, configured plugin of one of the five capability kinds
pub enum PluginInstance {
    /// Message source
    Consumer(Box<dyn Consumer>),
    /// Message sink
    Producer(Box<dyn Producer>),
    /// Stream dispatch policy
    Stream(Box<dyn StreamPlugin>),
    /// Payload transform
    Formatter(Box<dyn Formatter>),
    /// Message veto
    Filter(Box<dyn Filter>),
}

impl PluginInstance {
    fn kind_name(&self) -> &'static str {
        match self {
            PluginInstance::Consumer(_) => "consumer",
            PluginInstance::Producer(_) => "producer",
            PluginInstance::Stream(_) => "stream",
            PluginInstance::Formatter(_) => "formatter",
            PluginInstance::Filter(_) => "filter",
        }
    }
}

/// Factory signature: construct and configure one plugin instance
///
/// Factories receive the registry so chained plugins (a formatter wrapping
/// its base formatter) can resolve their dependencies by name. A factory
/// returns only after the instance bound its configuration; option errors
/// surface here and fail startup.
pub type PluginFactory =
    fn(&TypeRegistry, &mut PluginConfig, &PluginContext) -> Result<PluginInstance>;

/// Name → factory table
#[derive(Default)]
pub struct TypeRegistry {
    factories: HashMap<String, PluginFactory>,
}

impl TypeRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under its full dotted name
    ///
    /// Later registrations of the same name replace earlier ones, which
    /// lets tests shadow builtins.
    pub fn register(&mut self, name: &str, factory: PluginFactory) {
        self.factories.insert(name.to_string(), factory);
    }

    /// Whether a name (exact form) is registered
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// All registered names, sorted
    pub fn available(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Resolve a full or suffix name to the registered full name
    pub fn resolve(&self, name: &str) -> Result<&str> {
        if let Some((key, _)) = self.factories.get_key_value(name) {
            return Ok(key.as_str());
        }

        let suffix = format!(".{name}");
        let mut matches: Vec<&str> = self
            .factories
            .keys()
            .filter(|key| key.ends_with(&suffix))
            .map(String::as_str)
            .collect();
        matches.sort_unstable();

        match matches.len() {
            1 => Ok(matches[0]),
            0 => Err(CoreError::UnknownPlugin {
                name: name.to_string(),
                available: self.available().join(", "),
            }),
            _ => Err(CoreError::AmbiguousPlugin {
                name: name.to_string(),
                candidates: matches.join(", "),
            }),
        }
    }

    /// Construct and configure a plugin by name
    pub fn create(
        &self,
        name: &str,
        config: &mut PluginConfig,
        ctx: &PluginContext,
    ) -> Result<PluginInstance> {
        let full_name = self.resolve(name)?;
        let factory = self.factories[full_name];
        factory(self, config, ctx)
    }

    /// Construct a producer, erroring when the name is another kind
    pub fn create_producer(
        &self,
        name: &str,
        config: &mut PluginConfig,
        ctx: &PluginContext,
    ) -> Result<Box<dyn Producer>> {
        match self.create(name, config, ctx)? {
            PluginInstance::Producer(p) => Ok(p),
            other => Err(self.mismatch(name, "producer", &other)),
        }
    }

    /// Construct a consumer, erroring when the name is another kind
    pub fn create_consumer(
        &self,
        name: &str,
        config: &mut PluginConfig,
        ctx: &PluginContext,
    ) -> Result<Box<dyn Consumer>> {
        match self.create(name, config, ctx)? {
            PluginInstance::Consumer(c) => Ok(c),
            other => Err(self.mismatch(name, "consumer", &other)),
        }
    }

    /// Construct a stream plugin, erroring when the name is another kind
    pub fn create_stream(
        &self,
        name: &str,
        config: &mut PluginConfig,
        ctx: &PluginContext,
    ) -> Result<Box<dyn StreamPlugin>> {
        match self.create(name, config, ctx)? {
            PluginInstance::Stream(s) => Ok(s),
            other => Err(self.mismatch(name, "stream", &other)),
        }
    }

    /// Construct a formatter, erroring when the name is another kind
    pub fn create_formatter(
        &self,
        name: &str,
        config: &mut PluginConfig,
        ctx: &PluginContext,
    ) -> Result<Box<dyn Formatter>> {
        match self.create(name, config, ctx)? {
            PluginInstance::Formatter(f) => Ok(f),
            other => Err(self.mismatch(name, "formatter", &other)),
        }
    }

    /// Construct a filter, erroring when the name is another kind
    pub fn create_filter(
        &self,
        name: &str,
        config: &mut PluginConfig,
        ctx: &PluginContext,
    ) -> Result<Box<dyn Filter>> {
        match self.create(name, config, ctx)? {
            PluginInstance::Filter(f) => Ok(f),
            other => Err(self.mismatch(name, "filter", &other)),
        }
    }

    fn mismatch(&self, name: &str, expected: &'static str, got: &PluginInstance) -> CoreError {
        CoreError::TypeMismatch {
            name: name.to_string(),
            expected,
            actual: got.kind_name(),
        }
    }
}

impl std::fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("types", &self.factories.len())
            .finish()
    }
}

#[cfg(test)]
#[path = "type_registry_test.rs"]
mod type_registry_test;
