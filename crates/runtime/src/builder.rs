//! Pipeline assembly - plugin records to wired instances
//!
//! The builder walks the ordered plugin records, instantiates each enabled
//! one through the type registry, registers named instances, binds stream
//! plugins, and subscribes every producer to its streams. Configuration
//! errors (unknown types, ambiguous names, duplicate ids, bad options) are
//! fatal here, before anything runs.

use std::sync::Arc;

use sluice_config::Config;
use sluice_core::{
    Consumer, ControlSender, PluginConfig, PluginContext, PluginInstance, PluginRegistry,
    PluginState, Producer, RegisteredPlugin, StateCell, StreamId, TypeRegistry,
};

use crate::error::{Result, RuntimeError};
use crate::supervisor::Pipeline;

/// Type registry with every built-in plugin registered
pub fn builtin_types() -> TypeRegistry {
    let mut registry = TypeRegistry::new();
    sluice_consumers::register(&mut registry);
    sluice_formats::register(&mut registry);
    sluice_producers::register(&mut registry);
    sluice_streams::register(&mut registry);
    registry
}

/// Registry view of a running consumer or producer
struct PluginHandle {
    id: String,
    type_name: String,
    state: Arc<StateCell>,
    control: ControlSender,
}

impl RegisteredPlugin for PluginHandle {
    fn id(&self) -> &str {
        &self.id
    }

    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn state(&self) -> Option<PluginState> {
        Some(self.state.get())
    }

    fn control(&self) -> Option<ControlSender> {
        Some(self.control.clone())
    }
}

/// Assembles a [`Pipeline`] from configuration
pub struct PipelineBuilder {
    types: TypeRegistry,
    ctx: PluginContext,
}

impl PipelineBuilder {
    /// Builder over the built-in plugin set
    pub fn new() -> Self {
        Self::with_types(builtin_types())
    }

    /// Builder over a custom type registry (tests, embedders)
    pub fn with_types(types: TypeRegistry) -> Self {
        Self {
            types,
            ctx: PluginContext::new(),
        }
    }

    /// The context (stream fabric, metrics) plugins will share
    pub fn context(&self) -> &PluginContext {
        &self.ctx
    }

    /// Instantiate and wire every enabled record
    pub fn build(self, config: &Config) -> Result<Pipeline> {
        let registry = Arc::new(PluginRegistry::new());
        let mut consumers: Vec<Box<dyn Consumer>> = Vec::new();
        let mut producers: Vec<Box<dyn Producer>> = Vec::new();

        for record in &config.plugins {
            let mut plugin_config =
                PluginConfig::from_record(&record.type_name, record.options.clone())
                    .map_err(|source| RuntimeError::Plugin {
                        type_name: record.type_name.clone(),
                        source,
                    })?;

            if !plugin_config.enabled() {
                tracing::info!(type_name = %record.type_name, "plugin disabled, skipping");
                continue;
            }

            let instance = self
                .types
                .create(&record.type_name, &mut plugin_config, &self.ctx)
                .map_err(|source| RuntimeError::Plugin {
                    type_name: record.type_name.clone(),
                    source,
                })?;

            match instance {
                PluginInstance::Consumer(consumer) => {
                    let base = consumer.base();
                    register_instance(
                        &registry,
                        plugin_config.id(),
                        &record.type_name,
                        Arc::clone(base.state()),
                        base.control_sender(),
                    )?;
                    tracing::info!(
                        type_name = %record.type_name,
                        plugin = %base.id(),
                        "consumer configured"
                    );
                    consumers.push(consumer);
                }
                PluginInstance::Producer(producer) => {
                    let base = producer.base();
                    register_instance(
                        &registry,
                        plugin_config.id(),
                        &record.type_name,
                        Arc::clone(base.state()),
                        base.control_sender(),
                    )?;
                    tracing::info!(
                        type_name = %record.type_name,
                        plugin = %base.id(),
                        streams = plugin_config.streams_or_wildcard().len(),
                        "producer configured"
                    );
                    producers.push(producer);
                }
                PluginInstance::Stream(plugin) => {
                    // one dispatcher instance per bound stream
                    let names = plugin_config.streams_or_wildcard();
                    let (first, rest) = names.split_first().expect("at least the wildcard");
                    self.ctx.streams.set_stream_plugin(first, plugin);
                    for name in rest {
                        match self
                            .types
                            .create(&record.type_name, &mut plugin_config, &self.ctx)
                            .map_err(|source| RuntimeError::Plugin {
                                type_name: record.type_name.clone(),
                                source,
                            })? {
                            PluginInstance::Stream(plugin) => {
                                self.ctx.streams.set_stream_plugin(name, plugin);
                            }
                            _ => unreachable!("factory kind is stable"),
                        }
                    }
                    tracing::info!(
                        type_name = %record.type_name,
                        streams = names.len(),
                        "stream plugin bound"
                    );
                }
                PluginInstance::Formatter(_) | PluginInstance::Filter(_) => {
                    return Err(RuntimeError::Invalid(format!(
                        "'{}' is referenced from a producer's Formatter/Filter option, \
                         not instantiated as a standalone record",
                        record.type_name
                    )));
                }
            }
        }

        // subscribe producers to their streams
        for producer in &producers {
            let base = producer.base();
            let handle = base.handle();
            for &stream in base.streams() {
                self.ctx.streams.subscribe(stream, handle.clone());
            }
        }

        let stop_order = stop_order(&producers);

        Ok(Pipeline::new(
            consumers,
            producers,
            stop_order,
            self.ctx,
            registry,
        ))
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn register_instance(
    registry: &PluginRegistry,
    id: &str,
    type_name: &str,
    state: Arc<StateCell>,
    control: ControlSender,
) -> Result<()> {
    registry
        .register_unique(Arc::new(PluginHandle {
            id: id.to_string(),
            type_name: type_name.to_string(),
            state,
            control,
        }))
        .map_err(|source| RuntimeError::Plugin {
            type_name: type_name.to_string(),
            source,
        })
}

/// Producer stop order over drop-path dependencies
///
/// A producer stops before any producer that receives its drops, so the
/// final drops of a stopping producer always find a live receiver. The
/// wildcard only catches a drop stream no producer matches exactly. Among
/// unordered producers, configuration order is kept; cycles fall back to
/// configuration order with a warning.
fn stop_order(producers: &[Box<dyn Producer>]) -> Vec<usize> {
    let n = producers.len();
    let mut edges: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut indegree = vec![0usize; n];

    for i in 0..n {
        let drop_stream = producers[i].base().drop_stream();

        let exact: Vec<usize> = (0..n)
            .filter(|&j| j != i && producers[j].base().streams().contains(&drop_stream))
            .collect();
        let receivers = if exact.is_empty() {
            (0..n)
                .filter(|&j| {
                    j != i && producers[j].base().streams().contains(&StreamId::WILDCARD)
                })
                .collect()
        } else {
            exact
        };

        for j in receivers {
            if !edges[i].contains(&j) {
                edges[i].push(j);
                indegree[j] += 1;
            }
        }
    }

    let mut order = Vec::with_capacity(n);
    let mut placed = vec![false; n];

    loop {
        // lowest config index among ready nodes keeps the order stable
        let Some(next) = (0..n).find(|&i| !placed[i] && indegree[i] == 0) else {
            break;
        };
        placed[next] = true;
        order.push(next);
        for &j in &edges[next] {
            indegree[j] -= 1;
        }
    }

    if order.len() < n {
        tracing::warn!(
            "drop-stream dependencies form a cycle; stopping remaining producers in config order"
        );
        for i in 0..n {
            if !placed[i] {
                order.push(i);
            }
        }
    }

    order
}

#[cfg(test)]
#[path = "builder_test.rs"]
mod builder_test;
