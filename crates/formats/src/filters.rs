//! Built-in filters

use sluice_core::{
    Filter, Message, PluginConfig, PluginContext, PluginInstance, Result, TypeRegistry,
};

/// Accepts every message; the default when no filter is configured
pub struct AnyFilter;

impl Filter for AnyFilter {
    fn accepts(&self, _msg: &Message) -> bool {
        true
    }
}

/// Vetoes every message
///
/// Useful for muting a producer without unwiring it.
pub struct NoneFilter;

impl Filter for NoneFilter {
    fn accepts(&self, _msg: &Message) -> bool {
        false
    }
}

pub(crate) fn any_factory(
    _registry: &TypeRegistry,
    _config: &mut PluginConfig,
    _ctx: &PluginContext,
) -> Result<PluginInstance> {
    Ok(PluginInstance::Filter(Box::new(AnyFilter)))
}

pub(crate) fn none_factory(
    _registry: &TypeRegistry,
    _config: &mut PluginConfig,
    _ctx: &PluginContext,
) -> Result<PluginInstance> {
    Ok(PluginInstance::Filter(Box::new(NoneFilter)))
}
