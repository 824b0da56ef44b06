//! Broadcast - deliver to every subscriber

use sluice_core::{
    Dispatch, Message, PluginConfig, PluginContext, PluginInstance, Result, StreamPlugin,
    TypeRegistry,
};

/// Fan-out to all subscribed producers
///
/// The same policy the fabric applies to streams without an explicit
/// plugin; registering it makes the default expressible in configuration.
pub struct Broadcast;

impl StreamPlugin for Broadcast {
    fn dispatch(&self, _msg: &Message, _subscribers: usize) -> Dispatch {
        Dispatch::Broadcast
    }
}

pub(crate) fn factory(
    _registry: &TypeRegistry,
    _config: &mut PluginConfig,
    _ctx: &PluginContext,
) -> Result<PluginInstance> {
    Ok(PluginInstance::Stream(Box::new(Broadcast)))
}
