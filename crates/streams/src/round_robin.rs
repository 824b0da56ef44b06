//! RoundRobin - rotate through subscribers

use std::sync::atomic::{AtomicUsize, Ordering};

use sluice_core::{
    Dispatch, Message, PluginConfig, PluginContext, PluginInstance, Result, StreamPlugin,
    TypeRegistry,
};

/// Subscribers in rotation, one per message
#[derive(Default)]
pub struct RoundRobin {
    next: AtomicUsize,
}

impl StreamPlugin for RoundRobin {
    fn dispatch(&self, _msg: &Message, subscribers: usize) -> Dispatch {
        let index = self.next.fetch_add(1, Ordering::Relaxed) % subscribers;
        Dispatch::One(index)
    }
}

pub(crate) fn factory(
    _registry: &TypeRegistry,
    _config: &mut PluginConfig,
    _ctx: &PluginContext,
) -> Result<PluginInstance> {
    Ok(PluginInstance::Stream(Box::new(RoundRobin::default())))
}
