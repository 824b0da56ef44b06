//! Random - pick one subscriber uniformly per message

use rand::Rng;
use sluice_core::{
    Dispatch, Message, PluginConfig, PluginContext, PluginInstance, Result, StreamPlugin,
    TypeRegistry,
};

/// One uniformly random subscriber per message
pub struct Random;

impl StreamPlugin for Random {
    fn dispatch(&self, _msg: &Message, subscribers: usize) -> Dispatch {
        Dispatch::One(rand::thread_rng().gen_range(0..subscribers))
    }
}

pub(crate) fn factory(
    _registry: &TypeRegistry,
    _config: &mut PluginConfig,
    _ctx: &PluginContext,
) -> Result<PluginInstance> {
    Ok(PluginInstance::Stream(Box::new(Random)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use sluice_core::StreamId;

    #[test]
    fn test_picks_valid_index() {
        let random = Random;
        let msg = Message::new(Bytes::from_static(b"m"), StreamId::from_name("s"), 0);

        for _ in 0..100 {
            match random.dispatch(&msg, 3) {
                Dispatch::One(index) => assert!(index < 3),
                other => panic!("expected One, got {other:?}"),
            }
        }
    }
}
