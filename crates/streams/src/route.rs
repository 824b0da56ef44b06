//! Route - re-address messages to a configured target stream

use sluice_core::{
    CoreError, Dispatch, Message, PluginConfig, PluginContext, PluginInstance, Result, StreamId,
    StreamPlugin, TypeRegistry,
};

/// Reassigns the stream id (recording the previous one) before dispatch
///
/// `TargetStream` names the destination. Messages already on the target
/// pass through as a broadcast so a self-route cannot loop.
pub struct Route {
    target: StreamId,
}

impl Route {
    /// Route everything to `target`
    pub fn new(target: StreamId) -> Self {
        Self { target }
    }
}

impl StreamPlugin for Route {
    fn dispatch(&self, msg: &Message, _subscribers: usize) -> Dispatch {
        if msg.stream_id() == self.target {
            Dispatch::Broadcast
        } else {
            Dispatch::Reroute(self.target)
        }
    }
}

pub(crate) fn factory(
    _registry: &TypeRegistry,
    config: &mut PluginConfig,
    ctx: &PluginContext,
) -> Result<PluginInstance> {
    let target_name = config.get_string("TargetStream", "")?;
    if target_name.is_empty() {
        return Err(CoreError::Config(format!(
            "{}: stream.Route requires TargetStream",
            config.type_name()
        )));
    }

    let target = ctx.streams.register_stream(&target_name);
    Ok(PluginInstance::Stream(Box::new(Route::new(target))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn test_reroutes_to_target() {
        let route = Route::new(StreamId::from_name("archive"));
        let msg = Message::new(Bytes::from_static(b"m"), StreamId::from_name("app"), 0);

        assert_eq!(
            route.dispatch(&msg, 1),
            Dispatch::Reroute(StreamId::from_name("archive"))
        );
    }

    #[test]
    fn test_message_already_on_target_broadcasts() {
        let route = Route::new(StreamId::from_name("archive"));
        let msg = Message::new(Bytes::from_static(b"m"), StreamId::from_name("archive"), 0);

        assert_eq!(route.dispatch(&msg, 1), Dispatch::Broadcast);
    }
}
