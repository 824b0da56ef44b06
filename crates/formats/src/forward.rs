//! Forward - the identity formatter

use bytes::Bytes;
use sluice_core::{
    Formatter, Message, PluginConfig, PluginContext, PluginInstance, Result, TypeRegistry,
};

/// Passes the payload through unchanged
///
/// The default base for every chaining formatter.
#[derive(Default)]
pub struct Forward {
    data: Bytes,
}

impl Formatter for Forward {
    fn prepare(&mut self, msg: &Message) {
        self.data = msg.data.clone();
    }

    fn encoded_len(&self) -> usize {
        self.data.len()
    }

    fn copy_to(&self, dest: &mut [u8]) -> usize {
        dest[..self.data.len()].copy_from_slice(&self.data);
        self.data.len()
    }
}

pub(crate) fn factory(
    _registry: &TypeRegistry,
    _config: &mut PluginConfig,
    _ctx: &PluginContext,
) -> Result<PluginInstance> {
    Ok(PluginInstance::Formatter(Box::new(Forward::default())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sluice_core::StreamId;

    #[test]
    fn test_forward_is_identity() {
        let mut formatter = Forward::default();
        let msg = Message::new(Bytes::from_static(b"hello"), StreamId::from_name("s"), 1);

        let (data, stream) = formatter.format(&msg);
        assert_eq!(&data[..], b"hello");
        assert_eq!(stream, msg.stream_id());
    }
}
