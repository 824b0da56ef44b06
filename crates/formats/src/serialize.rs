//! Serialize - emits the full binary message record
//!
//! The payload becomes the spool segment record for the message: header
//! (stream id, prev stream id, sequence, timestamp) plus original payload.
//! The spooling producer pins its formatter to this type so that whatever
//! the user configured, segments always decode back into messages.

use sluice_core::{
    codec, Formatter, Message, PluginConfig, PluginContext, PluginInstance, Result, TypeRegistry,
};

/// Binary message record formatter
#[derive(Default)]
pub struct Serialize {
    record: Vec<u8>,
}

impl Formatter for Serialize {
    fn prepare(&mut self, msg: &Message) {
        self.record.resize(codec::encoded_len(msg), 0);
        codec::encode_to_slice(msg, &mut self.record);
    }

    fn encoded_len(&self) -> usize {
        self.record.len()
    }

    fn copy_to(&self, dest: &mut [u8]) -> usize {
        dest[..self.record.len()].copy_from_slice(&self.record);
        self.record.len()
    }
}

pub(crate) fn factory(
    _registry: &TypeRegistry,
    _config: &mut PluginConfig,
    _ctx: &PluginContext,
) -> Result<PluginInstance> {
    Ok(PluginInstance::Formatter(Box::new(Serialize::default())))
}
