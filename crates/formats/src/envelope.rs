//! Envelope - wraps the payload in a configured prefix and postfix

use sluice_core::{
    Formatter, Message, PluginConfig, PluginContext, PluginInstance, Result, StreamId,
    TypeRegistry,
};

/// Formats as `Prefix` + base output + `Postfix`
///
/// Both default to empty; `Postfix` defaults to a newline when neither is
/// set, which makes the envelope the usual line framing for text sinks.
/// The base formatter is named by `EnvelopeDataFormatter`.
pub struct Envelope {
    base: Box<dyn Formatter>,
    prefix: Vec<u8>,
    postfix: Vec<u8>,
}

impl Envelope {
    /// Wrap a base formatter with explicit framing
    pub fn new(base: Box<dyn Formatter>, prefix: Vec<u8>, postfix: Vec<u8>) -> Self {
        Self {
            base,
            prefix,
            postfix,
        }
    }
}

impl Formatter for Envelope {
    fn prepare(&mut self, msg: &Message) {
        self.base.prepare(msg);
    }

    fn encoded_len(&self) -> usize {
        self.prefix.len() + self.base.encoded_len() + self.postfix.len()
    }

    fn copy_to(&self, dest: &mut [u8]) -> usize {
        let mut at = self.prefix.len();
        dest[..at].copy_from_slice(&self.prefix);
        at += self.base.copy_to(&mut dest[at..]);
        dest[at..at + self.postfix.len()].copy_from_slice(&self.postfix);
        at + self.postfix.len()
    }

    fn target_stream(&self, msg: &Message) -> StreamId {
        self.base.target_stream(msg)
    }
}

pub(crate) fn factory(
    registry: &TypeRegistry,
    config: &mut PluginConfig,
    ctx: &PluginContext,
) -> Result<PluginInstance> {
    let base_name = config.get_string("EnvelopeDataFormatter", "format.Forward")?;
    let base = registry.create_formatter(&base_name, config, ctx)?;

    let has_framing = config.has("Prefix") || config.has("Postfix");
    let prefix = config.get_string("Prefix", "")?.into_bytes();
    let postfix = config
        .get_string("Postfix", if has_framing { "" } else { "\n" })?
        .into_bytes();

    Ok(PluginInstance::Formatter(Box::new(Envelope::new(
        base, prefix, postfix,
    ))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forward::Forward;
    use bytes::Bytes;

    #[test]
    fn test_envelope_framing() {
        let mut formatter = Envelope::new(
            Box::new(Forward::default()),
            b"[".to_vec(),
            b"]".to_vec(),
        );
        let msg = Message::new(Bytes::from_static(b"body"), StreamId::from_name("s"), 0);

        let (data, _) = formatter.format(&msg);
        assert_eq!(&data[..], b"[body]");
    }

    #[test]
    fn test_empty_framing_is_identity() {
        let mut formatter = Envelope::new(Box::new(Forward::default()), vec![], vec![]);
        let msg = Message::new(Bytes::from_static(b"body"), StreamId::from_name("s"), 0);

        let (data, _) = formatter.format(&msg);
        assert_eq!(&data[..], b"body");
    }
}
