//! Sequence - prefixes the payload with the message's sequence number

use sluice_core::{
    Formatter, Message, PluginConfig, PluginContext, PluginInstance, Result, StreamId,
    TypeRegistry,
};

/// Formats as `<sequence>:<base output>`
///
/// The base formatter is named by `SequenceDataFormatter` and defaults to
/// `format.Forward`.
pub struct Sequence {
    base: Box<dyn Formatter>,
    sequence: u64,
    prefix_len: usize,
    length: usize,
}

impl Sequence {
    /// Wrap a base formatter
    pub fn new(base: Box<dyn Formatter>) -> Self {
        Self {
            base,
            sequence: 0,
            prefix_len: 0,
            length: 0,
        }
    }
}

fn decimal_digits(value: u64) -> usize {
    if value == 0 {
        1
    } else {
        value.ilog10() as usize + 1
    }
}

impl Formatter for Sequence {
    fn prepare(&mut self, msg: &Message) {
        self.base.prepare(msg);
        self.sequence = msg.sequence;
        self.prefix_len = decimal_digits(msg.sequence) + 1;
        self.length = self.base.encoded_len() + self.prefix_len;
    }

    fn encoded_len(&self) -> usize {
        self.length
    }

    fn copy_to(&self, dest: &mut [u8]) -> usize {
        let colon = self.prefix_len - 1;
        let mut value = self.sequence;
        for slot in dest[..colon].iter_mut().rev() {
            *slot = b'0' + (value % 10) as u8;
            value /= 10;
        }
        dest[colon] = b':';

        self.prefix_len + self.base.copy_to(&mut dest[self.prefix_len..])
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
    let base_name = config.get_string("SequenceDataFormatter", "format.Forward")?;
    let base = registry.create_formatter(&base_name, config, ctx)?;
    Ok(PluginInstance::Formatter(Box::new(Sequence::new(base))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forward::Forward;
    use bytes::Bytes;

    fn prepared(payload: &'static [u8], sequence: u64) -> (Sequence, Message) {
        let mut formatter = Sequence::new(Box::new(Forward::default()));
        let msg = Message::new(Bytes::from_static(payload), StreamId::from_name("s"), sequence);
        formatter.prepare(&msg);
        (formatter, msg)
    }

    #[test]
    fn test_copy_to_writes_prefix_and_payload() {
        let (formatter, _msg) = prepared(b"hi", 42);

        assert_eq!(formatter.encoded_len(), 5);
        let mut dest = vec![0u8; formatter.encoded_len()];
        let written = formatter.copy_to(&mut dest);

        assert_eq!(written, 5);
        assert_eq!(&dest[..], b"42:hi");
    }

    #[test]
    fn test_sequence_zero() {
        let (formatter, _msg) = prepared(b"x", 0);

        let mut dest = vec![0u8; formatter.encoded_len()];
        let written = formatter.copy_to(&mut dest);

        assert_eq!(written, 3);
        assert_eq!(&dest[..], b"0:x");
    }

    #[test]
    fn test_large_sequence() {
        let (formatter, _msg) = prepared(b"log line", 1_000_000);

        let mut dest = vec![0u8; formatter.encoded_len()];
        formatter.copy_to(&mut dest);

        assert_eq!(&dest[..], b"1000000:log line");
    }

    #[test]
    fn test_format_end_to_end() {
        let mut formatter = Sequence::new(Box::new(Forward::default()));
        let msg = Message::new(Bytes::from_static(b"hi"), StreamId::from_name("s"), 9);

        let (data, stream) = formatter.format(&msg);
        assert_eq!(&data[..], b"9:hi");
        assert_eq!(stream, msg.stream_id());
    }
}
