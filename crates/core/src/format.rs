//! Formatter and filter seams
//!
//! Formatters rewrite a message's payload (and possibly its target stream)
//! right before delivery; filters veto messages before formatting. Both are
//! plugins resolved by name through the type registry, and formatters chain:
//! most wrap a base formatter named in their configuration.

use bytes::Bytes;

use crate::message::Message;
use crate::stream::StreamId;

/// Per-message payload transform
///
/// The contract is prepare-then-copy: `prepare` computes the output for one
/// message, `encoded_len` reports its size, and `copy_to` writes it into a
/// caller-provided buffer, returning the bytes written. [`format`] bundles
/// the three for callers that just want the payload.
pub trait Formatter: Send + Sync {
    /// Compute the output for `msg`
    fn prepare(&mut self, msg: &Message);

    /// Size of the prepared output in bytes
    fn encoded_len(&self) -> usize;

    /// Write the prepared output into `dest`, returning the bytes written
    ///
    /// `dest` is at least [`encoded_len`](Self::encoded_len) bytes.
    fn copy_to(&self, dest: &mut [u8]) -> usize;

    /// The stream the formatted message should be delivered on
    ///
    /// Most formatters keep the message's stream; rewriting formatters
    /// override this.
    fn target_stream(&self, msg: &Message) -> StreamId {
        msg.stream_id()
    }

    /// Prepare and materialize the output payload
    fn format(&mut self, msg: &Message) -> (Bytes, StreamId) {
        self.prepare(msg);
        let mut buf = vec![0u8; self.encoded_len()];
        let written = self.copy_to(&mut buf);
        buf.truncate(written);
        (Bytes::from(buf), self.target_stream(msg))
    }
}

impl std::fmt::Debug for dyn Formatter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Formatter").finish()
    }
}

/// Per-message veto applied before formatting
pub trait Filter: Send + Sync {
    /// True when the message may pass
    fn accepts(&self, msg: &Message) -> bool;
}
