//! Message - the unit that flows through the routing fabric
//!
//! A message couples an opaque payload with its routing state: the stream it
//! is currently on, the stream it came from (exactly one step of history),
//! an ingress-assigned sequence number and creation timestamp, and a weak
//! handle back to the consumer that produced it.

use std::sync::Weak;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;

use crate::stream::StreamId;

/// Back-reference from a message to its originating consumer
///
/// The fabric only ever asks two things of a source: whether it is currently
/// blocked (so batching producers can favor draining) and to acknowledge a
/// delivered sequence. The handle is weak; it never keeps a consumer alive.
pub trait MessageSource: Send + Sync {
    /// True while the consumer cannot accept acks or produce further data
    fn is_blocked(&self) -> bool {
        false
    }

    /// Notification that `sequence` reached a terminal sink
    fn notify_ack(&self, _sequence: u64) {}
}

/// A routed message
///
/// # Design
///
/// - `data` is `bytes::Bytes`: cloning a message for fan-out shares the
///   payload buffer instead of copying it
/// - the fabric never mutates `data` in place; formatters return a new
///   payload alongside a possibly new stream id
/// - `sequence` is assigned once at ingress and never rewritten
/// - `prev_stream_id` always holds the stream the message was on before the
///   most recent `route` call
#[derive(Clone)]
pub struct Message {
    /// Opaque payload
    pub data: Bytes,

    /// Stream the message is currently addressed to
    stream_id: StreamId,

    /// Stream the message was on before the last routing step
    prev_stream_id: StreamId,

    /// Monotonic per-consumer sequence number, assigned at ingress
    pub sequence: u64,

    /// Creation time, nanoseconds since the Unix epoch
    pub timestamp_ns: u64,

    /// Weak handle to the originating consumer, if any
    pub source: Option<Weak<dyn MessageSource>>,
}

impl Message {
    /// Create a message addressed to `stream_id`
    ///
    /// `prev_stream_id` starts equal to `stream_id`; it diverges on the
    /// first `route` call.
    pub fn new(data: Bytes, stream_id: StreamId, sequence: u64) -> Self {
        Self {
            data,
            stream_id,
            prev_stream_id: stream_id,
            sequence,
            timestamp_ns: now_ns(),
            source: None,
        }
    }

    /// Create a message with an explicit source handle
    pub fn with_source(
        data: Bytes,
        stream_id: StreamId,
        sequence: u64,
        source: Weak<dyn MessageSource>,
    ) -> Self {
        let mut msg = Self::new(data, stream_id, sequence);
        msg.source = Some(source);
        msg
    }

    /// Rebuild a message from persisted fields (spool replay)
    pub fn restored(
        data: Bytes,
        stream_id: StreamId,
        prev_stream_id: StreamId,
        sequence: u64,
        timestamp_ns: u64,
    ) -> Self {
        Self {
            data,
            stream_id,
            prev_stream_id,
            sequence,
            timestamp_ns,
            source: None,
        }
    }

    /// The stream this message is currently addressed to
    #[inline]
    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    /// The stream this message was on before the last routing step
    #[inline]
    pub fn prev_stream_id(&self) -> StreamId {
        self.prev_stream_id
    }

    /// Re-address the message, pushing the current stream into history
    ///
    /// After `route(s)`, `prev_stream_id()` equals the stream id immediately
    /// prior. Only one step of history is kept.
    #[inline]
    pub fn route(&mut self, stream_id: StreamId) {
        self.prev_stream_id = self.stream_id;
        self.stream_id = stream_id;
    }

    /// Replace the payload and target stream, as returned by a formatter
    #[inline]
    pub fn apply_format(&mut self, data: Bytes, stream_id: StreamId) {
        self.data = data;
        if stream_id != self.stream_id {
            self.route(stream_id);
        }
    }

    /// Whether the originating consumer reports itself blocked
    ///
    /// False when the message has no source or the consumer is gone.
    pub fn source_blocked(&self) -> bool {
        self.source
            .as_ref()
            .and_then(Weak::upgrade)
            .map(|s| s.is_blocked())
            .unwrap_or(false)
    }

    /// Acknowledge delivery to the originating consumer, if still alive
    pub fn ack(&self) {
        if let Some(source) = self.source.as_ref().and_then(Weak::upgrade) {
            source.notify_ack(self.sequence);
        }
    }
}

impl std::fmt::Debug for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Message")
            .field("stream_id", &self.stream_id)
            .field("prev_stream_id", &self.prev_stream_id)
            .field("sequence", &self.sequence)
            .field("len", &self.data.len())
            .finish()
    }
}

/// Current time as nanoseconds since the Unix epoch
pub(crate) fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
#[path = "message_test.rs"]
mod message_test;
