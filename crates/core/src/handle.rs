//! Producer handle - the fabric's sending side of a producer
//!
//! `ProducerHandle` wraps a producer's message channel sender together with
//! its backpressure policy, letting streams enqueue messages without knowing
//! the producer's concrete type.

use std::time::Duration;

use tokio::sync::mpsc;

use crate::message::Message;
use crate::stream::StreamId;

/// Result of a failed enqueue, carrying the message back to the caller
#[derive(Debug)]
pub enum EnqueueError {
    /// The channel stayed full past the producer's enqueue timeout
    Timeout(Message),
    /// The producer's receiving side is gone
    Closed(Message),
}

impl EnqueueError {
    /// Recover the message for the drop path
    pub fn into_message(self) -> Message {
        match self {
            EnqueueError::Timeout(msg) | EnqueueError::Closed(msg) => msg,
        }
    }
}

/// Handle for enqueueing messages into a producer
///
/// # Design
///
/// - Wraps `mpsc::Sender<Message>`; cloning is cheap and handles are cloned
///   out of the stream registry before any await
/// - Carries the producer's enqueue timeout: `None` blocks until capacity,
///   `Some(0)` never waits, `Some(d)` waits up to `d` before reporting a
///   timeout
/// - Carries the producer's drop-stream target so the fabric can reroute
///   messages the producer could not accept
#[derive(Clone)]
pub struct ProducerHandle {
    /// Plugin instance id (for logging)
    id: String,

    /// Producer's bounded message channel
    sender: mpsc::Sender<Message>,

    /// Max wait before an enqueue gives up
    enqueue_timeout: Option<Duration>,

    /// Where rejected messages are rerouted
    drop_stream: StreamId,
}

impl ProducerHandle {
    /// Create a handle for a producer's message channel
    pub fn new(
        id: impl Into<String>,
        sender: mpsc::Sender<Message>,
        enqueue_timeout: Option<Duration>,
        drop_stream: StreamId,
    ) -> Self {
        Self {
            id: id.into(),
            sender,
            enqueue_timeout,
            drop_stream,
        }
    }

    /// The plugin instance id this handle feeds
    #[inline]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The stream rejected messages are rerouted to
    #[inline]
    pub fn drop_stream(&self) -> StreamId {
        self.drop_stream
    }

    /// Remaining capacity of the producer's channel
    #[inline]
    pub fn capacity(&self) -> usize {
        self.sender.capacity()
    }

    /// Whether the producer's receiving side is gone
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Enqueue a message, honoring the producer's timeout policy
    ///
    /// Blocks up to the configured timeout (or indefinitely when no timeout
    /// is set). On failure the message is handed back inside the error so
    /// the caller can take the drop path.
    pub async fn enqueue(&self, msg: Message) -> Result<(), EnqueueError> {
        match self.enqueue_timeout {
            None => self
                .sender
                .send(msg)
                .await
                .map_err(|e| EnqueueError::Closed(e.0)),
            Some(timeout) if timeout.is_zero() => {
                self.sender.try_send(msg).map_err(|e| match e {
                    mpsc::error::TrySendError::Full(m) => EnqueueError::Timeout(m),
                    mpsc::error::TrySendError::Closed(m) => EnqueueError::Closed(m),
                })
            }
            Some(timeout) => self
                .sender
                .send_timeout(msg, timeout)
                .await
                .map_err(|e| match e {
                    mpsc::error::SendTimeoutError::Timeout(m) => EnqueueError::Timeout(m),
                    mpsc::error::SendTimeoutError::Closed(m) => EnqueueError::Closed(m),
                }),
        }
    }
}

impl std::fmt::Debug for ProducerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProducerHandle")
            .field("id", &self.id)
            .field("drop_stream", &self.drop_stream)
            .field("closed", &self.is_closed())
            .finish()
    }
}
