//! MessageBatch - bounded double-buffered message staging
//!
//! Producers stage messages here before shipping them in bulk. The batch
//! keeps two buffers: appenders fill the active side while at most one
//! filled generation is out being flushed, so appends never wait on I/O.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::message::Message;

/// Flush seam for [`MessageBatch::close`]
///
/// Producers implement this over whatever ships their generations (a
/// transport window, a segment writer); the same implementation backs the
/// regular flush path and the shutdown flush. `flush` receives one
/// generation, delivers or drops every message in it, and hands the
/// cleared buffer back for reuse.
#[async_trait]
pub trait BatchFlusher: Send {
    /// Flush one generation, returning the cleared buffer
    async fn flush(&mut self, generation: Vec<Message>) -> Vec<Message>;
}

struct Inner {
    active: Vec<Message>,
    /// Cleared buffer handed back by the last flush, reused on the next swap
    spare: Option<Vec<Message>>,
    /// True while a filled generation is out with the flush function
    flushing: bool,
    last_append: Instant,
}

/// Fixed-capacity double-buffered batch
///
/// # Contract
///
/// - every message accepted by [`append_or_flush`](Self::append_or_flush)
///   is part of exactly one generation returned by that call or a later
///   [`try_flush`](Self::try_flush)/[`close`](Self::close)
/// - at most one generation is flushing at a time; while it is out, a full
///   active side rejects appends through the drop path rather than blocking
/// - callers return flushed buffers through
///   [`flush_done`](Self::flush_done) so allocations are reused
pub struct MessageBatch {
    capacity: usize,
    inner: Mutex<Inner>,
}

impl MessageBatch {
    /// Create a batch holding up to `capacity` messages per generation
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            inner: Mutex::new(Inner {
                active: Vec::with_capacity(capacity),
                spare: Some(Vec::with_capacity(capacity)),
                flushing: false,
                last_append: Instant::now(),
            }),
        }
    }

    /// Generation capacity
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Messages currently staged on the active side
    pub fn len(&self) -> usize {
        self.inner.lock().expect("batch lock poisoned").active.len()
    }

    /// True when nothing is staged
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True while a generation is out with the flush function
    pub fn is_flushing(&self) -> bool {
        self.inner.lock().expect("batch lock poisoned").flushing
    }

    /// Stage a message, swapping out a filled generation when needed
    ///
    /// When `can_append` is false the message goes straight to `drop_fn`.
    /// When the active side is full and no flush is in progress, the filled
    /// generation is returned and the caller must flush it (and hand the
    /// buffer back via [`flush_done`](Self::flush_done)). When a flush is
    /// still in progress the message is dropped; this path never blocks.
    pub fn append_or_flush(
        &self,
        msg: Message,
        can_append: impl FnOnce() -> bool,
        drop_fn: impl FnOnce(Message),
    ) -> Option<Vec<Message>> {
        if !can_append() {
            drop_fn(msg);
            return None;
        }

        let mut inner = self.inner.lock().expect("batch lock poisoned");

        if inner.active.len() >= self.capacity {
            if inner.flushing {
                drop(inner);
                drop_fn(msg);
                return None;
            }

            let spare = inner
                .spare
                .take()
                .unwrap_or_else(|| Vec::with_capacity(self.capacity));
            let filled = std::mem::replace(&mut inner.active, spare);
            inner.flushing = true;
            inner.active.push(msg);
            inner.last_append = Instant::now();
            return Some(filled);
        }

        inner.active.push(msg);
        inner.last_append = Instant::now();
        None
    }

    /// Swap out the active generation for flushing
    ///
    /// No-op (returns `None`) when the batch is empty or a generation is
    /// already out.
    pub fn try_flush(&self) -> Option<Vec<Message>> {
        let mut inner = self.inner.lock().expect("batch lock poisoned");

        if inner.flushing || inner.active.is_empty() {
            return None;
        }

        let spare = inner
            .spare
            .take()
            .unwrap_or_else(|| Vec::with_capacity(self.capacity));
        let filled = std::mem::replace(&mut inner.active, spare);
        inner.flushing = true;
        Some(filled)
    }

    /// Return a flushed buffer, making the batch swappable again
    pub fn flush_done(&self, mut spare: Vec<Message>) {
        spare.clear();
        let mut inner = self.inner.lock().expect("batch lock poisoned");
        inner.spare = Some(spare);
        inner.flushing = false;
    }

    /// True when the active side holds at least `count` messages
    pub fn reached_size_threshold(&self, count: usize) -> bool {
        self.inner
            .lock()
            .expect("batch lock poisoned")
            .active
            .len()
            >= count
    }

    /// True when messages are staged and none arrived for `idle`
    pub fn reached_time_threshold(&self, idle: Duration) -> bool {
        let inner = self.inner.lock().expect("batch lock poisoned");
        !inner.active.is_empty() && inner.last_append.elapsed() >= idle
    }

    /// Flush every staged generation within `budget`
    ///
    /// Each generation goes through the flusher, which returns the cleared
    /// buffer. Whatever cannot be flushed inside the budget is returned as
    /// residue for the caller's drop path; a flush that exceeds the
    /// remaining budget is abandoned (its messages are already with the
    /// transport and cannot be recovered).
    pub async fn close(&self, flush: &mut dyn BatchFlusher, budget: Duration) -> Vec<Message> {
        let deadline = Instant::now() + budget;

        while let Some(generation) = self.try_flush() {
            let now = Instant::now();
            if now >= deadline {
                self.abort_flush();
                return generation;
            }

            match tokio::time::timeout(deadline - now, flush.flush(generation)).await {
                Ok(spare) => self.flush_done(spare),
                Err(_) => {
                    tracing::warn!("batch flush exceeded shutdown budget, abandoning generation");
                    self.abort_flush();
                    return self.take_remaining();
                }
            }
        }

        self.take_remaining()
    }

    /// Remove and return everything staged on the active side
    fn take_remaining(&self) -> Vec<Message> {
        let mut inner = self.inner.lock().expect("batch lock poisoned");
        std::mem::take(&mut inner.active)
    }

    /// Unmark the flushing state without returning a buffer
    fn abort_flush(&self) {
        let mut inner = self.inner.lock().expect("batch lock poisoned");
        inner.flushing = false;
    }
}

impl std::fmt::Debug for MessageBatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock().expect("batch lock poisoned");
        f.debug_struct("MessageBatch")
            .field("capacity", &self.capacity)
            .field("staged", &inner.active.len())
            .field("flushing", &inner.flushing)
            .finish()
    }
}

#[cfg(test)]
#[path = "batch_test.rs"]
mod batch_test;
