//! Streams - named logical channels and the routing fabric
//!
//! A stream is a 64-bit id (FNV-1a of its name) plus the producers
//! subscribed to it and a dispatch policy. The registry owns the name↔id
//! mapping in both directions and performs delivery, including the drop
//! path for messages a producer cannot accept.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock};

use sluice_metrics::MetricsRegistry;

use crate::handle::ProducerHandle;
use crate::message::Message;

/// Messages routed to at least one producer
pub const METRIC_ROUTED: &str = "Routing:Routed";
/// Messages rerouted to a drop stream after a failed enqueue
pub const METRIC_DROPPED: &str = "Routing:Dropped";
/// Messages discarded because no producer could receive them
pub const METRIC_DISCARDED: &str = "Routing:Discarded";

/// Bound on reroute steps per delivery, so misconfigured drop chains
/// terminate instead of cycling.
const MAX_ROUTE_HOPS: usize = 4;

/// Stable 64-bit stream identifier
///
/// Ids are the FNV-1a hash of the stream name, so they are identical across
/// processes and restarts and can be embedded in spool segments. The hash is
/// spelled out as a const fn because the id is part of the on-disk format.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId(u64);

impl StreamId {
    /// Name of the wildcard stream: producers bound to it receive messages
    /// from any stream not otherwise matched
    pub const WILDCARD_NAME: &'static str = "*";
    /// Name of the default drop sink
    pub const DROPPED_NAME: &'static str = "_DROPPED_";
    /// Name of the pipeline's internal self-logging stream
    pub const INTERNAL_NAME: &'static str = "_SLUICE_";

    /// Wildcard stream id
    pub const WILDCARD: StreamId = StreamId::from_name(Self::WILDCARD_NAME);
    /// Default drop sink id
    pub const DROPPED: StreamId = StreamId::from_name(Self::DROPPED_NAME);
    /// Internal self-logging stream id
    pub const INTERNAL: StreamId = StreamId::from_name(Self::INTERNAL_NAME);

    /// Hash a stream name into its id (FNV-1a, 64 bit)
    pub const fn from_name(name: &str) -> Self {
        let bytes = name.as_bytes();
        let mut hash = 0xcbf2_9ce4_8422_2325u64;
        let mut i = 0;
        while i < bytes.len() {
            hash ^= bytes[i] as u64;
            hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
            i += 1;
        }
        StreamId(hash)
    }

    /// Wrap a raw id (spool replay)
    #[inline]
    pub const fn from_raw(raw: u64) -> Self {
        StreamId(raw)
    }

    /// The raw 64-bit value (spool persistence)
    #[inline]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Debug for StreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StreamId({:#018x})", self.0)
    }
}

impl std::fmt::Display for StreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

/// A dispatch decision made by a stream plugin
///
/// Plugins decide; the registry performs the sends. This keeps plugin
/// implementations synchronous and lock-free.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Deliver to every subscribed producer
    Broadcast,
    /// Deliver to the producer at this subscriber index (wrapped mod count)
    One(usize),
    /// Re-address the message to another stream before delivery
    Reroute(StreamId),
    /// Swallow the message
    Discard,
}

/// Dispatch policy attached to a stream
///
/// Plugins bind their configuration at construction, through their factory;
/// at dispatch time they only decide, and the registry performs the sends.
pub trait StreamPlugin: Send + Sync {
    /// Decide how `msg` reaches the `subscribers` currently bound producers
    ///
    /// `subscribers` is always ≥ 1; streams without producers never reach
    /// their plugin.
    fn dispatch(&self, msg: &Message, subscribers: usize) -> Dispatch;
}

/// Default policy: deliver to every subscriber
struct FanoutDispatch;

impl StreamPlugin for FanoutDispatch {
    fn dispatch(&self, _msg: &Message, _subscribers: usize) -> Dispatch {
        Dispatch::Broadcast
    }
}

struct StreamEntry {
    name: String,
    plugin: Box<dyn StreamPlugin>,
    producers: Vec<ProducerHandle>,
}

/// Bidirectional stream registry and routing fabric
///
/// # Concurrency
///
/// The stream table is read-mostly after wiring. `dispatch` resolves the
/// plan and clones the selected handles under a short read lock, then
/// performs all channel sends outside it.
pub struct StreamRegistry {
    streams: RwLock<HashMap<StreamId, StreamEntry>>,
    metrics: Arc<MetricsRegistry>,
}

impl StreamRegistry {
    /// Create a registry with the reserved streams pre-registered
    pub fn new(metrics: Arc<MetricsRegistry>) -> Self {
        let registry = Self {
            streams: RwLock::new(HashMap::new()),
            metrics,
        };
        registry.register_stream(StreamId::WILDCARD_NAME);
        registry.register_stream(StreamId::DROPPED_NAME);
        registry.register_stream(StreamId::INTERNAL_NAME);
        registry
    }

    /// The metrics registry this fabric reports into
    #[inline]
    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    /// Register a stream by name, returning its id
    ///
    /// Idempotent; the first registration installs the default broadcast
    /// dispatch policy.
    pub fn register_stream(&self, name: &str) -> StreamId {
        let id = StreamId::from_name(name);
        let mut streams = self.streams.write().expect("stream table poisoned");
        streams.entry(id).or_insert_with(|| StreamEntry {
            name: name.to_string(),
            plugin: Box::new(FanoutDispatch),
            producers: Vec::new(),
        });
        id
    }

    /// Resolve an id back to its registered name
    pub fn stream_name(&self, id: StreamId) -> Option<String> {
        let streams = self.streams.read().expect("stream table poisoned");
        streams.get(&id).map(|e| e.name.clone())
    }

    /// Replace the dispatch policy of a stream
    pub fn set_stream_plugin(&self, name: &str, plugin: Box<dyn StreamPlugin>) -> StreamId {
        let id = self.register_stream(name);
        let mut streams = self.streams.write().expect("stream table poisoned");
        if let Some(entry) = streams.get_mut(&id) {
            entry.plugin = plugin;
        }
        id
    }

    /// Subscribe a producer to a stream
    ///
    /// Subscribing to [`StreamId::WILDCARD`] binds the producer to any
    /// stream not otherwise matched.
    pub fn subscribe(&self, stream: StreamId, handle: ProducerHandle) {
        let mut streams = self.streams.write().expect("stream table poisoned");
        if let Some(entry) = streams.get_mut(&stream) {
            tracing::debug!(
                stream = %entry.name,
                plugin = %handle.id(),
                "producer subscribed"
            );
            entry.producers.push(handle);
        } else {
            tracing::warn!(
                stream = %stream,
                plugin = %handle.id(),
                "subscribe to unregistered stream ignored"
            );
        }
    }

    /// Number of producers bound to a stream
    pub fn producer_count(&self, stream: StreamId) -> usize {
        let streams = self.streams.read().expect("stream table poisoned");
        streams.get(&stream).map(|e| e.producers.len()).unwrap_or(0)
    }

    /// Re-address a message and deliver it
    pub async fn route(&self, mut msg: Message, target: StreamId) {
        msg.route(target);
        self.dispatch(msg).await;
    }

    /// Deliver a message according to its stream's dispatch policy
    ///
    /// Falls back to the wildcard stream when the target has no producers;
    /// messages nothing can receive are discarded with a counter. Failed
    /// enqueues reroute to the owning producer's drop stream, bounded by
    /// [`MAX_ROUTE_HOPS`] so drop chains cannot cycle.
    pub async fn dispatch(&self, msg: Message) {
        let mut pending: VecDeque<(Message, usize)> = VecDeque::new();
        pending.push_back((msg, 0));

        while let Some((mut msg, hops)) = pending.pop_front() {
            if hops >= MAX_ROUTE_HOPS {
                tracing::warn!(
                    stream = %msg.stream_id(),
                    sequence = msg.sequence,
                    "routing hop limit reached, discarding"
                );
                self.metrics.inc(METRIC_DISCARDED);
                continue;
            }

            let plan = self.plan(&msg);

            match plan {
                Plan::Discard => {
                    self.metrics.inc(METRIC_DISCARDED);
                }
                Plan::Reroute(target) => {
                    if target == msg.stream_id() {
                        self.metrics.inc(METRIC_DISCARDED);
                        continue;
                    }
                    msg.route(target);
                    pending.push_back((msg, hops + 1));
                }
                Plan::Deliver(handles) => {
                    self.metrics.inc(METRIC_ROUTED);

                    let last = handles.len() - 1;
                    for (i, handle) in handles.iter().enumerate() {
                        let out = if i == last {
                            // hand over the original without cloning
                            std::mem::replace(
                                &mut msg,
                                Message::new(bytes::Bytes::new(), StreamId::DROPPED, 0),
                            )
                        } else {
                            msg.clone()
                        };

                        if let Err(err) = handle.enqueue(out).await {
                            let mut failed = err.into_message();
                            let drop_target = handle.drop_stream();

                            if failed.stream_id() == drop_target {
                                // already on its drop stream, nowhere to go
                                self.metrics.inc(METRIC_DISCARDED);
                                continue;
                            }

                            tracing::debug!(
                                plugin = %handle.id(),
                                stream = %failed.stream_id(),
                                sequence = failed.sequence,
                                "enqueue failed, taking drop path"
                            );
                            self.metrics.inc(METRIC_DROPPED);
                            failed.route(drop_target);
                            pending.push_back((failed, hops + 1));
                        }
                    }
                }
            }
        }
    }

    /// Resolve a delivery plan under the read lock
    fn plan(&self, msg: &Message) -> Plan {
        let streams = self.streams.read().expect("stream table poisoned");

        let entry = streams
            .get(&msg.stream_id())
            .filter(|e| !e.producers.is_empty())
            .or_else(|| {
                streams
                    .get(&StreamId::WILDCARD)
                    .filter(|e| !e.producers.is_empty())
            });

        let Some(entry) = entry else {
            return Plan::Discard;
        };

        match entry.plugin.dispatch(msg, entry.producers.len()) {
            Dispatch::Broadcast => Plan::Deliver(entry.producers.clone()),
            Dispatch::One(index) => {
                let handle = entry.producers[index % entry.producers.len()].clone();
                Plan::Deliver(vec![handle])
            }
            Dispatch::Reroute(target) => Plan::Reroute(target),
            Dispatch::Discard => Plan::Discard,
        }
    }
}

impl std::fmt::Debug for StreamRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let streams = self.streams.read().expect("stream table poisoned");
        f.debug_struct("StreamRegistry")
            .field("streams", &streams.len())
            .finish()
    }
}

enum Plan {
    Deliver(Vec<ProducerHandle>),
    Reroute(StreamId),
    Discard,
}

#[cfg(test)]
#[path = "stream_test.rs"]
mod stream_test;
