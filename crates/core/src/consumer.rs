//! Consumer lifecycle harness
//!
//! Consumers are message sources: they read from the outside world, stamp
//! each payload with a fresh sequence number and timestamp, and post it to
//! their bound streams. The base carries the shared plumbing; concrete
//! consumers drive their own read loop under a cancellation token.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use sluice_metrics::MetricsRegistry;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::PluginConfig;
use crate::control::{FinishGuard, PluginControl, StateCell};
use crate::error::Result;
use crate::message::{Message, MessageSource};
use crate::producer::ControlSender;
use crate::stream::{StreamId, StreamRegistry};
use crate::type_registry::PluginContext;

/// Messages posted by consumers
pub const METRIC_CONSUMED: &str = "Routing:Consumed";

/// Shared per-consumer source state, handed to messages as a weak reference
///
/// Producers use it to ask whether the source is blocked and to acknowledge
/// delivered sequences; the weak handle never keeps the consumer alive.
#[derive(Debug, Default)]
pub struct SourceState {
    blocked: AtomicBool,
    acked: AtomicU64,
}

impl SourceState {
    /// Mark the consumer blocked or unblocked
    pub fn set_blocked(&self, blocked: bool) {
        self.blocked.store(blocked, Ordering::Release);
    }

    /// Highest acknowledged sequence so far
    pub fn acked(&self) -> u64 {
        self.acked.load(Ordering::Acquire)
    }
}

impl MessageSource for SourceState {
    fn is_blocked(&self) -> bool {
        self.blocked.load(Ordering::Acquire)
    }

    fn notify_ack(&self, sequence: u64) {
        self.acked.fetch_max(sequence, Ordering::AcqRel);
    }
}

/// Shared consumer state and plumbing
pub struct ConsumerBase {
    id: String,
    type_name: String,
    state: Arc<StateCell>,
    streams: Vec<StreamId>,
    sequence: AtomicU64,
    source: Arc<SourceState>,

    control_tx: ControlSender,
    control_rx: Option<mpsc::UnboundedReceiver<PluginControl>>,

    fabric: Arc<StreamRegistry>,
    metrics: Arc<MetricsRegistry>,
}

impl ConsumerBase {
    /// Bind the common consumer options and build the base
    pub fn configure(config: &mut PluginConfig, ctx: &PluginContext) -> Result<Self> {
        let streams = config
            .streams_or_wildcard()
            .iter()
            .map(|name| ctx.streams.register_stream(name))
            .collect();

        let (control_tx, control_rx) = mpsc::unbounded_channel();

        Ok(Self {
            id: if config.id().is_empty() {
                config.type_name().to_string()
            } else {
                config.id().to_string()
            },
            type_name: config.type_name().to_string(),
            state: Arc::new(StateCell::new()),
            streams,
            sequence: AtomicU64::new(0),
            source: Arc::new(SourceState::default()),
            control_tx,
            control_rx: Some(control_rx),
            fabric: Arc::clone(&ctx.streams),
            metrics: Arc::clone(&ctx.metrics),
        })
    }

    /// Instance id (user `ID`, falling back to the type name)
    #[inline]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Dotted plugin type
    #[inline]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Shared lifecycle state cell
    #[inline]
    pub fn state(&self) -> &Arc<StateCell> {
        &self.state
    }

    /// Streams this consumer posts to
    #[inline]
    pub fn streams(&self) -> &[StreamId] {
        &self.streams
    }

    /// This consumer's source state (blocked flag, ack watermark)
    #[inline]
    pub fn source(&self) -> &Arc<SourceState> {
        &self.source
    }

    /// Sender half of the control channel
    pub fn control_sender(&self) -> ControlSender {
        self.control_tx.clone()
    }

    /// Take the receiving half of the control channel
    ///
    /// Consumers select on this next to their read loop so `StopConsumer`
    /// is observed before any subsequently read data.
    pub fn take_control(&mut self) -> mpsc::UnboundedReceiver<PluginControl> {
        self.control_rx
            .take()
            .expect("consumer control already taken")
    }

    /// Stamp a payload and post it to every bound stream
    ///
    /// The sequence number is assigned once per post; fan-out to multiple
    /// streams shares it. Messages carry a weak handle to this consumer's
    /// source state.
    pub async fn post(&self, data: Bytes) {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        self.metrics.inc(METRIC_CONSUMED);

        for &stream in &self.streams {
            let source_arc: Arc<dyn MessageSource> = self.source.clone();
            let source: std::sync::Weak<dyn MessageSource> = Arc::downgrade(&source_arc);
            let msg = Message::with_source(data.clone(), stream, sequence, source);
            self.fabric.dispatch(msg).await;
        }
    }
}

impl std::fmt::Debug for ConsumerBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsumerBase")
            .field("id", &self.id)
            .field("type_name", &self.type_name)
            .field("state", &self.state.get())
            .finish()
    }
}

/// A message source plugin
#[async_trait]
pub trait Consumer: Send {
    /// Shared lifecycle state and plumbing
    fn base(&self) -> &ConsumerBase;

    /// Mutable access to the base
    fn base_mut(&mut self) -> &mut ConsumerBase;

    /// Run the consumer until cancelled or stopped via control
    async fn consume(self: Box<Self>, guard: FinishGuard, cancel: CancellationToken);
}
