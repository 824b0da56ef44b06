//! Producer lifecycle harness
//!
//! Every producer embeds a [`ProducerBase`]: a bounded message channel with
//! a timeout/drop policy, a control channel with priority over data, fuse
//! supervision, and the drop/format plumbing shared by all producers. The
//! base hands out a [`ProducerRunner`] event pump; producer impls drive it
//! from their `produce` task:
//!
//! ```ignore
//! async fn produce(mut self: Box<Self>, mut guard: FinishGuard) {
//!     let mut runner = self.base_mut().runner();
//!     let mut ticker = tokio::time::interval(self.flush_interval);
//!     loop {
//!         match runner.next_event(Some(&mut ticker)).await {
//!             Event::Message(msg) => self.buffer(msg),
//!             Event::Tick => self.flush_on_timeout().await,
//!             Event::FusePoll => {
//!                 if self.try_open_connection().await {
//!                     runner.rearm_fuse();
//!                 }
//!             }
//!             Event::Control(PluginControl::StopProducer) => break,
//!             Event::Control(_) => {}
//!             Event::ChannelClosed => break,
//!         }
//!     }
//!     self.close(&mut runner).await;
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use sluice_metrics::MetricsRegistry;
use tokio::sync::mpsc;
use tokio::time::Interval;

use crate::config::PluginConfig;
use crate::control::{FinishGuard, PluginControl, PluginState, StateCell};
use crate::error::Result;
use crate::format::{Filter, Formatter};
use crate::handle::ProducerHandle;
use crate::message::Message;
use crate::stream::{StreamId, StreamRegistry};
use crate::type_registry::{PluginContext, TypeRegistry};

/// Messages vetoed by a producer's filter
pub const METRIC_FILTERED: &str = "Routing:Filtered";

/// Default incoming channel capacity
const DEFAULT_CHANNEL: i64 = 8192;
/// Default shutdown flush budget in milliseconds
const DEFAULT_SHUTDOWN_TIMEOUT_MS: i64 = 3000;
/// Default fuse health-check cadence in milliseconds
const DEFAULT_FUSE_CHECK_MS: i64 = 500;
/// Hard upper bound on the fuse health-check cadence
const MAX_FUSE_CHECK: Duration = Duration::from_secs(1);

/// Sender half of a plugin's control channel
pub type ControlSender = mpsc::UnboundedSender<PluginControl>;

/// One observation from the producer event pump
#[derive(Debug)]
pub enum Event {
    /// A data message passed the filter
    Message(Message),
    /// The ticker fired
    Tick,
    /// A control message; state transitions already happened
    Control(PluginControl),
    /// The fuse is blown and the health check is due
    FusePoll,
    /// The message channel closed (all senders gone)
    ChannelClosed,
}

/// Shared producer state and plumbing
///
/// Built once in the producer's constructor via [`ProducerBase::configure`],
/// which binds the common options (`Channel`, `ChannelTimeoutMs`,
/// `ShutdownTimeoutMs`, `DropStream`, `Formatter`, `Filter`, `Stream`).
pub struct ProducerBase {
    id: String,
    type_name: String,
    state: Arc<StateCell>,
    streams: Vec<StreamId>,
    drop_stream: StreamId,
    shutdown_timeout: Duration,
    enqueue_timeout: Option<Duration>,
    fuse_poll: Duration,

    message_tx: mpsc::Sender<Message>,
    message_rx: Option<mpsc::Receiver<Message>>,
    control_tx: ControlSender,
    control_rx: Option<mpsc::UnboundedReceiver<PluginControl>>,

    fabric: Arc<StreamRegistry>,
    metrics: Arc<MetricsRegistry>,

    formatter: Option<Box<dyn Formatter>>,
    filter: Option<Box<dyn Filter>>,
}

impl ProducerBase {
    /// Bind the common producer options and build the base
    pub fn configure(
        registry: &TypeRegistry,
        config: &mut PluginConfig,
        ctx: &PluginContext,
    ) -> Result<Self> {
        let capacity = config.get_int("Channel", DEFAULT_CHANNEL)?.max(1) as usize;
        let enqueue_timeout = config.get_timeout_ms("ChannelTimeoutMs", 0)?;
        let shutdown_timeout = config
            .get_timeout_ms("ShutdownTimeoutMs", DEFAULT_SHUTDOWN_TIMEOUT_MS)?
            .unwrap_or(Duration::from_millis(DEFAULT_SHUTDOWN_TIMEOUT_MS as u64));
        let fuse_poll = config
            .get_timeout_ms("FuseCheckIntervalMs", DEFAULT_FUSE_CHECK_MS)?
            .unwrap_or(Duration::from_millis(DEFAULT_FUSE_CHECK_MS as u64))
            .min(MAX_FUSE_CHECK);

        let drop_name = config.get_string("DropStream", StreamId::DROPPED_NAME)?;
        let drop_stream = ctx.streams.register_stream(&drop_name);

        let streams = config
            .streams_or_wildcard()
            .iter()
            .map(|name| ctx.streams.register_stream(name))
            .collect();

        let formatter = match config.get_string("Formatter", "")? {
            name if name.is_empty() => None,
            name => Some(registry.create_formatter(&name, config, ctx)?),
        };
        let filter = match config.get_string("Filter", "")? {
            name if name.is_empty() => None,
            name => Some(registry.create_filter(&name, config, ctx)?),
        };

        let (message_tx, message_rx) = mpsc::channel(capacity);
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
            drop_stream,
            shutdown_timeout,
            enqueue_timeout,
            fuse_poll,
            message_tx,
            message_rx: Some(message_rx),
            control_tx,
            control_rx: Some(control_rx),
            fabric: Arc::clone(&ctx.streams),
            metrics: Arc::clone(&ctx.metrics),
            formatter,
            filter,
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

    /// Streams this producer binds to
    #[inline]
    pub fn streams(&self) -> &[StreamId] {
        &self.streams
    }

    /// Where this producer's rejected messages go
    #[inline]
    pub fn drop_stream(&self) -> StreamId {
        self.drop_stream
    }

    /// Budget for the graceful shutdown flush
    #[inline]
    pub fn shutdown_timeout(&self) -> Duration {
        self.shutdown_timeout
    }

    /// The routing fabric
    #[inline]
    pub fn fabric(&self) -> &Arc<StreamRegistry> {
        &self.fabric
    }

    /// The metrics registry
    #[inline]
    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    /// Sender half of the control channel
    pub fn control_sender(&self) -> ControlSender {
        self.control_tx.clone()
    }

    /// Enqueue handle for the routing fabric
    pub fn handle(&self) -> ProducerHandle {
        ProducerHandle::new(
            self.id.clone(),
            self.message_tx.clone(),
            self.enqueue_timeout,
            self.drop_stream,
        )
    }

    /// Apply the configured formatter to a message
    ///
    /// Without a formatter the payload passes through unchanged on the
    /// message's current stream.
    pub fn format(&mut self, msg: &Message) -> (Bytes, StreamId) {
        match &mut self.formatter {
            Some(formatter) => formatter.format(msg),
            None => (msg.data.clone(), msg.stream_id()),
        }
    }

    /// Route a message to this producer's drop stream
    ///
    /// Messages already on the drop stream are discarded by the fabric.
    pub async fn drop_message(&self, mut msg: Message) {
        if msg.stream_id() == self.drop_stream {
            self.metrics.inc(crate::stream::METRIC_DISCARDED);
            return;
        }
        self.metrics.inc(crate::stream::METRIC_DROPPED);
        msg.route(self.drop_stream);
        self.fabric.dispatch(msg).await;
    }

    /// Take the receiving halves and build the event pump
    ///
    /// Marks the producer `Active`. Callable once; the runner owns the
    /// channel receivers from here on.
    pub fn runner(&mut self) -> ProducerRunner {
        let messages = self
            .message_rx
            .take()
            .expect("producer runner already taken");
        let control = self
            .control_rx
            .take()
            .expect("producer runner already taken");

        self.state.set(PluginState::Active);
        tracing::info!(plugin = %self.id, type_name = %self.type_name, "producer starting");

        ProducerRunner {
            id: self.id.clone(),
            messages,
            control,
            state: Arc::clone(&self.state),
            fuse_poll: self.fuse_poll,
            filter: self.filter.take(),
            metrics: Arc::clone(&self.metrics),
        }
    }

    /// Arm the finish guard's stop hook and log the start of shutdown
    ///
    /// The hook runs exactly once when the worker finishes, panics
    /// included.
    pub fn set_stop_callback(&self, guard: &mut FinishGuard, hook: impl FnOnce() + Send + 'static) {
        let id = self.id.clone();
        guard.set_stop_hook(move || {
            tracing::debug!(plugin = %id, "stop callback");
            hook();
        });
    }
}

impl std::fmt::Debug for ProducerBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProducerBase")
            .field("id", &self.id)
            .field("type_name", &self.type_name)
            .field("state", &self.state.get())
            .finish()
    }
}

/// Event pump owning a producer's channel receivers
///
/// Control is observed before data in every variant; while the fuse is
/// blown the data arm is disabled, so incoming messages queue in the
/// channel (and overflow through the enqueue timeout to the drop path).
pub struct ProducerRunner {
    id: String,
    messages: mpsc::Receiver<Message>,
    control: mpsc::UnboundedReceiver<PluginControl>,
    state: Arc<StateCell>,
    fuse_poll: Duration,
    filter: Option<Box<dyn Filter>>,
    metrics: Arc<MetricsRegistry>,
}

impl ProducerRunner {
    /// Wait for the next event
    ///
    /// Pass a ticker to get [`Event::Tick`] at its cadence (the ticker
    /// variants of the loop); pass `None` for a pure message/control loop.
    pub async fn next_event(&mut self, mut ticker: Option<&mut Interval>) -> Event {
        loop {
            if self.state.get() == PluginState::WaitingForFuse {
                tokio::select! {
                    biased;
                    ctrl = self.control.recv() => match ctrl {
                        Some(c) => return self.on_control(c),
                        None => return Event::ChannelClosed,
                    },
                    _ = tokio::time::sleep(self.fuse_poll) => return Event::FusePoll,
                }
            }

            let event = match ticker.as_mut() {
                Some(tick) => {
                    tokio::select! {
                        biased;
                        ctrl = self.control.recv() => match ctrl {
                            Some(c) => self.on_control(c),
                            None => Event::ChannelClosed,
                        },
                        _ = tick.tick() => Event::Tick,
                        msg = self.messages.recv() => match msg {
                            Some(m) => Event::Message(m),
                            None => Event::ChannelClosed,
                        },
                    }
                }
                None => {
                    tokio::select! {
                        biased;
                        ctrl = self.control.recv() => match ctrl {
                            Some(c) => self.on_control(c),
                            None => Event::ChannelClosed,
                        },
                        msg = self.messages.recv() => match msg {
                            Some(m) => Event::Message(m),
                            None => Event::ChannelClosed,
                        },
                    }
                }
            };

            if let Event::Message(msg) = event {
                if let Some(filter) = &self.filter {
                    if !filter.accepts(&msg) {
                        self.metrics.inc(METRIC_FILTERED);
                        continue;
                    }
                }
                return Event::Message(msg);
            }

            return event;
        }
    }

    /// Rearm a blown fuse after a successful health check
    pub fn rearm_fuse(&self) {
        if self.state.get() == PluginState::WaitingForFuse {
            self.state.set(PluginState::Active);
            tracing::info!(plugin = %self.id, "fuse rearmed");
        }
    }

    /// Current number of messages queued in the channel
    #[inline]
    pub fn queued(&self) -> usize {
        self.messages.len()
    }

    /// Close the channel and feed every queued message to `terminal`
    ///
    /// Part of the shutdown sequence: after this no further enqueues
    /// succeed, and the terminal handler (typically buffer-then-flush or
    /// straight drop) sees everything that was still in flight.
    pub fn drain(&mut self, mut terminal: impl FnMut(Message)) {
        self.messages.close();
        while let Ok(msg) = self.messages.try_recv() {
            terminal(msg);
        }
    }

    fn on_control(&mut self, ctrl: PluginControl) -> Event {
        match ctrl {
            PluginControl::StopProducer => {
                tracing::debug!(plugin = %self.id, "stop requested");
                self.state.set(PluginState::Stopping);
            }
            PluginControl::FuseBurn => {
                if self.state.get() == PluginState::Active {
                    tracing::warn!(plugin = %self.id, "fuse burned");
                    self.state.set(PluginState::WaitingForFuse);
                }
            }
            PluginControl::FuseActive => self.rearm_fuse(),
            PluginControl::StopConsumer | PluginControl::Roll => {}
        }
        Event::Control(ctrl)
    }
}

/// A message sink plugin
#[async_trait]
pub trait Producer: Send {
    /// Shared lifecycle state and plumbing
    fn base(&self) -> &ProducerBase;

    /// Mutable access to the base (for [`ProducerBase::runner`])
    fn base_mut(&mut self) -> &mut ProducerBase;

    /// Run the producer until stopped
    ///
    /// The guard signals the worker group when the task finishes and runs
    /// the stop callback exactly once, panics included.
    async fn produce(self: Box<Self>, guard: FinishGuard);
}

#[cfg(test)]
#[path = "producer_test.rs"]
mod producer_test;
