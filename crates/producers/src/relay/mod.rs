//! Relay producer - batched delivery with an adaptive window
//!
//! Buffers messages into a batch and ships them through a
//! [`RelayTransport`] in windows. A throttling remote (`TryLater`) halves
//! the window down to 1; full drains grow it back by half the remaining
//! gap. Transport failures close the connection, burn the fuse, and drop
//! the unshipped suffix; the fuse health check is the reconnect attempt.
//!
//! Configuration example:
//!
//! ```toml
//! [[plugin]]
//! type = "producer.Relay"
//! Stream = ["console", "_SLUICE_"]
//! Address = "localhost:1463"
//! ConnectionBufferSizeKB = 1024
//! BatchMaxCount = 8192
//! BatchFlushCount = 4096
//! BatchTimeoutSec = 5
//!
//! [plugin.Category]
//! console = "console"
//! ```
//!
//! `Category` maps streams to remote categories; a wildcard entry catches
//! everything unmapped, and without one the stream name is used.

mod transport;

pub use transport::{RelayEntry, RelayTransport, ShipOutcome, TcpRelayTransport};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use sluice_core::{
    BatchFlusher, Event, FinishGuard, Message, MessageBatch, PluginConfig, PluginContext,
    PluginControl, PluginInstance, Producer, ProducerBase, ProducerRunner, Result, StreamId,
    TypeRegistry,
};

const METRIC_MESSAGES: &str = "Relay:Messages-";
const METRIC_MESSAGES_SEC: &str = "Relay:MessagesSec-";
const METRIC_WINDOW_SIZE: &str = "Relay:WindowSize";

/// Bounded retries while the remote throttles
const MAX_RETRIES: usize = 30;
/// Total sleep budget spread over the retries
const MAX_SLEEP: Duration = Duration::from_millis(3000);

/// Batched delivery producer
pub struct Relay {
    base: ProducerBase,
    transport: Box<dyn RelayTransport>,
    batch: MessageBatch,
    batch_timeout: Duration,
    batch_flush_count: usize,
    window_size: usize,
    categories: HashMap<StreamId, String>,
    counters: HashMap<String, i64>,
    last_metric_update: Instant,
}

impl Relay {
    /// Build and bind a relay producer from its record
    pub fn configure(
        registry: &TypeRegistry,
        config: &mut PluginConfig,
        ctx: &PluginContext,
    ) -> Result<Self> {
        let address = config.get_string("Address", "localhost:1463")?;
        let buffer_size = (config.get_int("ConnectionBufferSizeKB", 1 << 10)? as usize) << 10;
        let transport = Box::new(TcpRelayTransport::new(address, buffer_size));
        Self::with_transport(registry, config, ctx, transport)
    }

    /// Build with an injected transport (tests, alternate protocols)
    pub fn with_transport(
        registry: &TypeRegistry,
        config: &mut PluginConfig,
        ctx: &PluginContext,
        transport: Box<dyn RelayTransport>,
    ) -> Result<Self> {
        let base = ProducerBase::configure(registry, config, ctx)?;

        let batch_max_count = config.get_int("BatchMaxCount", 8192)?.max(1) as usize;
        let batch_flush_count = config
            .get_int("BatchFlushCount", (batch_max_count / 2) as i64)?
            .max(1) as usize;
        let batch_flush_count = batch_flush_count.min(batch_max_count);
        let batch_timeout = Duration::from_secs(config.get_uint("BatchTimeoutSec", 5)?.max(1));

        let categories = config.get_stream_map("Category", "")?;

        let metrics = base.metrics();
        metrics.set_f(METRIC_WINDOW_SIZE, batch_max_count as f64);
        let mut counters = HashMap::new();
        for category in categories.values() {
            metrics.new_counter(&format!("{METRIC_MESSAGES}{category}"));
            metrics.new_gauge(&format!("{METRIC_MESSAGES_SEC}{category}"));
            counters.insert(category.clone(), 0);
        }

        Ok(Self {
            base,
            transport,
            batch: MessageBatch::new(batch_max_count),
            batch_timeout,
            batch_flush_count,
            window_size: batch_max_count,
            categories,
            counters,
            last_metric_update: Instant::now(),
        })
    }

    /// Resolve a stream to its remote category
    ///
    /// Explicit mapping, then the wildcard entry, then the stream name.
    fn category_for(&mut self, stream: StreamId) -> String {
        if let Some(category) = self.categories.get(&stream) {
            return category.clone();
        }

        let category = match self.categories.get(&StreamId::WILDCARD) {
            Some(wildcard) => wildcard.clone(),
            None => self
                .base
                .fabric()
                .stream_name(stream)
                .unwrap_or_else(|| format!("{:016x}", stream.raw())),
        };

        self.base
            .metrics()
            .new_counter(&format!("{METRIC_MESSAGES}{category}"));
        self.base
            .metrics()
            .new_gauge(&format!("{METRIC_MESSAGES_SEC}{category}"));
        self.counters.entry(category.clone()).or_insert(0);
        self.categories.insert(stream, category.clone());
        category
    }

    async fn buffer_message(&mut self, msg: Message) {
        let state = Arc::clone(self.base.state());
        let mut rejected = None;
        let generation = self.batch.append_or_flush(
            msg,
            || state.is_active_or_stopping(),
            |m| rejected = Some(m),
        );

        if let Some(m) = rejected {
            self.base.drop_message(m).await;
        }
        if let Some(generation) = generation {
            let spare = self.ship_generation(generation).await;
            self.batch.flush_done(spare);
        }
    }

    /// Tick: publish per-category counters and flush on thresholds
    async fn send_batch_on_timeout(&mut self) {
        let elapsed = self
            .last_metric_update
            .elapsed()
            .as_secs_f64()
            .max(f64::EPSILON);
        self.last_metric_update = Instant::now();

        for (category, count) in self.counters.iter_mut() {
            let taken = std::mem::take(count);
            let metrics = self.base.metrics();
            metrics.add(&format!("{METRIC_MESSAGES}{category}"), taken);
            metrics.set_f(
                &format!("{METRIC_MESSAGES_SEC}{category}"),
                taken as f64 / elapsed,
            );
        }

        if self.batch.reached_time_threshold(self.batch_timeout)
            || self.batch.reached_size_threshold(self.batch_flush_count)
        {
            self.send_batch().await;
        }
    }

    async fn send_batch(&mut self) {
        if self.try_open_connection().await {
            if let Some(generation) = self.batch.try_flush() {
                let spare = self.ship_generation(generation).await;
                self.batch.flush_done(spare);
            }
        } else if self.base.state().is_stopping() {
            // no connection and shutting down: the batch can only drain to
            // the drop path
            if let Some(generation) = self.batch.try_flush() {
                let spare = self.drop_suffix(generation, 0).await;
                self.batch.flush_done(spare);
            }
        }
    }

    /// Open the connection if needed, rearming the fuse on success and
    /// burning it on failure
    async fn try_open_connection(&mut self) -> bool {
        if self.transport.is_open() {
            return true;
        }

        match self.transport.open().await {
            Ok(()) => {
                let _ = self.base.control_sender().send(PluginControl::FuseActive);
                true
            }
            Err(e) => {
                tracing::error!(
                    plugin = %self.base.id(),
                    error = %e,
                    "relay connection failed"
                );
                if !self.base.state().is_stopping() {
                    let _ = self.base.control_sender().send(PluginControl::FuseBurn);
                }
                false
            }
        }
    }

    /// Ship one generation through the adaptive window
    ///
    /// Returns the cleared buffer for [`MessageBatch::flush_done`];
    /// unshipped messages have taken the drop path by then.
    async fn ship_generation(&mut self, mut generation: Vec<Message>) -> Vec<Message> {
        let mut entries = Vec::with_capacity(generation.len());
        for msg in &generation {
            let (payload, stream) = self.base.format(msg);
            let category = self.category_for(stream);
            *self.counters.entry(category.clone()).or_insert(0) += 1;
            entries.push(RelayEntry { category, payload });
        }

        let total = entries.len();
        let mut idx_start = 0;
        let mut retries = 0;

        while retries < MAX_RETRIES {
            let idx_end = total.min(idx_start + self.window_size);

            match self.transport.ship(&entries[idx_start..idx_end]).await {
                ShipOutcome::Delivered => {
                    idx_start = idx_end;
                    if idx_start < total {
                        retries = 0;
                        continue;
                    }
                    // grow the window on a full drain so it cannot stay
                    // pinned at 1; already-full windows stay put
                    if self.window_size < total {
                        self.window_size += (total - self.window_size) / 2;
                        self.base
                            .metrics()
                            .set_f(METRIC_WINDOW_SIZE, self.window_size as f64);
                    }
                    generation.clear();
                    return generation;
                }
                ShipOutcome::TryLater => {
                    self.window_size = (self.window_size / 2).max(1);
                    self.base
                        .metrics()
                        .set_f(METRIC_WINDOW_SIZE, self.window_size as f64);
                    retries += 1;
                    tokio::time::sleep(MAX_SLEEP / MAX_RETRIES as u32).await;
                }
                ShipOutcome::Failed(e) => {
                    tracing::error!(
                        plugin = %self.base.id(),
                        error = %e,
                        unsent = total - idx_start,
                        "relay ship failed, reconnecting"
                    );
                    self.transport.close();
                    if !self.base.state().is_stopping() {
                        let _ = self.base.control_sender().send(PluginControl::FuseBurn);
                    }
                    return self.drop_suffix(generation, idx_start).await;
                }
            }
        }

        tracing::error!(
            plugin = %self.base.id(),
            unsent = total - idx_start,
            "relay remote stayed busy, dropping unsent messages"
        );
        self.drop_suffix(generation, idx_start).await
    }

    /// Drop every message from `from` on and hand the cleared buffer back
    async fn drop_suffix(&mut self, mut generation: Vec<Message>, from: usize) -> Vec<Message> {
        let unsent: Vec<Message> = generation.drain(from..).collect();
        generation.clear();
        for msg in unsent {
            self.base.drop_message(msg).await;
        }
        generation
    }

    async fn close(&mut self, runner: &mut ProducerRunner) {
        // late arrivals still get a shot at the final flush
        let mut queued = Vec::new();
        runner.drain(|m| queued.push(m));
        for msg in queued {
            self.buffer_message(msg).await;
        }

        let budget = self.base.shutdown_timeout();
        if self.try_open_connection().await {
            // the batch is swapped out so its close can borrow the relay
            // as the flusher
            let batch = std::mem::replace(&mut self.batch, MessageBatch::new(1));
            let residue = batch.close(self, budget).await;
            for msg in residue {
                self.base.drop_message(msg).await;
            }
            self.batch = batch;
        } else {
            // no connection: staged batches can only drain to the drop path
            while let Some(generation) = self.batch.try_flush() {
                let spare = self.drop_suffix(generation, 0).await;
                self.batch.flush_done(spare);
            }
        }

        self.transport.close();
        tracing::info!(plugin = %self.base.id(), "relay producer shut down");
    }
}

#[async_trait]
impl BatchFlusher for Relay {
    async fn flush(&mut self, generation: Vec<Message>) -> Vec<Message> {
        self.ship_generation(generation).await
    }
}

#[async_trait]
impl Producer for Relay {
    fn base(&self) -> &ProducerBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ProducerBase {
        &mut self.base
    }

    async fn produce(mut self: Box<Self>, mut guard: FinishGuard) {
        let id = self.base.id().to_string();
        self.base.set_stop_callback(&mut guard, move || {
            tracing::debug!(plugin = %id, "relay stop callback");
        });

        let mut runner = self.base.runner();
        let mut ticker = tokio::time::interval(self.batch_timeout);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            match runner.next_event(Some(&mut ticker)).await {
                Event::Message(msg) => self.buffer_message(msg).await,
                Event::Tick => self.send_batch_on_timeout().await,
                Event::FusePoll => {
                    if self.try_open_connection().await {
                        runner.rearm_fuse();
                    }
                }
                Event::Control(PluginControl::StopProducer) | Event::ChannelClosed => break,
                Event::Control(_) => {}
            }
        }

        self.close(&mut runner).await;
    }
}

pub(crate) fn factory(
    registry: &TypeRegistry,
    config: &mut PluginConfig,
    ctx: &PluginContext,
) -> Result<PluginInstance> {
    Ok(PluginInstance::Producer(Box::new(Relay::configure(
        registry, config, ctx,
    )?)))
}
