//! Spooling producer - disk buffering for unreachable downstreams
//!
//! Accepts messages addressed to any stream, persists them to per-stream
//! segment files keyed by the message's *prior* stream, and re-injects them
//! into that stream on an independent schedule. This is how the pipeline
//! tolerates transient downstream outages: point a producer's `DropStream`
//! at a stream this producer subscribes to, and rejected messages come back
//! once the downstream recovers.
//!
//! Configuration example:
//!
//! ```toml
//! [[plugin]]
//! type = "producer.Spooling"
//! Stream = "spool"
//! Path = "/var/spool/sluice"
//! BatchMaxCount = 100
//! BatchTimeoutSec = 5
//! MaxFileSizeMB = 512
//! MaxFileAgeMin = 1
//! ```
//!
//! A message must have been routed at least once before it can spool; when
//! a replayed message's current and prior stream coincide it is dropped,
//! which breaks the loop of a producer whose own drop target is the
//! spooler. The `Formatter` option is forced to `format.Serialize` so
//! segments always hold decodable records. Reading starts only after a
//! segment rotates (`MaxFileSizeMB` / `MaxFileAgeMin`); the replay cadence
//! is half the age bound. This producer does not burn a fuse.

mod spool_file;

pub use spool_file::SpoolFile;

use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use sluice_core::{
    codec, BatchFlusher, CoreError, Event, FinishGuard, Message, MessageBatch, PluginConfig,
    PluginContext, PluginControl, PluginInstance, Producer, ProducerBase, ProducerRunner, Result,
    StreamId, TypeRegistry,
};

const METRIC_WRITE: &str = "Spooling:Write-";
const METRIC_READ: &str = "Spooling:Read-";
const METRIC_WRITE_SEC: &str = "Spooling:WriteSec-";
const METRIC_READ_SEC: &str = "Spooling:ReadSec-";

/// Disk spooling producer
pub struct Spooling {
    base: ProducerBase,
    spools: HashMap<StreamId, SpoolFile>,
    path: PathBuf,
    max_file_size: u64,
    max_file_age: Duration,
    batch_max_count: usize,
    batch_timeout: Duration,
    read_interval: Duration,
    last_read_check: Instant,
}

impl Spooling {
    /// Build and bind a spooling producer from its record
    pub fn configure(
        registry: &TypeRegistry,
        config: &mut PluginConfig,
        ctx: &PluginContext,
    ) -> Result<Self> {
        // segments must decode back into messages regardless of user config
        config.override_option("Formatter", "format.Serialize");
        let base = ProducerBase::configure(registry, config, ctx)?;

        let path = PathBuf::from(config.get_string("Path", "/var/spool/sluice")?);
        let max_file_size = config.get_uint("MaxFileSizeMB", 512)? << 20;
        let max_file_age = Duration::from_secs(config.get_uint("MaxFileAgeMin", 1)? * 60);
        let batch_max_count = config.get_int("BatchMaxCount", 100)?.max(1) as usize;
        let batch_timeout = Duration::from_secs(config.get_uint("BatchTimeoutSec", 5)?.max(1));

        Ok(Self {
            base,
            spools: HashMap::new(),
            path,
            max_file_size,
            max_file_age,
            batch_max_count,
            batch_timeout,
            read_interval: max_file_age / 2,
            last_read_check: Instant::now(),
        })
    }

    async fn write_to_file(&mut self, msg: Message) {
        let stream_id = msg.prev_stream_id();

        if !self.spools.contains_key(&stream_id) {
            let stream_name = self
                .base
                .fabric()
                .stream_name(stream_id)
                .unwrap_or_else(|| format!("{:016x}", stream_id.raw()));

            match SpoolFile::open(&self.path, stream_id, &stream_name, self.batch_max_count) {
                Ok(spool) => {
                    self.spools.insert(stream_id, spool);
                }
                Err(e) => {
                    tracing::error!(
                        plugin = %self.base.id(),
                        stream = %stream_name,
                        error = %e,
                        "failed to create spool directory"
                    );
                    self.base.drop_message(msg).await;
                    return;
                }
            }
        }

        // open/rotate the segment before staging; a message we cannot spool
        // goes back to its origin stream instead
        let rotated = self
            .spools
            .get_mut(&stream_id)
            .expect("spool exists")
            .open_or_rotate(self.max_file_size, self.max_file_age);
        if let Err(e) = rotated {
            tracing::error!(
                plugin = %self.base.id(),
                stream = %stream_id,
                error = %e,
                "could not open spool segment, returning message to origin"
            );
            self.route_to_origin(msg).await;
            return;
        }

        let state = Arc::clone(self.base.state());
        let mut rejected = None;
        let generation = {
            let spool = self.spools.get_mut(&stream_id).expect("spool exists");
            let generation = spool.batch.append_or_flush(
                msg,
                || state.is_active_or_stopping(),
                |m| rejected = Some(m),
            );
            if rejected.is_none() {
                spool.count_write();
            }
            generation
        };

        if let Some(m) = rejected {
            self.base.drop_message(m).await;
        }
        if let Some(generation) = generation {
            self.flush_generation(stream_id, generation).await;
        }
    }

    /// Return a message to the stream it came from (rotation failure path)
    async fn route_to_origin(&mut self, msg: Message) {
        let origin = msg.prev_stream_id();
        if let Some(spool) = self.spools.get_mut(&origin) {
            spool.count_read();
        }
        self.base.fabric().route(msg, origin).await;
    }

    /// Write one swapped-out generation to its segment
    async fn flush_generation(&mut self, stream_id: StreamId, generation: Vec<Message>) {
        let Some(mut spool) = self.spools.remove(&stream_id) else {
            return;
        };

        let spare = SegmentFlusher {
            base: &mut self.base,
            spool: &mut spool,
            max_file_size: self.max_file_size,
            max_file_age: self.max_file_age,
        }
        .flush(generation)
        .await;

        spool.batch.flush_done(spare);
        self.spools.insert(stream_id, spool);
    }

    /// Tick: export per-stream counters, flush due batches, seal idle
    /// segments, and run the replay schedule
    async fn write_batch_on_timeout(&mut self) {
        let mut due = Vec::new();

        for (id, spool) in self.spools.iter_mut() {
            let (reads, writes) = spool.take_counts();
            let elapsed = spool
                .last_metric_update
                .elapsed()
                .as_secs_f64()
                .max(f64::EPSILON);
            spool.last_metric_update = Instant::now();

            let metrics = self.base.metrics();
            metrics.add(&format!("{METRIC_READ}{}", spool.stream_name()), reads);
            metrics.add(&format!("{METRIC_WRITE}{}", spool.stream_name()), writes);
            metrics.set_f(
                &format!("{METRIC_READ_SEC}{}", spool.stream_name()),
                reads as f64 / elapsed,
            );
            metrics.set_f(
                &format!("{METRIC_WRITE_SEC}{}", spool.stream_name()),
                writes as f64 / elapsed,
            );

            if let Err(e) = spool.rotate_if_aged(self.max_file_age) {
                tracing::warn!(
                    plugin = %self.base.id(),
                    stream = %spool.stream_name(),
                    error = %e,
                    "age-based segment rotation failed"
                );
            }

            if spool.batch.reached_size_threshold(self.batch_max_count / 2)
                || spool.batch.reached_time_threshold(self.batch_timeout)
            {
                due.push(*id);
            }
        }

        for id in due {
            let generation = self.spools.get_mut(&id).and_then(|s| s.batch.try_flush());
            if let Some(generation) = generation {
                self.flush_generation(id, generation).await;
            }
        }

        if self.last_read_check.elapsed() >= self.read_interval {
            self.last_read_check = Instant::now();
            self.replay().await;
        }
    }

    /// Walk sealed segments in order and re-inject their messages
    async fn replay(&mut self) {
        let ids: Vec<StreamId> = self.spools.keys().copied().collect();

        for id in ids {
            loop {
                let Some((index, path)) = self.spools.get(&id).and_then(|s| s.sealed_segment())
                else {
                    break;
                };

                match self.replay_segment(id, &path).await {
                    Ok(count) => {
                        tracing::debug!(
                            plugin = %self.base.id(),
                            segment = index,
                            messages = count,
                            "spool segment replayed"
                        );
                        let done = self
                            .spools
                            .get_mut(&id)
                            .map(|s| s.finish_segment())
                            .transpose();
                        if let Err(e) = done {
                            tracing::error!(
                                plugin = %self.base.id(),
                                segment = %path.display(),
                                error = %e,
                                "failed to delete replayed segment"
                            );
                            break;
                        }
                    }
                    Err(e) => {
                        // leave the file for the operator, move on so replay
                        // cannot wedge on one bad segment
                        tracing::error!(
                            plugin = %self.base.id(),
                            segment = %path.display(),
                            error = %e,
                            "unreadable spool segment, skipping"
                        );
                        if let Some(spool) = self.spools.get_mut(&id) {
                            spool.skip_segment();
                        }
                    }
                }
            }
        }
    }

    async fn replay_segment(
        &mut self,
        id: StreamId,
        path: &Path,
    ) -> std::result::Result<usize, CoreError> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        let mut count = 0usize;

        while let Some(msg) = codec::decode_from(&mut reader)? {
            count += 1;
            if let Some(spool) = self.spools.get_mut(&id) {
                spool.count_read();
            }

            if msg.stream_id() == msg.prev_stream_id() {
                // re-injecting would land the message right back here
                self.base.drop_message(msg).await;
                continue;
            }

            let origin = msg.prev_stream_id();
            self.base.fabric().route(msg, origin).await;
        }

        Ok(count)
    }

    /// Seal every active segment so the reader can take over
    fn roll_all(&mut self) {
        for spool in self.spools.values_mut() {
            if let Err(e) = spool.seal() {
                tracing::warn!(
                    stream = %spool.stream_name(),
                    error = %e,
                    "roll failed to seal segment"
                );
            }
        }
    }

    async fn close(&mut self, runner: &mut ProducerRunner) {
        // whatever is still queued has no live downstream; drop it
        let mut queued = Vec::new();
        runner.drain(|m| queued.push(m));
        let queued_count = queued.len();
        for msg in queued {
            self.base.drop_message(msg).await;
        }

        // staged batches go to disk so the next run can replay them; the
        // shutdown budget is shared across streams and anything that cannot
        // be flushed in time takes the drop path
        let deadline = Instant::now() + self.base.shutdown_timeout();
        let mut expired = 0usize;
        let ids: Vec<StreamId> = self.spools.keys().copied().collect();
        for id in ids {
            let Some(mut spool) = self.spools.remove(&id) else {
                continue;
            };

            let remaining = deadline.saturating_duration_since(Instant::now());
            let batch = std::mem::replace(&mut spool.batch, MessageBatch::new(1));
            let residue = batch
                .close(
                    &mut SegmentFlusher {
                        base: &mut self.base,
                        spool: &mut spool,
                        max_file_size: self.max_file_size,
                        max_file_age: self.max_file_age,
                    },
                    remaining,
                )
                .await;
            spool.batch = batch;

            if let Err(e) = spool.seal() {
                tracing::error!(
                    stream = %spool.stream_name(),
                    error = %e,
                    "failed to seal segment on shutdown"
                );
            }
            self.spools.insert(id, spool);

            expired += residue.len();
            for msg in residue {
                self.base.drop_message(msg).await;
            }
        }

        tracing::info!(
            plugin = %self.base.id(),
            dropped_queued = queued_count,
            dropped_on_timeout = expired,
            spools = self.spools.len(),
            "spooling producer shut down"
        );
    }
}

/// Writes generations into one stream's segment store
///
/// A borrowed view over the producer's fields, so the same write path
/// backs both the tick-driven flush and [`MessageBatch::close`] during
/// shutdown. A failed rotation returns the whole generation to its origin
/// stream; individual write failures take the drop path.
struct SegmentFlusher<'a> {
    base: &'a mut ProducerBase,
    spool: &'a mut SpoolFile,
    max_file_size: u64,
    max_file_age: Duration,
}

#[async_trait]
impl BatchFlusher for SegmentFlusher<'_> {
    async fn flush(&mut self, mut generation: Vec<Message>) -> Vec<Message> {
        // a tick may have sealed the segment since the messages were staged
        if let Err(e) = self
            .spool
            .open_or_rotate(self.max_file_size, self.max_file_age)
        {
            tracing::error!(
                plugin = %self.base.id(),
                stream = %self.spool.stream_name(),
                error = %e,
                "could not open spool segment, returning staged messages to origin"
            );
            for msg in generation.drain(..) {
                self.spool.count_read();
                let origin = msg.prev_stream_id();
                self.base.fabric().route(msg, origin).await;
            }
            return generation;
        }

        for msg in generation.drain(..) {
            let (record, _) = self.base.format(&msg);
            match self.spool.write_record(&record) {
                Ok(()) => {}
                Err(e) => {
                    tracing::error!(
                        plugin = %self.base.id(),
                        stream = %self.spool.stream_name(),
                        error = %e,
                        "spool write failed"
                    );
                    self.base.drop_message(msg).await;
                }
            }
        }
        generation
    }
}

#[async_trait]
impl Producer for Spooling {
    fn base(&self) -> &ProducerBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ProducerBase {
        &mut self.base
    }

    async fn produce(mut self: Box<Self>, mut guard: FinishGuard) {
        let id = self.base.id().to_string();
        self.base
            .set_stop_callback(&mut guard, move || {
                tracing::debug!(plugin = %id, "spooling stop callback");
            });

        let mut runner = self.base.runner();
        let mut ticker = tokio::time::interval(self.batch_timeout);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            match runner.next_event(Some(&mut ticker)).await {
                Event::Message(msg) => self.write_to_file(msg).await,
                Event::Tick => self.write_batch_on_timeout().await,
                Event::Control(PluginControl::StopProducer) | Event::ChannelClosed => break,
                Event::Control(PluginControl::Roll) => self.roll_all(),
                Event::Control(_) => {}
                // no transport, nothing to check; never stays blown
                Event::FusePoll => runner.rearm_fuse(),
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
    Ok(PluginInstance::Producer(Box::new(Spooling::configure(
        registry, config, ctx,
    )?)))
}
