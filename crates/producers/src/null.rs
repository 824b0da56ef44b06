//! Null producer - counts and discards
//!
//! Useful as a benchmark sink (pipeline throughput without I/O), as an
//! explicit `_DROPPED_` subscriber so drops stay countable, and in tests.

use async_trait::async_trait;
use sluice_core::{
    Event, FinishGuard, PluginConfig, PluginContext, PluginControl, PluginInstance, Producer,
    ProducerBase, ProducerRunner, Result, TypeRegistry,
};

/// Messages swallowed by null producers
pub const METRIC_DISCARDED: &str = "Null:Discarded";

/// Discarding producer
pub struct Null {
    base: ProducerBase,
}

impl Null {
    /// Build and bind a null producer from its record
    pub fn configure(
        registry: &TypeRegistry,
        config: &mut PluginConfig,
        ctx: &PluginContext,
    ) -> Result<Self> {
        let base = ProducerBase::configure(registry, config, ctx)?;
        Ok(Self { base })
    }

    fn swallow(&self) {
        self.base.metrics().inc(METRIC_DISCARDED);
    }

    fn close(&mut self, runner: &mut ProducerRunner) {
        let mut count = 0usize;
        runner.drain(|_| count += 1);
        self.base.metrics().add(METRIC_DISCARDED, count as i64);
    }
}

#[async_trait]
impl Producer for Null {
    fn base(&self) -> &ProducerBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ProducerBase {
        &mut self.base
    }

    async fn produce(mut self: Box<Self>, mut guard: FinishGuard) {
        let id = self.base.id().to_string();
        self.base.set_stop_callback(&mut guard, move || {
            tracing::debug!(plugin = %id, "null stop callback");
        });

        let mut runner = self.base.runner();
        loop {
            match runner.next_event(None).await {
                Event::Message(_) => self.swallow(),
                Event::Control(PluginControl::StopProducer) | Event::ChannelClosed => break,
                Event::FusePoll => runner.rearm_fuse(),
                Event::Tick | Event::Control(_) => {}
            }
        }

        self.close(&mut runner);
    }
}

pub(crate) fn factory(
    registry: &TypeRegistry,
    config: &mut PluginConfig,
    ctx: &PluginContext,
) -> Result<PluginInstance> {
    Ok(PluginInstance::Producer(Box::new(Null::configure(
        registry, config, ctx,
    )?)))
}
