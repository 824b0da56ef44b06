//! Console consumer - stdin lines into streams
//!
//! Reads standard input line by line and posts each line to the bound
//! streams. The minimal ingress that turns a config file into a runnable
//! pipeline:
//!
//! ```toml
//! [[plugin]]
//! type = "consumer.Console"
//! Stream = "console"
//! ```

use async_trait::async_trait;
use bytes::Bytes;
use sluice_core::{
    Consumer, ConsumerBase, FinishGuard, PluginConfig, PluginContext, PluginControl,
    PluginInstance, PluginState, Result, TypeRegistry,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

/// Stdin line consumer
pub struct Console {
    base: ConsumerBase,
}

impl Console {
    /// Build and bind a console consumer from its record
    pub fn configure(config: &mut PluginConfig, ctx: &PluginContext) -> Result<Self> {
        let base = ConsumerBase::configure(config, ctx)?;
        Ok(Self { base })
    }
}

#[async_trait]
impl Consumer for Console {
    fn base(&self) -> &ConsumerBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ConsumerBase {
        &mut self.base
    }

    async fn consume(mut self: Box<Self>, guard: FinishGuard, cancel: CancellationToken) {
        let mut control = self.base.take_control();
        self.base.state().set(PluginState::Active);
        tracing::info!(plugin = %self.base.id(), "console consumer starting");

        let stdin = BufReader::new(tokio::io::stdin());
        let mut lines = stdin.lines();
        let mut posted = 0u64;

        loop {
            tokio::select! {
                biased;
                ctrl = control.recv() => match ctrl {
                    Some(PluginControl::StopConsumer) | None => break,
                    Some(_) => {}
                },
                _ = cancel.cancelled() => break,
                line = lines.next_line() => match line {
                    Ok(Some(line)) => {
                        self.base.post(Bytes::from(line)).await;
                        posted += 1;
                    }
                    Ok(None) => break,
                    Err(e) => {
                        tracing::error!(plugin = %self.base.id(), error = %e, "stdin read failed");
                        break;
                    }
                },
            }
        }

        tracing::info!(
            plugin = %self.base.id(),
            lines = posted,
            "console consumer shutting down"
        );
        drop(guard);
    }
}

pub(crate) fn factory(
    _registry: &TypeRegistry,
    config: &mut PluginConfig,
    ctx: &PluginContext,
) -> Result<PluginInstance> {
    Ok(PluginInstance::Consumer(Box::new(Console::configure(
        config, ctx,
    )?)))
}
