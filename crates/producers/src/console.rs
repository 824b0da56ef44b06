//! Console producer - formatted payloads to stdout or stderr
//!
//! Debug and demo sink; not meant for high-throughput production use.
//! `Console = "stderr"` selects the error stream, anything else (default
//! `"stdout"`) the standard one. Payloads without a trailing newline get
//! one so lines stay readable.

use async_trait::async_trait;
use sluice_core::{
    Event, FinishGuard, Message, PluginConfig, PluginContext, PluginControl, PluginInstance,
    Producer, ProducerBase, ProducerRunner, Result, TypeRegistry,
};
use tokio::io::AsyncWriteExt;

enum Target {
    Stdout,
    Stderr,
}

/// Stdout/stderr producer
pub struct Console {
    base: ProducerBase,
    target: Target,
}

impl Console {
    /// Build and bind a console producer from its record
    pub fn configure(
        registry: &TypeRegistry,
        config: &mut PluginConfig,
        ctx: &PluginContext,
    ) -> Result<Self> {
        let base = ProducerBase::configure(registry, config, ctx)?;
        let target = match config.get_string("Console", "stdout")?.as_str() {
            "stderr" => Target::Stderr,
            _ => Target::Stdout,
        };
        Ok(Self { base, target })
    }

    async fn print(&mut self, msg: Message) {
        let (payload, _) = self.base.format(&msg);

        let result = match self.target {
            Target::Stdout => {
                let mut out = tokio::io::stdout();
                write_line(&mut out, &payload).await
            }
            Target::Stderr => {
                let mut out = tokio::io::stderr();
                write_line(&mut out, &payload).await
            }
        };

        if let Err(e) = result {
            tracing::error!(plugin = %self.base.id(), error = %e, "console write failed");
            self.base.drop_message(msg).await;
        }
    }

    async fn close(&mut self, runner: &mut ProducerRunner) {
        let mut queued = Vec::new();
        runner.drain(|m| queued.push(m));
        for msg in queued {
            self.print(msg).await;
        }
    }
}

async fn write_line<W: AsyncWriteExt + Unpin>(out: &mut W, payload: &[u8]) -> std::io::Result<()> {
    out.write_all(payload).await?;
    if !payload.ends_with(b"\n") {
        out.write_all(b"\n").await?;
    }
    out.flush().await
}

#[async_trait]
impl Producer for Console {
    fn base(&self) -> &ProducerBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ProducerBase {
        &mut self.base
    }

    async fn produce(mut self: Box<Self>, mut guard: FinishGuard) {
        let id = self.base.id().to_string();
        self.base.set_stop_callback(&mut guard, move || {
            tracing::debug!(plugin = %id, "console stop callback");
        });

        let mut runner = self.base.runner();
        loop {
            match runner.next_event(None).await {
                Event::Message(msg) => self.print(msg).await,
                Event::Control(PluginControl::StopProducer) | Event::ChannelClosed => break,
                Event::FusePoll => runner.rearm_fuse(),
                Event::Tick | Event::Control(_) => {}
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
    Ok(PluginInstance::Producer(Box::new(Console::configure(
        registry, config, ctx,
    )?)))
}
