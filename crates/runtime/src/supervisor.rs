//! Pipeline supervision - spawn, signal wait, ordered shutdown
//!
//! Producers spawn before consumers so ingress never posts into the void.
//! Shutdown runs the other way: consumers are cancelled first, then
//! producers stop one at a time in drop-path order, each within its own
//! shutdown budget, and a process-wide worker group gates final exit.

use std::sync::Arc;
use std::time::Duration;

use sluice_core::{
    Consumer, ControlSender, FinishGuard, PluginContext, PluginControl, PluginRegistry, Producer,
    WorkerGroup,
};
use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::Result;

/// Wait budget for a consumer to stop after cancellation
const CONSUMER_STOP_TIMEOUT: Duration = Duration::from_secs(5);
/// Slack on top of a producer's own shutdown budget
const PRODUCER_STOP_GRACE: Duration = Duration::from_secs(2);
/// Final wait for the worker group after every task was joined
const GROUP_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

struct WorkerTask {
    id: String,
    control: ControlSender,
    budget: Duration,
    handle: JoinHandle<()>,
}

/// A built, not-yet-running pipeline
pub struct Pipeline {
    consumers: Vec<Box<dyn Consumer>>,
    producers: Vec<Box<dyn Producer>>,
    stop_order: Vec<usize>,
    ctx: PluginContext,
    registry: Arc<PluginRegistry>,
}

impl Pipeline {
    pub(crate) fn new(
        consumers: Vec<Box<dyn Consumer>>,
        producers: Vec<Box<dyn Producer>>,
        stop_order: Vec<usize>,
        ctx: PluginContext,
        registry: Arc<PluginRegistry>,
    ) -> Self {
        Self {
            consumers,
            producers,
            stop_order,
            ctx,
            registry,
        }
    }

    /// Shared context (stream fabric, metrics)
    pub fn context(&self) -> &PluginContext {
        &self.ctx
    }

    /// Registry of named instances
    pub fn plugin_registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    /// Number of configured consumers
    pub fn consumer_count(&self) -> usize {
        self.consumers.len()
    }

    /// Number of configured producers
    pub fn producer_count(&self) -> usize {
        self.producers.len()
    }

    /// Spawn every worker task
    pub fn spawn(self) -> RunningPipeline {
        let group = WorkerGroup::new();
        let cancel = CancellationToken::new();

        tracing::info!(
            producers = self.producers.len(),
            consumers = self.consumers.len(),
            "pipeline starting"
        );

        // take producers in stop order so shutdown can walk the list front
        // to back
        let mut slots: Vec<Option<Box<dyn Producer>>> =
            self.producers.into_iter().map(Some).collect();
        let mut producer_tasks = Vec::with_capacity(slots.len());
        for &index in &self.stop_order {
            let producer = slots[index].take().expect("stop order is a permutation");
            let base = producer.base();
            let id = base.id().to_string();
            let control = base.control_sender();
            let budget = base.shutdown_timeout();

            group.add(1);
            let guard = FinishGuard::new(Arc::clone(base.state()), Arc::clone(&group));
            let handle = tokio::spawn(producer.produce(guard));

            producer_tasks.push(WorkerTask {
                id,
                control,
                budget,
                handle,
            });
        }

        let mut consumer_tasks = Vec::with_capacity(self.consumers.len());
        for consumer in self.consumers {
            let base = consumer.base();
            let id = base.id().to_string();
            let control = base.control_sender();

            group.add(1);
            let guard = FinishGuard::new(Arc::clone(base.state()), Arc::clone(&group));
            let handle = tokio::spawn(consumer.consume(guard, cancel.child_token()));

            consumer_tasks.push(WorkerTask {
                id,
                control,
                budget: CONSUMER_STOP_TIMEOUT,
                handle,
            });
        }

        RunningPipeline {
            consumer_tasks,
            producer_tasks,
            cancel,
            group,
            ctx: self.ctx,
            registry: self.registry,
        }
    }

    /// Run until SIGINT/SIGTERM, then shut down in order
    pub async fn run(self) -> Result<()> {
        let running = self.spawn();
        wait_for_shutdown().await;
        tracing::info!("shutdown signal received");
        running.shutdown().await;
        Ok(())
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("consumers", &self.consumers.len())
            .field("producers", &self.producers.len())
            .finish()
    }
}

/// A spawned pipeline and its shutdown handle
pub struct RunningPipeline {
    consumer_tasks: Vec<WorkerTask>,
    producer_tasks: Vec<WorkerTask>,
    cancel: CancellationToken,
    group: Arc<WorkerGroup>,
    ctx: PluginContext,
    registry: Arc<PluginRegistry>,
}

impl RunningPipeline {
    /// Shared context (stream fabric, metrics)
    pub fn context(&self) -> &PluginContext {
        &self.ctx
    }

    /// Registry of named instances
    pub fn plugin_registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    /// Stop everything: consumers first, then producers in drop-path order
    pub async fn shutdown(mut self) {
        tracing::info!("stopping consumers");
        self.cancel.cancel();
        for task in &self.consumer_tasks {
            let _ = task.control.send(PluginControl::StopConsumer);
        }
        for mut task in self.consumer_tasks.drain(..) {
            match tokio::time::timeout(task.budget, &mut task.handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(plugin = %task.id, error = %e, "consumer task panicked");
                }
                Err(_) => {
                    tracing::warn!(plugin = %task.id, "consumer did not stop in time, aborting");
                    task.handle.abort();
                }
            }
        }

        // one at a time: a producer's final drops must reach receivers that
        // are still running, which the stop order guarantees only if each
        // stop completes before the next begins
        tracing::info!("stopping producers");
        for mut task in self.producer_tasks.drain(..) {
            let _ = task.control.send(PluginControl::StopProducer);
            let budget = task.budget + PRODUCER_STOP_GRACE;
            match tokio::time::timeout(budget, &mut task.handle).await {
                Ok(Ok(())) => {
                    tracing::debug!(plugin = %task.id, "producer stopped");
                }
                Ok(Err(e)) => {
                    tracing::warn!(plugin = %task.id, error = %e, "producer task panicked");
                }
                Err(_) => {
                    tracing::warn!(
                        plugin = %task.id,
                        budget_ms = budget.as_millis() as u64,
                        "producer exceeded its shutdown budget, aborting"
                    );
                    task.handle.abort();
                }
            }
        }

        if tokio::time::timeout(GROUP_DRAIN_TIMEOUT, self.group.wait())
            .await
            .is_err()
        {
            tracing::warn!(active = self.group.active(), "worker group did not drain");
        }

        tracing::info!(
            metrics = %self.ctx.metrics.snapshot_json(),
            "pipeline shutdown complete"
        );
    }
}

/// Wait for SIGINT or SIGTERM
async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
