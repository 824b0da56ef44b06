//! Plugin lifecycle state and control messages

use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

/// Control messages delivered over a plugin's control channel
///
/// Control always takes priority over data: every loop variant observes a
/// posted control message before any data message that became visible
/// after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginControl {
    /// Stop a consumer: cease producing new messages
    StopConsumer,
    /// Stop a producer: drain, flush and shut down
    StopProducer,
    /// Rearm a blown fuse; the producer resumes consuming data
    FuseActive,
    /// Blow the fuse; the producer stops consuming data until its health
    /// check passes
    FuseBurn,
    /// Rotate whatever the plugin keeps open (spool segments, log files)
    Roll,
}

/// Lifecycle states a plugin instance moves through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PluginState {
    /// Constructed and configured, not yet running
    Initializing = 0,
    /// Main loop running
    Active = 1,
    /// Fuse blown; waiting for the health check to pass
    WaitingForFuse = 2,
    /// Stop requested; draining and flushing
    Stopping = 3,
    /// Worker finished
    Dead = 4,
}

impl PluginState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => PluginState::Initializing,
            1 => PluginState::Active,
            2 => PluginState::WaitingForFuse,
            3 => PluginState::Stopping,
            _ => PluginState::Dead,
        }
    }
}

/// Shared, atomically updated plugin state
///
/// Handed out as `Arc<StateCell>` so the plugin registry and supervisor can
/// observe a plugin after its worker task took ownership of the plugin
/// value itself.
#[derive(Debug)]
pub struct StateCell(AtomicU8);

impl StateCell {
    /// New cell in `Initializing`
    pub fn new() -> Self {
        Self(AtomicU8::new(PluginState::Initializing as u8))
    }

    /// Current state
    #[inline]
    pub fn get(&self) -> PluginState {
        PluginState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Replace the state
    #[inline]
    pub fn set(&self, state: PluginState) {
        self.0.store(state as u8, Ordering::Release);
    }

    /// True for `Active` or `WaitingForFuse`
    #[inline]
    pub fn is_running(&self) -> bool {
        matches!(
            self.get(),
            PluginState::Active | PluginState::WaitingForFuse
        )
    }

    /// True for any state that still accepts batched work
    ///
    /// Used as the batch append predicate: messages are staged while the
    /// plugin is running or draining, and dropped once it is dead.
    #[inline]
    pub fn is_active_or_stopping(&self) -> bool {
        matches!(
            self.get(),
            PluginState::Active | PluginState::WaitingForFuse | PluginState::Stopping
        )
    }

    /// True once a stop was requested or completed
    #[inline]
    pub fn is_stopping(&self) -> bool {
        matches!(self.get(), PluginState::Stopping | PluginState::Dead)
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}

/// Counted gate over a set of worker tasks
///
/// The supervisor adds one entry per spawned worker and waits for all of
/// them before the process exits. Workers signal completion through a
/// [`FinishGuard`], which fires even when the worker panics.
#[derive(Debug)]
pub struct WorkerGroup {
    active: AtomicUsize,
    notify: Notify,
}

impl WorkerGroup {
    /// New group with no registered workers
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            active: AtomicUsize::new(0),
            notify: Notify::new(),
        })
    }

    /// Register `count` workers about to start
    pub fn add(&self, count: usize) {
        self.active.fetch_add(count, Ordering::AcqRel);
    }

    /// Mark one worker finished
    pub fn done(&self) {
        let previous = self.active.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "worker group underflow");
        if previous == 1 {
            self.notify.notify_waiters();
        }
    }

    /// Number of workers still running
    pub fn active(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Wait until every registered worker reported done
    pub async fn wait(&self) {
        loop {
            if self.active() == 0 {
                return;
            }
            let notified = self.notify.notified();
            if self.active() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Scoped completion guard for a worker task
///
/// Runs the stop hook exactly once and signals the worker group when
/// dropped, which happens both on normal return and while unwinding from a
/// panic inside the worker.
pub struct FinishGuard {
    state: Arc<StateCell>,
    group: Arc<WorkerGroup>,
    hook: Option<Box<dyn FnOnce() + Send>>,
}

impl FinishGuard {
    /// Arm a guard for one worker
    pub fn new(state: Arc<StateCell>, group: Arc<WorkerGroup>) -> Self {
        Self {
            state,
            group,
            hook: None,
        }
    }

    /// Install the stop hook to run when the worker finishes
    ///
    /// The hook performs synchronous cleanup (closing files, sockets); any
    /// async draining happens in the worker before the guard drops.
    pub fn set_stop_hook(&mut self, hook: impl FnOnce() + Send + 'static) {
        self.hook = Some(Box::new(hook));
    }
}

impl Drop for FinishGuard {
    fn drop(&mut self) {
        if let Some(hook) = self.hook.take() {
            hook();
        }
        self.state.set(PluginState::Dead);
        self.group.done();
    }
}

#[cfg(test)]
#[path = "control_test.rs"]
mod control_test;
