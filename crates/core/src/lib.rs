//! Sluice - Core
//!
//! The message plane and plugin runtime: messages and streams, the routing
//! fabric, batching, plugin configuration and registries, and the
//! producer/consumer lifecycle harnesses everything else plugs into.
//!
//! # Architecture
//!
//! ```text
//! [Consumers]            [Streams]                       [Producers]
//!    stdin ──┐                                        ┌──→ Relay ──→ remote
//!    ...   ──┼──→ post ──→ StreamRegistry::dispatch ──┼──→ Spooling ──→ disk
//!            │             (plugin decides fan-out)   └──→ Console
//!            │                      │
//!            │                      └── drop path → _DROPPED_
//! ```
//!
//! # Key Design
//!
//! - **Streams are ids**: a stream name hashes to a stable 64-bit id that
//!   is safe to persist; the registry keeps both directions
//! - **Handles, not references**: the fabric holds producer channel
//!   senders; producers own their receivers inside their worker tasks
//! - **Control beats data**: every producer loop observes control messages
//!   before data, which is what makes shutdown and fuse handling sound
//! - **Drops stay observable**: anything a producer cannot take is rerouted
//!   to its drop stream instead of vanishing

mod batch;
mod config;
mod consumer;
mod control;
mod error;
mod format;
mod handle;
mod message;
mod plugin_registry;
mod producer;
mod stream;
mod type_registry;

pub mod codec;

pub use batch::{BatchFlusher, MessageBatch};
pub use config::PluginConfig;
pub use consumer::{Consumer, ConsumerBase, SourceState, METRIC_CONSUMED};
pub use control::{FinishGuard, PluginControl, PluginState, StateCell, WorkerGroup};
pub use error::{CoreError, Result};
pub use format::{Filter, Formatter};
pub use handle::{EnqueueError, ProducerHandle};
pub use message::{Message, MessageSource};
pub use plugin_registry::{PluginRegistry, RegisteredPlugin};
pub use producer::{
    ControlSender, Event, Producer, ProducerBase, ProducerRunner, METRIC_FILTERED,
};
pub use stream::{
    Dispatch, StreamId, StreamPlugin, StreamRegistry, METRIC_DISCARDED, METRIC_DROPPED,
    METRIC_ROUTED,
};
pub use type_registry::{PluginContext, PluginFactory, PluginInstance, TypeRegistry};
