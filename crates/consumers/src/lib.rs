//! Sluice - Consumers
//!
//! The built-in consumer plugins. Consumers are the pipeline's ingress:
//! they read from the outside world and post sequenced messages to their
//! bound streams. Socket, broker and HTTP ingestion are separate protocol
//! adapters; this crate carries the baseline `consumer.Console`.

mod console;

pub use console::Console;

use sluice_core::TypeRegistry;

/// Register every built-in consumer
pub fn register(registry: &mut TypeRegistry) {
    registry.register("consumer.Console", console::factory);
}
