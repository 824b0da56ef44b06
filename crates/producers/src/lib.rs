//! Sluice - Producers
//!
//! The built-in producer plugins.
//!
//! | Type | Effect |
//! |---|---|
//! | `producer.Spooling` | persist messages to rotated disk segments keyed by their prior stream, replay them later |
//! | `producer.Relay` | batched delivery to a remote endpoint with an adaptive window and fuse |
//! | `producer.Console` | write formatted payloads to stdout/stderr |
//! | `producer.Null` | count and discard (pipeline benchmarking, drop sinks) |

mod console;
mod null;
pub mod relay;
pub mod spooling;

pub use console::Console;
pub use null::Null;
pub use relay::{Relay, RelayEntry, RelayTransport, ShipOutcome, TcpRelayTransport};
pub use spooling::Spooling;

use sluice_core::TypeRegistry;

/// Register every built-in producer
pub fn register(registry: &mut TypeRegistry) {
    registry.register("producer.Spooling", spooling::factory);
    registry.register("producer.Relay", relay::factory);
    registry.register("producer.Console", console::factory);
    registry.register("producer.Null", null::factory);
}
