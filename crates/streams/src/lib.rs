//! Sluice - Streams
//!
//! The built-in stream dispatch plugins. A stream plugin decides, per
//! message, how the subscribed producers are selected; the fabric performs
//! the sends.
//!
//! | Type | Policy |
//! |---|---|
//! | `stream.Broadcast` | every subscribed producer (the default) |
//! | `stream.Route` | re-address to `TargetStream` before dispatch |
//! | `stream.Random` | one uniformly random subscriber per message |
//! | `stream.RoundRobin` | subscribers in rotation |

mod broadcast;
mod random;
mod round_robin;
mod route;

pub use broadcast::Broadcast;
pub use random::Random;
pub use round_robin::RoundRobin;
pub use route::Route;

use sluice_core::TypeRegistry;

/// Register every built-in stream plugin
pub fn register(registry: &mut TypeRegistry) {
    registry.register("stream.Broadcast", broadcast::factory);
    registry.register("stream.Route", route::factory);
    registry.register("stream.Random", random::factory);
    registry.register("stream.RoundRobin", round_robin::factory);
}
