//! Sluice - Formats
//!
//! The built-in formatter and filter plugins. Formatters chain: most wrap a
//! base formatter named in their configuration (`SequenceDataFormatter`,
//! `EnvelopeDataFormatter`), with `format.Forward` as the universal leaf.
//!
//! | Type | Effect |
//! |---|---|
//! | `format.Forward` | payload unchanged |
//! | `format.Envelope` | `Prefix` + payload + `Postfix` |
//! | `format.Sequence` | `<sequence>:` + payload |
//! | `format.Serialize` | full binary message record (spool format) |
//! | `filter.Any` | accepts everything |
//! | `filter.None` | vetoes everything |

mod envelope;
mod filters;
mod forward;
mod sequence;
mod serialize;

pub use envelope::Envelope;
pub use filters::{AnyFilter, NoneFilter};
pub use forward::Forward;
pub use sequence::Sequence;
pub use serialize::Serialize;

use sluice_core::TypeRegistry;

/// Register every built-in formatter and filter
pub fn register(registry: &mut TypeRegistry) {
    registry.register("format.Forward", forward::factory);
    registry.register("format.Envelope", envelope::factory);
    registry.register("format.Sequence", sequence::factory);
    registry.register("format.Serialize", serialize::factory);
    registry.register("filter.Any", filters::any_factory);
    registry.register("filter.None", filters::none_factory);
}
