//! Sluice - Metrics
//!
//! In-process metric registry fed by plugins and read by the reporting
//! surface.
//!
//! # Design Principles
//!
//! - **Lock-free updates**: every metric is a single atomic; the registry
//!   lock is only taken to resolve a name to its atomic
//! - **Free-form names**: plugins own their namespace convention
//!   (`Spooling:Write-<stream>`, `Relay:Messages-<category>`)
//! - **Two kinds**: monotonic `i64` counters (atomic add) and `f64` gauges
//!   (atomic set)
//! - **Rates on demand**: `rate()` derives Δvalue/Δt since the previous
//!   observation instead of sampling in the background
//!
//! # Example
//!
//! ```
//! use sluice_metrics::MetricsRegistry;
//!
//! let metrics = MetricsRegistry::new();
//! metrics.add("Routing:Routed", 3);
//! metrics.set_f("Relay:MessagesSec-console", 12.5);
//! assert_eq!(metrics.get_i("Routing:Routed"), Some(3));
//! ```

mod registry;

pub use registry::{MetricKind, MetricsRegistry, MetricsSnapshot};
