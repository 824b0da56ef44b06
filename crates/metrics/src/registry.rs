//! Metric registry - named atomic counters and gauges
//!
//! All value updates use relaxed ordering; readings are eventually
//! consistent, not real-time.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;

/// The two metric kinds the registry stores
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    /// Monotonic `i64` counter, updated with atomic adds
    Counter,
    /// `f64` gauge, updated with atomic stores
    Gauge,
}

enum Metric {
    Counter(Arc<AtomicI64>),
    /// f64 stored as raw bits
    Gauge(Arc<AtomicU64>),
}

impl Metric {
    fn kind(&self) -> MetricKind {
        match self {
            Metric::Counter(_) => MetricKind::Counter,
            Metric::Gauge(_) => MetricKind::Gauge,
        }
    }
}

/// Per-name state for rate derivation
struct RateState {
    last_value: i64,
    last_sample: Instant,
}

/// Process-wide metric registry
///
/// The registry maps free-form names to atomic counters or gauges. Metrics
/// are created lazily on first update; `new_counter`/`new_gauge` exist for
/// plugins that want a metric visible before the first event arrives.
///
/// # Thread Safety
///
/// All methods take `&self` and are safe to call concurrently. The name
/// table is guarded by an `RwLock`; the values themselves are atomics.
#[derive(Default)]
pub struct MetricsRegistry {
    metrics: RwLock<HashMap<String, Metric>>,
    rates: Mutex<HashMap<String, RateState>>,
}

impl MetricsRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a counter, initialized to zero
    ///
    /// No-op if the name already exists.
    pub fn new_counter(&self, name: &str) {
        let mut metrics = self.metrics.write().expect("metrics lock poisoned");
        metrics
            .entry(name.to_string())
            .or_insert_with(|| Metric::Counter(Arc::new(AtomicI64::new(0))));
    }

    /// Register a gauge, initialized to zero
    ///
    /// No-op if the name already exists.
    pub fn new_gauge(&self, name: &str) {
        let mut metrics = self.metrics.write().expect("metrics lock poisoned");
        metrics
            .entry(name.to_string())
            .or_insert_with(|| Metric::Gauge(Arc::new(AtomicU64::new(0))));
    }

    /// Add `delta` to the named counter, creating it if absent
    pub fn add(&self, name: &str, delta: i64) {
        self.counter(name).fetch_add(delta, Ordering::Relaxed);
    }

    /// Add 1 to the named counter, creating it if absent
    #[inline]
    pub fn inc(&self, name: &str) {
        self.add(name, 1);
    }

    /// Set the named counter to an absolute value, creating it if absent
    pub fn set_i(&self, name: &str, value: i64) {
        self.counter(name).store(value, Ordering::Relaxed);
    }

    /// Set the named gauge, creating it if absent
    pub fn set_f(&self, name: &str, value: f64) {
        self.gauge(name).store(value.to_bits(), Ordering::Relaxed);
    }

    /// Read a counter value
    ///
    /// Returns `None` if the name is unknown or names a gauge.
    pub fn get_i(&self, name: &str) -> Option<i64> {
        let metrics = self.metrics.read().expect("metrics lock poisoned");
        match metrics.get(name) {
            Some(Metric::Counter(v)) => Some(v.load(Ordering::Relaxed)),
            _ => None,
        }
    }

    /// Read a gauge value
    ///
    /// Returns `None` if the name is unknown or names a counter.
    pub fn get_f(&self, name: &str) -> Option<f64> {
        let metrics = self.metrics.read().expect("metrics lock poisoned");
        match metrics.get(name) {
            Some(Metric::Gauge(v)) => Some(f64::from_bits(v.load(Ordering::Relaxed))),
            _ => None,
        }
    }

    /// Derive the per-second rate of a counter since the previous `rate` call
    ///
    /// The first observation of a name returns 0.0 and seeds the baseline.
    pub fn rate(&self, name: &str) -> f64 {
        let value = self.get_i(name).unwrap_or(0);
        let now = Instant::now();

        let mut rates = self.rates.lock().expect("rates lock poisoned");
        match rates.get_mut(name) {
            Some(state) => {
                let elapsed = now.duration_since(state.last_sample).as_secs_f64();
                let delta = value - state.last_value;
                state.last_value = value;
                state.last_sample = now;
                if elapsed <= 0.0 {
                    0.0
                } else {
                    delta as f64 / elapsed
                }
            }
            None => {
                rates.insert(
                    name.to_string(),
                    RateState {
                        last_value: value,
                        last_sample: now,
                    },
                );
                0.0
            }
        }
    }

    /// The kind registered under `name`, if any
    pub fn kind(&self, name: &str) -> Option<MetricKind> {
        let metrics = self.metrics.read().expect("metrics lock poisoned");
        metrics.get(name).map(Metric::kind)
    }

    /// All registered metric names, sorted
    pub fn names(&self) -> Vec<String> {
        let metrics = self.metrics.read().expect("metrics lock poisoned");
        let mut names: Vec<String> = metrics.keys().cloned().collect();
        names.sort();
        names
    }

    /// Point-in-time copy of every metric
    pub fn snapshot(&self) -> MetricsSnapshot {
        let metrics = self.metrics.read().expect("metrics lock poisoned");
        let mut counters = HashMap::new();
        let mut gauges = HashMap::new();

        for (name, metric) in metrics.iter() {
            match metric {
                Metric::Counter(v) => {
                    counters.insert(name.clone(), v.load(Ordering::Relaxed));
                }
                Metric::Gauge(v) => {
                    gauges.insert(name.clone(), f64::from_bits(v.load(Ordering::Relaxed)));
                }
            }
        }

        MetricsSnapshot { counters, gauges }
    }

    /// Serialize the current snapshot as a JSON object
    ///
    /// This is the payload the scrape surface exposes; counters and gauges
    /// share one flat namespace.
    pub fn snapshot_json(&self) -> String {
        let snapshot = self.snapshot();
        let mut map = serde_json::Map::new();

        for (name, value) in &snapshot.counters {
            map.insert(name.clone(), serde_json::json!(value));
        }
        for (name, value) in &snapshot.gauges {
            map.insert(name.clone(), serde_json::json!(value));
        }

        serde_json::Value::Object(map).to_string()
    }

    /// Remove every metric and rate baseline
    ///
    /// Intended for tests that reuse a shared registry.
    pub fn reset(&self) {
        self.metrics.write().expect("metrics lock poisoned").clear();
        self.rates.lock().expect("rates lock poisoned").clear();
    }

    fn counter(&self, name: &str) -> Arc<AtomicI64> {
        {
            let metrics = self.metrics.read().expect("metrics lock poisoned");
            if let Some(Metric::Counter(v)) = metrics.get(name) {
                return Arc::clone(v);
            }
        }

        let mut metrics = self.metrics.write().expect("metrics lock poisoned");
        match metrics
            .entry(name.to_string())
            .or_insert_with(|| Metric::Counter(Arc::new(AtomicI64::new(0))))
        {
            Metric::Counter(v) => Arc::clone(v),
            Metric::Gauge(_) => {
                // Kind conflict: keep the existing gauge visible, update a shadow
                // counter so the caller still has somewhere to write.
                tracing::debug!(metric = %name, "counter update on a gauge metric");
                Arc::new(AtomicI64::new(0))
            }
        }
    }

    fn gauge(&self, name: &str) -> Arc<AtomicU64> {
        {
            let metrics = self.metrics.read().expect("metrics lock poisoned");
            if let Some(Metric::Gauge(v)) = metrics.get(name) {
                return Arc::clone(v);
            }
        }

        let mut metrics = self.metrics.write().expect("metrics lock poisoned");
        match metrics
            .entry(name.to_string())
            .or_insert_with(|| Metric::Gauge(Arc::new(AtomicU64::new(0))))
        {
            Metric::Gauge(v) => Arc::clone(v),
            Metric::Counter(_) => {
                tracing::debug!(metric = %name, "gauge update on a counter metric");
                Arc::new(AtomicU64::new(0))
            }
        }
    }
}

impl std::fmt::Debug for MetricsRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let metrics = self.metrics.read().expect("metrics lock poisoned");
        f.debug_struct("MetricsRegistry")
            .field("metrics", &metrics.len())
            .finish()
    }
}

/// Point-in-time copy of all metrics
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    /// Counter values by name
    pub counters: HashMap<String, i64>,
    /// Gauge values by name
    pub gauges: HashMap<String, f64>,
}

#[cfg(test)]
#[path = "registry_test.rs"]
mod registry_test;
