//! Tests for the metric registry

use super::*;
use std::thread;
use std::time::Duration;

#[test]
fn test_counter_add_and_read() {
    let metrics = MetricsRegistry::new();

    metrics.add("Routing:Routed", 5);
    metrics.add("Routing:Routed", 3);

    assert_eq!(metrics.get_i("Routing:Routed"), Some(8));
    assert_eq!(metrics.kind("Routing:Routed"), Some(MetricKind::Counter));
}

#[test]
fn test_inc() {
    let metrics = MetricsRegistry::new();

    metrics.inc("Routing:Dropped");
    metrics.inc("Routing:Dropped");

    assert_eq!(metrics.get_i("Routing:Dropped"), Some(2));
}

#[test]
fn test_set_i_overwrites() {
    let metrics = MetricsRegistry::new();

    metrics.add("Relay:WindowSize", 100);
    metrics.set_i("Relay:WindowSize", 50);

    assert_eq!(metrics.get_i("Relay:WindowSize"), Some(50));
}

#[test]
fn test_gauge_set_and_read() {
    let metrics = MetricsRegistry::new();

    metrics.set_f("Spooling:WriteSec-app", 12.5);
    assert_eq!(metrics.get_f("Spooling:WriteSec-app"), Some(12.5));
    assert_eq!(
        metrics.kind("Spooling:WriteSec-app"),
        Some(MetricKind::Gauge)
    );

    metrics.set_f("Spooling:WriteSec-app", 0.25);
    assert_eq!(metrics.get_f("Spooling:WriteSec-app"), Some(0.25));
}

#[test]
fn test_kind_mismatch_returns_none() {
    let metrics = MetricsRegistry::new();

    metrics.add("a_counter", 1);
    metrics.set_f("a_gauge", 1.0);

    assert_eq!(metrics.get_f("a_counter"), None);
    assert_eq!(metrics.get_i("a_gauge"), None);
}

#[test]
fn test_new_counter_visible_before_first_event() {
    let metrics = MetricsRegistry::new();

    metrics.new_counter("Relay:Messages-console");

    assert_eq!(metrics.get_i("Relay:Messages-console"), Some(0));
}

#[test]
fn test_rate_first_observation_is_zero() {
    let metrics = MetricsRegistry::new();

    metrics.add("Spooling:Write-app", 100);
    assert_eq!(metrics.rate("Spooling:Write-app"), 0.0);
}

#[test]
fn test_rate_derives_delta_over_time() {
    let metrics = MetricsRegistry::new();

    metrics.add("Spooling:Write-app", 100);
    metrics.rate("Spooling:Write-app"); // seed baseline

    thread::sleep(Duration::from_millis(50));
    metrics.add("Spooling:Write-app", 10);

    let rate = metrics.rate("Spooling:Write-app");
    // 10 events over ~50ms: the rate is positive and bounded well below
    // the per-millisecond interpretation.
    assert!(rate > 0.0, "rate should be positive, got {rate}");
    assert!(rate < 10_000.0, "rate implausibly high: {rate}");
}

#[test]
fn test_snapshot_contains_both_kinds() {
    let metrics = MetricsRegistry::new();

    metrics.add("c", 7);
    metrics.set_f("g", 1.5);

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.counters.get("c"), Some(&7));
    assert_eq!(snapshot.gauges.get("g"), Some(&1.5));
}

#[test]
fn test_snapshot_json_round_trips() {
    let metrics = MetricsRegistry::new();

    metrics.add("Routing:Routed", 42);
    metrics.set_f("Relay:MessagesSec-web", 3.5);

    let json = metrics.snapshot_json();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();

    assert_eq!(value["Routing:Routed"], 42);
    assert_eq!(value["Relay:MessagesSec-web"], 3.5);
}

#[test]
fn test_reset_clears_everything() {
    let metrics = MetricsRegistry::new();

    metrics.add("c", 1);
    metrics.set_f("g", 1.0);
    metrics.reset();

    assert_eq!(metrics.get_i("c"), None);
    assert_eq!(metrics.get_f("g"), None);
    assert!(metrics.names().is_empty());
}

#[test]
fn test_names_sorted() {
    let metrics = MetricsRegistry::new();

    metrics.add("b", 1);
    metrics.add("a", 1);
    metrics.add("c", 1);

    assert_eq!(metrics.names(), vec!["a", "b", "c"]);
}

#[test]
fn test_concurrent_adds() {
    use std::sync::Arc;

    let metrics = Arc::new(MetricsRegistry::new());
    let mut handles = vec![];

    for _ in 0..4 {
        let m = Arc::clone(&metrics);
        handles.push(thread::spawn(move || {
            for _ in 0..1000 {
                m.add("contended", 1);
            }
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(metrics.get_i("contended"), Some(4000));
}
