//! Tests for stream ids and the routing fabric

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use sluice_metrics::MetricsRegistry;
use tokio::sync::mpsc;

use super::*;
use crate::handle::ProducerHandle;
use crate::message::Message;

fn registry() -> StreamRegistry {
    StreamRegistry::new(Arc::new(MetricsRegistry::new()))
}

fn handle_for(
    id: &str,
    capacity: usize,
    timeout: Option<Duration>,
) -> (ProducerHandle, mpsc::Receiver<Message>) {
    let (tx, rx) = mpsc::channel(capacity);
    (
        ProducerHandle::new(id, tx, timeout, StreamId::DROPPED),
        rx,
    )
}

fn msg(stream: StreamId, sequence: u64) -> Message {
    Message::new(Bytes::from_static(b"m"), stream, sequence)
}

// ============================================================================
// StreamId
// ============================================================================

#[test]
fn test_stream_id_is_stable() {
    // FNV-1a of the name; these values are embedded in spool segments and
    // must never change.
    assert_eq!(StreamId::from_name(""), StreamId::from_raw(0xcbf29ce484222325));
    assert_eq!(StreamId::from_name("a"), StreamId::from_raw(0xaf63dc4c8601ec8c));
    assert_eq!(
        StreamId::from_name("accesslog"),
        StreamId::from_name("accesslog")
    );
    assert_ne!(StreamId::from_name("a"), StreamId::from_name("b"));
}

#[test]
fn test_reserved_ids_match_their_names() {
    assert_eq!(StreamId::WILDCARD, StreamId::from_name("*"));
    assert_eq!(StreamId::DROPPED, StreamId::from_name("_DROPPED_"));
    assert_eq!(StreamId::INTERNAL, StreamId::from_name("_SLUICE_"));
}

// ============================================================================
// Registry: name ↔ id
// ============================================================================

#[test]
fn test_register_stream_is_bijective() {
    let fabric = registry();
    let id = fabric.register_stream("accesslog");

    assert_eq!(id, StreamId::from_name("accesslog"));
    assert_eq!(fabric.stream_name(id).as_deref(), Some("accesslog"));
}

#[test]
fn test_reserved_streams_preregistered() {
    let fabric = registry();

    assert_eq!(fabric.stream_name(StreamId::WILDCARD).as_deref(), Some("*"));
    assert_eq!(
        fabric.stream_name(StreamId::DROPPED).as_deref(),
        Some("_DROPPED_")
    );
}

#[test]
fn test_unknown_stream_has_no_name() {
    let fabric = registry();
    assert_eq!(fabric.stream_name(StreamId::from_name("nope")), None);
}

// ============================================================================
// Dispatch
// ============================================================================

#[tokio::test]
async fn test_dispatch_broadcasts_to_all_subscribers() {
    let fabric = registry();
    let stream = fabric.register_stream("app");

    let (h1, mut rx1) = handle_for("p1", 8, None);
    let (h2, mut rx2) = handle_for("p2", 8, None);
    fabric.subscribe(stream, h1);
    fabric.subscribe(stream, h2);

    fabric.dispatch(msg(stream, 1)).await;

    assert_eq!(rx1.recv().await.unwrap().sequence, 1);
    assert_eq!(rx2.recv().await.unwrap().sequence, 1);
    assert_eq!(fabric.metrics().get_i(METRIC_ROUTED), Some(1));
}

#[tokio::test]
async fn test_dispatch_without_producers_discards() {
    let fabric = registry();
    let stream = fabric.register_stream("app");

    fabric.dispatch(msg(stream, 1)).await;

    assert_eq!(fabric.metrics().get_i(METRIC_DISCARDED), Some(1));
    assert_eq!(fabric.metrics().get_i(METRIC_ROUTED), None);
}

#[tokio::test]
async fn test_dispatch_falls_back_to_wildcard() {
    let fabric = registry();
    let stream = fabric.register_stream("app");

    let (wild, mut rx) = handle_for("catchall", 8, None);
    fabric.subscribe(StreamId::WILDCARD, wild);

    fabric.dispatch(msg(stream, 9)).await;

    let received = rx.recv().await.unwrap();
    assert_eq!(received.sequence, 9);
    assert_eq!(received.stream_id(), stream);
}

#[tokio::test]
async fn test_exact_match_shadows_wildcard() {
    let fabric = registry();
    let stream = fabric.register_stream("app");

    let (exact, mut exact_rx) = handle_for("exact", 8, None);
    let (wild, mut wild_rx) = handle_for("catchall", 8, None);
    fabric.subscribe(stream, exact);
    fabric.subscribe(StreamId::WILDCARD, wild);

    fabric.dispatch(msg(stream, 1)).await;

    assert!(exact_rx.recv().await.is_some());
    assert!(wild_rx.try_recv().is_err());
}

#[tokio::test]
async fn test_failed_enqueue_takes_drop_path() {
    let fabric = registry();
    let stream = fabric.register_stream("app");

    // capacity 1, zero timeout: second message cannot enter
    let (full, mut full_rx) = handle_for("tiny", 1, Some(Duration::ZERO));
    fabric.subscribe(stream, full);

    let (dropsink, mut drop_rx) = handle_for("dropsink", 8, None);
    fabric.subscribe(StreamId::DROPPED, dropsink);

    fabric.dispatch(msg(stream, 1)).await;
    fabric.dispatch(msg(stream, 2)).await;

    assert_eq!(full_rx.recv().await.unwrap().sequence, 1);

    let dropped = drop_rx.recv().await.unwrap();
    assert_eq!(dropped.sequence, 2);
    assert_eq!(dropped.stream_id(), StreamId::DROPPED);
    assert_eq!(dropped.prev_stream_id(), stream);
    assert_eq!(fabric.metrics().get_i(METRIC_DROPPED), Some(1));
}

#[tokio::test]
async fn test_drop_path_without_receiver_discards() {
    let fabric = registry();
    let stream = fabric.register_stream("app");

    let (full, _keep) = handle_for("tiny", 1, Some(Duration::ZERO));
    fabric.subscribe(stream, full);

    fabric.dispatch(msg(stream, 1)).await;
    fabric.dispatch(msg(stream, 2)).await;

    // second message went to _DROPPED_, which has no producers
    assert_eq!(fabric.metrics().get_i(METRIC_DISCARDED), Some(1));
}

#[tokio::test]
async fn test_route_sets_history() {
    let fabric = registry();
    let from = fabric.register_stream("from");
    let to = fabric.register_stream("to");

    let (h, mut rx) = handle_for("p", 8, None);
    fabric.subscribe(to, h);

    fabric.route(msg(from, 3), to).await;

    let received = rx.recv().await.unwrap();
    assert_eq!(received.stream_id(), to);
    assert_eq!(received.prev_stream_id(), from);
}

// ============================================================================
// Stream plugins
// ============================================================================

struct PickFirst;

impl StreamPlugin for PickFirst {
    fn dispatch(&self, _msg: &Message, _subscribers: usize) -> Dispatch {
        Dispatch::One(0)
    }
}

#[tokio::test]
async fn test_custom_plugin_picks_single_subscriber() {
    let fabric = registry();
    fabric.set_stream_plugin("app", Box::new(PickFirst));
    let stream = StreamId::from_name("app");

    let (h1, mut rx1) = handle_for("p1", 8, None);
    let (h2, mut rx2) = handle_for("p2", 8, None);
    fabric.subscribe(stream, h1);
    fabric.subscribe(stream, h2);

    fabric.dispatch(msg(stream, 1)).await;

    assert!(rx1.recv().await.is_some());
    assert!(rx2.try_recv().is_err());
}

struct AlwaysReroute(StreamId);

impl StreamPlugin for AlwaysReroute {
    fn dispatch(&self, _msg: &Message, _subscribers: usize) -> Dispatch {
        Dispatch::Reroute(self.0)
    }
}

#[tokio::test]
async fn test_reroute_plugin_redirects_with_history() {
    let fabric = registry();
    let target = fabric.register_stream("target");
    fabric.set_stream_plugin("entry", Box::new(AlwaysReroute(target)));
    let entry = StreamId::from_name("entry");

    // the entry stream needs a subscriber so its plugin runs
    let (decoy, _decoy_rx) = handle_for("decoy", 8, None);
    fabric.subscribe(entry, decoy);
    let (h, mut rx) = handle_for("p", 8, None);
    fabric.subscribe(target, h);

    fabric.dispatch(msg(entry, 5)).await;

    let received = rx.recv().await.unwrap();
    assert_eq!(received.stream_id(), target);
    assert_eq!(received.prev_stream_id(), entry);
}
