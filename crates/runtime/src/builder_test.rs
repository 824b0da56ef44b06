//! Tests for pipeline assembly

use std::str::FromStr;

use sluice_config::Config;
use sluice_core::{PluginConfig, Producer, StreamId};

use super::*;

fn null_producer(stream: &str, drop_stream: &str, ctx: &PluginContext) -> Box<dyn Producer> {
    let types = builtin_types();
    let toml_src = format!(
        r#"
        Stream = "{stream}"
        DropStream = "{drop_stream}"
        "#
    );
    let table: toml::Table = toml::from_str(&toml_src).unwrap();
    let mut config = PluginConfig::from_record("producer.Null", table).unwrap();
    types.create_producer("producer.Null", &mut config, ctx).unwrap()
}

// ============================================================================
// stop_order
// ============================================================================

#[test]
fn test_stop_order_upstream_of_drop_path_first() {
    let ctx = PluginContext::new();
    // config order has the drop receiver first; topo must reverse it
    let receiver = null_producer("spill", "_DROPPED_", &ctx);
    let dropper = null_producer("a", "spill", &ctx);
    let producers = vec![receiver, dropper];

    assert_eq!(stop_order(&producers), vec![1, 0]);
}

#[test]
fn test_stop_order_chain() {
    let ctx = PluginContext::new();
    let p0 = null_producer("spill2", "_DROPPED_", &ctx); // end of the chain
    let p1 = null_producer("spill1", "spill2", &ctx);
    let p2 = null_producer("a", "spill1", &ctx);
    let producers = vec![p0, p1, p2];

    assert_eq!(stop_order(&producers), vec![2, 1, 0]);
}

#[test]
fn test_stop_order_wildcard_catches_unmatched_drop_stream() {
    let ctx = PluginContext::new();
    let catchall = null_producer("*", "_DROPPED_", &ctx);
    let dropper = null_producer("a", "nowhere", &ctx);
    let producers = vec![catchall, dropper];

    // nothing subscribes "nowhere" exactly, so the wildcard producer is
    // the receiver and must outlive the dropper
    assert_eq!(stop_order(&producers), vec![1, 0]);
}

#[test]
fn test_stop_order_independent_producers_keep_config_order() {
    let ctx = PluginContext::new();
    let a = null_producer("a", "_DROPPED_", &ctx);
    let b = null_producer("b", "_DROPPED_", &ctx);
    let producers = vec![a, b];

    assert_eq!(stop_order(&producers), vec![0, 1]);
}

#[test]
fn test_stop_order_cycle_falls_back_to_config_order() {
    let ctx = PluginContext::new();
    let a = null_producer("a", "b", &ctx);
    let b = null_producer("b", "a", &ctx);
    let producers = vec![a, b];

    assert_eq!(stop_order(&producers), vec![0, 1]);
}

// ============================================================================
// build
// ============================================================================

#[test]
fn test_build_minimal_pipeline() {
    let config = Config::from_str(
        r#"
        [[plugin]]
        type = "producer.Null"
        Stream = "a"
        "#,
    )
    .unwrap();

    let pipeline = PipelineBuilder::new().build(&config).unwrap();
    assert_eq!(pipeline.producer_count(), 1);
    assert_eq!(pipeline.consumer_count(), 0);
}

#[test]
fn test_build_unknown_type_fails() {
    let config = Config::from_str(
        r#"
        [[plugin]]
        type = "producer.Missing"
        "#,
    )
    .unwrap();

    let err = PipelineBuilder::new().build(&config).unwrap_err();
    assert!(matches!(err, RuntimeError::Plugin { .. }));
    assert!(err.to_string().contains("producer.Missing"));
}

#[test]
fn test_build_duplicate_id_fails() {
    let config = Config::from_str(
        r#"
        [[plugin]]
        type = "producer.Null"
        ID = "same"

        [[plugin]]
        type = "producer.Null"
        ID = "same"
        "#,
    )
    .unwrap();

    let err = PipelineBuilder::new().build(&config).unwrap_err();
    assert!(err.to_string().contains("same"));
}

#[test]
fn test_build_registers_named_plugins() {
    let config = Config::from_str(
        r#"
        [[plugin]]
        type = "producer.Null"
        ID = "sinkhole"

        [[plugin]]
        type = "producer.Null"
        "#,
    )
    .unwrap();

    let pipeline = PipelineBuilder::new().build(&config).unwrap();
    let registry = pipeline.plugin_registry();

    // only the named instance registers
    assert_eq!(registry.len(), 1);
    assert!(registry.get("sinkhole").is_some());
    assert_eq!(registry.get("sinkhole").unwrap().type_name(), "producer.Null");
}

#[test]
fn test_build_disabled_plugin_skipped() {
    let config = Config::from_str(
        r#"
        [[plugin]]
        type = "producer.Null"
        Enable = false
        "#,
    )
    .unwrap();

    let pipeline = PipelineBuilder::new().build(&config).unwrap();
    assert_eq!(pipeline.producer_count(), 0);
}

#[test]
fn test_build_standalone_formatter_record_fails() {
    let config = Config::from_str(
        r#"
        [[plugin]]
        type = "format.Sequence"
        "#,
    )
    .unwrap();

    let err = PipelineBuilder::new().build(&config).unwrap_err();
    assert!(matches!(err, RuntimeError::Invalid(_)));
}

#[test]
fn test_build_bad_option_fails() {
    let config = Config::from_str(
        r#"
        [[plugin]]
        type = "producer.Null"
        Channel = "lots"
        "#,
    )
    .unwrap();

    let err = PipelineBuilder::new().build(&config).unwrap_err();
    assert!(err.to_string().contains("Channel"));
}

#[tokio::test]
async fn test_build_binds_stream_plugin() {
    use bytes::Bytes;
    use sluice_core::Message;
    use tokio::sync::mpsc;

    let config = Config::from_str(
        r#"
        [[plugin]]
        type = "stream.Route"
        Stream = "in"
        TargetStream = "out"

        [[plugin]]
        type = "producer.Null"
        Stream = "in"
        "#,
    )
    .unwrap();

    let pipeline = PipelineBuilder::new().build(&config).unwrap();
    let ctx = pipeline.context();

    let (tx, mut rx) = mpsc::channel(8);
    ctx.streams.subscribe(
        StreamId::from_name("out"),
        sluice_core::ProducerHandle::new("capture", tx, None, StreamId::DROPPED),
    );

    let msg = Message::new(Bytes::from_static(b"x"), StreamId::from_name("in"), 1);
    ctx.streams.dispatch(msg).await;

    let routed = rx.recv().await.unwrap();
    assert_eq!(routed.stream_id(), StreamId::from_name("out"));
    assert_eq!(routed.prev_stream_id(), StreamId::from_name("in"));
}
