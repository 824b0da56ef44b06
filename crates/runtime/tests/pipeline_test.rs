//! End-to-end pipeline tests: spawn, message flow, ordered shutdown

use std::sync::{Mutex, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use sluice_core::{
    Event, FinishGuard, Message, PluginConfig, PluginContext, PluginControl, PluginInstance,
    Producer, ProducerBase, Result as CoreResult, StreamId, TypeRegistry,
};
use sluice_runtime::{builtin_types, PipelineBuilder};
use std::str::FromStr;

/// Shared event log; entries are tagged with the producer id so parallel
/// tests can filter their own
static EVENTS: OnceLock<Mutex<Vec<String>>> = OnceLock::new();

fn events() -> &'static Mutex<Vec<String>> {
    EVENTS.get_or_init(|| Mutex::new(Vec::new()))
}

fn record(entry: String) {
    events().lock().unwrap().push(entry);
}

fn recorded_with_prefix(prefix: &str) -> Vec<String> {
    events()
        .lock()
        .unwrap()
        .iter()
        .filter(|e| e.starts_with(prefix))
        .cloned()
        .collect()
}

/// Producer that logs its lifecycle and received payloads
struct Recording {
    base: ProducerBase,
}

#[async_trait]
impl Producer for Recording {
    fn base(&self) -> &ProducerBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ProducerBase {
        &mut self.base
    }

    async fn produce(mut self: Box<Self>, mut guard: FinishGuard) {
        let id = self.base.id().to_string();
        let hook_id = id.clone();
        self.base.set_stop_callback(&mut guard, move || {
            record(format!("{hook_id}:done"));
        });

        let mut runner = self.base.runner();
        loop {
            match runner.next_event(None).await {
                Event::Message(msg) => {
                    record(format!("{id}:msg:{}", String::from_utf8_lossy(&msg.data)));
                }
                Event::Control(PluginControl::StopProducer) => {
                    record(format!("{id}:stop"));
                    break;
                }
                Event::ChannelClosed => break,
                Event::FusePoll => runner.rearm_fuse(),
                Event::Tick | Event::Control(_) => {}
            }
        }

        // terminal drain: whatever is still queued is recorded like a
        // delivered message so nothing vanishes silently
        runner.drain(|msg| {
            record(format!("{id}:msg:{}", String::from_utf8_lossy(&msg.data)));
        });
    }
}

fn recording_factory(
    registry: &TypeRegistry,
    config: &mut PluginConfig,
    ctx: &PluginContext,
) -> CoreResult<PluginInstance> {
    let base = ProducerBase::configure(registry, config, ctx)?;
    Ok(PluginInstance::Producer(Box::new(Recording { base })))
}

fn types_with_recording() -> TypeRegistry {
    let mut types = builtin_types();
    types.register("producer.Recording", recording_factory);
    types
}

#[tokio::test(flavor = "multi_thread")]
async fn test_messages_flow_to_subscribed_producer() {
    let config = sluice_config::Config::from_str(
        r#"
        [[plugin]]
        type = "producer.Recording"
        ID = "flow-p"
        Stream = "flowstream"
        "#,
    )
    .unwrap();

    let pipeline = PipelineBuilder::with_types(types_with_recording())
        .build(&config)
        .unwrap();
    let running = pipeline.spawn();

    let stream = StreamId::from_name("flowstream");
    for i in 0..3 {
        let msg = Message::new(Bytes::from(format!("payload{i}")), stream, i);
        running.context().streams.dispatch(msg).await;
    }

    // give the producer task a moment to process
    tokio::time::sleep(Duration::from_millis(50)).await;
    running.shutdown().await;

    let seen = recorded_with_prefix("flow-p:msg:");
    assert_eq!(
        seen,
        vec![
            "flow-p:msg:payload0",
            "flow-p:msg:payload1",
            "flow-p:msg:payload2"
        ]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_ordered_shutdown_drop_source_stops_first() {
    // ord-p1 drops to the stream ord-p2 consumes. The config lists the
    // receiver first on purpose: the supervisor must still stop ord-p1
    // completely before ord-p2 sees its stop request.
    let config = sluice_config::Config::from_str(
        r#"
        [[plugin]]
        type = "producer.Recording"
        ID = "ord-p2"
        Stream = "ord-spill"

        [[plugin]]
        type = "producer.Recording"
        ID = "ord-p1"
        Stream = "ord-main"
        DropStream = "ord-spill"
        "#,
    )
    .unwrap();

    let pipeline = PipelineBuilder::with_types(types_with_recording())
        .build(&config)
        .unwrap();
    let running = pipeline.spawn();

    tokio::time::sleep(Duration::from_millis(20)).await;
    running.shutdown().await;

    let ordered = recorded_with_prefix("ord-");
    let p1_done = ordered
        .iter()
        .position(|e| e == "ord-p1:done")
        .expect("p1 stop callback ran");
    let p2_stop = ordered
        .iter()
        .position(|e| e == "ord-p2:stop")
        .expect("p2 received stop");

    assert!(
        p1_done < p2_stop,
        "drop-path source must finish before its receiver begins shutdown: {ordered:?}"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_late_drops_reach_live_receiver() {
    // late-p1 has a tiny channel and never consumes fast enough; its
    // overflow reroutes to late-spill, where late-p2 must still be alive
    // to record it during shutdown.
    let config = sluice_config::Config::from_str(
        r#"
        [[plugin]]
        type = "producer.Recording"
        ID = "late-p2"
        Stream = "late-spill"

        [[plugin]]
        type = "producer.Recording"
        ID = "late-p1"
        Stream = "late-main"
        DropStream = "late-spill"
        Channel = 1
        ChannelTimeoutMs = 5
        "#,
    )
    .unwrap();

    let pipeline = PipelineBuilder::with_types(types_with_recording())
        .build(&config)
        .unwrap();
    let running = pipeline.spawn();

    let stream = StreamId::from_name("late-main");
    for i in 0..5 {
        let msg = Message::new(Bytes::from(format!("burst{i}")), stream, i);
        running.context().streams.dispatch(msg).await;
    }

    tokio::time::sleep(Duration::from_millis(50)).await;
    let metrics = running.context().metrics.clone();
    running.shutdown().await;

    let p1_seen = recorded_with_prefix("late-p1:msg:").len();
    let p2_seen = recorded_with_prefix("late-p2:msg:").len();
    assert_eq!(p1_seen + p2_seen, 5, "nothing may vanish silently");
    assert_eq!(
        metrics.get_i(sluice_core::METRIC_DISCARDED).unwrap_or(0),
        0,
        "drops must land on the spill receiver, not the void"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_null_pipeline_counts_messages() {
    let config = sluice_config::Config::from_str(
        r#"
        [[plugin]]
        type = "producer.Null"
        ID = "hole"
        Stream = "nullstream"
        "#,
    )
    .unwrap();

    let pipeline = PipelineBuilder::new().build(&config).unwrap();
    let running = pipeline.spawn();

    let stream = StreamId::from_name("nullstream");
    for i in 0..10 {
        let msg = Message::new(Bytes::from_static(b"x"), stream, i);
        running.context().streams.dispatch(msg).await;
    }

    tokio::time::sleep(Duration::from_millis(50)).await;
    let metrics = running.context().metrics.clone();
    running.shutdown().await;

    assert_eq!(metrics.get_i("Null:Discarded"), Some(10));
    assert_eq!(metrics.get_i(sluice_core::METRIC_ROUTED), Some(10));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_plugin_registry_reflects_lifecycle() {
    let config = sluice_config::Config::from_str(
        r#"
        [[plugin]]
        type = "producer.Null"
        ID = "lifecycle-p"
        "#,
    )
    .unwrap();

    let pipeline = PipelineBuilder::new().build(&config).unwrap();
    let registry = pipeline.plugin_registry().clone();
    let running = pipeline.spawn();

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(
        registry.get_with_state("lifecycle-p").is_some(),
        "running plugin is queryable"
    );

    running.shutdown().await;
    assert!(
        registry.get_with_state("lifecycle-p").is_none(),
        "dead plugin is filtered"
    );
    assert!(registry.get("lifecycle-p").is_some(), "binding itself stays");
}
