//! Tests for the type registry

use super::*;
use crate::error::CoreError;
use crate::format::{Filter, Formatter};
use crate::message::Message;

struct PassFilter;

impl Filter for PassFilter {
    fn accepts(&self, _msg: &Message) -> bool {
        true
    }
}

struct EchoFormatter {
    data: Vec<u8>,
}

impl Formatter for EchoFormatter {
    fn prepare(&mut self, msg: &Message) {
        self.data = msg.data.to_vec();
    }

    fn encoded_len(&self) -> usize {
        self.data.len()
    }

    fn copy_to(&self, dest: &mut [u8]) -> usize {
        dest[..self.data.len()].copy_from_slice(&self.data);
        self.data.len()
    }
}

fn pass_filter(
    _registry: &TypeRegistry,
    _config: &mut PluginConfig,
    _ctx: &PluginContext,
) -> crate::error::Result<PluginInstance> {
    Ok(PluginInstance::Filter(Box::new(PassFilter)))
}

fn echo_formatter(
    _registry: &TypeRegistry,
    _config: &mut PluginConfig,
    _ctx: &PluginContext,
) -> crate::error::Result<PluginInstance> {
    Ok(PluginInstance::Formatter(Box::new(EchoFormatter {
        data: Vec::new(),
    })))
}

fn registry() -> TypeRegistry {
    let mut registry = TypeRegistry::new();
    registry.register("filter.Any", pass_filter);
    registry.register("format.Echo", echo_formatter);
    registry.register("contrib.alt.Echo", echo_formatter);
    registry
}

#[test]
fn test_exact_name_resolves() {
    let registry = registry();
    assert_eq!(registry.resolve("filter.Any").unwrap(), "filter.Any");
}

#[test]
fn test_unique_suffix_resolves() {
    let registry = registry();
    assert_eq!(registry.resolve("Any").unwrap(), "filter.Any");
    assert_eq!(registry.resolve("alt.Echo").unwrap(), "contrib.alt.Echo");
}

#[test]
fn test_ambiguous_suffix_errors_with_candidates() {
    let registry = registry();

    let err = registry.resolve("Echo").unwrap_err();
    match err {
        CoreError::AmbiguousPlugin { candidates, .. } => {
            assert!(candidates.contains("format.Echo"));
            assert!(candidates.contains("contrib.alt.Echo"));
        }
        other => panic!("expected AmbiguousPlugin, got {other:?}"),
    }
}

#[test]
fn test_unknown_name_lists_available() {
    let registry = registry();

    let err = registry.resolve("producer.Nope").unwrap_err();
    match err {
        CoreError::UnknownPlugin { available, .. } => {
            assert!(available.contains("filter.Any"));
        }
        other => panic!("expected UnknownPlugin, got {other:?}"),
    }
}

#[test]
fn test_create_filter() {
    let registry = registry();
    let ctx = PluginContext::new();
    let mut config = PluginConfig::new("filter.Any");

    let filter = registry.create_filter("Any", &mut config, &ctx).unwrap();
    let msg = Message::new(
        bytes::Bytes::from_static(b"x"),
        crate::stream::StreamId::from_name("s"),
        0,
    );
    assert!(filter.accepts(&msg));
}

#[test]
fn test_capability_mismatch() {
    let registry = registry();
    let ctx = PluginContext::new();
    let mut config = PluginConfig::new("filter.Any");

    let err = registry
        .create_formatter("filter.Any", &mut config, &ctx)
        .unwrap_err();
    match err {
        CoreError::TypeMismatch {
            expected, actual, ..
        } => {
            assert_eq!(expected, "formatter");
            assert_eq!(actual, "filter");
        }
        other => panic!("expected TypeMismatch, got {other:?}"),
    }
}

#[test]
fn test_available_is_sorted() {
    let registry = registry();
    let available = registry.available();
    let mut sorted = available.clone();
    sorted.sort_unstable();
    assert_eq!(available, sorted);
}
