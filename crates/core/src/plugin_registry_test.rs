//! Tests for the plugin instance registry

use std::sync::Arc;

use super::*;
use crate::control::{PluginState, StateCell};
use crate::error::CoreError;

struct TestPlugin {
    id: String,
    state: Option<Arc<StateCell>>,
}

impl TestPlugin {
    fn new(id: &str) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            state: None,
        })
    }

    fn with_state(id: &str, state: Arc<StateCell>) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            state: Some(state),
        })
    }
}

impl RegisteredPlugin for TestPlugin {
    fn id(&self) -> &str {
        &self.id
    }

    fn type_name(&self) -> &str {
        "producer.Test"
    }

    fn state(&self) -> Option<PluginState> {
        self.state.as_ref().map(|s| s.get())
    }
}

#[test]
fn test_register_and_get() {
    let registry = PluginRegistry::new();
    let plugin = TestPlugin::new("aPlugin");

    registry.register(plugin.clone());

    assert_eq!(registry.len(), 1);
    let found = registry.get("aPlugin").expect("registered plugin");
    assert_eq!(found.id(), "aPlugin");
}

#[test]
fn test_get_unknown_is_none() {
    let registry = PluginRegistry::new();
    assert!(registry.get("nonExistentPlugin").is_none());
}

#[test]
fn test_empty_id_not_registered() {
    let registry = PluginRegistry::new();
    registry.register(TestPlugin::new(""));
    assert!(registry.is_empty());
}

#[test]
fn test_register_unique_rejects_duplicate_and_keeps_original() {
    let registry = PluginRegistry::new();
    // the original is stateless; the would-be replacement has a state,
    // so get_with_state tells the two apart
    registry.register(TestPlugin::new("aPlugin"));

    let replacement = TestPlugin::with_state("aPlugin", Arc::new(StateCell::new()));
    let err = registry.register_unique(replacement).unwrap_err();
    assert!(matches!(err, CoreError::DuplicateId(id) if id == "aPlugin"));

    // the original binding survived
    assert_eq!(registry.len(), 1);
    assert!(registry.get("aPlugin").is_some());
    assert!(registry.get_with_state("aPlugin").is_none());
}

#[test]
fn test_get_with_state_requires_queryable_state() {
    let registry = PluginRegistry::new();
    registry.register(TestPlugin::new("stateless"));

    assert!(registry.get("stateless").is_some());
    assert!(registry.get_with_state("stateless").is_none());
}

#[test]
fn test_get_with_state_excludes_dead() {
    let registry = PluginRegistry::new();
    let state = Arc::new(StateCell::new());
    registry.register(TestPlugin::with_state("p", Arc::clone(&state)));

    state.set(PluginState::Active);
    assert!(registry.get_with_state("p").is_some());

    state.set(PluginState::Dead);
    assert!(registry.get_with_state("p").is_none());
}

#[test]
fn test_ids_sorted() {
    let registry = PluginRegistry::new();
    registry.register(TestPlugin::new("b"));
    registry.register(TestPlugin::new("a"));

    assert_eq!(registry.ids(), vec!["a", "b"]);
}

#[test]
fn test_clear() {
    let registry = PluginRegistry::new();
    registry.register(TestPlugin::new("p"));
    registry.clear();
    assert!(registry.is_empty());
}
