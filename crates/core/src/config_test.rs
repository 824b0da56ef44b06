//! Tests for plugin configuration binding

use super::*;
use crate::error::CoreError;
use crate::stream::StreamId;

fn record(toml_src: &str) -> PluginConfig {
    let table: toml::Table = toml::from_str(toml_src).unwrap();
    PluginConfig::from_record("producer.Test", table).unwrap()
}

#[test]
fn test_defaults_on_empty_record() {
    let config = record("");

    assert!(config.enabled());
    assert_eq!(config.id(), "");
    assert!(config.streams().is_empty());
    assert_eq!(config.streams_or_wildcard(), vec!["*"]);
}

#[test]
fn test_enable_id_and_streams_lifted() {
    let config = record(
        r#"
        Enable = false
        ID = "spool"
        Stream = ["a", "b"]
        "#,
    );

    assert!(!config.enabled());
    assert_eq!(config.id(), "spool");
    assert_eq!(config.streams(), ["a", "b"]);
}

#[test]
fn test_single_stream_string() {
    let config = record(r#"Stream = "app""#);
    assert_eq!(config.streams(), ["app"]);
}

#[test]
fn test_streams_alias() {
    let config = record(r#"Streams = ["x"]"#);
    assert_eq!(config.streams(), ["x"]);
}

#[test]
fn test_typed_getters_with_defaults() {
    let config = record(
        r#"
        BatchMaxCount = 100
        Path = "/tmp/spool"
        Compress = true
        "#,
    );

    assert_eq!(config.get_int("BatchMaxCount", 10).unwrap(), 100);
    assert_eq!(config.get_int("Missing", 10).unwrap(), 10);
    assert_eq!(config.get_string("Path", "").unwrap(), "/tmp/spool");
    assert!(config.get_bool("Compress", false).unwrap());
    assert!(!config.get_bool("Missing", false).unwrap());
}

#[test]
fn test_wrong_type_errors() {
    let config = record(r#"BatchMaxCount = "many""#);

    let err = config.get_int("BatchMaxCount", 0).unwrap_err();
    assert!(matches!(err, CoreError::BadOption { .. }));
    assert!(err.to_string().contains("BatchMaxCount"));
}

#[test]
fn test_override_shadows_user_value() {
    let mut config = record(r#"Formatter = "format.Envelope""#);

    config.override_option("Formatter", "format.Serialize");

    assert_eq!(
        config.get_string("Formatter", "").unwrap(),
        "format.Serialize"
    );
}

#[test]
fn test_override_on_absent_key() {
    let mut config = record("");
    assert!(!config.has("Formatter"));

    config.override_option("Formatter", "format.Serialize");

    assert!(config.has("Formatter"));
    assert_eq!(
        config.get_string("Formatter", "").unwrap(),
        "format.Serialize"
    );
}

#[test]
fn test_timeout_ms_zero_means_forever() {
    let config = record("ChannelTimeoutMs = 0");
    assert_eq!(config.get_timeout_ms("ChannelTimeoutMs", 50).unwrap(), None);

    let config = record("ChannelTimeoutMs = 25");
    assert_eq!(
        config.get_timeout_ms("ChannelTimeoutMs", 50).unwrap(),
        Some(std::time::Duration::from_millis(25))
    );
}

#[test]
fn test_string_list_accepts_bare_string() {
    let config = record(r#"Hosts = "one""#);
    assert_eq!(config.get_string_list("Hosts").unwrap(), ["one"]);

    let config = record(r#"Hosts = ["one", "two"]"#);
    assert_eq!(config.get_string_list("Hosts").unwrap(), ["one", "two"]);
}

#[test]
fn test_stream_map_with_wildcard_default() {
    let config = record(
        r#"
        [Category]
        accesslog = "web"
        "#,
    );

    let map = config.get_stream_map("Category", "fallback").unwrap();
    assert_eq!(
        map.get(&StreamId::from_name("accesslog")).map(String::as_str),
        Some("web")
    );
    assert_eq!(
        map.get(&StreamId::WILDCARD).map(String::as_str),
        Some("fallback")
    );
}

#[test]
fn test_stream_map_explicit_wildcard_wins() {
    let config = record(
        r#"
        [Category]
        "*" = "everything"
        "#,
    );

    let map = config.get_stream_map("Category", "fallback").unwrap();
    assert_eq!(
        map.get(&StreamId::WILDCARD).map(String::as_str),
        Some("everything")
    );
}

#[test]
fn test_stream_map_absent_without_default_is_empty() {
    let config = record("");
    assert!(config.get_stream_map("Category", "").unwrap().is_empty());
}
