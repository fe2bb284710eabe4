//! Configuration loading and validation tests
//!
//! Covers file loading, defaults, ordering of broker candidates and the
//! per-entry parsing of bridges.

use mqtt_bridge::bridge::BridgeContext;
use mqtt_bridge::config::{BridgeConfig, ConfigError};
use mqtt_bridge::plugins::PluginRegistry;
use mqtt_bridge::{BridgeError, BrokerCandidate, Direction};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

const EXAMPLE: &str = include_str!("../config/mqtt_bridge.example.toml");

fn write_config(content: &str) -> NamedTempFile {
    let mut temp_file = NamedTempFile::new().unwrap();
    writeln!(temp_file, "{content}").unwrap();
    temp_file
}

#[test]
fn test_example_config_loads_from_file() {
    let temp_file = write_config(EXAMPLE);

    let config = BridgeConfig::load_from_file(temp_file.path()).unwrap();

    assert_eq!(config.serializer, "msgpack:dumps");
    assert_eq!(config.mqtt.private_path, "device/001");
    assert_eq!(config.mqtt.connection.username_env.as_deref(), Some("MQTT_USERNAME"));
    assert_eq!(
        config.ip.candidates(),
        vec![
            BrokerCandidate::new("mqtt.example.com", 1883, 1),
            BrokerCandidate::new("192.168.1.20", 1883, 5),
            BrokerCandidate::new("127.0.0.1", 1883, 10),
        ]
    );
    assert_eq!(config.message_types.len(), 1);

    let specs: Vec<_> = config
        .bridge_specs()
        .into_iter()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(specs.len(), 3);
    assert_eq!(specs[1].direction, Direction::RemoteToLocal);
    assert_eq!(specs[2].serializer.as_deref(), Some("json:dumps"));
    assert_eq!(specs[2].qos, 1);
    assert_eq!(specs[2].frequency, Some(2.0));
}

#[test]
fn test_example_config_builds_context_with_custom_type() {
    let config = BridgeConfig::from_toml_str(EXAMPLE).unwrap();
    let context = BridgeContext::from_config(&config, &PluginRegistry::with_defaults()).unwrap();

    let temperature = context
        .message_types
        .resolve("sensor_msgs/Temperature")
        .unwrap();
    assert_eq!(
        temperature.fields().collect::<Vec<_>>(),
        vec!["temperature", "variance"]
    );
    assert_eq!(context.private_path.extract("/ping"), "device/001/ping");
}

#[test]
fn test_missing_file_reports_read_error() {
    let result = BridgeConfig::load_from_file(Path::new("/nonexistent/mqtt_bridge.toml"));
    assert!(matches!(result, Err(ConfigError::FileRead(_))));
}

#[test]
fn test_malformed_toml_reports_parse_error() {
    let temp_file = write_config("[ip.a\nhost = ");
    let result = BridgeConfig::load_from_file(temp_file.path());
    assert!(matches!(result, Err(ConfigError::TomlParse(_))));
}

#[test]
fn test_candidate_without_priority_is_rejected() {
    let result = BridgeConfig::from_toml_str("[ip.a]\nhost = \"a\"\nport = 1883\n");
    assert!(matches!(result, Err(ConfigError::TomlParse(_))));
}

#[test]
fn test_negative_priority_is_accepted() {
    let config =
        BridgeConfig::from_toml_str("[ip.a]\nhost = \"a\"\nport = 1883\npriority = -3\n").unwrap();
    assert_eq!(config.ip.candidates()[0].priority, -3);
}

#[test]
fn test_zero_probe_timeout_rejected() {
    let result = BridgeConfig::from_toml_str("[probe]\ntimeout_ms = 0\n");
    match result {
        Err(ConfigError::InvalidConfig(message)) => assert!(message.contains("timeout_ms")),
        other => panic!("expected InvalidConfig, got {other:?}"),
    }
}

#[test]
fn test_empty_host_rejected() {
    let result =
        BridgeConfig::from_toml_str("[ip.blank]\nhost = \" \"\nport = 1883\npriority = 1\n");
    match result {
        Err(ConfigError::InvalidConfig(message)) => assert!(message.contains("ip.blank")),
        other => panic!("expected InvalidConfig, got {other:?}"),
    }
}

#[test]
fn test_unknown_bridge_key_only_invalidates_that_bridge() {
    let config = BridgeConfig::from_toml_str(
        r#"
[[bridge]]
direction = "local_to_remote"
local_endpoint = "/a"
remote_topic = "a"
message_type = "std_msgs/String"
topic_typo = "a"

[[bridge]]
direction = "local_to_remote"
local_endpoint = "/b"
remote_topic = "b"
message_type = "std_msgs/String"
"#,
    )
    .unwrap();

    let specs = config.bridge_specs();
    assert!(specs[0].is_err());
    assert_eq!(specs[1].as_ref().unwrap().local_endpoint, "/b");
}

#[test]
fn test_unresolvable_default_codec_is_fatal() {
    let config = BridgeConfig::from_toml_str("serializer = \"yaml:dumps\"\n").unwrap();
    let result = BridgeContext::from_config(&config, &PluginRegistry::with_defaults());
    assert!(matches!(result, Err(BridgeError::UnresolvedReference(_))));
}

#[test]
fn test_config_survives_serialization() {
    let config = BridgeConfig::from_toml_str(EXAMPLE).unwrap();
    let rendered = toml::to_string_pretty(&config).unwrap();
    let reparsed = BridgeConfig::from_toml_str(&rendered).unwrap();
    assert_eq!(config, reparsed);
}
