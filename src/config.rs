//! Bridge configuration loaded from TOML
//!
//! The file mirrors the parameter tree of the bridge node: plugin references at the
//! top level, `[mqtt]` / `[mqtt.connection]` for the client, `[ip.*]` for broker
//! candidates, `[probe]` for reachability probing and `[[bridge]]` entries.
//!
//! Bridge entries are kept as raw TOML values so a single malformed entry cannot
//! prevent the rest of the configuration (and the other bridges) from loading.

use crate::broker::BrokerCandidate;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Default serializer reference (MessagePack)
pub const DEFAULT_SERIALIZER: &str = "msgpack:dumps";
/// Default deserializer reference (MessagePack)
pub const DEFAULT_DESERIALIZER: &str = "msgpack:loads";
/// Default MQTT client factory reference
pub const DEFAULT_CLIENT_FACTORY: &str = "mqtt_client:default_mqtt_client_factory";

/// Main bridge configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BridgeConfig {
    /// Serializer used by local-to-remote bridges without an override
    #[serde(default = "default_serializer")]
    pub serializer: String,
    /// Deserializer used by remote-to-local bridges without an override
    #[serde(default = "default_deserializer")]
    pub deserializer: String,
    /// Factory constructing the underlying MQTT client
    #[serde(default = "default_client_factory")]
    pub mqtt_client_factory: String,
    #[serde(default)]
    pub mqtt: MqttSection,
    #[serde(default)]
    pub probe: ProbeSection,
    /// Broker candidates; iteration order is the tie-break order
    #[serde(default)]
    pub ip: BrokerTable,
    /// Additional message types on top of the built-in registry
    #[serde(default, rename = "message_type")]
    pub message_types: Vec<MessageTypeConfig>,
    /// Raw bridge entries, parsed one by one with [`BridgeConfig::bridge_specs`]
    #[serde(default, rename = "bridge")]
    pub bridges: Vec<toml::Value>,
}

/// MQTT section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct MqttSection {
    /// Prefix prepended to every remote topic of this deployment
    #[serde(default)]
    pub private_path: String,
    /// Parameters forwarded to the client factory
    #[serde(default)]
    pub connection: ConnectionSection,
}

/// Client parameters forwarded to the MQTT client factory
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectionSection {
    /// Client identifier; a unique one is generated when absent
    pub client_id: Option<String>,
    /// Keep-alive interval in seconds
    #[serde(default = "default_keepalive")]
    pub keepalive_secs: u64,
    #[serde(default = "default_clean_start")]
    pub clean_start: bool,
    /// Environment variable containing username
    pub username_env: Option<String>,
    /// Environment variable containing password
    pub password_env: Option<String>,
    /// Maximum packet size accepted from the broker
    #[serde(default = "default_max_packet_size")]
    pub max_packet_size: u32,
    /// Capacity of the client request channel
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for ConnectionSection {
    fn default() -> Self {
        Self {
            client_id: None,
            keepalive_secs: default_keepalive(),
            clean_start: default_clean_start(),
            username_env: None,
            password_env: None,
            max_packet_size: default_max_packet_size(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl ConnectionSection {
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keepalive_secs)
    }

    /// Get MQTT username from environment variable
    pub fn username(&self) -> Option<String> {
        self.username_env
            .as_ref()
            .and_then(|name| std::env::var(name).ok())
    }

    /// Get MQTT password from environment variable
    pub fn password(&self) -> Option<String> {
        self.password_env
            .as_ref()
            .and_then(|name| std::env::var(name).ok())
    }
}

/// Reachability probe settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProbeSection {
    /// Per-attempt timeout in milliseconds
    #[serde(default = "default_probe_timeout_ms")]
    pub timeout_ms: u64,
    /// Attempts per candidate before it is dropped
    #[serde(default = "default_probe_attempts")]
    pub attempts: u32,
    /// Probe all candidates at once instead of one after another
    #[serde(default = "default_probe_concurrent")]
    pub concurrent: bool,
}

impl Default for ProbeSection {
    fn default() -> Self {
        Self {
            timeout_ms: default_probe_timeout_ms(),
            attempts: default_probe_attempts(),
            concurrent: default_probe_concurrent(),
        }
    }
}

impl ProbeSection {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// User-declared message type
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageTypeConfig {
    /// `package/Type` name
    pub name: String,
    /// Field names of the message body
    #[serde(default)]
    pub fields: Vec<String>,
}

/// Broker candidates keyed by name, in declaration order
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BrokerTable(Vec<(String, BrokerCandidate)>);

impl BrokerTable {
    pub fn new(entries: Vec<(String, BrokerCandidate)>) -> Self {
        Self(entries)
    }

    pub fn entries(&self) -> &[(String, BrokerCandidate)] {
        &self.0
    }

    /// Candidates in declaration order
    pub fn candidates(&self) -> Vec<BrokerCandidate> {
        self.0.iter().map(|(_, c)| c.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for BrokerTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, candidate) in &self.0 {
            map.serialize_entry(name, candidate)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for BrokerTable {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct OrderedVisitor;

        impl<'de> Visitor<'de> for OrderedVisitor {
            type Value = BrokerTable;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a table of broker candidates")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((name, candidate)) =
                    access.next_entry::<String, BrokerCandidate>()?
                {
                    entries.push((name, candidate));
                }
                Ok(BrokerTable(entries))
            }
        }

        deserializer.deserialize_map(OrderedVisitor)
    }
}

fn default_serializer() -> String {
    DEFAULT_SERIALIZER.to_string()
}

fn default_deserializer() -> String {
    DEFAULT_DESERIALIZER.to_string()
}

fn default_client_factory() -> String {
    DEFAULT_CLIENT_FACTORY.to_string()
}

fn default_keepalive() -> u64 {
    60
}

fn default_clean_start() -> bool {
    true
}

fn default_max_packet_size() -> u32 {
    256 * 1024
}

fn default_channel_capacity() -> usize {
    64
}

fn default_probe_timeout_ms() -> u64 {
    1000
}

fn default_probe_attempts() -> u32 {
    3
}

fn default_probe_concurrent() -> bool {
    true
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl BridgeConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: BridgeConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the sections every bridge depends on.
    ///
    /// Individual bridge entries are not checked here.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.probe.attempts == 0 {
            return Err(ConfigError::InvalidConfig(
                "probe.attempts must be at least 1".to_string(),
            ));
        }
        if self.probe.timeout_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "probe.timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.mqtt.connection.keepalive_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "mqtt.connection.keepalive_secs must be greater than 0".to_string(),
            ));
        }
        if self.mqtt.connection.channel_capacity == 0 {
            return Err(ConfigError::InvalidConfig(
                "mqtt.connection.channel_capacity must be greater than 0".to_string(),
            ));
        }
        for (name, candidate) in self.ip.entries() {
            if candidate.host.trim().is_empty() {
                return Err(ConfigError::InvalidConfig(format!(
                    "ip.{name}: host must not be empty"
                )));
            }
            if candidate.port == 0 {
                return Err(ConfigError::InvalidConfig(format!(
                    "ip.{name}: port must be greater than 0"
                )));
            }
        }
        for message_type in &self.message_types {
            if message_type.name.trim().is_empty() {
                return Err(ConfigError::InvalidConfig(
                    "message_type.name must not be empty".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Parse each `[[bridge]]` entry independently, preserving order
    pub fn bridge_specs(&self) -> Vec<Result<crate::bridge::BridgeSpec, ConfigError>> {
        self.bridges
            .iter()
            .map(|value| {
                value
                    .clone()
                    .try_into::<crate::bridge::BridgeSpec>()
                    .map_err(ConfigError::TomlParse)
            })
            .collect()
    }

    /// Create a test configuration for unit testing
    #[cfg(test)]
    pub fn test_config() -> Self {
        let toml_content = r#"
[mqtt]
private_path = "test/device"

[mqtt.connection]
client_id = "test-bridge"

[ip.primary]
host = "127.0.0.1"
port = 1883
priority = 1

[[bridge]]
direction = "local_to_remote"
local_endpoint = "/ping"
remote_topic = "/ping"
message_type = "std_msgs/Bool"
"#;
        toml::from_str(toml_content).expect("Test config should parse")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::Direction;

    #[test]
    fn test_defaults_applied() {
        let config = BridgeConfig::from_toml_str("").unwrap();
        assert_eq!(config.serializer, DEFAULT_SERIALIZER);
        assert_eq!(config.deserializer, DEFAULT_DESERIALIZER);
        assert_eq!(config.mqtt_client_factory, DEFAULT_CLIENT_FACTORY);
        assert_eq!(config.mqtt.private_path, "");
        assert_eq!(config.mqtt.connection.keepalive_secs, 60);
        assert_eq!(config.probe.attempts, 3);
        assert!(config.ip.is_empty());
        assert!(config.bridges.is_empty());
    }

    #[test]
    fn test_broker_table_preserves_declaration_order() {
        let config = BridgeConfig::from_toml_str(
            r#"
[ip.zeta]
host = "z"
port = 1883
priority = 1

[ip.alpha]
host = "a"
port = 1884
priority = 1

[ip.mid]
host = "m"
port = 1885
priority = 0
"#,
        )
        .unwrap();

        let names: Vec<&str> = config
            .ip
            .entries()
            .iter()
            .map(|(name, _)| name.as_str())
            .collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
        assert_eq!(config.ip.candidates()[1].port, 1884);
    }

    #[test]
    fn test_zero_probe_attempts_rejected() {
        let result = BridgeConfig::from_toml_str("[probe]\nattempts = 0\n");
        assert!(matches!(result, Err(ConfigError::InvalidConfig(_))));
    }

    #[test]
    fn test_zero_port_rejected() {
        let result =
            BridgeConfig::from_toml_str("[ip.a]\nhost = \"a\"\nport = 0\npriority = 1\n");
        assert!(matches!(result, Err(ConfigError::InvalidConfig(_))));
    }

    #[test]
    fn test_bad_bridge_entry_does_not_poison_others() {
        let config = BridgeConfig::from_toml_str(
            r#"
[[bridge]]
direction = "sideways"
local_endpoint = "/a"
remote_topic = "a"
message_type = "std_msgs/String"

[[bridge]]
direction = "remote_to_local"
local_endpoint = "/b"
remote_topic = "b"
message_type = "std_msgs/String"
"#,
        )
        .unwrap();

        let specs = config.bridge_specs();
        assert_eq!(specs.len(), 2);
        assert!(specs[0].is_err());
        let second = specs[1].as_ref().unwrap();
        assert_eq!(second.direction, Direction::RemoteToLocal);
    }

    #[test]
    fn test_test_config_parses() {
        let config = BridgeConfig::test_config();
        assert!(config.validate().is_ok());
        assert_eq!(config.ip.len(), 1);
        assert_eq!(config.bridge_specs().len(), 1);
    }
}
