//! Per-bridge configuration

use serde::{Deserialize, Serialize};
use std::fmt;

/// Relay direction of a bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Local endpoint -> MQTT topic
    LocalToRemote,
    /// MQTT topic -> local endpoint
    RemoteToLocal,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::LocalToRemote => f.write_str("local_to_remote"),
            Direction::RemoteToLocal => f.write_str("remote_to_local"),
        }
    }
}

/// One `[[bridge]]` entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BridgeSpec {
    pub direction: Direction,
    /// Local bus endpoint
    pub local_endpoint: String,
    /// Remote topic before the private path prefix is applied
    pub remote_topic: String,
    /// `package/Type` of the local messages
    pub message_type: String,
    /// Serializer override (local_to_remote)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serializer: Option<String>,
    /// Deserializer override (remote_to_local)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deserializer: Option<String>,
    #[serde(default)]
    pub qos: u8,
    #[serde(default)]
    pub retain: bool,
    /// Maximum publish rate in Hz (local_to_remote)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency: Option<f64>,
}

impl BridgeSpec {
    pub fn new<L, R, T>(direction: Direction, local_endpoint: L, remote_topic: R, message_type: T) -> Self
    where
        L: Into<String>,
        R: Into<String>,
        T: Into<String>,
    {
        Self {
            direction,
            local_endpoint: local_endpoint.into(),
            remote_topic: remote_topic.into(),
            message_type: message_type.into(),
            serializer: None,
            deserializer: None,
            qos: 0,
            retain: false,
            frequency: None,
        }
    }

    pub fn with_serializer<S: Into<String>>(mut self, reference: S) -> Self {
        self.serializer = Some(reference.into());
        self
    }

    pub fn with_deserializer<S: Into<String>>(mut self, reference: S) -> Self {
        self.deserializer = Some(reference.into());
        self
    }

    pub fn with_qos(mut self, qos: u8) -> Self {
        self.qos = qos;
        self
    }

    pub fn with_frequency(mut self, hz: f64) -> Self {
        self.frequency = Some(hz);
        self
    }

    /// Codec reference for this bridge's direction, if overridden
    pub fn codec_override(&self) -> Option<&str> {
        match self.direction {
            Direction::LocalToRemote => self.serializer.as_deref(),
            Direction::RemoteToLocal => self.deserializer.as_deref(),
        }
    }

    /// Checks that do not depend on other configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.local_endpoint.trim().is_empty() {
            return Err("local_endpoint must not be empty".to_string());
        }
        if self.remote_topic.is_empty() {
            return Err("remote_topic must not be empty".to_string());
        }
        if self.qos > 2 {
            return Err(format!("qos must be 0, 1 or 2, got {}", self.qos));
        }
        if let Some(hz) = self.frequency {
            if self.direction == Direction::RemoteToLocal {
                return Err("frequency only applies to local_to_remote bridges".to_string());
            }
            if !hz.is_finite() || hz <= 0.0 {
                return Err(format!("frequency must be a positive number, got {hz}"));
            }
        }
        Ok(())
    }

    /// Short label used in logs and errors
    pub fn label(&self, index: usize) -> String {
        match self.direction {
            Direction::LocalToRemote => {
                format!("#{index} {} -> {}", self.local_endpoint, self.remote_topic)
            }
            Direction::RemoteToLocal => {
                format!("#{index} {} -> {}", self.remote_topic, self.local_endpoint)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_from_toml() {
        let spec: BridgeSpec = toml::from_str(
            r#"
direction = "local_to_remote"
local_endpoint = "/ping"
remote_topic = "ping"
message_type = "std_msgs/Bool"
serializer = "json:dumps"
qos = 1
frequency = 2.5
"#,
        )
        .unwrap();
        assert_eq!(spec.direction, Direction::LocalToRemote);
        assert_eq!(spec.codec_override(), Some("json:dumps"));
        assert_eq!(spec.qos, 1);
        assert!(!spec.retain);
        assert_eq!(spec.frequency, Some(2.5));
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result: Result<BridgeSpec, _> = toml::from_str(
            r#"
direction = "remote_to_local"
local_endpoint = "/pong"
remote_topic = "pong"
message_type = "std_msgs/Bool"
topic_from = "/oops"
"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_override_follows_direction() {
        let spec = BridgeSpec::new(Direction::RemoteToLocal, "/a", "a", "std_msgs/String")
            .with_serializer("json:dumps");
        assert_eq!(spec.codec_override(), None);
        let spec = spec.with_deserializer("json:loads");
        assert_eq!(spec.codec_override(), Some("json:loads"));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let base = BridgeSpec::new(Direction::LocalToRemote, "/a", "a", "std_msgs/String");
        assert!(base.clone().with_qos(3).validate().is_err());
        assert!(base.clone().with_frequency(0.0).validate().is_err());
        assert!(base.clone().with_frequency(f64::NAN).validate().is_err());

        let inbound = BridgeSpec::new(Direction::RemoteToLocal, "/a", "a", "std_msgs/String");
        assert!(inbound.with_frequency(1.0).validate().is_err());

        let empty = BridgeSpec::new(Direction::LocalToRemote, "", "a", "std_msgs/String");
        assert!(empty.validate().is_err());
    }
}
