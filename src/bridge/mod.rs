//! Bridges between local endpoints and MQTT topics
//!
//! - [`spec`] - `[[bridge]]` entries
//! - [`private_path`] - remote topic namespacing
//! - [`message_type`] - local message type registry
//! - [`relay`] - a single bridge and its relay loop
//! - [`dispatcher`] - starts all bridges once the connection is up

pub mod dispatcher;
pub mod message_type;
pub mod private_path;
pub mod relay;
pub mod spec;

pub use dispatcher::{ActiveBridge, BridgeDispatcher, BridgeFailure};
pub use message_type::{MessageType, MessageTypeError, MessageTypeRegistry};
pub use private_path::PrivatePathExtractor;
pub use relay::{Bridge, BridgeStats, RelayOutcome, Throttle};
pub use spec::{BridgeSpec, Direction};

use crate::config::BridgeConfig;
use crate::error::BridgeError;
use crate::plugins::{Codec, PluginRegistry, UnresolvedReference};
use std::sync::Arc;

/// Everything bridges share, resolved once at startup
#[derive(Clone)]
pub struct BridgeContext {
    pub serializer: Arc<dyn Codec>,
    pub deserializer: Arc<dyn Codec>,
    pub private_path: PrivatePathExtractor,
    pub message_types: MessageTypeRegistry,
    plugins: PluginRegistry,
}

impl BridgeContext {
    /// Resolve the default codecs and message types.
    ///
    /// Fails on an unresolvable default codec or an invalid declared message type.
    pub fn from_config(config: &BridgeConfig, plugins: &PluginRegistry) -> Result<Self, BridgeError> {
        let serializer = plugins.resolve_codec(&config.serializer)?;
        let deserializer = plugins.resolve_codec(&config.deserializer)?;
        let message_types = MessageTypeRegistry::from_config(&config.message_types).map_err(|e| {
            BridgeError::Config(crate::config::ConfigError::InvalidConfig(e.to_string()))
        })?;

        Ok(Self {
            serializer,
            deserializer,
            private_path: PrivatePathExtractor::new(config.mqtt.private_path.clone()),
            message_types,
            plugins: plugins.clone(),
        })
    }

    /// Codec for a bridge: its own override, else the global default for its direction
    pub fn codec_for(&self, spec: &BridgeSpec) -> Result<Arc<dyn Codec>, UnresolvedReference> {
        if let Some(reference) = spec.codec_override() {
            return self.plugins.resolve_codec(reference);
        }
        Ok(match spec.direction {
            Direction::LocalToRemote => self.serializer.clone(),
            Direction::RemoteToLocal => self.deserializer.clone(),
        })
    }
}

impl std::fmt::Debug for BridgeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeContext")
            .field("serializer", &self.serializer.name())
            .field("deserializer", &self.deserializer.name())
            .field("private_path", &self.private_path.prefix())
            .field("message_types", &self.message_types.len())
            .finish()
    }
}
