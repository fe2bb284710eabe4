//! Error taxonomy for the bridge
//!
//! Startup errors (broker selection, plugin resolution, configuration, connect
//! failure) are fatal for the process instance. Delivery and deserialization
//! errors are contained to the bridge that produced them.

use crate::broker::NoReachableBroker;
use crate::local::LocalBusError;
use crate::plugins::{CodecError, UnresolvedReference};
use crate::transport::MqttError;
use thiserror::Error;

/// Main error type for bridge operations
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error(transparent)]
    NoReachableBroker(#[from] NoReachableBroker),

    #[error(transparent)]
    UnresolvedReference(#[from] UnresolvedReference),

    #[error("Connection to broker {host}:{port} failed: {reason}")]
    ConnectFailure {
        host: String,
        port: u16,
        reason: String,
    },

    #[error("Delivery to '{topic}' failed: {source}")]
    DeliveryError {
        topic: String,
        #[source]
        source: MqttError,
    },

    #[error("Dropping message from '{topic}': {message}")]
    DeserializationError { topic: String, message: String },

    #[error("Invalid bridge '{bridge}': {message}")]
    InvalidBridge { bridge: String, message: String },

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Local bus error: {0}")]
    LocalBus(#[from] LocalBusError),

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Transport error: {0}")]
    Transport(#[from] MqttError),
}

impl BridgeError {
    /// Create connect failure error
    pub fn connect_failure<S: Into<String>>(host: &str, port: u16, reason: S) -> Self {
        Self::ConnectFailure {
            host: host.to_string(),
            port,
            reason: reason.into(),
        }
    }

    /// Create deserialization error
    pub fn deserialization<T: Into<String>, M: Into<String>>(topic: T, message: M) -> Self {
        Self::DeserializationError {
            topic: topic.into(),
            message: message.into(),
        }
    }

    /// Create invalid bridge error
    pub fn invalid_bridge<B: Into<String>, M: Into<String>>(bridge: B, message: M) -> Self {
        Self::InvalidBridge {
            bridge: bridge.into(),
            message: message.into(),
        }
    }

    /// Whether this error ends the process instance
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            BridgeError::NoReachableBroker(_)
                | BridgeError::UnresolvedReference(_)
                | BridgeError::ConnectFailure { .. }
                | BridgeError::Config(_)
        )
    }
}

/// Result type for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;
