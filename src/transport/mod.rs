//! Transport layer for the remote side of the bridge
//!
//! [`MqttTransport`] is the seam between the connection manager and the concrete
//! MQTT client. Broker callbacks (connect acknowledgement, disconnect, inbound
//! publish) are delivered as [`ClientEvent`]s on a channel registered at connect
//! time, so they never touch shared state directly.

use crate::config::ConnectionSection;
use crate::connection::ConnectionState;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

pub mod mqtt;
pub mod topic;

pub use rumqttc::v5::mqttbytes::QoS;
pub use topic::{topic_matches_filter, validate_topic_filter, validate_topic_name};

/// Events raised by the client's network loop
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// Connect acknowledgement; `code` is the broker's return code
    ConnAck { success: bool, code: String },
    /// Publish received on a subscribed topic
    Message { topic: String, payload: Bytes },
    /// No acknowledgement within the client's connect timeout
    ConnectTimeout,
    /// Broker-initiated disconnect
    Disconnected { reason: String },
    /// Network loop failure
    NetworkError(String),
}

/// MQTT transport errors
#[derive(Debug, Error)]
pub enum MqttError {
    #[error("Connection failed")]
    ConnectionFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Publishing failed")]
    PublishFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Subscription failed")]
    SubscriptionFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Disconnect failed")]
    DisconnectFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Not connected - current state: {state:?}")]
    NotConnected { state: ConnectionState },
    #[error("Connection released by shutdown")]
    ConnectionReleased,
    #[error("Client not configured: connect has not been called")]
    NotConfigured,
    #[error("Network loop already started")]
    LoopAlreadyStarted,
    #[error("Invalid QoS level: {0}")]
    InvalidQos(u8),
}

/// Underlying MQTT client collaborator
///
/// Mirrors the classic callback-style client: `connect` configures the client
/// and registers the event sink, `loop_start` spawns the network loop which
/// performs the actual handshake, `loop_stop` ends it.
#[async_trait]
pub trait MqttTransport: Send + Sync {
    /// Configure the client for `host:port` and register the event sink
    async fn connect(
        &self,
        host: &str,
        port: u16,
        keep_alive: Duration,
        events: mpsc::UnboundedSender<ClientEvent>,
    ) -> Result<(), MqttError>;

    /// Start the network loop; returns immediately
    async fn loop_start(&self) -> Result<(), MqttError>;

    /// Stop the network loop
    async fn loop_stop(&self) -> Result<(), MqttError>;

    /// Disconnect from the broker
    async fn disconnect(&self) -> Result<(), MqttError>;

    /// Publish a payload
    async fn publish(
        &self,
        topic: &str,
        qos: QoS,
        retain: bool,
        payload: Bytes,
    ) -> Result<(), MqttError>;

    /// Subscribe to a topic filter
    async fn subscribe(&self, topic: &str, qos: QoS) -> Result<(), MqttError>;

    /// Caller-owned "connected" flag
    fn set_connected_flag(&self, connected: bool);

    fn connected_flag(&self) -> bool;
}

/// Constructs the underlying client from the `mqtt.connection` parameters
pub trait ClientFactory: Send + Sync {
    fn create(&self, params: &ConnectionSection) -> Result<Arc<dyn MqttTransport>, MqttError>;
}

/// Convert a configured QoS level (0..=2)
pub fn qos_from_level(level: u8) -> Result<QoS, MqttError> {
    match level {
        0 => Ok(QoS::AtMostOnce),
        1 => Ok(QoS::AtLeastOnce),
        2 => Ok(QoS::ExactlyOnce),
        other => Err(MqttError::InvalidQos(other)),
    }
}
