//! rumqttc-backed MQTT client
//!
//! - [`connection`] - pure option construction from the `mqtt.connection` section
//! - [`message_handler`] - pure translation of rumqttc events into [`ClientEvent`]s
//! - [`client`] - the impure client and network loop task
//!
//! [`ClientEvent`]: crate::transport::ClientEvent

pub mod client;
pub mod connection;
pub mod message_handler;

pub use client::{RumqttcClientFactory, RumqttcTransport};
pub use connection::configure_mqtt_options;
pub use message_handler::MessageHandler;
