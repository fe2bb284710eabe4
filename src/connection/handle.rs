//! Shared, read-mostly view of the connection used by bridges

use super::state::{can_publish, ConnectionState};
use super::subscriptions::{InboundMessage, SubscriptionTable};
use crate::transport::{MqttError, MqttTransport, QoS};
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

/// Handle to the connected client, handed out once the broker acknowledged
///
/// Bridges borrow the connection through this handle; they can publish and
/// subscribe but never drive the connection lifecycle. Once the manager starts
/// shutting down the handle is released: the state may still read `Connected`
/// but every call fails with [`MqttError::ConnectionReleased`].
#[derive(Clone)]
pub struct ConnectionHandle {
    transport: Arc<dyn MqttTransport>,
    state: watch::Receiver<ConnectionState>,
    subscriptions: Arc<SubscriptionTable>,
    released: Arc<AtomicBool>,
}

impl ConnectionHandle {
    pub(crate) fn new(
        transport: Arc<dyn MqttTransport>,
        state: watch::Receiver<ConnectionState>,
        subscriptions: Arc<SubscriptionTable>,
        released: Arc<AtomicBool>,
    ) -> Self {
        Self {
            transport,
            state,
            subscriptions,
            released,
        }
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    pub fn is_connected(&self) -> bool {
        !self.is_released() && can_publish(&self.state.borrow())
    }

    fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    fn check_connection_state(&self) -> Result<(), MqttError> {
        if self.is_released() {
            return Err(MqttError::ConnectionReleased);
        }
        let current_state = self.state();
        if !can_publish(&current_state) {
            return Err(MqttError::NotConnected {
                state: current_state,
            });
        }
        Ok(())
    }

    /// Publish a payload; fails fast when the connection is not up
    pub async fn publish(
        &self,
        topic: &str,
        qos: QoS,
        retain: bool,
        payload: Bytes,
    ) -> Result<(), MqttError> {
        self.check_connection_state()?;
        self.transport.publish(topic, qos, retain, payload).await
    }

    /// Subscribe to a topic filter and receive matching publishes
    pub async fn subscribe(
        &self,
        filter: &str,
        qos: QoS,
    ) -> Result<mpsc::Receiver<InboundMessage>, MqttError> {
        self.check_connection_state()?;
        let receiver = self.subscriptions.register(filter).await;
        if let Err(e) = self.transport.subscribe(filter, qos).await {
            drop(receiver);
            self.subscriptions.prune().await;
            return Err(e);
        }
        Ok(receiver)
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("state", &*self.state.borrow())
            .finish()
    }
}
