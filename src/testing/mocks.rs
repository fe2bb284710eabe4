//! Mock implementations for testing
//!
//! Provides a mock MQTT transport, client factory and reachability probe so the
//! whole startup sequence can run without a broker or network.
//!
//! ```rust
//! use mqtt_bridge::testing::MockTransport;
//! use mqtt_bridge::transport::{MqttTransport, QoS};
//!
//! # tokio_test::block_on(async {
//! let transport = MockTransport::new();
//! transport
//!     .publish("device/001/ping", QoS::AtMostOnce, false, "x".into())
//!     .await
//!     .unwrap();
//! assert_eq!(transport.get_published().await.len(), 1);
//! # });
//! ```

use crate::broker::{BrokerCandidate, ReachabilityProbe};
use crate::config::ConnectionSection;
use crate::transport::{ClientEvent, ClientFactory, MqttError, MqttTransport, QoS};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

/// How the mock broker answers the connect handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckBehavior {
    /// Successful acknowledgement as soon as the loop starts
    Accept,
    /// Refusal with the given return code
    Refuse(&'static str),
    /// No acknowledgement; the test drives events with [`MockTransport::emit`]
    Silent,
}

/// A recorded publish call
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedMessage {
    pub topic: String,
    pub qos: QoS,
    pub retain: bool,
    pub payload: Bytes,
}

/// Mock transport for testing
#[derive(Debug)]
pub struct MockTransport {
    ack: AckBehavior,
    events: Mutex<Option<mpsc::UnboundedSender<ClientEvent>>>,
    connects: Mutex<Vec<(String, u16, Duration)>>,
    published: Mutex<Vec<PublishedMessage>>,
    subscriptions: Mutex<Vec<(String, QoS)>>,
    fail_publish: AtomicBool,
    fail_subscribe: AtomicBool,
    disconnect_delay_ms: AtomicU64,
    connected: AtomicBool,
    loop_starts: AtomicUsize,
    loop_stops: AtomicUsize,
    disconnects: AtomicUsize,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    pub fn new() -> Self {
        Self::with_ack(AckBehavior::Accept)
    }

    pub fn with_ack(ack: AckBehavior) -> Self {
        Self {
            ack,
            events: Mutex::new(None),
            connects: Mutex::new(Vec::new()),
            published: Mutex::new(Vec::new()),
            subscriptions: Mutex::new(Vec::new()),
            fail_publish: AtomicBool::new(false),
            fail_subscribe: AtomicBool::new(false),
            disconnect_delay_ms: AtomicU64::new(0),
            connected: AtomicBool::new(false),
            loop_starts: AtomicUsize::new(0),
            loop_stops: AtomicUsize::new(0),
            disconnects: AtomicUsize::new(0),
        }
    }

    /// Make every subsequent publish fail
    pub fn set_fail_publish(&self, fail: bool) {
        self.fail_publish.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent subscribe fail
    pub fn set_fail_subscribe(&self, fail: bool) {
        self.fail_subscribe.store(fail, Ordering::SeqCst);
    }

    /// Slow down `disconnect`, to overlap it with other shutdown paths
    pub fn set_disconnect_delay(&self, delay: Duration) {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.disconnect_delay_ms.store(millis, Ordering::SeqCst);
    }

    /// Raise a client event as the network loop would; `false` if nobody listens
    pub async fn emit(&self, event: ClientEvent) -> bool {
        match self.events.lock().await.as_ref() {
            Some(sender) => sender.send(event).is_ok(),
            None => false,
        }
    }

    /// Simulate an inbound publish
    pub async fn inject_message(&self, topic: &str, payload: impl Into<Bytes>) -> bool {
        self.emit(ClientEvent::Message {
            topic: topic.to_string(),
            payload: payload.into(),
        })
        .await
    }

    pub async fn get_connects(&self) -> Vec<(String, u16, Duration)> {
        self.connects.lock().await.clone()
    }

    pub async fn get_published(&self) -> Vec<PublishedMessage> {
        self.published.lock().await.clone()
    }

    pub async fn get_subscriptions(&self) -> Vec<(String, QoS)> {
        self.subscriptions.lock().await.clone()
    }

    pub fn loop_start_count(&self) -> usize {
        self.loop_starts.load(Ordering::SeqCst)
    }

    pub fn loop_stop_count(&self) -> usize {
        self.loop_stops.load(Ordering::SeqCst)
    }

    pub fn disconnect_count(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MqttTransport for MockTransport {
    async fn connect(
        &self,
        host: &str,
        port: u16,
        keep_alive: Duration,
        events: mpsc::UnboundedSender<ClientEvent>,
    ) -> Result<(), MqttError> {
        self.connects
            .lock()
            .await
            .push((host.to_string(), port, keep_alive));
        *self.events.lock().await = Some(events);
        Ok(())
    }

    async fn loop_start(&self) -> Result<(), MqttError> {
        if self.loop_starts.fetch_add(1, Ordering::SeqCst) > 0 {
            return Err(MqttError::LoopAlreadyStarted);
        }
        let ack = match self.ack {
            AckBehavior::Accept => Some(ClientEvent::ConnAck {
                success: true,
                code: "Success".to_string(),
            }),
            AckBehavior::Refuse(code) => Some(ClientEvent::ConnAck {
                success: false,
                code: code.to_string(),
            }),
            AckBehavior::Silent => None,
        };
        if let Some(ack) = ack {
            self.emit(ack).await;
        }
        Ok(())
    }

    async fn loop_stop(&self) -> Result<(), MqttError> {
        self.loop_stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), MqttError> {
        let delay = self.disconnect_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn publish(
        &self,
        topic: &str,
        qos: QoS,
        retain: bool,
        payload: Bytes,
    ) -> Result<(), MqttError> {
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(MqttError::PublishFailed("mock publish failure".into()));
        }
        self.published.lock().await.push(PublishedMessage {
            topic: topic.to_string(),
            qos,
            retain,
            payload,
        });
        Ok(())
    }

    async fn subscribe(&self, topic: &str, qos: QoS) -> Result<(), MqttError> {
        if self.fail_subscribe.load(Ordering::SeqCst) {
            return Err(MqttError::SubscriptionFailed("mock subscribe failure".into()));
        }
        self.subscriptions.lock().await.push((topic.to_string(), qos));
        Ok(())
    }

    fn set_connected_flag(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    fn connected_flag(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

/// Client factory handing out one shared [`MockTransport`]
#[derive(Debug, Clone)]
pub struct MockClientFactory {
    pub transport: Arc<MockTransport>,
    created: Arc<AtomicUsize>,
}

impl MockClientFactory {
    pub fn new(transport: Arc<MockTransport>) -> Self {
        Self {
            transport,
            created: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn create_count(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

impl ClientFactory for MockClientFactory {
    fn create(&self, _params: &ConnectionSection) -> Result<Arc<dyn MqttTransport>, MqttError> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(self.transport.clone())
    }
}

/// Probe answering from a fixed set of reachable hosts
#[derive(Debug, Default)]
pub struct MockProbe {
    reachable: HashSet<String>,
    probed: Mutex<Vec<BrokerCandidate>>,
}

impl MockProbe {
    pub fn reachable(hosts: &[&str]) -> Self {
        Self {
            reachable: hosts.iter().map(|h| h.to_string()).collect(),
            probed: Mutex::new(Vec::new()),
        }
    }

    /// Nothing answers
    pub fn unreachable() -> Self {
        Self::default()
    }

    pub async fn get_probed(&self) -> Vec<BrokerCandidate> {
        self.probed.lock().await.clone()
    }
}

#[async_trait]
impl ReachabilityProbe for MockProbe {
    async fn probe(&self, candidate: &BrokerCandidate) -> bool {
        self.probed.lock().await.push(candidate.clone());
        self.reachable.contains(&candidate.host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_transport_acks_on_loop_start() {
        let transport = MockTransport::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        transport
            .connect("h", 1883, Duration::from_secs(60), tx)
            .await
            .unwrap();
        transport.loop_start().await.unwrap();

        assert_eq!(
            rx.recv().await,
            Some(ClientEvent::ConnAck {
                success: true,
                code: "Success".to_string()
            })
        );
        assert!(transport.loop_start().await.is_err());
    }

    #[tokio::test]
    async fn test_mock_transport_publish_failure_toggle() {
        let transport = MockTransport::new();
        transport.set_fail_publish(true);
        assert!(transport
            .publish("a", QoS::AtMostOnce, false, Bytes::new())
            .await
            .is_err());
        transport.set_fail_publish(false);
        transport
            .publish("a", QoS::AtLeastOnce, true, Bytes::from_static(b"x"))
            .await
            .unwrap();
        let published = transport.get_published().await;
        assert_eq!(published.len(), 1);
        assert!(published[0].retain);
    }

    #[tokio::test]
    async fn test_mock_probe_records_calls() {
        let probe = MockProbe::reachable(&["up"]);
        assert!(probe.probe(&BrokerCandidate::new("up", 1, 1)).await);
        assert!(!probe.probe(&BrokerCandidate::new("down", 1, 1)).await);
        assert_eq!(probe.get_probed().await.len(), 2);
    }
}
