//! A single one-directional relay between the local bus and the broker

use super::message_type::MessageType;
use super::spec::{BridgeSpec, Direction};
use super::BridgeContext;
use crate::connection::{ConnectionHandle, InboundMessage};
use crate::error::BridgeError;
use crate::local::{LocalBus, LocalMessage};
use crate::plugins::Codec;
use crate::transport::{qos_from_level, validate_topic_filter, validate_topic_name, QoS};
use bytes::Bytes;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Minimum spacing between publishes of a rate-limited bridge
#[derive(Debug, Clone)]
pub struct Throttle {
    interval: Option<Duration>,
    last: Option<Instant>,
}

impl Throttle {
    /// `frequency` in Hz; `None` admits everything
    pub fn new(frequency: Option<f64>) -> Self {
        let interval = frequency
            .filter(|hz| *hz > 0.0)
            .map(|hz| Duration::try_from_secs_f64(1.0 / hz).unwrap_or(Duration::MAX));
        Self {
            interval,
            last: None,
        }
    }

    /// Whether a message arriving at `now` may be published
    pub fn admit(&mut self, now: Instant) -> bool {
        let Some(interval) = self.interval else {
            return true;
        };
        match self.last {
            Some(last) if now.saturating_duration_since(last) < interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}

/// Per-bridge counters
#[derive(Debug, Default)]
pub struct BridgeStats {
    relayed: AtomicU64,
    dropped: AtomicU64,
    failed: AtomicU64,
}

impl BridgeStats {
    /// Messages delivered to the other side
    pub fn relayed(&self) -> u64 {
        self.relayed.load(Ordering::Relaxed)
    }

    /// Messages discarded by throttling, type mismatch or a bad payload
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Messages that could not be delivered
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

/// Source of messages for a running bridge
pub enum Feed {
    Local(mpsc::Receiver<LocalMessage>),
    Remote(mpsc::Receiver<InboundMessage>),
}

/// Outcome of relaying one local message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    Published,
    Dropped(String),
}

/// A configured relay, bound to its codec, message type and remote topic
pub struct Bridge {
    label: String,
    spec: BridgeSpec,
    remote_topic: String,
    qos: QoS,
    codec: Arc<dyn Codec>,
    message_type: Arc<MessageType>,
    stats: Arc<BridgeStats>,
}

impl Bridge {
    /// Resolve everything the bridge needs; any failure is reported as [`BridgeError::InvalidBridge`]
    pub fn build(index: usize, spec: BridgeSpec, context: &BridgeContext) -> Result<Self, BridgeError> {
        let label = spec.label(index);
        let invalid = |message: String| BridgeError::invalid_bridge(label.clone(), message);

        spec.validate().map_err(invalid)?;
        let message_type = context
            .message_types
            .resolve(&spec.message_type)
            .map_err(|e| invalid(e.to_string()))?;
        let codec = context
            .codec_for(&spec)
            .map_err(|e| invalid(e.to_string()))?;
        let qos = qos_from_level(spec.qos).map_err(|e| invalid(e.to_string()))?;

        let remote_topic = context.private_path.extract(&spec.remote_topic);
        let topic_check = match spec.direction {
            Direction::LocalToRemote => validate_topic_name(&remote_topic),
            Direction::RemoteToLocal => validate_topic_filter(&remote_topic),
        };
        topic_check.map_err(|e| invalid(format!("remote topic '{remote_topic}': {e}")))?;

        Ok(Self {
            label,
            spec,
            remote_topic,
            qos,
            codec,
            message_type,
            stats: Arc::new(BridgeStats::default()),
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn direction(&self) -> Direction {
        self.spec.direction
    }

    pub fn spec(&self) -> &BridgeSpec {
        &self.spec
    }

    /// Remote topic with the private path applied
    pub fn remote_topic(&self) -> &str {
        &self.remote_topic
    }

    pub fn stats(&self) -> Arc<BridgeStats> {
        self.stats.clone()
    }

    /// Subscribe to this bridge's source
    pub async fn subscribe(
        &self,
        handle: &ConnectionHandle,
        bus: &dyn LocalBus,
    ) -> Result<Feed, BridgeError> {
        match self.spec.direction {
            Direction::LocalToRemote => {
                let rx = bus
                    .subscribe(&self.spec.local_endpoint, self.message_type.name())
                    .await?;
                Ok(Feed::Local(rx))
            }
            Direction::RemoteToLocal => {
                let rx = handle.subscribe(&self.remote_topic, self.qos).await?;
                Ok(Feed::Remote(rx))
            }
        }
    }

    /// Serialize a local message and publish it on the remote topic
    pub async fn forward_local(
        &self,
        handle: &ConnectionHandle,
        message: &LocalMessage,
    ) -> Result<RelayOutcome, BridgeError> {
        if message.msg_type != self.message_type.name() {
            return Ok(RelayOutcome::Dropped(format!(
                "expected {}, got {}",
                self.message_type.name(),
                message.msg_type
            )));
        }

        let payload = self.codec.encode(&message.body)?;
        handle
            .publish(&self.remote_topic, self.qos, self.spec.retain, Bytes::from(payload))
            .await
            .map_err(|source| BridgeError::DeliveryError {
                topic: self.remote_topic.clone(),
                source,
            })?;
        Ok(RelayOutcome::Published)
    }

    /// Deserialize an inbound publish and republish it on the local endpoint
    pub async fn deliver_remote(
        &self,
        bus: &dyn LocalBus,
        inbound: &InboundMessage,
    ) -> Result<(), BridgeError> {
        let decoded = self
            .codec
            .decode(&inbound.payload)
            .map_err(|e| BridgeError::deserialization(&inbound.topic, e.to_string()))?;
        let body = self
            .message_type
            .populate(decoded)
            .map_err(|e| BridgeError::deserialization(&inbound.topic, e.to_string()))?;

        let message = LocalMessage::new(self.message_type.name(), body);
        bus.publish(&self.spec.local_endpoint, message).await?;
        Ok(())
    }

    /// Relay until the source closes
    pub async fn run(self: Arc<Self>, feed: Feed, handle: ConnectionHandle, bus: Arc<dyn LocalBus>) {
        info!(
            bridge = %self.label,
            direction = %self.spec.direction,
            topic = %self.remote_topic,
            codec = self.codec.name(),
            "Bridge started"
        );
        match feed {
            Feed::Local(rx) => self.run_outbound(rx, &handle).await,
            Feed::Remote(rx) => self.run_inbound(rx, bus.as_ref()).await,
        }
        info!(bridge = %self.label, "Bridge source closed");
    }

    async fn run_outbound(&self, mut rx: mpsc::Receiver<LocalMessage>, handle: &ConnectionHandle) {
        let mut throttle = Throttle::new(self.spec.frequency);
        while let Some(message) = rx.recv().await {
            if !throttle.admit(Instant::now()) {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                debug!(bridge = %self.label, "Throttled local message");
                continue;
            }
            match self.forward_local(handle, &message).await {
                Ok(RelayOutcome::Published) => {
                    self.stats.relayed.fetch_add(1, Ordering::Relaxed);
                }
                Ok(RelayOutcome::Dropped(reason)) => {
                    self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                    warn!(bridge = %self.label, reason = %reason, "Dropping local message of wrong type");
                }
                Err(e) => {
                    self.stats.failed.fetch_add(1, Ordering::Relaxed);
                    warn!(bridge = %self.label, topic = %self.remote_topic, error = %e, "Delivery failed");
                }
            }
        }
    }

    async fn run_inbound(&self, mut rx: mpsc::Receiver<InboundMessage>, bus: &dyn LocalBus) {
        while let Some(inbound) = rx.recv().await {
            match self.deliver_remote(bus, &inbound).await {
                Ok(()) => {
                    self.stats.relayed.fetch_add(1, Ordering::Relaxed);
                }
                Err(e @ BridgeError::DeserializationError { .. }) => {
                    self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                    error!(bridge = %self.label, topic = %inbound.topic, "{}", e);
                }
                Err(e) => {
                    self.stats.failed.fetch_add(1, Ordering::Relaxed);
                    warn!(bridge = %self.label, endpoint = %self.spec.local_endpoint, error = %e, "Local publish failed");
                }
            }
        }
    }
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("label", &self.label)
            .field("direction", &self.spec.direction)
            .field("remote_topic", &self.remote_topic)
            .field("codec", &self.codec.name())
            .finish()
    }
}
