//! Routing of inbound publishes to the bridges that subscribed to them

use crate::transport::topic_matches_filter;
use bytes::Bytes;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, warn};

/// Queue depth per subscription
pub const SUBSCRIPTION_QUEUE: usize = 256;

/// A publish received from the broker
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Bytes,
}

struct Subscription {
    filter: String,
    sender: mpsc::Sender<InboundMessage>,
}

/// Topic filter -> subscriber table
///
/// Dispatch runs on the network event task and never blocks it: a full
/// subscriber queue drops the message with a rate-limited warning.
pub struct SubscriptionTable {
    subscriptions: RwLock<Vec<Subscription>>,
    last_drop_warn: Mutex<Option<Instant>>,
}

impl Default for SubscriptionTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SubscriptionTable {
    pub fn new() -> Self {
        Self {
            subscriptions: RwLock::new(Vec::new()),
            last_drop_warn: Mutex::new(None),
        }
    }

    /// Register a subscriber for `filter`
    pub async fn register(&self, filter: &str) -> mpsc::Receiver<InboundMessage> {
        let (sender, receiver) = mpsc::channel(SUBSCRIPTION_QUEUE);
        self.subscriptions.write().await.push(Subscription {
            filter: filter.to_string(),
            sender,
        });
        receiver
    }

    /// Deliver a publish to every matching subscriber; returns the delivery count
    pub async fn dispatch(&self, topic: &str, payload: Bytes) -> usize {
        let subscriptions = self.subscriptions.read().await;
        let mut delivered = 0;
        for subscription in subscriptions
            .iter()
            .filter(|s| topic_matches_filter(topic, &s.filter))
        {
            let message = InboundMessage {
                topic: topic.to_string(),
                payload: payload.clone(),
            };
            match subscription.sender.try_send(message) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => self.warn_dropped(topic).await,
                Err(TrySendError::Closed(_)) => {
                    debug!(filter = %subscription.filter, "Subscriber gone, skipping");
                }
            }
        }
        if delivered == 0 {
            debug!(topic = %topic, "No subscriber for inbound message");
        }
        delivered
    }

    /// Drop subscriptions whose receiver is gone; returns how many were removed
    pub async fn prune(&self) -> usize {
        let mut subscriptions = self.subscriptions.write().await;
        let before = subscriptions.len();
        subscriptions.retain(|s| !s.sender.is_closed());
        before - subscriptions.len()
    }

    pub async fn len(&self) -> usize {
        self.subscriptions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.subscriptions.read().await.is_empty()
    }

    async fn warn_dropped(&self, topic: &str) {
        let mut last = self.last_drop_warn.lock().await;
        if last.map_or(true, |t| t.elapsed() > Duration::from_secs(1)) {
            warn!(topic = %topic, "inbound_message_dropped: subscriber queue full");
            *last = Some(Instant::now());
        }
    }
}
