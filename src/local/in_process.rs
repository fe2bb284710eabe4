//! In-process implementation of the local bus

use super::{LocalBus, LocalBusError, LocalMessage};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};

/// Queue depth per local subscriber
pub const LOCAL_QUEUE: usize = 256;

struct Endpoint {
    msg_type: String,
    subscribers: Vec<mpsc::Sender<LocalMessage>>,
}

/// Typed endpoints backed by bounded channels.
///
/// The first subscribe or publish on an endpoint fixes its message type.
/// Delivery never blocks the publisher; a full subscriber queue drops the message.
#[derive(Default)]
pub struct InProcessBus {
    endpoints: RwLock<HashMap<String, Endpoint>>,
}

impl InProcessBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Message type bound to `endpoint`, if any
    pub async fn endpoint_type(&self, endpoint: &str) -> Option<String> {
        self.endpoints
            .read()
            .await
            .get(endpoint)
            .map(|e| e.msg_type.clone())
    }

    /// Live subscribers on `endpoint`
    pub async fn subscriber_count(&self, endpoint: &str) -> usize {
        self.endpoints
            .read()
            .await
            .get(endpoint)
            .map_or(0, |e| e.subscribers.iter().filter(|s| !s.is_closed()).count())
    }

    fn check_type(endpoint: &str, existing: &str, requested: &str) -> Result<(), LocalBusError> {
        if existing != requested {
            return Err(LocalBusError::TypeMismatch {
                endpoint: endpoint.to_string(),
                existing: existing.to_string(),
                requested: requested.to_string(),
            });
        }
        Ok(())
    }
}

fn validate_endpoint(endpoint: &str) -> Result<(), LocalBusError> {
    if endpoint.trim().is_empty() || endpoint.chars().any(char::is_whitespace) {
        return Err(LocalBusError::InvalidEndpoint(endpoint.to_string()));
    }
    Ok(())
}

#[async_trait]
impl LocalBus for InProcessBus {
    async fn subscribe(
        &self,
        endpoint: &str,
        msg_type: &str,
    ) -> Result<mpsc::Receiver<LocalMessage>, LocalBusError> {
        validate_endpoint(endpoint)?;
        let mut endpoints = self.endpoints.write().await;
        let entry = endpoints
            .entry(endpoint.to_string())
            .or_insert_with(|| Endpoint {
                msg_type: msg_type.to_string(),
                subscribers: Vec::new(),
            });
        Self::check_type(endpoint, &entry.msg_type, msg_type)?;

        let (tx, rx) = mpsc::channel(LOCAL_QUEUE);
        entry.subscribers.retain(|s| !s.is_closed());
        entry.subscribers.push(tx);
        debug!(endpoint = %endpoint, msg_type = %msg_type, "Local subscriber registered");
        Ok(rx)
    }

    async fn publish(&self, endpoint: &str, message: LocalMessage) -> Result<(), LocalBusError> {
        validate_endpoint(endpoint)?;
        let mut endpoints = self.endpoints.write().await;
        let entry = endpoints
            .entry(endpoint.to_string())
            .or_insert_with(|| Endpoint {
                msg_type: message.msg_type.clone(),
                subscribers: Vec::new(),
            });
        Self::check_type(endpoint, &entry.msg_type, &message.msg_type)?;

        for subscriber in &entry.subscribers {
            match subscriber.try_send(message.clone()) {
                Ok(()) | Err(TrySendError::Closed(_)) => {}
                Err(TrySendError::Full(_)) => {
                    warn!(endpoint = %endpoint, "Local subscriber queue full, message dropped");
                }
            }
        }
        Ok(())
    }
}
