//! Local publish/subscribe bus collaborator
//!
//! Bridges talk to the local side only through [`LocalBus`]. Endpoints are
//! typed: every message carries the name of its message type and an endpoint
//! accepts a single type for its lifetime.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;

pub mod in_process;

pub use in_process::InProcessBus;

/// A message on the local bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalMessage {
    /// `package/Type` name
    pub msg_type: String,
    /// Message body, an object keyed by field name
    pub body: Value,
}

impl LocalMessage {
    pub fn new<S: Into<String>>(msg_type: S, body: Value) -> Self {
        Self {
            msg_type: msg_type.into(),
            body,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocalBusError {
    #[error("Endpoint '{endpoint}' carries {existing}, not {requested}")]
    TypeMismatch {
        endpoint: String,
        existing: String,
        requested: String,
    },
    #[error("Invalid endpoint name '{0}'")]
    InvalidEndpoint(String),
}

/// Local message bus
#[async_trait]
pub trait LocalBus: Send + Sync {
    /// Subscribe to `endpoint`, declaring the message type expected on it
    async fn subscribe(
        &self,
        endpoint: &str,
        msg_type: &str,
    ) -> Result<mpsc::Receiver<LocalMessage>, LocalBusError>;

    /// Publish to every subscriber of `endpoint`
    async fn publish(&self, endpoint: &str, message: LocalMessage) -> Result<(), LocalBusError>;
}
