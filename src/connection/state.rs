//! Pure connection state machine
//!
//! ```text
//! Disconnected --ConnectRequested--> Connecting
//! Connecting   --ConnAck(success)--> Connected
//! Connecting   --ConnAck(failure) | Timeout | NetworkError--> Failed
//! Connected    --BrokerDisconnected | NetworkError--> Failed
//! ```
//!
//! `Failed` is terminal: no event leaves it.

use std::fmt;
use thiserror::Error;
use tracing::{error, info, warn};

/// Connection state owned by the connection manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connect attempt made yet
    Disconnected,
    /// Network loop started, waiting for the connect acknowledgement
    Connecting,
    /// Acknowledged by the broker
    Connected,
    /// Terminal failure with reason
    Failed(String),
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ConnectionState::Failed(_))
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => f.write_str("disconnected"),
            ConnectionState::Connecting => f.write_str("connecting"),
            ConnectionState::Connected => f.write_str("connected"),
            ConnectionState::Failed(reason) => write!(f, "failed ({reason})"),
        }
    }
}

/// Events that drive state transitions
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// `connect` was called
    ConnectRequested,
    /// Connect acknowledgement from the broker
    ConnAck { success: bool, code: String },
    /// No acknowledgement arrived in time
    ConnectTimeout,
    /// Broker-initiated disconnect
    BrokerDisconnected(String),
    /// Network or protocol error
    NetworkError(String),
}

/// Rejected transition
#[derive(Debug, Clone, PartialEq, Error)]
#[error("no transition from {from} on {event:?}")]
pub struct InvalidTransition {
    pub from: ConnectionState,
    pub event: ConnectionEvent,
}

/// Determine next state after a connection event (pure function)
pub fn next_state(
    current: &ConnectionState,
    event: &ConnectionEvent,
) -> Result<ConnectionState, InvalidTransition> {
    use ConnectionEvent as E;
    use ConnectionState as S;

    let next = match (current, event) {
        (S::Disconnected, E::ConnectRequested) => S::Connecting,
        (S::Connecting, E::ConnAck { success: true, .. }) => S::Connected,
        (S::Connecting, E::ConnAck { success: false, code }) => {
            S::Failed(format!("connection refused with return code {code}"))
        }
        (S::Connecting, E::ConnectTimeout) => {
            S::Failed("no connect acknowledgement received".to_string())
        }
        (S::Connecting, E::NetworkError(e)) => S::Failed(format!("connect error: {e}")),
        (S::Connected, E::BrokerDisconnected(reason)) => {
            S::Failed(format!("broker disconnected: {reason}"))
        }
        (S::Connected, E::NetworkError(e)) => S::Failed(format!("connection lost: {e}")),
        _ => {
            return Err(InvalidTransition {
                from: current.clone(),
                event: event.clone(),
            })
        }
    };
    Ok(next)
}

/// Check if connection state allows publishing (pure function)
pub fn can_publish(state: &ConnectionState) -> bool {
    matches!(state, ConnectionState::Connected)
}

/// Log connection state transition
pub fn log_state_transition(from: &ConnectionState, to: &ConnectionState) {
    match (from, to) {
        (ConnectionState::Connecting, ConnectionState::Connected) => {
            info!("MQTT connection established");
        }
        (ConnectionState::Connected, ConnectionState::Failed(reason)) => {
            warn!("MQTT connection lost: {}", reason);
        }
        (_, ConnectionState::Failed(reason)) => {
            error!("MQTT connection failed: {}", reason);
        }
        _ => {
            info!("MQTT connection state: {} -> {}", from, to);
        }
    }
}
