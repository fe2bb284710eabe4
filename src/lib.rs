//! MQTT bridge
//!
//! Relays messages between a local publish/subscribe bus and one MQTT broker
//! chosen from a prioritized candidate list.
//!
//! # Overview
//!
//! - Broker selection: probe every candidate, pick the reachable one with the
//!   lowest priority value (earliest declared on ties)
//! - Connection lifecycle: a single connection manager owns the client; any
//!   connection loss ends the process so a supervisor can restart it
//! - Bridges: independent one-directional relays, each with its own codec,
//!   message type and remote topic under the deployment's private path
//!
//! # Quick Start
//!
//! ```rust
//! use mqtt_bridge::broker::{select_broker, BrokerCandidate, ReachabilityResult};
//!
//! let candidates = vec![
//!     BrokerCandidate::new("A", 1883, 10),
//!     BrokerCandidate::new("B", 1883, 5),
//!     BrokerCandidate::new("C", 1883, 5),
//! ];
//! let reachable = ReachabilityResult::from_outcomes([false, true, true]);
//!
//! let selected = select_broker(&candidates, &reachable).unwrap();
//! assert_eq!(selected.host, "B");
//! ```

pub mod bridge;
pub mod broker;
pub mod config;
pub mod connection;
pub mod error;
pub mod lifecycle;
pub mod local;
pub mod observability;
pub mod plugins;
pub mod shutdown;
pub mod testing;
pub mod transport;

pub use bridge::{BridgeDispatcher, BridgeSpec, Direction};
pub use broker::{select_broker, BrokerCandidate, NoReachableBroker};
pub use config::BridgeConfig;
pub use connection::{ConnectionManager, ConnectionState};
pub use error::{BridgeError, BridgeResult};
pub use lifecycle::{BridgeApp, RunningBridge};
pub use shutdown::{ShutdownReason, ShutdownSignal};
