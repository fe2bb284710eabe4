//! Broker candidates, reachability probing and selection

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod prioritizer;
pub mod probe;

pub use prioritizer::{select_broker, BrokerPrioritizer, ReachabilityResult};
pub use probe::{ReachabilityProbe, TcpProbe};

/// A broker offered in configuration. Lower priority value is preferred.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerCandidate {
    pub host: String,
    pub port: u16,
    pub priority: i64,
}

impl BrokerCandidate {
    pub fn new<S: Into<String>>(host: S, port: u16, priority: i64) -> Self {
        Self {
            host: host.into(),
            port,
            priority,
        }
    }
}

impl std::fmt::Display for BrokerCandidate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{} (priority {})", self.host, self.port, self.priority)
    }
}

/// No candidate passed the reachability probe
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("No reachable broker among {candidates} candidate(s)")]
pub struct NoReachableBroker {
    pub candidates: usize,
}
