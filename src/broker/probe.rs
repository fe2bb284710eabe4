//! Reachability probes used to rank broker candidates
//!
//! A probe is a bounded connectivity check independent of the MQTT handshake.
//! Errors, refusals and timeouts all count as "unreachable".

use super::BrokerCandidate;
use crate::config::ProbeSection;
use async_trait::async_trait;
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    /// `true` if the candidate answered within the probe's bounds
    async fn probe(&self, candidate: &BrokerCandidate) -> bool;
}

/// TCP connect probe against the candidate's own host and port
#[derive(Debug, Clone)]
pub struct TcpProbe {
    timeout: Duration,
    attempts: u32,
}

impl TcpProbe {
    pub fn new(timeout: Duration, attempts: u32) -> Self {
        Self {
            timeout,
            attempts: attempts.max(1),
        }
    }

    pub fn from_config(section: &ProbeSection) -> Self {
        Self::new(section.timeout(), section.attempts)
    }
}

#[async_trait]
impl ReachabilityProbe for TcpProbe {
    async fn probe(&self, candidate: &BrokerCandidate) -> bool {
        let address = (candidate.host.as_str(), candidate.port);
        for attempt in 1..=self.attempts {
            match tokio::time::timeout(self.timeout, TcpStream::connect(address)).await {
                Ok(Ok(_stream)) => {
                    info!(
                        host = %candidate.host,
                        port = candidate.port,
                        attempt = attempt,
                        "Probe to {}:{} succeeded",
                        candidate.host,
                        candidate.port
                    );
                    return true;
                }
                Ok(Err(e)) => {
                    debug!(host = %candidate.host, port = candidate.port, attempt = attempt, error = %e, "Probe attempt failed");
                }
                Err(_) => {
                    debug!(host = %candidate.host, port = candidate.port, attempt = attempt, "Probe attempt timed out");
                }
            }
        }
        warn!(
            host = %candidate.host,
            port = candidate.port,
            priority = candidate.priority,
            "Probe to {}:{} failed",
            candidate.host,
            candidate.port
        );
        false
    }
}
