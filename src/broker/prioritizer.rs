//! Broker selection by reachability and priority
//!
//! Every candidate is probed once per selection round. Among the reachable ones
//! the lowest priority value wins; ties go to the candidate declared first. The
//! winner is returned whole, so its host is always paired with its own port.

use super::probe::ReachabilityProbe;
use super::{BrokerCandidate, NoReachableBroker};
use futures::future::join_all;
use std::sync::Arc;
use tracing::{info, warn};

/// Candidates that answered the probe, by position in the candidate list
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReachabilityResult {
    reachable: Vec<usize>,
}

impl ReachabilityResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from per-candidate probe outcomes in candidate order
    pub fn from_outcomes<I: IntoIterator<Item = bool>>(outcomes: I) -> Self {
        Self {
            reachable: outcomes
                .into_iter()
                .enumerate()
                .filter_map(|(index, ok)| ok.then_some(index))
                .collect(),
        }
    }

    /// Record a successful probe for the candidate at `index`
    pub fn record(&mut self, index: usize) {
        if let Err(pos) = self.reachable.binary_search(&index) {
            self.reachable.insert(pos, index);
        }
    }

    pub fn is_reachable(&self, index: usize) -> bool {
        self.reachable.binary_search(&index).is_ok()
    }

    /// Reachable candidate indices, ascending
    pub fn indices(&self) -> &[usize] {
        &self.reachable
    }

    pub fn len(&self) -> usize {
        self.reachable.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reachable.is_empty()
    }

    /// `host -> priority` view over the reachable candidates
    pub fn priorities<'a>(
        &'a self,
        candidates: &'a [BrokerCandidate],
    ) -> impl Iterator<Item = (&'a str, i64)> + 'a {
        self.reachable
            .iter()
            .filter_map(move |&i| candidates.get(i))
            .map(|c| (c.host.as_str(), c.priority))
    }
}

/// Pick the reachable candidate with the lowest priority, earliest on ties (pure function)
pub fn select_broker<'a>(
    candidates: &'a [BrokerCandidate],
    reachable: &ReachabilityResult,
) -> Result<&'a BrokerCandidate, NoReachableBroker> {
    let mut selected: Option<&BrokerCandidate> = None;
    for candidate in reachable.indices().iter().filter_map(|&i| candidates.get(i)) {
        match selected {
            Some(best) if best.priority <= candidate.priority => {}
            _ => selected = Some(candidate),
        }
    }
    selected.ok_or(NoReachableBroker {
        candidates: candidates.len(),
    })
}

/// Probes candidates and selects the broker to connect to
pub struct BrokerPrioritizer {
    probe: Arc<dyn ReachabilityProbe>,
    concurrent: bool,
}

impl BrokerPrioritizer {
    pub fn new(probe: Arc<dyn ReachabilityProbe>) -> Self {
        Self {
            probe,
            concurrent: true,
        }
    }

    /// Probe one candidate at a time instead of all at once
    pub fn sequential(mut self) -> Self {
        self.concurrent = false;
        self
    }

    pub fn with_concurrency(mut self, concurrent: bool) -> Self {
        self.concurrent = concurrent;
        self
    }

    /// Run one probe per candidate
    pub async fn probe_all(&self, candidates: &[BrokerCandidate]) -> ReachabilityResult {
        if self.concurrent {
            let outcomes = join_all(candidates.iter().map(|c| self.probe.probe(c))).await;
            ReachabilityResult::from_outcomes(outcomes)
        } else {
            let mut result = ReachabilityResult::new();
            for (index, candidate) in candidates.iter().enumerate() {
                if self.probe.probe(candidate).await {
                    result.record(index);
                }
            }
            result
        }
    }

    /// Probe all candidates and select one
    pub async fn select(
        &self,
        candidates: &[BrokerCandidate],
    ) -> Result<BrokerCandidate, NoReachableBroker> {
        if candidates.is_empty() {
            warn!("No broker candidates configured");
            return Err(NoReachableBroker { candidates: 0 });
        }

        let reachable = self.probe_all(candidates).await;
        info!(
            reachable = reachable.len(),
            candidates = candidates.len(),
            "Probe round complete"
        );

        match select_broker(candidates, &reachable) {
            Ok(selected) => {
                info!(
                    host = %selected.host,
                    port = selected.port,
                    priority = selected.priority,
                    "Highest priority broker: {}",
                    selected
                );
                Ok(selected.clone())
            }
            Err(e) => {
                for candidate in candidates {
                    warn!(
                        host = %candidate.host,
                        port = candidate.port,
                        priority = candidate.priority,
                        "Broker unreachable"
                    );
                }
                Err(e)
            }
        }
    }
}
