//! Builds every configured bridge and runs each on its own task

use super::relay::{Bridge, BridgeStats};
use super::spec::{BridgeSpec, Direction};
use super::BridgeContext;
use crate::config::ConfigError;
use crate::connection::ConnectionHandle;
use crate::error::BridgeError;
use crate::local::LocalBus;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, Instrument};

/// A bridge that could not be started
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeFailure {
    pub index: usize,
    pub reason: String,
}

/// A started bridge
#[derive(Debug)]
pub struct ActiveBridge {
    pub index: usize,
    pub label: String,
    pub direction: Direction,
    pub remote_topic: String,
    pub stats: Arc<BridgeStats>,
    task: JoinHandle<()>,
}

/// The set of running bridges
///
/// Each bridge is built, subscribed and spawned independently: a bridge that
/// fails at any of those steps is recorded and skipped.
#[derive(Debug, Default)]
pub struct BridgeDispatcher {
    active: Vec<ActiveBridge>,
    failures: Vec<BridgeFailure>,
}

impl BridgeDispatcher {
    /// Start one relay per entry, in configuration order
    pub async fn start(
        specs: Vec<Result<BridgeSpec, ConfigError>>,
        context: &BridgeContext,
        handle: ConnectionHandle,
        bus: Arc<dyn LocalBus>,
    ) -> Self {
        let mut dispatcher = Self::default();

        for (index, spec) in specs.into_iter().enumerate() {
            let started = match spec {
                Ok(spec) => Self::start_one(index, spec, context, &handle, &bus).await,
                Err(e) => Err(BridgeError::invalid_bridge(format!("#{index}"), e.to_string())),
            };
            match started {
                Ok(active) => dispatcher.active.push(active),
                Err(e) => {
                    error!(bridge_index = index, error = %e, "Bridge not started");
                    dispatcher.failures.push(BridgeFailure {
                        index,
                        reason: e.to_string(),
                    });
                }
            }
        }

        info!(
            active = dispatcher.active.len(),
            failed = dispatcher.failures.len(),
            "Bridges started"
        );
        dispatcher
    }

    async fn start_one(
        index: usize,
        spec: BridgeSpec,
        context: &BridgeContext,
        handle: &ConnectionHandle,
        bus: &Arc<dyn LocalBus>,
    ) -> Result<ActiveBridge, BridgeError> {
        let bridge = Arc::new(Bridge::build(index, spec, context)?);
        let feed = bridge.subscribe(handle, bus.as_ref()).await.map_err(|e| {
            BridgeError::invalid_bridge(bridge.label(), format!("subscribe failed: {e}"))
        })?;

        let span = crate::bridge_span!(
            bridge = %bridge.label(),
            direction = %bridge.direction()
        );
        let task = tokio::spawn(
            bridge
                .clone()
                .run(feed, handle.clone(), bus.clone())
                .instrument(span),
        );

        Ok(ActiveBridge {
            index,
            label: bridge.label().to_string(),
            direction: bridge.direction(),
            remote_topic: bridge.remote_topic().to_string(),
            stats: bridge.stats(),
            task,
        })
    }

    pub fn active(&self) -> &[ActiveBridge] {
        &self.active
    }

    pub fn failures(&self) -> &[BridgeFailure] {
        &self.failures
    }

    /// Stats of the bridge declared at `index`, if it is running
    pub fn stats(&self, index: usize) -> Option<Arc<BridgeStats>> {
        self.active
            .iter()
            .find(|b| b.index == index)
            .map(|b| b.stats.clone())
    }

    /// Stop every relay task
    pub fn stop(&self) {
        for bridge in &self.active {
            bridge.task.abort();
        }
    }
}

impl Drop for BridgeDispatcher {
    fn drop(&mut self) {
        self.stop();
    }
}
