//! Startup wiring and process lifecycle
//!
//! Startup runs in a fixed order and aborts on the first fatal error:
//!
//! 1. resolve the configured plugins (codecs, client factory)
//! 2. probe the broker candidates and select one
//! 3. create the client and connect, waiting for the acknowledgement
//! 4. build and start every bridge
//!
//! Any fatal error also requests a fatal shutdown, so the process exits
//! non-zero and the supervisor restarts it from step 1.

use crate::bridge::{BridgeContext, BridgeDispatcher};
use crate::broker::{BrokerCandidate, BrokerPrioritizer, ReachabilityProbe, TcpProbe};
use crate::config::BridgeConfig;
use crate::connection::{ConnectionManager, ConnectionState};
use crate::error::BridgeError;
use crate::local::LocalBus;
use crate::plugins::PluginRegistry;
use crate::shutdown::{ShutdownReason, ShutdownSignal};
use std::sync::Arc;
use tracing::{error, info, Instrument};

/// Assembles the bridge from configuration
pub struct BridgeApp {
    config: BridgeConfig,
    registry: PluginRegistry,
    probe: Option<Arc<dyn ReachabilityProbe>>,
    shutdown: ShutdownSignal,
}

impl BridgeApp {
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            config,
            registry: PluginRegistry::with_defaults(),
            probe: None,
            shutdown: ShutdownSignal::new(),
        }
    }

    /// Replace the plugin registry (custom codecs or client factories)
    pub fn with_registry(mut self, registry: PluginRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Replace the TCP reachability probe
    pub fn with_probe(mut self, probe: Arc<dyn ReachabilityProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Share an existing shutdown signal, e.g. one wired to OS signals
    pub fn with_shutdown_signal(mut self, shutdown: ShutdownSignal) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    fn prioritizer(&self) -> BrokerPrioritizer {
        let probe = self
            .probe
            .clone()
            .unwrap_or_else(|| Arc::new(TcpProbe::from_config(&self.config.probe)));
        BrokerPrioritizer::new(probe).with_concurrency(self.config.probe.concurrent)
    }

    fn abort(&self, error: BridgeError) -> BridgeError {
        error!(error = %error, fatal = error.is_fatal(), "Startup aborted");
        self.shutdown
            .request(ShutdownReason::fatal(format!("startup failed: {error}")));
        error
    }

    /// Run the startup sequence against `bus`
    pub async fn start(self, bus: Arc<dyn LocalBus>) -> Result<RunningBridge, BridgeError> {
        let span = crate::lifecycle_span!(phase = "startup", brokers = self.config.ip.len());
        self.start_inner(bus).instrument(span).await
    }

    async fn start_inner(self, bus: Arc<dyn LocalBus>) -> Result<RunningBridge, BridgeError> {
        info!("Starting MQTT bridge");

        let context = match BridgeContext::from_config(&self.config, &self.registry) {
            Ok(context) => context,
            Err(e) => return Err(self.abort(e)),
        };
        let factory = match self
            .registry
            .resolve_client_factory(&self.config.mqtt_client_factory)
        {
            Ok(factory) => factory,
            Err(e) => return Err(self.abort(e.into())),
        };
        info!(
            serializer = %self.config.serializer,
            deserializer = %self.config.deserializer,
            client_factory = %self.config.mqtt_client_factory,
            "Plugins resolved"
        );

        let candidates = self.config.ip.candidates();
        let broker = match self.prioritizer().select(&candidates).await {
            Ok(broker) => broker,
            Err(e) => return Err(self.abort(e.into())),
        };

        let transport = match factory.create(&self.config.mqtt.connection) {
            Ok(transport) => transport,
            Err(e) => {
                let error = BridgeError::connect_failure(&broker.host, broker.port, e.to_string());
                return Err(self.abort(error));
            }
        };

        let manager = ConnectionManager::new(
            transport,
            self.config.mqtt.connection.keep_alive(),
            self.shutdown.clone(),
        );
        manager.connect(&broker).await?;
        let handle = match manager.wait_connected().await {
            Ok(handle) => handle,
            Err(e) => {
                manager
                    .shutdown(ShutdownReason::fatal(e.to_string()))
                    .await;
                return Err(e);
            }
        };

        let dispatcher =
            BridgeDispatcher::start(self.config.bridge_specs(), &context, handle, bus).await;

        info!(
            host = %broker.host,
            port = broker.port,
            bridges = dispatcher.active().len(),
            "MQTT bridge running"
        );

        Ok(RunningBridge {
            broker,
            manager,
            dispatcher,
            shutdown: self.shutdown,
        })
    }
}

/// A started bridge process
pub struct RunningBridge {
    broker: BrokerCandidate,
    manager: Arc<ConnectionManager>,
    dispatcher: BridgeDispatcher,
    shutdown: ShutdownSignal,
}

impl RunningBridge {
    /// Selected broker
    pub fn broker(&self) -> &BrokerCandidate {
        &self.broker
    }

    pub fn state(&self) -> ConnectionState {
        self.manager.state()
    }

    pub fn manager(&self) -> &Arc<ConnectionManager> {
        &self.manager
    }

    pub fn dispatcher(&self) -> &BridgeDispatcher {
        &self.dispatcher
    }

    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Block until shutdown is requested, stop the bridges, then tear the
    /// connection down. Returns only after the teardown has completed, even
    /// when another task started it.
    pub async fn wait(self) -> ShutdownReason {
        let reason = self.shutdown.wait().await;
        info!(reason = %reason.message, fatal = reason.fatal, "Shutdown requested");
        self.dispatcher.stop();
        self.manager.shutdown(reason.clone()).await;
        reason
    }
}
