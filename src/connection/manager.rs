//! Connection manager: owns the MQTT client and its lifecycle
//!
//! Every state change goes through [`ConnectionManager::apply`], which performs
//! the transition atomically on the state channel. Broker callbacks arrive as
//! [`ClientEvent`]s on the event task, so the single-writer rule holds even
//! though the network loop runs on its own task.
//!
//! There is no in-process reconnect. Once the state is `Failed` the manager
//! requests a fatal process shutdown, then disconnects and stops the loop; the
//! supervisor restarts the process and broker selection runs again.

use super::handle::ConnectionHandle;
use super::state::{log_state_transition, next_state, ConnectionEvent, ConnectionState};
use super::subscriptions::SubscriptionTable;
use crate::broker::BrokerCandidate;
use crate::error::BridgeError;
use crate::shutdown::{ShutdownReason, ShutdownSignal};
use crate::transport::{ClientEvent, MqttTransport};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::{mpsc, watch, OnceCell};
use tracing::{debug, error, info, warn};

pub struct ConnectionManager {
    transport: Arc<dyn MqttTransport>,
    keep_alive: Duration,
    state_tx: watch::Sender<ConnectionState>,
    subscriptions: Arc<SubscriptionTable>,
    shutdown_signal: ShutdownSignal,
    broker: OnceLock<BrokerCandidate>,
    connect_called: AtomicBool,
    released: Arc<AtomicBool>,
    teardown: OnceCell<()>,
}

impl ConnectionManager {
    pub fn new(
        transport: Arc<dyn MqttTransport>,
        keep_alive: Duration,
        shutdown_signal: ShutdownSignal,
    ) -> Arc<Self> {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Arc::new(Self {
            transport,
            keep_alive,
            state_tx,
            subscriptions: Arc::new(SubscriptionTable::new()),
            shutdown_signal,
            broker: OnceLock::new(),
            connect_called: AtomicBool::new(false),
            released: Arc::new(AtomicBool::new(false)),
            teardown: OnceCell::new(),
        })
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        self.state_tx.borrow().clone()
    }

    /// Watch state changes
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Broker passed to `connect`
    pub fn broker(&self) -> Option<&BrokerCandidate> {
        self.broker.get()
    }

    /// `true` once shutdown started; the client is released and handles stop publishing
    pub fn is_shutting_down(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    /// Start connecting to `broker`. Returns as soon as the network loop runs;
    /// the outcome arrives later as a state change.
    pub async fn connect(self: &Arc<Self>, broker: &BrokerCandidate) -> Result<(), BridgeError> {
        if self.connect_called.swap(true, Ordering::SeqCst) {
            return Err(BridgeError::connect_failure(
                &broker.host,
                broker.port,
                "connect may only be called once per manager",
            ));
        }
        let _ = self.broker.set(broker.clone());
        self.apply(ConnectionEvent::ConnectRequested);

        info!(
            host = %broker.host,
            port = broker.port,
            priority = broker.priority,
            "Connecting to MQTT broker"
        );

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        if let Err(e) = self
            .transport
            .connect(&broker.host, broker.port, self.keep_alive, events_tx)
            .await
        {
            return Err(self.fail_startup(broker, e.to_string()).await);
        }

        tokio::spawn(self.clone().run_events(events_rx));

        if let Err(e) = self.transport.loop_start().await {
            return Err(self.fail_startup(broker, e.to_string()).await);
        }
        Ok(())
    }

    async fn fail_startup(&self, broker: &BrokerCandidate, reason: String) -> BridgeError {
        self.apply(ConnectionEvent::NetworkError(reason.clone()));
        let error = BridgeError::connect_failure(&broker.host, broker.port, reason);
        self.shutdown(ShutdownReason::fatal(error.to_string())).await;
        error
    }

    /// Single entry point for state transitions; returns the resulting state
    fn apply(&self, event: ConnectionEvent) -> ConnectionState {
        let mut transition = None;
        self.state_tx.send_if_modified(|state| match next_state(state, &event) {
            Ok(next) => {
                transition = Some((state.clone(), next.clone()));
                *state = next;
                true
            }
            Err(invalid) => {
                if invalid.from.is_failed() || self.is_shutting_down() {
                    debug!("Ignoring {:?} after failure or shutdown", invalid.event);
                } else {
                    warn!("{}", invalid);
                }
                false
            }
        });

        if let Some((from, to)) = &transition {
            log_state_transition(from, to);
            self.on_transition(to, &event);
        }
        self.state()
    }

    fn on_transition(&self, to: &ConnectionState, event: &ConnectionEvent) {
        let (host, port) = self
            .broker
            .get()
            .map(|b| (b.host.as_str(), b.port))
            .unwrap_or(("<unknown>", 0));

        match (to, event) {
            (ConnectionState::Connected, _) => {
                self.transport.set_connected_flag(true);
                info!(host = %host, port = port, "Connected to the broker {}:{}", host, port);
            }
            (ConnectionState::Failed(_), ConnectionEvent::ConnAck { code, .. }) => {
                self.transport.set_connected_flag(false);
                error!(
                    host = %host,
                    port = port,
                    code = %code,
                    "Connection to the broker {}:{} failed with return code {}",
                    host,
                    port,
                    code
                );
            }
            (ConnectionState::Failed(reason), _) => {
                self.transport.set_connected_flag(false);
                error!(host = %host, port = port, reason = %reason, "MQTT connection failed");
            }
            _ => {}
        }
    }

    /// Consume client events until failure or process shutdown
    async fn run_events(self: Arc<Self>, mut events: mpsc::UnboundedReceiver<ClientEvent>) {
        loop {
            let event = tokio::select! {
                event = events.recv() => event,
                _ = self.shutdown_signal.wait() => {
                    debug!("Shutdown requested, stopping connection event task");
                    break;
                }
            };
            let Some(event) = event else {
                debug!("Client event channel closed");
                break;
            };

            let transition = match event {
                ClientEvent::Message { topic, payload } => {
                    self.subscriptions.dispatch(&topic, payload).await;
                    continue;
                }
                ClientEvent::ConnAck { success, code } => ConnectionEvent::ConnAck { success, code },
                ClientEvent::ConnectTimeout => ConnectionEvent::ConnectTimeout,
                ClientEvent::Disconnected { reason } => {
                    info!("MQTT disconnected");
                    ConnectionEvent::BrokerDisconnected(reason)
                }
                ClientEvent::NetworkError(e) => ConnectionEvent::NetworkError(e),
            };

            if let ConnectionState::Failed(reason) = self.apply(transition) {
                self.shutdown(ShutdownReason::fatal(format!("restarting: {reason}")))
                    .await;
                break;
            }
        }
    }

    /// Wait for the connect acknowledgement and hand out the shared handle.
    ///
    /// Fails when the connection fails or the process is asked to shut down first.
    pub async fn wait_connected(&self) -> Result<ConnectionHandle, BridgeError> {
        let mut state_rx = self.state_tx.subscribe();
        loop {
            let state = state_rx.borrow_and_update().clone();
            match state {
                ConnectionState::Connected => return Ok(self.make_handle()),
                ConnectionState::Failed(reason) => return Err(self.connect_error(reason)),
                ConnectionState::Disconnected | ConnectionState::Connecting => {}
            }

            tokio::select! {
                changed = state_rx.changed() => {
                    if changed.is_err() {
                        return Err(self.connect_error("state channel closed".to_string()));
                    }
                }
                reason = self.shutdown_signal.wait() => {
                    return Err(self.connect_error(format!(
                        "shutdown requested before connect acknowledgement: {}",
                        reason.message
                    )));
                }
            }
        }
    }

    /// Shared handle, available only once connected
    pub fn handle(&self) -> Option<ConnectionHandle> {
        self.state().is_connected().then(|| self.make_handle())
    }

    fn make_handle(&self) -> ConnectionHandle {
        ConnectionHandle::new(
            self.transport.clone(),
            self.state_tx.subscribe(),
            self.subscriptions.clone(),
            self.released.clone(),
        )
    }

    fn connect_error(&self, reason: String) -> BridgeError {
        match self.broker.get() {
            Some(broker) => BridgeError::connect_failure(&broker.host, broker.port, reason),
            None => BridgeError::connect_failure("<none>", 0, reason),
        }
    }

    /// Request process shutdown, then disconnect and stop the network loop.
    ///
    /// Idempotent: only the first caller performs the teardown and gets `true`.
    /// Later or concurrent callers wait until that teardown has finished. The
    /// reason is recorded before the teardown starts, so the first request
    /// decides the exit code.
    pub async fn shutdown(&self, reason: ShutdownReason) -> bool {
        let performed = AtomicBool::new(false);
        let (performed_ref, reason_ref) = (&performed, &reason);
        self.teardown
            .get_or_init(|| async move {
                performed_ref.store(true, Ordering::SeqCst);
                self.teardown_client(reason_ref).await;
            })
            .await;

        let performed = performed.load(Ordering::SeqCst);
        if !performed {
            debug!("Connection shutdown already done by another caller");
        }
        performed
    }

    async fn teardown_client(&self, reason: &ShutdownReason) {
        self.released.store(true, Ordering::SeqCst);
        info!(
            reason = %reason.message,
            fatal = reason.fatal,
            "Shutting down MQTT connection"
        );
        self.shutdown_signal.request(reason.clone());

        if let Err(e) = self.transport.disconnect().await {
            warn!("MQTT disconnect failed: {}", e);
        }
        if let Err(e) = self.transport.loop_stop().await {
            warn!("Stopping MQTT network loop failed: {}", e);
        }
        self.transport.set_connected_flag(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::mocks::{AckBehavior, MockTransport};

    fn broker() -> BrokerCandidate {
        BrokerCandidate::new("broker.local", 1883, 1)
    }

    fn manager(transport: Arc<MockTransport>) -> Arc<ConnectionManager> {
        ConnectionManager::new(transport, Duration::from_secs(60), ShutdownSignal::new())
    }

    #[tokio::test]
    async fn test_connect_then_ack_reaches_connected() {
        let transport = Arc::new(MockTransport::new());
        let manager = manager(transport.clone());
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(manager.handle().is_none());

        manager.connect(&broker()).await.unwrap();
        let handle = manager.wait_connected().await.unwrap();

        assert!(handle.is_connected());
        assert!(transport.connected_flag());
        assert_eq!(
            transport.get_connects().await,
            vec![("broker.local".to_string(), 1883, Duration::from_secs(60))]
        );
    }

    #[tokio::test]
    async fn test_second_connect_rejected() {
        let transport = Arc::new(MockTransport::new());
        let manager = manager(transport.clone());
        manager.connect(&broker()).await.unwrap();
        assert!(manager.connect(&broker()).await.is_err());
        assert_eq!(transport.get_connects().await.len(), 1);
    }

    #[tokio::test]
    async fn test_refused_ack_fails_and_requests_fatal_shutdown() {
        let transport = Arc::new(MockTransport::with_ack(AckBehavior::Refuse("NotAuthorized")));
        let signal = ShutdownSignal::new();
        let manager = ConnectionManager::new(transport.clone(), Duration::from_secs(60), signal.clone());

        manager.connect(&broker()).await.unwrap();
        let result = manager.wait_connected().await;

        assert!(matches!(result, Err(BridgeError::ConnectFailure { .. })));
        assert!(manager.state().is_failed());
        let reason = signal.wait().await;
        assert!(reason.fatal);
        // already started by the event task; this only waits for it
        assert!(!manager.shutdown(ShutdownReason::graceful("SIGTERM")).await);
        assert_eq!(transport.loop_stop_count(), 1);
        assert_eq!(transport.disconnect_count(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let transport = Arc::new(MockTransport::new());
        let manager = manager(transport.clone());
        manager.connect(&broker()).await.unwrap();
        manager.wait_connected().await.unwrap();

        let first = manager.shutdown(ShutdownReason::graceful("SIGTERM"));
        let second = manager.shutdown(ShutdownReason::fatal("broker gone"));
        let (a, b) = tokio::join!(first, second);

        assert!(a ^ b, "exactly one caller performs teardown");
        assert_eq!(transport.loop_stop_count(), 1);
        assert_eq!(transport.disconnect_count(), 1);
    }

    #[tokio::test]
    async fn test_late_shutdown_caller_waits_for_teardown() {
        let transport = Arc::new(MockTransport::new());
        transport.set_disconnect_delay(Duration::from_millis(200));
        let signal = ShutdownSignal::new();
        let manager = ConnectionManager::new(transport.clone(), Duration::from_secs(60), signal.clone());
        manager.connect(&broker()).await.unwrap();
        manager.wait_connected().await.unwrap();

        let first = tokio::spawn({
            let manager = manager.clone();
            async move { manager.shutdown(ShutdownReason::fatal("broker gone")).await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(manager.is_shutting_down());

        let second = manager.shutdown(ShutdownReason::graceful("SIGINT")).await;

        assert!(!second);
        assert_eq!(transport.disconnect_count(), 1);
        assert_eq!(transport.loop_stop_count(), 1);
        assert!(first.await.unwrap());
        // recorded before the teardown awaited, so the later graceful request lost
        assert!(signal.requested().unwrap().fatal);
    }

    #[tokio::test]
    async fn test_handles_stop_publishing_after_shutdown() {
        let transport = Arc::new(MockTransport::new());
        let manager = manager(transport.clone());
        manager.connect(&broker()).await.unwrap();
        let handle = manager.wait_connected().await.unwrap();

        manager.shutdown(ShutdownReason::graceful("SIGTERM")).await;

        assert!(!handle.is_connected());
        let result = handle
            .publish("a/b", crate::transport::QoS::AtMostOnce, false, bytes::Bytes::new())
            .await;
        assert!(matches!(result, Err(crate::transport::MqttError::ConnectionReleased)));
        assert!(transport.get_published().await.is_empty());
    }
}
