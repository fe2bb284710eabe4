//! Impure I/O operations for the MQTT client
//!
//! Owns the rumqttc `AsyncClient` and drives its `EventLoop` on a dedicated task.
//! The loop never reconnects on its own: the first network error is reported and
//! the task ends, leaving recovery to the connection manager's policy.

use super::connection::configure_mqtt_options;
use super::message_handler::MessageHandler;
use crate::config::ConnectionSection;
use crate::transport::{ClientEvent, ClientFactory, MqttError, MqttTransport, QoS};
use async_trait::async_trait;
use bytes::Bytes;
use rumqttc::v5::{AsyncClient, EventLoop};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// How long `loop_stop` waits for the network loop to flush and exit
const LOOP_STOP_GRACE: Duration = Duration::from_secs(2);

/// rumqttc-backed implementation of [`MqttTransport`]
pub struct RumqttcTransport {
    params: ConnectionSection,
    client: Mutex<Option<AsyncClient>>,
    event_loop: Mutex<Option<(EventLoop, mpsc::UnboundedSender<ClientEvent>)>>,
    loop_handle: Mutex<Option<JoinHandle<()>>>,
    loop_shutdown: watch::Sender<bool>,
    connected: AtomicBool,
}

impl RumqttcTransport {
    pub fn new(params: ConnectionSection) -> Self {
        let (loop_shutdown, _) = watch::channel(false);
        Self {
            params,
            client: Mutex::new(None),
            event_loop: Mutex::new(None),
            loop_handle: Mutex::new(None),
            loop_shutdown,
            connected: AtomicBool::new(false),
        }
    }

    async fn client(&self) -> Result<AsyncClient, MqttError> {
        self.client.lock().await.clone().ok_or(MqttError::NotConfigured)
    }

    /// Poll the event loop until shutdown or the first error
    async fn run_event_loop(
        mut event_loop: EventLoop,
        events: mpsc::UnboundedSender<ClientEvent>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        let mut acknowledged = false;
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        debug!(target: "mqtt_transport", "Network loop stop requested");
                        break;
                    }
                }
                result = event_loop.poll() => {
                    match result {
                        Ok(event) => {
                            if let Some(routed) = MessageHandler::route_mqtt_event(&event) {
                                if matches!(routed, ClientEvent::ConnAck { success: true, .. }) {
                                    acknowledged = true;
                                }
                                if events.send(routed).is_err() {
                                    debug!(target: "mqtt_transport", "Event sink closed, stopping network loop");
                                    break;
                                }
                            }
                        }
                        Err(e) => {
                            let _ = events.send(MessageHandler::route_connection_error(&e, acknowledged));
                            break;
                        }
                    }
                }
            }
        }
        info!("MQTT network loop stopped");
    }
}

#[async_trait]
impl MqttTransport for RumqttcTransport {
    async fn connect(
        &self,
        host: &str,
        port: u16,
        keep_alive: Duration,
        events: mpsc::UnboundedSender<ClientEvent>,
    ) -> Result<(), MqttError> {
        let options = configure_mqtt_options(host, port, keep_alive, &self.params);
        let (client, event_loop) = AsyncClient::new(options, self.params.channel_capacity);

        *self.client.lock().await = Some(client);
        *self.event_loop.lock().await = Some((event_loop, events));
        debug!(host = %host, port = port, "MQTT client configured");
        Ok(())
    }

    async fn loop_start(&self) -> Result<(), MqttError> {
        let mut handle_guard = self.loop_handle.lock().await;
        if handle_guard.is_some() {
            return Err(MqttError::LoopAlreadyStarted);
        }
        let (event_loop, events) = self
            .event_loop
            .lock()
            .await
            .take()
            .ok_or(MqttError::NotConfigured)?;

        let shutdown_rx = self.loop_shutdown.subscribe();
        *handle_guard = Some(tokio::spawn(Self::run_event_loop(
            event_loop,
            events,
            shutdown_rx,
        )));
        Ok(())
    }

    async fn loop_stop(&self) -> Result<(), MqttError> {
        let _ = self.loop_shutdown.send(true);

        let Some(handle) = self.loop_handle.lock().await.take() else {
            return Ok(());
        };
        let abort = handle.abort_handle();
        match tokio::time::timeout(LOOP_STOP_GRACE, handle).await {
            Ok(Ok(())) => debug!("Network loop shut down gracefully"),
            Ok(Err(e)) if !e.is_cancelled() => warn!("Network loop ended with error: {}", e),
            Err(_) => {
                warn!("Network loop didn't stop in time, aborting");
                abort.abort();
            }
            _ => {}
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), MqttError> {
        let client = self.client.lock().await.take();
        self.connected.store(false, Ordering::SeqCst);
        match client {
            Some(client) => client
                .disconnect()
                .await
                .map_err(|e| MqttError::DisconnectFailed(Box::new(e))),
            None => Ok(()),
        }
    }

    async fn publish(
        &self,
        topic: &str,
        qos: QoS,
        retain: bool,
        payload: Bytes,
    ) -> Result<(), MqttError> {
        let client = self.client().await?;
        client
            .publish(topic, qos, retain, payload)
            .await
            .map_err(|e| MqttError::PublishFailed(Box::new(e)))
    }

    async fn subscribe(&self, topic: &str, qos: QoS) -> Result<(), MqttError> {
        let client = self.client().await?;
        client
            .subscribe(topic, qos)
            .await
            .map_err(|e| MqttError::SubscriptionFailed(Box::new(e)))
    }

    fn set_connected_flag(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    fn connected_flag(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

/// Default client factory: `mqtt_client:default_mqtt_client_factory`
#[derive(Debug, Default, Clone, Copy)]
pub struct RumqttcClientFactory;

impl ClientFactory for RumqttcClientFactory {
    fn create(&self, params: &ConnectionSection) -> Result<Arc<dyn MqttTransport>, MqttError> {
        Ok(Arc::new(RumqttcTransport::new(params.clone())))
    }
}
