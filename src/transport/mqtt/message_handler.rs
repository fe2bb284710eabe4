//! Pure translation of rumqttc events into client events

use crate::transport::ClientEvent;
use rumqttc::v5::mqttbytes::v5::{ConnectReturnCode, Packet};
use rumqttc::v5::{ConnectionError, Event};

/// Pure routing decisions based on MQTT events
pub struct MessageHandler;

impl MessageHandler {
    /// Map a network loop event to the event the connection manager cares about.
    /// Outgoing traffic and keep-alive chatter map to `None`.
    pub fn route_mqtt_event(event: &Event) -> Option<ClientEvent> {
        match event {
            Event::Incoming(Packet::ConnAck(ack)) => Some(ClientEvent::ConnAck {
                success: matches!(ack.code, ConnectReturnCode::Success),
                code: format!("{:?}", ack.code),
            }),
            Event::Incoming(Packet::Publish(publish)) => Some(ClientEvent::Message {
                topic: String::from_utf8_lossy(&publish.topic).to_string(),
                payload: publish.payload.clone(),
            }),
            Event::Incoming(Packet::Disconnect(disconnect)) => Some(ClientEvent::Disconnected {
                reason: format!("{:?}", disconnect.reason_code),
            }),
            Event::Incoming(other) => {
                tracing::trace!(target: "mqtt_transport", "MQTT event: {:?}", other);
                None
            }
            Event::Outgoing(_) => None,
        }
    }

    /// Map a network loop error. The broker's refusal surfaces here rather than
    /// as an incoming ConnAck, so it is turned back into a failed acknowledgement.
    pub fn route_connection_error(error: &ConnectionError, acknowledged: bool) -> ClientEvent {
        match error {
            ConnectionError::ConnectionRefused(code) => ClientEvent::ConnAck {
                success: false,
                code: format!("{code:?}"),
            },
            ConnectionError::Timeout(_) if !acknowledged => ClientEvent::ConnectTimeout,
            other => ClientEvent::NetworkError(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rumqttc::v5::mqttbytes::v5::ConnAck;

    fn connack(code: ConnectReturnCode) -> Event {
        Event::Incoming(Packet::ConnAck(ConnAck {
            session_present: false,
            code,
            properties: None,
        }))
    }

    #[test]
    fn test_successful_connack() {
        let routed = MessageHandler::route_mqtt_event(&connack(ConnectReturnCode::Success));
        assert!(matches!(
            routed,
            Some(ClientEvent::ConnAck { success: true, .. })
        ));
    }

    #[test]
    fn test_refused_connack_carries_code() {
        let routed = MessageHandler::route_mqtt_event(&connack(ConnectReturnCode::NotAuthorized));
        match routed {
            Some(ClientEvent::ConnAck { success, code }) => {
                assert!(!success);
                assert_eq!(code, "NotAuthorized");
            }
            other => panic!("unexpected route: {other:?}"),
        }
    }

    #[test]
    fn test_refused_connection_error_becomes_failed_ack() {
        let error = ConnectionError::ConnectionRefused(ConnectReturnCode::BadUserNamePassword);
        assert_eq!(
            MessageHandler::route_connection_error(&error, false),
            ClientEvent::ConnAck {
                success: false,
                code: "BadUserNamePassword".to_string()
            }
        );
    }

    #[test]
    fn test_other_errors_are_network_errors() {
        let error = ConnectionError::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "reset by peer",
        ));
        assert!(matches!(
            MessageHandler::route_connection_error(&error, true),
            ClientEvent::NetworkError(_)
        ));
    }
}
