//! Pure construction of MQTT client options

use crate::config::ConnectionSection;
use rumqttc::v5::MqttOptions;
use std::time::Duration;

/// Build client options for `host:port` from the connection section
pub fn configure_mqtt_options(
    host: &str,
    port: u16,
    keep_alive: Duration,
    params: &ConnectionSection,
) -> MqttOptions {
    let client_id = client_id(params);
    let mut mqtt_options = MqttOptions::new(client_id, host, port);

    if let Some(username) = params.username() {
        let password = params.password().unwrap_or_default();
        mqtt_options.set_credentials(username, password);
    }

    mqtt_options.set_keep_alive(keep_alive);
    mqtt_options.set_clean_start(params.clean_start);
    mqtt_options.set_max_packet_size(Some(params.max_packet_size));

    mqtt_options
}

/// Configured client id, or a unique one so restarts never collide on the broker
pub fn client_id(params: &ConnectionSection) -> String {
    match &params.client_id {
        Some(id) if !id.trim().is_empty() => id.clone(),
        _ => format!("mqtt-bridge-{}", uuid::Uuid::new_v4().simple()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configured_client_id_is_used() {
        let params = ConnectionSection {
            client_id: Some("bridge-7".to_string()),
            ..Default::default()
        };
        assert_eq!(client_id(&params), "bridge-7");
    }

    #[test]
    fn test_generated_client_ids_are_unique() {
        let params = ConnectionSection::default();
        let a = client_id(&params);
        let b = client_id(&params);
        assert!(a.starts_with("mqtt-bridge-"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_configure_mqtt_options() {
        let params = ConnectionSection {
            client_id: Some("bridge".to_string()),
            ..Default::default()
        };
        let options = configure_mqtt_options("broker.local", 1884, Duration::from_secs(30), &params);
        assert_eq!(options.broker_address(), ("broker.local".to_string(), 1884));
        assert_eq!(options.keep_alive(), Duration::from_secs(30));
        assert_eq!(options.client_id(), "bridge");
    }
}
