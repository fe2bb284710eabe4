//! Bridge relay behavior on top of a connected (mock) client


use mqtt_bridge::local::{InProcessBus, LocalBus, LocalMessage};
use mqtt_bridge::plugins::{Codec, JsonCodec, MsgPackCodec};
use mqtt_bridge::testing::{MockProbe, MockTransport};
use mqtt_bridge::transport::QoS;
use mqtt_bridge::{BridgeApp, Direction, RunningBridge};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use test_helpers::{config_with, eventually, mock_registry};

const BRIDGES: &str = r#"
[mqtt]
private_path = "device/001"

[[bridge]]
direction = "local_to_remote"
local_endpoint = "/ping"
remote_topic = "/ping"
message_type = "std_msgs/Bool"
qos = 1
retain = true

[[bridge]]
direction = "remote_to_local"
local_endpoint = "/pong"
remote_topic = "/pong"
message_type = "std_msgs/Bool"

[[bridge]]
direction = "remote_to_local"
local_endpoint = "/echo"
remote_topic = "/echo"
message_type = "std_msgs/String"
deserializer = "json:loads"

[[bridge]]
direction = "local_to_remote"
local_endpoint = "/broken"
remote_topic = "/broken"
message_type = "std_msgs/DoesNotExist"

[[bridge]]
direction = "local_to_remote"
local_endpoint = "/cmd_vel"
remote_topic = "/cmd_vel"
message_type = "geometry_msgs/Twist"
serializer = "json:dumps"
frequency = 1.0
"#;

struct Harness {
    running: RunningBridge,
    transport: Arc<MockTransport>,
    bus: Arc<InProcessBus>,
}

async fn start() -> Harness {
    let transport = Arc::new(MockTransport::new());
    let (registry, _factory) = mock_registry(transport.clone());
    let bus = Arc::new(InProcessBus::new());
    let running = BridgeApp::new(config_with(BRIDGES))
        .with_registry(registry)
        .with_probe(Arc::new(MockProbe::reachable(&["B"])))
        .start(bus.clone())
        .await
        .unwrap();
    Harness {
        running,
        transport,
        bus,
    }
}

async fn published_count(transport: &Arc<MockTransport>, expected: usize) -> bool {
    eventually(|| {
        let transport = transport.clone();
        async move { transport.get_published().await.len() == expected }
    })
    .await
}

#[tokio::test]
async fn test_invalid_bridge_does_not_block_others() {
    let h = start().await;
    let dispatcher = h.running.dispatcher();

    assert_eq!(dispatcher.active().len(), 4);
    assert_eq!(dispatcher.failures().len(), 1);
    assert_eq!(dispatcher.failures()[0].index, 3);
    assert!(dispatcher.failures()[0].reason.contains("std_msgs/DoesNotExist"));
}

#[tokio::test]
async fn test_remote_subscriptions_use_private_path() {
    let h = start().await;

    let subscriptions = h.transport.get_subscriptions().await;
    assert_eq!(
        subscriptions,
        vec![
            ("device/001/pong".to_string(), QoS::AtMostOnce),
            ("device/001/echo".to_string(), QoS::AtMostOnce),
        ]
    );
    let inbound: Vec<_> = h
        .running
        .dispatcher()
        .active()
        .iter()
        .filter(|b| b.direction == Direction::RemoteToLocal)
        .map(|b| b.remote_topic.as_str())
        .collect();
    assert_eq!(inbound, vec!["device/001/pong", "device/001/echo"]);
}

#[tokio::test]
async fn test_local_message_published_once_with_serialized_payload() {
    let h = start().await;
    let body = json!({"data": true});

    h.bus
        .publish("/ping", LocalMessage::new("std_msgs/Bool", body.clone()))
        .await
        .unwrap();

    assert!(published_count(&h.transport, 1).await);
    let published = h.transport.get_published().await;
    assert_eq!(published[0].topic, "device/001/ping");
    assert_eq!(published[0].qos, QoS::AtLeastOnce);
    assert!(published[0].retain);
    assert_eq!(published[0].payload.as_ref(), MsgPackCodec.encode(&body).unwrap());

    // nothing else shows up
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.transport.get_published().await.len(), 1);
}

#[tokio::test]
async fn test_remote_message_republished_locally() {
    let h = start().await;
    let mut pong = h.bus.subscribe("/pong", "std_msgs/Bool").await.unwrap();

    let payload = MsgPackCodec.encode(&json!({"data": false})).unwrap();
    assert!(h.transport.inject_message("device/001/pong", payload).await);

    let received = tokio::time::timeout(Duration::from_secs(1), pong.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(received, LocalMessage::new("std_msgs/Bool", json!({"data": false})));
}

#[tokio::test]
async fn test_malformed_payload_dropped_and_other_bridges_unaffected() {
    let h = start().await;
    let mut pong = h.bus.subscribe("/pong", "std_msgs/Bool").await.unwrap();
    let mut echo = h.bus.subscribe("/echo", "std_msgs/String").await.unwrap();

    h.transport
        .inject_message("device/001/pong", &b"\xc1 definitely not msgpack"[..])
        .await;
    h.transport
        .inject_message("device/001/echo", JsonCodec.encode(&json!({"data": "hi"})).unwrap())
        .await;

    let received = tokio::time::timeout(Duration::from_secs(1), echo.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(received.body, json!({"data": "hi"}));

    let stats = h.running.dispatcher().stats(1).unwrap();
    let dropped = stats.clone();
    assert!(
        eventually(|| {
            let stats = dropped.clone();
            async move { stats.dropped() == 1 }
        })
        .await
    );
    assert_eq!(stats.relayed(), 0);
    assert!(pong.try_recv().is_err());

    // the bridge keeps working after a bad message
    let payload = MsgPackCodec.encode(&json!({"data": true})).unwrap();
    h.transport.inject_message("device/001/pong", payload).await;
    let received = tokio::time::timeout(Duration::from_secs(1), pong.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(received.body, json!({"data": true}));
}

#[tokio::test]
async fn test_payload_with_wrong_fields_is_dropped() {
    let h = start().await;
    let mut pong = h.bus.subscribe("/pong", "std_msgs/Bool").await.unwrap();

    let payload = MsgPackCodec.encode(&json!({"value": true})).unwrap();
    h.transport.inject_message("device/001/pong", payload).await;

    let stats = h.running.dispatcher().stats(1).unwrap();
    assert!(
        eventually(|| {
            let stats = stats.clone();
            async move { stats.dropped() == 1 }
        })
        .await
    );
    assert!(pong.try_recv().is_err());
}

#[tokio::test]
async fn test_delivery_failure_is_contained() {
    let h = start().await;
    h.transport.set_fail_publish(true);

    h.bus
        .publish("/ping", LocalMessage::new("std_msgs/Bool", json!({"data": true})))
        .await
        .unwrap();

    let stats = h.running.dispatcher().stats(0).unwrap();
    let failed = stats.clone();
    assert!(
        eventually(|| {
            let stats = failed.clone();
            async move { stats.failed() == 1 }
        })
        .await
    );

    h.transport.set_fail_publish(false);
    h.bus
        .publish("/ping", LocalMessage::new("std_msgs/Bool", json!({"data": false})))
        .await
        .unwrap();
    assert!(published_count(&h.transport, 1).await);
    assert!(h.running.state().is_connected());
}

#[tokio::test]
async fn test_frequency_limits_publish_rate() {
    let h = start().await;
    let twist = json!({
        "linear": {"x": 0.5, "y": 0.0, "z": 0.0},
        "angular": {"x": 0.0, "y": 0.0, "z": 0.1}
    });

    for _ in 0..5 {
        h.bus
            .publish(
                "/cmd_vel",
                LocalMessage::new("geometry_msgs/Twist", twist.clone()),
            )
            .await
            .unwrap();
    }

    assert!(published_count(&h.transport, 1).await);
    let stats = h.running.dispatcher().stats(4).unwrap();
    assert!(
        eventually(|| {
            let stats = stats.clone();
            async move { stats.dropped() == 4 }
        })
        .await
    );

    let published = h.transport.get_published().await;
    assert_eq!(published[0].topic, "device/001/cmd_vel");
    assert_eq!(
        serde_json::from_slice::<serde_json::Value>(&published[0].payload).unwrap(),
        twist
    );
}

#[tokio::test]
async fn test_bridges_stop_after_shutdown() {
    let h = start().await;
    let signal = h.running.shutdown_signal();
    signal.request(mqtt_bridge::ShutdownReason::graceful("test"));
    h.running.wait().await;

    let _ = h
        .bus
        .publish("/ping", LocalMessage::new("std_msgs/Bool", json!({"data": true})))
        .await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(h.transport.get_published().await.is_empty());
}
