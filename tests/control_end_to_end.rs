//! Client to server to actuator, over real loopback sockets.

mod common;

use std::time::Duration;

use camlink::control::{ControlClient, Delivery};
use tokio::net::UdpSocket;

use common::{ACK_TIMEOUT, JOIN_TIMEOUT, client_for, start_server};

#[tokio::test]
async fn test_led_on_is_acknowledged_and_applied() {
    let (server, actuators) = start_server(&[17, 27]).await;
    let client = client_for(&server);

    assert_eq!(client.send("LED ON 17", ACK_TIMEOUT).await, Delivery::Acknowledged);
    assert_eq!(actuators.level(17), Some(true));
    assert_eq!(actuators.level(27), Some(false));

    server.stop();
    assert!(server.join(JOIN_TIMEOUT).await);
}

#[tokio::test]
async fn test_unconfigured_pin_is_not_acknowledged() {
    let (server, actuators) = start_server(&[17, 27]).await;
    let client = client_for(&server);
    let before = actuators.pins();

    assert_eq!(client.send("SET 99 1", ACK_TIMEOUT).await, Delivery::NotAcknowledged);
    assert_eq!(client.send("LED ON 99", ACK_TIMEOUT).await, Delivery::NotAcknowledged);
    assert_eq!(actuators.pins(), before);
    assert_eq!(actuators.level(99), None);

    server.stop();
    assert!(server.join(JOIN_TIMEOUT).await);
}

#[tokio::test]
async fn test_mixed_case_toggle_twice_restores_state() {
    let (server, actuators) = start_server(&[17, 27]).await;
    let client = client_for(&server);
    let original = actuators.level(27);

    assert_eq!(client.send("led toggle 27", ACK_TIMEOUT).await, Delivery::Acknowledged);
    assert_eq!(actuators.level(27), original.map(|level| !level));
    assert_eq!(client.send("led toggle 27", ACK_TIMEOUT).await, Delivery::Acknowledged);
    assert_eq!(actuators.level(27), original);

    server.stop();
    assert!(server.join(JOIN_TIMEOUT).await);
}

#[tokio::test]
async fn test_malformed_commands_keep_server_available() {
    let (server, actuators) = start_server(&[17]).await;
    let client = client_for(&server);

    for command in ["LED", "LED ON", "FLASH 17", "SET seventeen 1", "SET 17 on", "LED ON 17 18"] {
        assert_eq!(
            client.send(command, ACK_TIMEOUT).await,
            Delivery::NotAcknowledged,
            "{command}"
        );
    }
    assert_eq!(actuators.level(17), Some(false));

    assert_eq!(client.send("SET 17 1", ACK_TIMEOUT).await, Delivery::Acknowledged);
    assert_eq!(actuators.level(17), Some(true));
    assert!(server.is_running());

    server.stop();
    assert!(server.join(JOIN_TIMEOUT).await);
}

#[tokio::test]
async fn test_silent_server_yields_no_ack() {
    // Bound but never answering.
    let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let client = ControlClient::new(silent.local_addr().unwrap().to_string());

    let delivery = client.send("LED ON 17", Duration::from_millis(150)).await;
    assert_eq!(delivery, Delivery::NotAcknowledged);
}

#[tokio::test]
async fn test_stopped_server_yields_no_ack() {
    let (server, actuators) = start_server(&[17]).await;
    let client = client_for(&server);
    server.stop();
    server.stop();
    assert!(server.join(JOIN_TIMEOUT).await);
    assert!(!server.is_running());

    let delivery = client.send("LED ON 17", Duration::from_millis(150)).await;
    assert_eq!(delivery, Delivery::NotAcknowledged);
    assert_eq!(actuators.level(17), Some(false));
}

#[tokio::test]
async fn test_concurrent_clients_each_get_one_reply() {
    let (server, actuators) = start_server(&[17, 27]).await;
    let first = client_for(&server);
    let second = client_for(&server);

    let (a, b) = tokio::join!(
        first.send("LED ON 17", ACK_TIMEOUT),
        second.send("SET 27 1", ACK_TIMEOUT)
    );
    assert_eq!(a, Delivery::Acknowledged);
    assert_eq!(b, Delivery::Acknowledged);
    assert_eq!(actuators.level(17), Some(true));
    assert_eq!(actuators.level(27), Some(true));

    server.stop();
    assert!(server.join(JOIN_TIMEOUT).await);
}
