//! Integration tests for ports over real TCP sockets

use network::{AckStatus, Port, PortSpec, SendStatus, TcpNetworkConfig, TcpReqRepTransport, TransportError};
use std::time::Duration;
use types::{Direction, PortKind, PortRecord, PortState, Value};

fn free_record(name: &str) -> PortRecord {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    PortRecord {
        name: name.to_string(),
        host: "127.0.0.1".to_string(),
        port: port.to_string(),
        pid: std::process::id().to_string(),
    }
}

fn tcp_port(name: &str, path: &str, direction: Direction, kind: PortKind) -> Port {
    Port::new(
        PortSpec::new(name, path, direction, kind),
        Box::new(TcpReqRepTransport::new(TcpNetworkConfig::default())),
    )
    .with_ack_timeout(Some(Duration::from_secs(5)))
}

async fn send_until_sent(port: &mut Port, value: &Value) {
    for _ in 0..200 {
        if port.send(value).await.unwrap() == SendStatus::Sent {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("port {} never became writable", port.name());
}

async fn wired_pair(kind: PortKind) -> (Port, Port) {
    let target = free_record("/consumer0/input");
    let mut input = tcp_port("Input", "/consumer0/input", Direction::In, kind);
    input.open(target.clone()).await.unwrap();

    let mut output = tcp_port("Output", "/producer0/output", Direction::Out, kind);
    output.open(free_record("/producer0/output")).await.unwrap();
    output.connect(&target).await.unwrap();
    (output, input)
}

#[tokio::test]
async fn test_value_exchange_over_tcp() {
    let (mut output, mut input) = wired_pair(PortKind::Int).await;

    send_until_sent(&mut output, &Value::Int(42)).await;
    assert_eq!(output.state(), PortState::AwaitingAck);

    assert_eq!(input.receive(true).await.unwrap(), Some(Value::Int(42)));
    assert_eq!(output.receive_ack(true).await.unwrap(), AckStatus::Acked);
    assert_eq!(output.state(), PortState::Ready);
}

#[tokio::test]
async fn test_sequence_values_survive_the_wire() {
    let (mut output, mut input) = wired_pair(PortKind::FloatSeq).await;
    let value = Value::FloatSeq(vec![1.5, -2.25, 1e-3]);

    send_until_sent(&mut output, &value).await;
    assert_eq!(input.receive(true).await.unwrap(), Some(value));
    output.receive_ack(true).await.unwrap();
}

#[tokio::test]
async fn test_one_request_in_flight_over_tcp() {
    let (mut output, mut input) = wired_pair(PortKind::Int).await;

    send_until_sent(&mut output, &Value::Int(1)).await;
    let err = output.send(&Value::Int(2)).await.unwrap_err();
    assert!(matches!(err, TransportError::NotReady { .. }));

    assert_eq!(input.receive(true).await.unwrap(), Some(Value::Int(1)));
    output.receive_ack(true).await.unwrap();

    send_until_sent(&mut output, &Value::Int(3)).await;
    assert_eq!(input.receive(true).await.unwrap(), Some(Value::Int(3)));
}

#[tokio::test]
async fn test_server_poll_is_non_blocking() {
    let (_output, mut input) = wired_pair(PortKind::Int).await;
    let polled = tokio::time::timeout(Duration::from_millis(500), input.receive(false))
        .await
        .expect("non-blocking receive must not wait");
    assert_eq!(polled.unwrap(), None);
}

#[tokio::test]
async fn test_closed_port_must_be_reopened() {
    let (mut output, _input) = wired_pair(PortKind::Int).await;
    output.close().await.unwrap();
    assert!(!output.is_open());

    let err = output.send(&Value::Int(1)).await.unwrap_err();
    assert!(matches!(err, TransportError::NotOpen { .. }));
}
