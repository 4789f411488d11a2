//! Control channel behaviour against a live name server

mod common;

use codec::{ControlCommand, CONNECT_TAG};
use common::{module_config, start_registry};
use module_runtime::{CommandOutcome, ControlClient, Module};
use network::{AckStatus, SendStatus, TransportFactory};
use runtime_config::{PortConfig, RuntimeConfig};
use std::time::Duration;
use types::{Direction, PortKind, Value};

fn producer(registry: &str) -> Module {
    let config = module_config(
        registry,
        "Producer",
        "1001",
        vec![PortConfig::new("Output", Direction::Out, PortKind::Int)],
    );
    Module::new(config, TransportFactory::default()).unwrap()
}

async fn orchestrator(registry: &str) -> ControlClient {
    let mut config = RuntimeConfig::default();
    config.registry.address = registry.to_string();
    config.module.ack_timeout_ms = Some(5_000);
    ControlClient::connect(&config).await.unwrap()
}

/// Poll the module's control channel until one command was handled
async fn next_command(module: &mut Module) -> CommandOutcome {
    loop {
        if let Some(outcome) = module.handle_command().await.unwrap() {
            return outcome;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}

#[tokio::test]
async fn test_malformed_command_is_acked_without_connecting() {
    let registry = start_registry().await;
    let mut module = producer(&registry);
    module.init().await.unwrap();

    let mut client = orchestrator(&registry).await;
    let control = client.control_of("/producer0/output").await.unwrap();

    let mut payload = vec![CONNECT_TAG];
    payload.extend_from_slice(b"Output/consumer0/input");
    let (sent, outcome) = tokio::join!(
        client.send_payload(&control, &payload),
        next_command(&mut module)
    );

    sent.unwrap();
    assert!(matches!(outcome, CommandOutcome::Malformed { .. }));
    // never connected, so nothing can be sent yet
    assert_eq!(module.write("Output", 1).await.unwrap(), SendStatus::WouldBlock);
}

#[tokio::test]
async fn test_unknown_tag_is_acked() {
    let registry = start_registry().await;
    let mut module = producer(&registry);
    module.init().await.unwrap();

    let mut client = orchestrator(&registry).await;
    let control = client.control_of("/producer0/output").await.unwrap();

    let (sent, outcome) = tokio::join!(
        client.send_payload(&control, b"\x07hello"),
        next_command(&mut module)
    );
    sent.unwrap();
    assert!(matches!(outcome, CommandOutcome::Malformed { .. }));
}

#[tokio::test]
async fn test_failed_connect_is_still_acked() {
    let registry = start_registry().await;
    let mut module = producer(&registry);
    module.init().await.unwrap();

    let mut client = orchestrator(&registry).await;
    let control = client.control_of("/producer0/output").await.unwrap();

    let command = ControlCommand::connect("Missing", "/consumer0/input");
    let (sent, outcome) = tokio::join!(client.send(&control, &command), next_command(&mut module));
    sent.unwrap();

    match outcome {
        CommandOutcome::Failed { source, reason, .. } => {
            assert_eq!(source, "Missing");
            assert!(reason.contains("Unknown port"));
        }
        other => panic!("expected a failed connect, got {:?}", other),
    }
}

#[tokio::test]
async fn test_connect_command_wires_ports() {
    let registry = start_registry().await;
    let mut module = producer(&registry);
    module.init().await.unwrap();

    let consumer_config = module_config(
        &registry,
        "Consumer",
        "1002",
        vec![PortConfig::new("Input", Direction::In, PortKind::Int)],
    );
    let mut consumer = Module::new(consumer_config, TransportFactory::default()).unwrap();
    consumer.init().await.unwrap();

    let mut client = orchestrator(&registry).await;
    let (sent, outcome) = tokio::join!(
        client.connect_ports("/producer0/output", "/consumer0/input"),
        next_command(&mut module)
    );
    sent.unwrap();
    assert_eq!(
        outcome,
        CommandOutcome::Connected {
            source: "/producer0/output".to_string(),
            target: "/consumer0/input".to_string(),
        }
    );

    // the connection carries data right away
    while module.write("Output", 5).await.unwrap() == SendStatus::WouldBlock {
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    assert_eq!(consumer.read("Input", true).await.unwrap(), Some(Value::Int(5)));
    assert_eq!(module.receive_ack("Output", true).await.unwrap(), AckStatus::Acked);
}
