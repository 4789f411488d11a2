//! Two modules wired together by an orchestrator through their control channels

use e2e_tests::TestRegistry;
use module_runtime::{CommandOutcome, ControlClient, Module, ModuleError};
use network::{AckStatus, SendStatus, TransportError};
use runtime_config::PortConfig;
use std::time::Duration;
use types::{Direction, PortKind, PortRecord, PortState, Value};

fn module_a(registry: &TestRegistry) -> Module {
    registry
        .module(
            "A",
            "4101",
            vec![PortConfig::new("Output", Direction::Out, PortKind::Int)],
        )
        .unwrap()
}

fn module_b(registry: &TestRegistry) -> Module {
    registry
        .module(
            "B",
            "4102",
            vec![PortConfig::new("Input", Direction::In, PortKind::Int)],
        )
        .unwrap()
}

/// Poll the control channel the way a tick loop would until one command arrives
async fn serve_one_command(module: &mut Module) -> CommandOutcome {
    loop {
        if let Some(outcome) = module.handle_command().await.unwrap() {
            return outcome;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}

async fn wire(registry: &TestRegistry, a: &mut Module) {
    let mut orchestrator = ControlClient::connect(&registry.orchestrator_config())
        .await
        .unwrap();
    let (sent, outcome) = tokio::join!(
        orchestrator.connect_ports("/a0/output", "/b0/input"),
        serve_one_command(a)
    );
    sent.unwrap();
    assert!(matches!(outcome, CommandOutcome::Connected { .. }));
}

async fn write_when_connected(module: &mut Module, value: i64) {
    while module.write("Output", value).await.unwrap() == SendStatus::WouldBlock {
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}

#[tokio::test]
async fn test_value_flows_and_ack_returns_port_to_ready() {
    e2e_tests::init_tracing();
    let registry = TestRegistry::start().await.unwrap();

    let mut a = module_a(&registry);
    let mut b = module_b(&registry);
    a.init().await.unwrap();
    b.init().await.unwrap();

    wire(&registry, &mut a).await;

    write_when_connected(&mut a, 42).await;
    assert_eq!(a.port_state("Output").unwrap(), PortState::AwaitingAck);

    assert_eq!(b.read("Input", true).await.unwrap(), Some(Value::Int(42)));
    assert_eq!(a.receive_ack("Output", true).await.unwrap(), AckStatus::Acked);
    assert_eq!(a.port_state("Output").unwrap(), PortState::Ready);
}

#[tokio::test]
async fn test_only_one_write_in_flight_per_port() {
    let registry = TestRegistry::start().await.unwrap();

    let mut a = module_a(&registry);
    let mut b = module_b(&registry);
    a.init().await.unwrap();
    b.init().await.unwrap();
    wire(&registry, &mut a).await;

    write_when_connected(&mut a, 1).await;

    let err = a.write("Output", 2).await.unwrap_err();
    assert!(matches!(
        err,
        ModuleError::Transport(TransportError::NotReady { .. })
    ));
    assert!(err.is_transient());

    // nothing beyond the first value reached the consumer
    assert_eq!(b.read("Input", true).await.unwrap(), Some(Value::Int(1)));
    assert_eq!(b.read("Input", false).await.unwrap(), None);

    assert_eq!(a.receive_ack("Output", true).await.unwrap(), AckStatus::Acked);
    write_when_connected(&mut a, 2).await;
    assert_eq!(b.read("Input", true).await.unwrap(), Some(Value::Int(2)));
}

#[tokio::test]
async fn test_resolution_is_stable_across_clients() {
    let registry = TestRegistry::start().await.unwrap();

    let mut b = module_b(&registry);
    b.init().await.unwrap();
    let bound = b.port_record("Input").unwrap().cloned().unwrap();
    assert_eq!(bound.pid, "4102");

    let mut first = registry.client().await.unwrap();
    let mut second = registry.client().await.unwrap();

    let mut once = PortRecord::new("/b0/input", "9001");
    let mut again = PortRecord::new("/resolve/b0/input", "9002");
    first.resolve(&mut once).await.unwrap();
    second.resolve(&mut again).await.unwrap();

    assert_eq!(once.endpoint(), bound.endpoint());
    assert_eq!(again.endpoint(), bound.endpoint());
    // the owner stays the module that resolved first
    assert_eq!(once.pid, "4102");
    assert_eq!(again.pid, "4102");
}

#[tokio::test]
async fn test_connect_to_unresolved_target_is_acked_and_reported() {
    let registry = TestRegistry::start().await.unwrap();

    let mut a = module_a(&registry);
    a.init().await.unwrap();

    let mut orchestrator = ControlClient::connect(&registry.orchestrator_config())
        .await
        .unwrap();
    let (sent, outcome) = tokio::join!(
        orchestrator.connect_ports("/a0/output", "/resolve"),
        serve_one_command(&mut a)
    );

    // the orchestrator still gets its acknowledgment
    sent.unwrap();
    assert!(matches!(outcome, CommandOutcome::Failed { .. }));
    assert_eq!(a.write("Output", 1).await.unwrap(), SendStatus::WouldBlock);
}
