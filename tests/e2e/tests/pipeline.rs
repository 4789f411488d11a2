//! Producer on a worker thread, consumer behind a host bridge, wired at runtime

use async_trait::async_trait;
use e2e_tests::{wait_until, TestRegistry};
use module_runtime::{ControlClient, HostBridge, Module, Result, Tick, TickFlow, Worker};
use network::SendStatus;
use runtime_config::{PortConfig, TransportKind};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;
use tokio::task::LocalSet;
use types::{Direction, PortKind, PortState, Value};

/// Emits `next..=last`, one value per acknowledgment
struct Counter {
    next: i64,
    last: i64,
}

#[async_trait]
impl Tick for Counter {
    async fn tick(&mut self, module: &mut Module) -> Result<TickFlow> {
        if self.next > self.last || module.port_state("Output")? == PortState::AwaitingAck {
            return Ok(TickFlow::Continue);
        }
        if module.write("Output", self.next).await? == SendStatus::Sent {
            self.next += 1;
        }
        Ok(TickFlow::Continue)
    }
}

/// Forwards everything from the network to the host
struct Relay;

#[async_trait]
impl Tick for Relay {
    async fn tick(&mut self, module: &mut Module) -> Result<TickFlow> {
        while let Some(value) = module.read("Input", false).await? {
            module.write("Seen", value).await?;
        }
        Ok(TickFlow::Continue)
    }
}

#[tokio::test]
async fn test_values_reach_host_in_order() {
    e2e_tests::init_tracing();
    let registry = TestRegistry::start().await.unwrap();
    let local = LocalSet::new();

    local
        .run_until(async move {
            let producer = registry
                .module(
                    "Producer",
                    "4201",
                    vec![PortConfig::new("Output", Direction::Out, PortKind::Int)],
                )
                .unwrap();
            let consumer = registry
                .module(
                    "Consumer",
                    "4202",
                    vec![
                        PortConfig::new("Input", Direction::In, PortKind::Int),
                        PortConfig::new("Seen", Direction::Out, PortKind::Int)
                            .with_transport(TransportKind::HostBridge),
                    ],
                )
                .unwrap();

            let worker = Worker::spawn(producer, Counter { next: 1, last: 5 })
                .await
                .unwrap();
            let bridge = HostBridge::spawn(consumer, Relay).await.unwrap();

            let seen = Rc::new(RefCell::new(Vec::new()));
            let sink = seen.clone();
            bridge
                .register_callback("Seen", move |value: Value| sink.borrow_mut().push(value))
                .unwrap();

            // both modules are up, so their paths are owned by them
            let mut orchestrator = ControlClient::connect(&registry.orchestrator_config())
                .await
                .unwrap();
            orchestrator
                .connect_ports("/producer0/output", "/consumer0/input")
                .await
                .unwrap();

            let arrived = wait_until(|| seen.borrow().len() == 5, Duration::from_secs(10)).await;
            assert!(arrived, "only {:?} arrived", seen.borrow());
            let values: Vec<i64> = seen.borrow().iter().filter_map(Value::as_int).collect();
            assert_eq!(values, vec![1, 2, 3, 4, 5]);

            bridge.destroy();
            bridge.closed().await;
            assert!(bridge.is_finalized());
            worker.stop_and_join().unwrap();
        })
        .await;
}
