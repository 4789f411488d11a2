//! Shared fixtures: an in-process name server and module configurations

#![allow(dead_code)]

use name_server::{NameServer, NameServerConfig};
use runtime_config::{PortConfig, RuntimeConfig};
use std::time::Duration;

/// Start a name server on a free port; returns its address
pub async fn start_registry() -> String {
    let server = NameServer::bind(NameServerConfig {
        bind_address: "127.0.0.1:0".to_string(),
        port_base: None,
        ..Default::default()
    })
    .await
    .expect("name server should bind");
    let address = server.local_addr().to_string();
    tokio::spawn(server.run());
    address
}

pub fn module_config(registry: &str, name: &str, pid: &str, ports: Vec<PortConfig>) -> RuntimeConfig {
    let mut config = RuntimeConfig::default();
    config.registry.address = registry.to_string();
    config.registry.retry.backoff_ms = 10;
    config.module.name = name.to_string();
    config.module.pid = Some(pid.to_string());
    config.module.tick_interval_ms = 2;
    config.module.ack_timeout_ms = Some(5_000);
    config.ports = ports;
    config
}

/// Poll `condition` every few milliseconds until it holds
pub async fn eventually<F: FnMut() -> bool>(mut condition: F, what: &str) {
    for _ in 0..1_000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {}", what);
}
