//! End-to-End Test Fixtures
//!
//! A name server running inside the test process plus helpers for building
//! modules against it.

use anyhow::{Context, Result};
use module_runtime::Module;
use name_server::{NameServer, NameServerConfig};
use network::{RegistryClient, TransportFactory};
use runtime_config::{PortConfig, RuntimeConfig};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;

/// In-process name server, stopped when dropped
pub struct TestRegistry {
    address: String,
    task: JoinHandle<Result<()>>,
}

impl TestRegistry {
    /// Start on a free loopback port; records get OS-assigned ports
    pub async fn start() -> Result<Self> {
        let server = NameServer::bind(NameServerConfig {
            bind_address: "127.0.0.1:0".to_string(),
            port_base: None,
            ..Default::default()
        })
        .await
        .context("Failed to start test registry")?;

        let address = server.local_addr().to_string();
        info!(registry = %address, "Test registry started");
        Ok(Self {
            address,
            task: tokio::spawn(server.run()),
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Configuration for a module resolving through this registry
    pub fn module_config(&self, name: &str, pid: &str, ports: Vec<PortConfig>) -> RuntimeConfig {
        let mut config = RuntimeConfig::default();
        config.registry.address = self.address.clone();
        config.registry.retry.backoff_ms = 10;
        config.module.name = name.to_string();
        config.module.pid = Some(pid.to_string());
        config.module.tick_interval_ms = 2;
        config.module.ack_timeout_ms = Some(5_000);
        config.ports = ports;
        config
    }

    pub fn module(&self, name: &str, pid: &str, ports: Vec<PortConfig>) -> Result<Module> {
        let config = self.module_config(name, pid, ports);
        Ok(Module::new(config, TransportFactory::default())?)
    }

    /// Orchestrator-side configuration
    pub fn orchestrator_config(&self) -> RuntimeConfig {
        let mut config = RuntimeConfig::default();
        config.registry.address = self.address.clone();
        config
    }

    pub async fn client(&self) -> Result<RegistryClient> {
        Ok(RegistryClient::connect(&self.orchestrator_config().registry).await?)
    }
}

impl Drop for TestRegistry {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Poll `condition` every few milliseconds until it holds or `limit` passes
pub async fn wait_until<F: FnMut() -> bool>(mut condition: F, limit: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

/// Opt-in log output, e.g. `RUST_LOG=debug cargo test`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
