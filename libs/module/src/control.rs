//! Orchestrator side of the control channel
//!
//! A [`ControlClient`] tells a running module to connect one of its
//! outbound ports to another module's inbound port. The module is found
//! through the registry: the source port's record names its owning pid,
//! and that pid names the module's control channel.

use crate::error::{ModuleError, Result};
use codec::ControlCommand;
use network::{AckStatus, Port, PortSpec, RegistryClient, TransportError, TransportFactory};
use runtime_config::{RuntimeConfig, TransportKind};
use std::time::Duration;
use tracing::{debug, info};
use types::{control_path, Direction, PortRecord};

pub struct ControlClient {
    registry: RegistryClient,
    factory: TransportFactory,
    transport: TransportKind,
    pid: String,
    ack_timeout: Option<Duration>,
}

impl ControlClient {
    /// Connect to the configured registry over TCP
    pub async fn connect(config: &RuntimeConfig) -> Result<Self> {
        let registry = RegistryClient::connect(&config.registry).await?;
        let factory = TransportFactory::from_settings(&config.module);
        Ok(Self::new(registry, factory)
            .with_transport(config.module.control_transport)
            .with_ack_timeout(config.module.ack_timeout()))
    }

    pub fn new(registry: RegistryClient, factory: TransportFactory) -> Self {
        Self {
            registry,
            factory,
            transport: TransportKind::Tcp,
            pid: std::process::id().to_string(),
            ack_timeout: None,
        }
    }

    /// Transport the target modules' control channels use
    pub fn with_transport(mut self, transport: TransportKind) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_ack_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.ack_timeout = timeout;
        self
    }

    /// Control channel of the module owning the port registered at `path`.
    ///
    /// The owner must have resolved `path` before; otherwise the registry
    /// records this process as its owner.
    pub async fn control_of(&mut self, path: &str) -> Result<PortRecord> {
        let mut owner = PortRecord::new(path, &self.pid);
        self.registry.resolve(&mut owner).await?;

        let mut control = PortRecord::new(control_path(&owner.pid), &self.pid);
        self.registry.resolve(&mut control).await?;
        debug!(path, owner = %owner.pid, control = %control.endpoint(), "Located control channel");
        Ok(control)
    }

    /// Have the module owning `source` connect it to `target`
    pub async fn connect_ports(&mut self, source: &str, target: &str) -> Result<()> {
        let control = self.control_of(source).await?;
        self.send(&control, &ControlCommand::connect(source, target))
            .await?;
        info!(source, target, "Connect command acknowledged");
        Ok(())
    }

    /// Send one command to a control channel and wait for its `ACK`
    pub async fn send(&mut self, control: &PortRecord, command: &ControlCommand) -> Result<()> {
        self.send_payload(control, &command.encode()).await
    }

    /// Send raw command bytes to a control channel and wait for its `ACK`
    pub async fn send_payload(&mut self, control: &PortRecord, payload: &[u8]) -> Result<()> {
        let transport = self.factory.create_for(self.transport)?;
        let spec = PortSpec::raw("orchestrator", control.name.clone(), Direction::Out);
        let mut port = Port::new(spec, transport).with_ack_timeout(self.ack_timeout);

        port.open(control.clone()).await?;
        port.connect(control).await?;
        let result = exchange(&mut port, payload).await;
        if let Err(e) = port.close().await {
            debug!(error = %e, "Error closing orchestrator port");
        }
        result
    }
}

async fn exchange(port: &mut Port, payload: &[u8]) -> Result<()> {
    port.send_payload_blocking(payload).await?;
    match port.receive_ack(true).await? {
        AckStatus::Acked => Ok(()),
        AckStatus::Pending => Err(ModuleError::Transport(TransportError::protocol_on_port(
            "control channel closed without acknowledging",
            port.name(),
        ))),
    }
}
