//! Module lifecycle and port table
//!
//! A [`Module`] owns its registry client, its control channel and one
//! binding per declared port. Network ports go through the request/reply
//! [`Port`] discipline; `host_bridge` ports are queues crossing into an
//! embedding host's event loop (see [`crate::bridge`]).
//!
//! Lifecycle: [`Module::new`] → [`Module::init`] → tick loop →
//! [`Module::close`].

use crate::bridge::{HostEndpoints, InboundLane, OutboundGate, OutboundLane};
use crate::error::{ModuleError, Result};
use codec::ControlCommand;
use network::{AckStatus, Port, PortSpec, RegistryClient, SendStatus, TransportFactory};
use runtime_config::{RuntimeConfig, TransportKind};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::{debug, info, warn};
use types::{control_path, Direction, PortKind, PortRecord, PortState, Value};

/// What the control channel did with one command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Connected { source: String, target: String },
    /// Well-formed but not carried out; the orchestrator was still acked
    Failed {
        source: String,
        target: String,
        reason: String,
    },
    /// Undecodable command, logged and acked
    Malformed { reason: String },
}

enum Binding {
    Network(Port),
    BridgedOut {
        name: String,
        path: String,
        kind: PortKind,
        gate: Arc<OutboundGate>,
    },
    BridgedIn {
        name: String,
        path: String,
        kind: PortKind,
        values: UnboundedReceiver<Value>,
    },
}

impl Binding {
    fn name(&self) -> &str {
        match self {
            Binding::Network(port) => port.name(),
            Binding::BridgedOut { name, .. } | Binding::BridgedIn { name, .. } => name,
        }
    }

    fn path(&self) -> &str {
        match self {
            Binding::Network(port) => port.path(),
            Binding::BridgedOut { path, .. } | Binding::BridgedIn { path, .. } => path,
        }
    }

    fn kind(&self) -> Option<PortKind> {
        match self {
            Binding::Network(port) => port.kind(),
            Binding::BridgedOut { kind, .. } | Binding::BridgedIn { kind, .. } => Some(*kind),
        }
    }

    fn matches(&self, port: &str) -> bool {
        self.name().eq_ignore_ascii_case(port) || self.path() == port
    }
}

/// One processing module and its ports
pub struct Module {
    config: RuntimeConfig,
    pid: String,
    factory: TransportFactory,
    registry: Option<RegistryClient>,
    control: Option<Port>,
    bindings: Vec<Binding>,
    host_endpoints: Option<HostEndpoints>,
    initialized: bool,
}

impl Module {
    /// Build a module from validated configuration; no sockets are opened yet
    pub fn new(config: RuntimeConfig, factory: TransportFactory) -> Result<Self> {
        config.validate()?;

        let pid = config.module.effective_pid();
        let ack_timeout = config.module.ack_timeout();
        let mut bindings = Vec::with_capacity(config.ports.len());
        let mut host_endpoints = HostEndpoints::default();

        for declared in &config.ports {
            let path = config.port_path(&declared.name);
            let binding = match (declared.transport, declared.direction) {
                (TransportKind::HostBridge, Direction::Out) => {
                    let (gate, values) = OutboundGate::channel(&declared.name);
                    host_endpoints.outbound.push(OutboundLane {
                        name: declared.name.clone(),
                        gate: gate.clone(),
                        values,
                    });
                    Binding::BridgedOut {
                        name: declared.name.clone(),
                        path,
                        kind: declared.kind,
                        gate,
                    }
                }
                (TransportKind::HostBridge, Direction::In) => {
                    let (sender, values) = mpsc::unbounded_channel();
                    host_endpoints.inbound.push(InboundLane {
                        name: declared.name.clone(),
                        kind: declared.kind,
                        sender,
                    });
                    Binding::BridgedIn {
                        name: declared.name.clone(),
                        path,
                        kind: declared.kind,
                        values,
                    }
                }
                (transport, direction) => {
                    let spec = PortSpec::new(&declared.name, path, direction, declared.kind);
                    let port = Port::new(spec, factory.create_for(transport)?)
                        .with_ack_timeout(ack_timeout);
                    Binding::Network(port)
                }
            };
            bindings.push(binding);
        }

        debug!(
            module = %config.module.name,
            id = %config.module.id,
            pid = %pid,
            ports = bindings.len(),
            "Module created"
        );
        Ok(Self {
            config,
            pid,
            factory,
            registry: None,
            control: None,
            bindings,
            host_endpoints: Some(host_endpoints),
            initialized: false,
        })
    }

    /// Load configuration from a TOML file and build the module
    pub fn load(path: &Path) -> Result<Self> {
        let config = RuntimeConfig::load(path)?;
        let factory = TransportFactory::from_settings(&config.module);
        Self::new(config, factory)
    }

    /// Resolve through `registry` instead of connecting to the configured address
    pub fn with_registry(mut self, registry: RegistryClient) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn name(&self) -> &str {
        &self.config.module.name
    }

    pub fn pid(&self) -> &str {
        &self.pid
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn control_path(&self) -> String {
        control_path(&self.pid)
    }

    /// Registry path of a declared port
    pub fn port_path(&self, port: &str) -> Option<&str> {
        self.find(port).map(|index| self.bindings[index].path())
    }

    pub fn port_names(&self) -> impl Iterator<Item = &str> {
        self.bindings.iter().map(Binding::name)
    }

    /// Resolved record of an open network port
    pub fn port_record(&self, port: &str) -> Result<Option<&PortRecord>> {
        match self.binding(port)? {
            Binding::Network(port) => Ok(port.record()),
            _ => Ok(None),
        }
    }

    /// Bind the control channel, then resolve and open every network port.
    ///
    /// Any resolution failure here is fatal to the module.
    pub async fn init(&mut self) -> Result<()> {
        if self.initialized {
            return Ok(());
        }

        if self.registry.is_none() {
            self.registry = Some(RegistryClient::connect(&self.config.registry).await?);
        }
        let registry = self.registry.as_mut().ok_or(ModuleError::NotInitialized)?;

        let path = control_path(&self.pid);
        let mut record = PortRecord::new(&path, &self.pid);
        registry.resolve(&mut record).await?;
        if record.pid != self.pid {
            warn!(path = %path, owner = %record.pid, pid = %self.pid, "Control path registered to another process");
        }

        let transport = self.factory.create_for(self.config.module.control_transport)?;
        let mut control = Port::new(PortSpec::raw("control", &path, Direction::In), transport);
        control.open(record).await?;
        self.control = Some(control);

        for binding in &mut self.bindings {
            let Binding::Network(port) = binding else {
                continue;
            };
            let mut record = PortRecord::new(port.path(), &self.pid);
            registry.resolve(&mut record).await?;
            port.open(record).await?;
        }

        self.initialized = true;
        info!(
            module = %self.config.module.name,
            id = %self.config.module.id,
            pid = %self.pid,
            control = %path,
            "Module initialized"
        );
        Ok(())
    }

    /// Poll the control channel once without blocking.
    ///
    /// Every received command is acknowledged, whether it succeeded, failed
    /// or could not be decoded.
    pub async fn handle_command(&mut self) -> Result<Option<CommandOutcome>> {
        let control = self.control.as_mut().ok_or(ModuleError::NotInitialized)?;
        let Some(payload) = control.receive_request(false).await? else {
            return Ok(None);
        };

        let outcome = match ControlCommand::decode(&payload) {
            Ok(ControlCommand::Connect { source, target }) => {
                match self.connect_port(&source, &target).await {
                    Ok(record) => {
                        info!(source = %source, target = %target, endpoint = %record.endpoint(), "Connect command applied");
                        CommandOutcome::Connected { source, target }
                    }
                    Err(e) => {
                        warn!(source = %source, target = %target, error = %e, "Connect command failed");
                        CommandOutcome::Failed {
                            source,
                            target,
                            reason: e.to_string(),
                        }
                    }
                }
            }
            Err(e) => {
                warn!(
                    command = %String::from_utf8_lossy(&payload),
                    error = %e,
                    "Malformed control command"
                );
                CommandOutcome::Malformed {
                    reason: e.to_string(),
                }
            }
        };

        self.control
            .as_mut()
            .ok_or(ModuleError::NotInitialized)?
            .acknowledge()
            .await?;
        Ok(Some(outcome))
    }

    /// Connect the outbound port `source` to the port registered as `target`
    pub async fn connect_port(&mut self, source: &str, target: &str) -> Result<PortRecord> {
        let index = self
            .find(source)
            .ok_or_else(|| ModuleError::unknown_port(source))?;
        let registry = self.registry.as_mut().ok_or(ModuleError::NotInitialized)?;

        let port = match &mut self.bindings[index] {
            Binding::Network(port) => port,
            other => {
                return Err(ModuleError::not_connectable(
                    other.name(),
                    "host bridge ports are not connected to peers",
                ))
            }
        };
        if port.direction() != Direction::Out {
            return Err(ModuleError::not_connectable(
                port.name(),
                "only outbound ports connect to a peer",
            ));
        }

        let mut record = PortRecord::new(target, &self.pid);
        registry.resolve_with_retry(&mut record).await?;
        port.connect(&record).await?;
        Ok(record)
    }

    /// Consume any acknowledgments that have arrived; returns how many ports became ready
    pub async fn poll_acks(&mut self) -> usize {
        let mut acked = 0;
        for binding in &mut self.bindings {
            let Binding::Network(port) = binding else {
                continue;
            };
            if port.state() != PortState::AwaitingAck {
                continue;
            }
            match port.receive_ack(false).await {
                Ok(AckStatus::Acked) => acked += 1,
                Ok(AckStatus::Pending) => {}
                Err(e) => warn!(port = %port.name(), error = %e, "Acknowledgment poll failed"),
            }
        }
        acked
    }

    /// Non-blocking write to an outbound port
    pub async fn write(&mut self, port: &str, value: impl Into<Value>) -> Result<SendStatus> {
        let value = value.into();
        let binding = self.binding_mut(port)?;
        check_kind(binding, &value)?;

        match binding {
            Binding::Network(port) if port.direction() == Direction::Out => {
                Ok(port.send(&value).await?)
            }
            Binding::BridgedOut { gate, .. } => {
                gate.push(value)?;
                Ok(SendStatus::Sent)
            }
            other => Err(ModuleError::wrong_direction(other.name(), "be written")),
        }
    }

    /// Read the oldest value from an inbound port; `None` when nothing is
    /// available without blocking
    pub async fn read(&mut self, port: &str, blocking: bool) -> Result<Option<Value>> {
        match self.binding_mut(port)? {
            Binding::Network(port) if port.direction() == Direction::In => {
                Ok(port.receive(blocking).await?)
            }
            Binding::BridgedIn { values, .. } => {
                if blocking {
                    Ok(values.recv().await)
                } else {
                    Ok(values.try_recv().ok())
                }
            }
            other => Err(ModuleError::wrong_direction(other.name(), "be read")),
        }
    }

    /// Consume the acknowledgment for the last write on an outbound port
    pub async fn receive_ack(&mut self, port: &str, blocking: bool) -> Result<AckStatus> {
        match self.binding_mut(port)? {
            Binding::Network(port) if port.direction() == Direction::Out => {
                Ok(port.receive_ack(blocking).await?)
            }
            // bridged writes complete on enqueue
            Binding::BridgedOut { .. } => Ok(AckStatus::Acked),
            other => Err(ModuleError::wrong_direction(other.name(), "receive acknowledgments")),
        }
    }

    pub fn port_state(&self, port: &str) -> Result<PortState> {
        match self.binding(port)? {
            Binding::Network(port) => Ok(port.state()),
            _ => Ok(PortState::Ready),
        }
    }

    /// Values written to a bridged outbound port and not yet delivered
    pub fn queued(&self, port: &str) -> Result<usize> {
        match self.binding(port)? {
            Binding::BridgedOut { gate, .. } => Ok(gate.pending()),
            _ => Ok(0),
        }
    }

    /// Release every socket; the module can be initialized again afterwards
    pub async fn close(&mut self) {
        for binding in &mut self.bindings {
            if let Binding::Network(port) = binding {
                if let Err(e) = port.close().await {
                    warn!(port = %port.name(), error = %e, "Error closing port");
                }
            }
        }
        if let Some(mut control) = self.control.take() {
            if let Err(e) = control.close().await {
                warn!(error = %e, "Error closing control channel");
            }
        }
        if let Some(mut registry) = self.registry.take() {
            if let Err(e) = registry.close().await {
                debug!(error = %e, "Error closing registry connection");
            }
        }

        if self.initialized {
            info!(module = %self.config.module.name, pid = %self.pid, "Module closed");
        }
        self.initialized = false;
    }

    /// Host-side ends of the bridged ports; handed out once
    pub(crate) fn take_host_endpoints(&mut self) -> Option<HostEndpoints> {
        self.host_endpoints.take()
    }

    fn find(&self, port: &str) -> Option<usize> {
        self.bindings.iter().position(|binding| binding.matches(port))
    }

    fn binding(&self, port: &str) -> Result<&Binding> {
        self.bindings
            .iter()
            .find(|binding| binding.matches(port))
            .ok_or_else(|| ModuleError::unknown_port(port))
    }

    fn binding_mut(&mut self, port: &str) -> Result<&mut Binding> {
        self.bindings
            .iter_mut()
            .find(|binding| binding.matches(port))
            .ok_or_else(|| ModuleError::unknown_port(port))
    }
}

fn check_kind(binding: &Binding, value: &Value) -> Result<()> {
    match binding.kind() {
        Some(expected) if expected != value.kind() => Err(ModuleError::KindMismatch {
            port: binding.name().to_string(),
            expected,
            actual: value.kind(),
        }),
        _ => Ok(()),
    }
}

impl std::fmt::Debug for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Module")
            .field("name", &self.config.module.name)
            .field("id", &self.config.module.id)
            .field("pid", &self.pid)
            .field("ports", &self.bindings.iter().map(Binding::name).collect::<Vec<_>>())
            .field("initialized", &self.initialized)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use runtime_config::PortConfig;

    fn config() -> RuntimeConfig {
        let mut config = RuntimeConfig::default();
        config.module.name = "Producer".to_string();
        config.module.pid = Some("4242".to_string());
        config.ports = vec![
            PortConfig::new("Output", Direction::Out, PortKind::Int),
            PortConfig::new("Input", Direction::In, PortKind::Int),
            PortConfig::new("Seen", Direction::Out, PortKind::Int)
                .with_transport(TransportKind::HostBridge),
            PortConfig::new("Commands", Direction::In, PortKind::IntSeq)
                .with_transport(TransportKind::HostBridge),
        ];
        config
    }

    fn module() -> Module {
        Module::new(config(), TransportFactory::default()).unwrap()
    }

    #[test]
    fn test_ports_are_addressed_by_name_or_path() {
        let module = module();
        assert_eq!(module.port_path("output"), Some("/producer0/output"));
        assert_eq!(module.port_path("/producer0/seen"), Some("/producer0/seen"));
        assert_eq!(module.port_path("missing"), None);
        assert_eq!(module.control_path(), "/4242/control");
        assert_eq!(module.port_names().count(), 4);
    }

    #[test]
    fn test_duplicate_ports_rejected() {
        let mut config = config();
        config
            .ports
            .push(PortConfig::new("OUTPUT", Direction::Out, PortKind::Int));
        let err = Module::new(config, TransportFactory::default()).unwrap_err();
        assert_eq!(err.category(), "configuration");
    }

    #[tokio::test]
    async fn test_network_ports_unusable_before_init() {
        let mut module = module();
        let err = module.write("Output", 1).await.unwrap_err();
        assert_eq!(err.category(), "not_open");
        assert!(matches!(
            module.handle_command().await.unwrap_err(),
            ModuleError::NotInitialized
        ));
    }

    #[tokio::test]
    async fn test_bridged_ports_queue_without_init() {
        let mut module = module();
        assert_eq!(module.write("Seen", 10).await.unwrap(), SendStatus::Sent);
        assert_eq!(module.write("seen", 20).await.unwrap(), SendStatus::Sent);
        assert_eq!(module.queued("Seen").unwrap(), 2);
        assert_eq!(module.receive_ack("Seen", false).await.unwrap(), AckStatus::Acked);
        assert_eq!(module.read("Commands", false).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_direction_and_kind_checks() {
        let mut module = module();

        let err = module.write("Seen", 1.5).await.unwrap_err();
        assert!(matches!(err, ModuleError::KindMismatch { .. }));

        let err = module.write("Commands", vec![1i64]).await.unwrap_err();
        assert!(matches!(err, ModuleError::WrongDirection { .. }));

        let err = module.read("Seen", false).await.unwrap_err();
        assert!(matches!(err, ModuleError::WrongDirection { .. }));

        let err = module.write("Nope", 1).await.unwrap_err();
        assert!(matches!(err, ModuleError::UnknownPort { .. }));
    }

    #[tokio::test]
    async fn test_host_endpoints_handed_out_once() {
        let mut module = module();
        let endpoints = module.take_host_endpoints().unwrap();
        assert_eq!(endpoints.outbound.len(), 1);
        assert_eq!(endpoints.inbound.len(), 1);
        assert!(module.take_host_endpoints().is_none());

        endpoints.inbound[0].sender.send(Value::IntSeq(vec![1, 2])).unwrap();
        assert_eq!(
            module.read("Commands", true).await.unwrap(),
            Some(Value::IntSeq(vec![1, 2]))
        );
    }
}
