//! Runtime Configuration Module
//!
//! Loads module configuration from TOML with environment overrides and
//! checks it before any socket is opened.

use crate::defaults;
use anyhow::{bail, Context, Result};
use config_crate::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};
use types::{port_path, Direction, PortKind};

/// Complete configuration of one module
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub registry: RegistryConfig,
    pub module: ModuleSettings,
    pub ports: Vec<PortConfig>,
}

/// Where the registry lives and how patiently to talk to it
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub address: String,
    /// `None` waits for the registry indefinitely
    pub resolve_timeout_ms: Option<u64>,
    pub retry: RetryConfig,
}

/// Retry policy for resolutions made after initialization
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub backoff_ms: u64,
}

/// Module identity and tick-loop settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ModuleSettings {
    pub name: String,
    pub id: String,
    /// Overrides the OS process id used to name the control channel
    pub pid: Option<String>,
    pub tick_interval_ms: u64,
    /// `None` lets blocking acknowledgment waits run indefinitely
    pub ack_timeout_ms: Option<u64>,
    pub connect_timeout_ms: u64,
    pub max_message_size: usize,
    pub control_transport: TransportKind,
}

/// One declared port
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PortConfig {
    pub name: String,
    pub direction: Direction,
    pub kind: PortKind,
    #[serde(default)]
    pub transport: TransportKind,
}

/// How a port's values are carried
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// Framed request/reply over TCP
    #[default]
    Tcp,
    /// In-process channels, for modules sharing one process
    Memory,
    /// Queue into an embedding host's event loop
    HostBridge,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            address: defaults::registry::ADDRESS.to_string(),
            resolve_timeout_ms: Some(defaults::registry::RESOLVE_TIMEOUT_MS),
            retry: RetryConfig::default(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: defaults::registry::RETRY_ATTEMPTS,
            backoff_ms: defaults::registry::RETRY_BACKOFF_MS,
        }
    }
}

impl Default for ModuleSettings {
    fn default() -> Self {
        Self {
            name: defaults::module::NAME.to_string(),
            id: defaults::module::ID.to_string(),
            pid: None,
            tick_interval_ms: defaults::module::TICK_INTERVAL_MS,
            ack_timeout_ms: Some(defaults::module::ACK_TIMEOUT_MS),
            connect_timeout_ms: defaults::module::CONNECT_TIMEOUT_MS,
            max_message_size: defaults::module::MAX_MESSAGE_SIZE,
            control_transport: TransportKind::Tcp,
        }
    }
}

impl PortConfig {
    pub fn new(name: impl Into<String>, direction: Direction, kind: PortKind) -> Self {
        Self {
            name: name.into(),
            direction,
            kind,
            transport: TransportKind::Tcp,
        }
    }

    pub fn with_transport(mut self, transport: TransportKind) -> Self {
        self.transport = transport;
        self
    }
}

impl RegistryConfig {
    pub fn resolve_timeout(&self) -> Option<Duration> {
        self.resolve_timeout_ms.map(Duration::from_millis)
    }
}

impl RetryConfig {
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

impl ModuleSettings {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn ack_timeout(&self) -> Option<Duration> {
        self.ack_timeout_ms.map(Duration::from_millis)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Process id naming this module's control channel
    pub fn effective_pid(&self) -> String {
        self.pid
            .clone()
            .unwrap_or_else(|| std::process::id().to_string())
    }
}

impl RuntimeConfig {
    /// Load from a TOML file, then apply `AIM_` environment overrides
    pub fn load(path: &Path) -> Result<Self> {
        info!("Loading module configuration: {:?}", path);

        let config = Config::builder()
            .add_source(File::from(path).required(true))
            .add_source(
                Environment::with_prefix("AIM")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build module configuration")?;

        let mut parsed: Self = config
            .try_deserialize()
            .context("Failed to deserialize module configuration")?;
        parsed.expand_env_vars()?;
        parsed.validate()?;

        debug!(
            module = %parsed.module.name,
            ports = parsed.ports.len(),
            registry = %parsed.registry.address,
            "Module configuration loaded"
        );
        Ok(parsed)
    }

    /// Parse an in-memory TOML document without environment overrides
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let mut parsed: Self = toml::from_str(text).context("Failed to parse module configuration")?;
        parsed.expand_env_vars()?;
        parsed.validate()?;
        Ok(parsed)
    }

    /// Expand `$VAR` references in the registry address
    pub fn expand_env_vars(&mut self) -> Result<()> {
        let expanded = shellexpand::env(&self.registry.address)
            .context("Failed to expand registry address")?;
        self.registry.address = expanded.to_string();
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.module.name.trim().is_empty() {
            bail!("module.name must not be empty");
        }
        if self.module.max_message_size == 0 {
            bail!("module.max_message_size must be positive");
        }
        if self.registry.retry.max_attempts == 0 {
            bail!("registry.retry.max_attempts must be at least 1");
        }
        if self.module.control_transport == TransportKind::HostBridge {
            bail!("the control channel cannot use the host bridge");
        }

        let mut seen = HashSet::new();
        for port in &self.ports {
            if port.name.trim().is_empty() {
                bail!("port names must not be empty");
            }
            if port.name.contains('/') || port.name.contains("->") {
                bail!("port name {:?} must not contain '/' or '->'", port.name);
            }
            if !seen.insert(port.name.to_lowercase()) {
                bail!("port {:?} is declared more than once", port.name);
            }
        }
        Ok(())
    }

    /// Registry path of one of this module's ports
    pub fn port_path(&self, port: &str) -> String {
        port_path(&self.module.name, &self.module.id, port)
    }

    pub fn port(&self, name: &str) -> Option<&PortConfig> {
        self.ports
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
        [registry]
        address = "127.0.0.1:20202"
        resolve_timeout_ms = 250

        [registry.retry]
        max_attempts = 5
        backoff_ms = 10

        [module]
        name = "Producer"
        id = "7"
        pid = "9001"
        tick_interval_ms = 1

        [[ports]]
        name = "Output"
        direction = "out"
        kind = "int"

        [[ports]]
        name = "Samples"
        direction = "out"
        kind = "float_seq"
        transport = "host_bridge"
    "#;

    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.registry.address, "127.0.0.1:10101");
        assert_eq!(config.registry.resolve_timeout(), Some(Duration::from_secs(5)));
        assert_eq!(config.module.tick_interval(), Duration::from_millis(10));
        assert_eq!(config.module.control_transport, TransportKind::Tcp);
        assert!(config.ports.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_sample() {
        let config = RuntimeConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.registry.retry.max_attempts, 5);
        assert_eq!(config.module.effective_pid(), "9001");
        assert_eq!(config.ports.len(), 2);
        assert_eq!(config.ports[0].transport, TransportKind::Tcp);
        assert_eq!(config.ports[1].transport, TransportKind::HostBridge);
        assert_eq!(config.ports[1].kind, PortKind::FloatSeq);
        assert_eq!(config.port_path("Output"), "/producer7/output");
        assert!(config.port("output").is_some());
    }

    #[test]
    fn test_missing_sections_use_defaults() {
        let config = RuntimeConfig::from_toml_str("[module]\nname = \"Solo\"\n").unwrap();
        assert_eq!(config.module.id, "0");
        assert_eq!(config.module.ack_timeout(), Some(Duration::from_secs(5)));
        assert_eq!(config.registry.retry.max_attempts, 3);
    }

    #[test]
    fn test_rejects_duplicate_ports() {
        let text = r#"
            [[ports]]
            name = "Input"
            direction = "in"
            kind = "int"

            [[ports]]
            name = "INPUT"
            direction = "in"
            kind = "float"
        "#;
        let err = RuntimeConfig::from_toml_str(text).unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn test_rejects_unusable_port_names() {
        for name in ["", "a/b", "a->b"] {
            let mut config = RuntimeConfig::default();
            config
                .ports
                .push(PortConfig::new(name, Direction::In, PortKind::Int));
            assert!(config.validate().is_err(), "{:?} accepted", name);
        }
    }

    #[test]
    fn test_rejects_bridged_control_channel() {
        let mut config = RuntimeConfig::default();
        config.module.control_transport = TransportKind::HostBridge;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = RuntimeConfig::load(file.path()).unwrap();
        assert_eq!(config.module.name, "Producer");
        assert_eq!(config.registry.resolve_timeout(), Some(Duration::from_millis(250)));
        assert_eq!(config.ports[0].name, "Output");
    }

    #[test]
    fn test_load_missing_file_fails() {
        let missing = Path::new("/nonexistent/module.toml");
        assert!(RuntimeConfig::load(missing).is_err());
    }

    #[test]
    fn test_shipped_configs_are_valid() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config");
        for file in ["producer.toml", "consumer.toml"] {
            let text = std::fs::read_to_string(dir.join(file)).unwrap();
            let config = RuntimeConfig::from_toml_str(&text).unwrap();
            assert!(config.validate().is_ok(), "{} is invalid", file);
        }
    }
}
