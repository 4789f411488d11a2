//! Unified Transport Layer
//!
//! One request/reply transport interface with pluggable implementations:
//! framed TCP for modules in different processes and in-process channels for
//! modules sharing a process. Ports are written against [`Transport`] only and
//! never know which implementation carries their bytes.

use crate::{Result, TransportError};
use async_trait::async_trait;
use bytes::Bytes;
use runtime_config::{ModuleSettings, TransportKind};
use serde::{Deserialize, Serialize};

pub mod memory;
pub mod metrics;
pub mod tcp;


pub use memory::{MemoryHub, MemoryTransport};
pub use metrics::{MetricsTracker, TransportMetrics};
pub use tcp::{TcpConnection, TcpNetworkConfig, TcpReqRepTransport};

/// Outcome of a non-blocking send attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStatus {
    /// The whole frame was handed to the transport
    Sent,
    /// Nothing was written; try again on a later tick
    WouldBlock,
}

/// Request/reply transport.
///
/// A transport is a server once [`bind`](Transport::bind) succeeded and a
/// client once [`connect`](Transport::connect) succeeded. Servers read
/// requests with [`recv`](Transport::recv) and answer the peer that sent
/// the last one with [`reply`](Transport::reply); clients send requests and
/// read replies with [`recv`](Transport::recv).
#[async_trait]
pub trait Transport: Send {
    /// Start accepting peers at `endpoint`
    async fn bind(&mut self, endpoint: &str) -> Result<()>;

    /// Connect to the server at `endpoint`, replacing any earlier connection
    async fn connect(&mut self, endpoint: &str) -> Result<()>;

    /// Send a request, waiting until it is written
    async fn send(&mut self, payload: &[u8]) -> Result<()>;

    /// Send a request only if it can be handed over without waiting
    async fn try_send(&mut self, payload: &[u8]) -> Result<SendStatus>;

    /// Next request (server) or reply (client); `Ok(None)` only when not blocking
    async fn recv(&mut self, blocking: bool) -> Result<Option<Bytes>>;

    /// Answer the peer whose request was received last
    async fn reply(&mut self, payload: &[u8]) -> Result<()>;

    fn is_connected(&self) -> bool;

    fn transport_info(&self) -> TransportInfo;

    fn metrics(&self) -> TransportMetrics;

    async fn close(&mut self) -> Result<()>;
}

/// Transport type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportType {
    /// Framed TCP
    Tcp,
    /// In-process channels
    Memory,
}

impl TryFrom<TransportKind> for TransportType {
    type Error = TransportError;

    fn try_from(kind: TransportKind) -> Result<Self> {
        match kind {
            TransportKind::Tcp => Ok(TransportType::Tcp),
            TransportKind::Memory => Ok(TransportType::Memory),
            TransportKind::HostBridge => Err(TransportError::configuration(
                "host_bridge ports are served by the module's bridge, not a network transport",
                Some("transport"),
            )),
        }
    }
}

/// Transport information for monitoring
#[derive(Debug, Clone)]
pub struct TransportInfo {
    pub transport_type: TransportType,
    pub local_address: Option<String>,
    pub remote_address: Option<String>,
    pub connection_count: usize,
}

/// Builds transports from configuration.
///
/// Holds the [`MemoryHub`] shared by every in-process transport it creates,
/// so modules only see each other's memory endpoints when built from the
/// same factory.
#[derive(Debug, Clone, Default)]
pub struct TransportFactory {
    tcp: TcpNetworkConfig,
    hub: MemoryHub,
}

impl TransportFactory {
    pub fn new(tcp: TcpNetworkConfig) -> Self {
        Self {
            tcp,
            hub: MemoryHub::new(),
        }
    }

    pub fn from_settings(settings: &ModuleSettings) -> Self {
        Self::new(TcpNetworkConfig::from_settings(settings))
    }

    pub fn with_memory_hub(mut self, hub: MemoryHub) -> Self {
        self.hub = hub;
        self
    }

    pub fn memory_hub(&self) -> &MemoryHub {
        &self.hub
    }

    pub fn create(&self, transport_type: TransportType) -> Box<dyn Transport> {
        match transport_type {
            TransportType::Tcp => Box::new(TcpReqRepTransport::new(self.tcp.clone())),
            TransportType::Memory => Box::new(MemoryTransport::new(self.hub.clone())),
        }
    }

    /// Create the transport for a configured port kind
    pub fn create_for(&self, kind: TransportKind) -> Result<Box<dyn Transport>> {
        Ok(self.create(TransportType::try_from(kind)?))
    }
}
