//! Network Infrastructure
//!
//! Transports, ports and the registry client that modules are built from.
//!
//! - [`transports`]: the request/reply [`Transport`] trait with framed TCP and
//!   in-process implementations
//! - [`port`]: the [`Port`] state machine enforcing one outstanding request
//!   per client and an `ACK` for every delivered request
//! - [`registry`]: the [`RegistryClient`] that turns port paths into endpoints

pub mod error;
pub mod port;
pub mod registry;
pub mod transports;

pub use error::{Result, TransportError};
pub use port::{AckStatus, Port, PortSpec};
pub use registry::RegistryClient;
pub use transports::{
    MemoryHub, MemoryTransport, SendStatus, TcpConnection, TcpNetworkConfig, TcpReqRepTransport, Transport,
    TransportFactory, TransportInfo, TransportMetrics, TransportType,
};
