//! # Module Runtime Types
//!
//! Shared vocabulary for every crate in the workspace: how a port is named,
//! which way it points, what it carries, and where the registry says it lives.
//!
//! ## Overview
//!
//! - [`PortRecord`]: resolved transport identity (`host`, `port`, `pid`) of a named port
//! - [`Direction`] / [`Role`]: inbound ports serve, outbound ports connect
//! - [`PortState`]: request/reply flow-control state of a single port
//! - [`PortKind`] / [`Value`]: the fixed set of value kinds a port can carry
//!
//! ## Path Conventions
//!
//! ```rust
//! use types::{control_path, port_path, resolve_path};
//!
//! assert_eq!(port_path("Consumer", "0", "Input"), "/consumer0/input");
//! assert_eq!(control_path("4242"), "/4242/control");
//! assert_eq!(resolve_path("/consumer0/input"), "/resolve/consumer0/input");
//! ```

pub mod port;
pub mod value;

pub use port::{
    control_path, port_path, resolve_path, strip_resolve_prefix, Direction, PortKind, PortRecord,
    PortState, Role, RESOLVE_PREFIX,
};
pub use value::{Value, ValueError};
