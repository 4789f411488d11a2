//! Port identity, direction and flow-control state

use serde::{Deserialize, Serialize};
use std::fmt;

/// Prefix the registry expects in front of every port path it resolves
pub const RESOLVE_PREFIX: &str = "/resolve";

/// Which way values travel through a port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Values arrive from a peer
    In,
    /// Values leave towards a peer
    Out,
}

impl Direction {
    /// Transport role a port with this direction takes.
    ///
    /// Inbound ports bind and wait for requests, outbound ports connect and
    /// issue them.
    pub fn role(self) -> Role {
        match self {
            Direction::In => Role::Server,
            Direction::Out => Role::Client,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::In => write!(f, "in"),
            Direction::Out => write!(f, "out"),
        }
    }
}

/// Transport role of a port socket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Server,
    Client,
}

/// Request/reply state of a port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortState {
    /// No request outstanding
    #[default]
    Ready,
    /// A request went out and its acknowledgment has not been consumed yet
    AwaitingAck,
}

/// Kind of value a port carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortKind {
    Int,
    Float,
    IntSeq,
    FloatSeq,
}

impl fmt::Display for PortKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PortKind::Int => "int",
            PortKind::Float => "float",
            PortKind::IntSeq => "int_seq",
            PortKind::FloatSeq => "float_seq",
        };
        f.write_str(name)
    }
}

/// Resolved transport identity of a named port.
///
/// A record starts out with only `name` (and usually the requesting `pid`)
/// set; the registry client fills `host`, `port` and `pid` in place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortRecord {
    pub name: String,
    pub host: String,
    pub port: String,
    pub pid: String,
}

impl PortRecord {
    pub fn new(name: impl Into<String>, pid: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pid: pid.into(),
            ..Default::default()
        }
    }

    /// True once the registry has supplied a host and a port
    pub fn is_resolved(&self) -> bool {
        !self.host.is_empty() && !self.port.is_empty()
    }

    /// `host:port` form accepted by the transports
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for PortRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_resolved() {
            write!(f, "{} @ {}:{} (pid {})", self.name, self.host, self.port, self.pid)
        } else {
            write!(f, "{} (unresolved)", self.name)
        }
    }
}

/// Registry path of a module's port: `/<module><id>/<port>`, lowercased.
pub fn port_path(module: &str, id: &str, port: &str) -> String {
    format!(
        "/{}{}/{}",
        module.to_lowercase(),
        id,
        port.to_lowercase()
    )
}

/// Registry path of the control channel owned by process `pid`
pub fn control_path(pid: &str) -> String {
    format!("/{}/control", pid)
}

/// Prefix `path` with [`RESOLVE_PREFIX`] unless it already carries it
pub fn resolve_path(path: &str) -> String {
    if strip_resolve_prefix(path) != path {
        return path.to_string();
    }
    if path.starts_with('/') {
        format!("{}{}", RESOLVE_PREFIX, path)
    } else {
        format!("{}/{}", RESOLVE_PREFIX, path)
    }
}

/// Inverse of [`resolve_path`]; paths without the prefix are returned as-is
pub fn strip_resolve_prefix(path: &str) -> &str {
    match path.strip_prefix(RESOLVE_PREFIX) {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => rest,
        _ => path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_roles() {
        assert_eq!(Direction::In.role(), Role::Server);
        assert_eq!(Direction::Out.role(), Role::Client);
    }

    #[test]
    fn test_port_path_is_lowercased() {
        assert_eq!(port_path("ZmqModule", "3", "Output"), "/zmqmodule3/output");
    }

    #[test]
    fn test_resolve_path_prefix_is_idempotent() {
        let once = resolve_path("/producer0/output");
        assert_eq!(once, "/resolve/producer0/output");
        assert_eq!(resolve_path(&once), once);
        assert_eq!(resolve_path("bare"), "/resolve/bare");
    }

    #[test]
    fn test_strip_resolve_prefix_requires_separator() {
        assert_eq!(strip_resolve_prefix("/resolve/a/b"), "/a/b");
        assert_eq!(strip_resolve_prefix("/resolver/a"), "/resolver/a");
        assert_eq!(strip_resolve_prefix("/a/b"), "/a/b");
        assert_eq!(strip_resolve_prefix("/resolve"), "");
    }

    #[test]
    fn test_record_resolution_state() {
        let mut record = PortRecord::new("/4242/control", "4242");
        assert!(!record.is_resolved());

        record.host = "127.0.0.1".into();
        record.port = "60000".into();
        assert!(record.is_resolved());
        assert_eq!(record.endpoint(), "127.0.0.1:60000");
    }

    #[test]
    fn test_enum_serde_names() {
        let kind: PortKind = serde_json::from_str("\"float_seq\"").unwrap();
        assert_eq!(kind, PortKind::FloatSeq);

        let direction: Direction = serde_json::from_str("\"out\"").unwrap();
        assert_eq!(direction, Direction::Out);
    }
}
