//! Transport Error Types
//!
//! Error handling for sockets, the request/reply discipline on ports and
//! registry resolution.

use codec::CodecError;
use thiserror::Error;

/// Main transport error type
#[derive(Error, Debug)]
pub enum TransportError {
    /// Network connectivity errors
    #[error("Network error: {message}")]
    Network {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Connection management errors
    #[error("Connection error: {message} (remote: {remote_addr:?})")]
    Connection {
        message: String,
        remote_addr: Option<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Unexpected reply, truncated payload or out-of-order exchange
    #[error("Protocol error: {message}{}", .port.as_ref().map(|p| format!(" (port: {})", p)).unwrap_or_default())]
    Protocol {
        message: String,
        port: Option<String>,
    },

    /// Registry unreachable, malformed reply or unknown name
    #[error("Resolution error for {name}: {reason}")]
    Resolution { name: String, reason: String },

    /// A request on this port has not been acknowledged yet
    #[error("Port {port} is awaiting an acknowledgment")]
    NotReady { port: String },

    /// Port used before a resolved record was attached to it
    #[error("Port {port} is not open")]
    NotOpen { port: String },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        field: Option<String>,
    },

    /// Transport timeout errors
    #[error("Timeout error: {operation} exceeded {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    /// Generic I/O errors
    #[error("I/O error: {message}")]
    Io {
        message: String,
        source: std::io::Error,
    },

    /// Payload could not be encoded or decoded
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
}

/// Result type alias for transport operations
pub type Result<T> = std::result::Result<T, TransportError>;

impl TransportError {
    /// Create a network error
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            source: None,
        }
    }

    /// Create a network error with source
    pub fn network_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Network {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a connection error
    pub fn connection(message: impl Into<String>, remote_addr: Option<&str>) -> Self {
        Self::Connection {
            message: message.into(),
            remote_addr: remote_addr.map(str::to_string),
            source: None,
        }
    }

    /// Create a connection error with source
    pub fn connection_with_source(
        message: impl Into<String>,
        remote_addr: Option<&str>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Connection {
            message: message.into(),
            remote_addr: remote_addr.map(str::to_string),
            source: Some(Box::new(source)),
        }
    }

    /// Create a protocol error
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
            port: None,
        }
    }

    /// Create a protocol error naming the port it happened on
    pub fn protocol_on_port(message: impl Into<String>, port: &str) -> Self {
        Self::Protocol {
            message: message.into(),
            port: Some(port.to_string()),
        }
    }

    /// Create a resolution error
    pub fn resolution(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Resolution {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn not_ready(port: &str) -> Self {
        Self::NotReady {
            port: port.to_string(),
        }
    }

    pub fn not_open(port: &str) -> Self {
        Self::NotOpen {
            port: port.to_string(),
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>, field: Option<&str>) -> Self {
        Self::Configuration {
            message: message.into(),
            field: field.map(|s| s.to_string()),
        }
    }

    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Check if this is a retryable error
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Network { .. } => true,
            TransportError::Connection { .. } => true,
            TransportError::Timeout { .. } => true,
            TransportError::Resolution { .. } => true,
            TransportError::NotReady { .. } => true,
            TransportError::Io { .. } => true,
            TransportError::Protocol { .. } => false,
            TransportError::NotOpen { .. } => false,
            TransportError::Configuration { .. } => false,
            TransportError::Codec(_) => false,
        }
    }

    /// Check if this is a transient error
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TransportError::Network { .. }
                | TransportError::Connection { .. }
                | TransportError::Timeout { .. }
                | TransportError::NotReady { .. }
        )
    }

    /// Get error category for logs
    pub fn category(&self) -> &'static str {
        match self {
            TransportError::Network { .. } => "network",
            TransportError::Connection { .. } => "connection",
            TransportError::Protocol { .. } => "protocol",
            TransportError::Resolution { .. } => "resolution",
            TransportError::NotReady { .. } => "not_ready",
            TransportError::NotOpen { .. } => "not_open",
            TransportError::Configuration { .. } => "configuration",
            TransportError::Timeout { .. } => "timeout",
            TransportError::Io { .. } => "io",
            TransportError::Codec(_) => "codec",
        }
    }
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
            source: err,
        }
    }
}
