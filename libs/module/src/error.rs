//! Module Error Types

use network::TransportError;
use thiserror::Error;
use types::PortKind;

#[derive(Error, Debug)]
pub enum ModuleError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Unknown port: {port}")]
    UnknownPort { port: String },

    #[error("Port {port} cannot {operation}")]
    WrongDirection { port: String, operation: String },

    #[error("Port {port} carries {expected} values, got {actual}")]
    KindMismatch {
        port: String,
        expected: PortKind,
        actual: PortKind,
    },

    #[error("Port {port} cannot be connected: {reason}")]
    NotConnectable { port: String, reason: String },

    /// Teardown has begun; no new values are accepted
    #[error("Port {port} rejected a write: module is being destroyed")]
    Destroying { port: String },

    #[error("Module is not initialized")]
    NotInitialized,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Worker error: {0}")]
    Worker(String),
}

pub type Result<T> = std::result::Result<T, ModuleError>;

impl ModuleError {
    pub fn unknown_port(port: &str) -> Self {
        Self::UnknownPort {
            port: port.to_string(),
        }
    }

    pub fn wrong_direction(port: &str, operation: &str) -> Self {
        Self::WrongDirection {
            port: port.to_string(),
            operation: operation.to_string(),
        }
    }

    pub fn not_connectable(port: &str, reason: impl Into<String>) -> Self {
        Self::NotConnectable {
            port: port.to_string(),
            reason: reason.into(),
        }
    }

    pub fn worker(message: impl Into<String>) -> Self {
        Self::Worker(message.into())
    }

    /// Conditions a tick loop can simply retry on a later tick
    pub fn is_transient(&self) -> bool {
        match self {
            ModuleError::Transport(e) => e.is_transient(),
            _ => false,
        }
    }

    pub fn category(&self) -> &'static str {
        match self {
            ModuleError::Transport(e) => e.category(),
            ModuleError::UnknownPort { .. } => "unknown_port",
            ModuleError::WrongDirection { .. } => "wrong_direction",
            ModuleError::KindMismatch { .. } => "kind_mismatch",
            ModuleError::NotConnectable { .. } => "not_connectable",
            ModuleError::Destroying { .. } => "destroying",
            ModuleError::NotInitialized => "not_initialized",
            ModuleError::Config(_) => "configuration",
            ModuleError::Worker(_) => "worker",
        }
    }
}

impl From<anyhow::Error> for ModuleError {
    fn from(err: anyhow::Error) -> Self {
        // keep the context chain, e.g. "Failed to parse ...: missing field"
        Self::Config(format!("{:#}", err))
    }
}
