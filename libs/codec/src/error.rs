//! Codec errors
//!
//! Every variant carries enough context to log the offending payload
//! without re-reading the socket.

use thiserror::Error;
use types::PortKind;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CodecError {
    /// Declared or actual frame length above the accepted maximum
    #[error("Frame too large: {size} bytes exceeds maximum {max}")]
    FrameTooLarge { size: usize, max: usize },

    /// Control payload that cannot be interpreted as a connect command
    #[error("Malformed control command: {reason}")]
    MalformedCommand { reason: String },

    /// Control payload with a tag this runtime does not know
    #[error("Unknown control command tag {tag:#04x}")]
    UnknownCommand { tag: u8 },

    /// Registry request that is not `"<path>:<pid>"` text
    #[error("Malformed registry request: {reason}")]
    MalformedRequest { reason: String },

    /// Registry reply that is not a usable JSON record
    #[error("Malformed registry reply: {reason}")]
    MalformedReply { reason: String },

    /// Value payload that does not parse as the port's kind
    #[error("Invalid {kind} value {input:?}: {reason}")]
    InvalidValue {
        kind: PortKind,
        input: String,
        reason: String,
    },

    #[error("Invalid UTF-8 in {context}")]
    InvalidUtf8 { context: String },
}

impl CodecError {
    pub fn malformed_command(reason: impl Into<String>) -> Self {
        Self::MalformedCommand {
            reason: reason.into(),
        }
    }

    pub fn malformed_reply(reason: impl Into<String>) -> Self {
        Self::MalformedReply {
            reason: reason.into(),
        }
    }

    pub fn invalid_value(kind: PortKind, input: &str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            kind,
            input: input.to_string(),
            reason: reason.into(),
        }
    }

    pub fn invalid_utf8(context: impl Into<String>) -> Self {
        Self::InvalidUtf8 {
            context: context.into(),
        }
    }
}
