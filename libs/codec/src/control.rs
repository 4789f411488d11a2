//! Control-channel commands
//!
//! A command is one tag byte followed by a UTF-8 body. The only command is
//! connect (`0x01`), whose body names a local source port and a target port
//! path separated by `->`.

use crate::constants::{CONNECT_SEPARATOR, CONNECT_TAG};
use crate::{trim_nul, CodecError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    /// Connect the local port `source` to the port registered as `target`
    Connect { source: String, target: String },
}

impl ControlCommand {
    pub fn connect(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self::Connect {
            source: source.into(),
            target: target.into(),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        match self {
            ControlCommand::Connect { source, target } => {
                let mut out =
                    Vec::with_capacity(1 + source.len() + CONNECT_SEPARATOR.len() + target.len());
                out.push(CONNECT_TAG);
                out.extend_from_slice(source.as_bytes());
                out.extend_from_slice(CONNECT_SEPARATOR.as_bytes());
                out.extend_from_slice(target.as_bytes());
                out
            }
        }
    }

    pub fn decode(payload: &[u8]) -> Result<Self, CodecError> {
        let (&tag, body) = payload
            .split_first()
            .ok_or_else(|| CodecError::malformed_command("empty command"))?;

        if tag != CONNECT_TAG {
            return Err(CodecError::UnknownCommand { tag });
        }

        let body = std::str::from_utf8(trim_nul(body))
            .map_err(|_| CodecError::malformed_command("command body is not valid UTF-8"))?;
        if body.is_empty() {
            return Err(CodecError::malformed_command("connect command has no body"));
        }

        let (source, target) = body.split_once(CONNECT_SEPARATOR).ok_or_else(|| {
            CodecError::malformed_command(format!(
                "no '{}' separator in {:?}",
                CONNECT_SEPARATOR, body
            ))
        })?;

        let (source, target) = (source.trim(), target.trim());
        if source.is_empty() || target.is_empty() {
            return Err(CodecError::malformed_command(format!(
                "connect needs both a source and a target, got {:?}",
                body
            )));
        }

        Ok(Self::connect(source, target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_layout() {
        let bytes = ControlCommand::connect("Output", "/consumer0/input").encode();
        assert_eq!(bytes[0], 0x01);
        assert_eq!(&bytes[1..], b"Output->/consumer0/input");
    }

    #[test]
    fn test_decode_tolerates_nul_terminator() {
        let mut bytes = ControlCommand::connect("Output", "/b0/input").encode();
        bytes.push(0);
        assert_eq!(
            ControlCommand::decode(&bytes).unwrap(),
            ControlCommand::connect("Output", "/b0/input")
        );
    }

    #[test]
    fn test_missing_separator_is_malformed() {
        let err = ControlCommand::decode(b"\x01Output").unwrap_err();
        assert!(matches!(err, CodecError::MalformedCommand { .. }));
    }

    #[test]
    fn test_empty_sides_are_malformed() {
        for body in [&b"\x01->/b0/input"[..], b"\x01Output->", b"\x01", b""] {
            let err = ControlCommand::decode(body).unwrap_err();
            assert!(
                matches!(err, CodecError::MalformedCommand { .. }),
                "{:?} gave {:?}",
                body,
                err
            );
        }
    }

    #[test]
    fn test_unknown_tag() {
        assert_eq!(
            ControlCommand::decode(b"\x07Output->x").unwrap_err(),
            CodecError::UnknownCommand { tag: 0x07 }
        );
    }

    #[test]
    fn test_invalid_utf8_body() {
        let err = ControlCommand::decode(&[0x01, 0xff, 0xfe]).unwrap_err();
        assert!(matches!(err, CodecError::MalformedCommand { .. }));
    }
}
