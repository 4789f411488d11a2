//! Text encoding of port values
//!
//! Scalars are written in decimal, sequences as space-separated decimals.
//! The receiving port's [`PortKind`] decides how the text is read back.

use crate::{trim_nul, CodecError};
use std::fmt::Display;
use std::str::FromStr;
use types::{PortKind, Value};

pub fn encode_value(value: &Value) -> Vec<u8> {
    match value {
        Value::Int(v) => v.to_string().into_bytes(),
        Value::Float(v) => v.to_string().into_bytes(),
        Value::IntSeq(vs) => join(vs),
        Value::FloatSeq(vs) => join(vs),
    }
}

pub fn decode_value(kind: PortKind, payload: &[u8]) -> Result<Value, CodecError> {
    let text = std::str::from_utf8(trim_nul(payload))
        .map_err(|_| CodecError::invalid_utf8("value payload"))?;
    let text = text.trim();

    match kind {
        PortKind::Int => parse_scalar(kind, text).map(Value::Int),
        PortKind::Float => parse_scalar(kind, text).map(Value::Float),
        PortKind::IntSeq => parse_seq(kind, text).map(Value::IntSeq),
        PortKind::FloatSeq => parse_seq(kind, text).map(Value::FloatSeq),
    }
}

fn join<T: Display>(values: &[T]) -> Vec<u8> {
    values
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ")
        .into_bytes()
}

fn parse_scalar<T>(kind: PortKind, text: &str) -> Result<T, CodecError>
where
    T: FromStr,
    T::Err: Display,
{
    let mut tokens = text.split_whitespace();
    match (tokens.next(), tokens.next()) {
        (Some(token), None) => token
            .parse()
            .map_err(|e: T::Err| CodecError::invalid_value(kind, text, e.to_string())),
        (None, _) => Err(CodecError::invalid_value(kind, text, "empty payload")),
        (Some(_), Some(_)) => Err(CodecError::invalid_value(
            kind,
            text,
            "expected a single value",
        )),
    }
}

fn parse_seq<T>(kind: PortKind, text: &str) -> Result<Vec<T>, CodecError>
where
    T: FromStr,
    T::Err: Display,
{
    text.split_whitespace()
        .map(|token| {
            token
                .parse()
                .map_err(|e: T::Err| CodecError::invalid_value(kind, token, e.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_text() {
        assert_eq!(encode_value(&Value::Int(42)), b"42");
        assert_eq!(encode_value(&Value::Int(-7)), b"-7");
        assert_eq!(encode_value(&Value::Float(1.5)), b"1.5");
        assert_eq!(decode_value(PortKind::Int, b"42\0").unwrap(), Value::Int(42));
        assert_eq!(decode_value(PortKind::Float, b" 3 ").unwrap(), Value::Float(3.0));
    }

    #[test]
    fn test_sequence_text() {
        assert_eq!(encode_value(&Value::IntSeq(vec![10, 20, 30])), b"10 20 30");
        assert_eq!(
            decode_value(PortKind::FloatSeq, b"0.5 -2 1e3").unwrap(),
            Value::FloatSeq(vec![0.5, -2.0, 1000.0])
        );
        assert_eq!(decode_value(PortKind::IntSeq, b"").unwrap(), Value::IntSeq(vec![]));
    }

    #[test]
    fn test_truncated_or_garbled_payloads() {
        assert!(matches!(
            decode_value(PortKind::Int, b""),
            Err(CodecError::InvalidValue { .. })
        ));
        assert!(matches!(
            decode_value(PortKind::Int, b"4 2"),
            Err(CodecError::InvalidValue { .. })
        ));
        assert!(matches!(
            decode_value(PortKind::Int, b"4.2"),
            Err(CodecError::InvalidValue { .. })
        ));
        assert!(matches!(
            decode_value(PortKind::IntSeq, b"1 x 3"),
            Err(CodecError::InvalidValue { .. })
        ));
        assert!(matches!(
            decode_value(PortKind::Float, &[0xff]),
            Err(CodecError::InvalidUtf8 { .. })
        ));
    }
}
