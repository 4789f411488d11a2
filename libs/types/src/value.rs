//! Values carried by ports

use crate::PortKind;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single value of one of the supported [`PortKind`]s
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Value {
    Int(i64),
    Float(f64),
    IntSeq(Vec<i64>),
    FloatSeq(Vec<f64>),
}

/// Conversion out of a [`Value`] of the wrong kind
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("expected a {expected} value, got {actual}")]
pub struct ValueError {
    pub expected: PortKind,
    pub actual: PortKind,
}

impl Value {
    pub fn kind(&self) -> PortKind {
        match self {
            Value::Int(_) => PortKind::Int,
            Value::Float(_) => PortKind::Float,
            Value::IntSeq(_) => PortKind::IntSeq,
            Value::FloatSeq(_) => PortKind::FloatSeq,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_int_seq(&self) -> Option<&[i64]> {
        match self {
            Value::IntSeq(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_float_seq(&self) -> Option<&[f64]> {
        match self {
            Value::FloatSeq(v) => Some(v),
            _ => None,
        }
    }

    fn mismatch(&self, expected: PortKind) -> ValueError {
        ValueError {
            expected,
            actual: self.kind(),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<Vec<i64>> for Value {
    fn from(v: Vec<i64>) -> Self {
        Value::IntSeq(v)
    }
}

impl From<Vec<f64>> for Value {
    fn from(v: Vec<f64>) -> Self {
        Value::FloatSeq(v)
    }
}

impl TryFrom<Value> for i64 {
    type Error = ValueError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        value.as_int().ok_or_else(|| value.mismatch(PortKind::Int))
    }
}

impl TryFrom<Value> for f64 {
    type Error = ValueError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        value.as_float().ok_or_else(|| value.mismatch(PortKind::Float))
    }
}

impl TryFrom<Value> for Vec<i64> {
    type Error = ValueError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::IntSeq(v) => Ok(v),
            other => Err(other.mismatch(PortKind::IntSeq)),
        }
    }
}

impl TryFrom<Value> for Vec<f64> {
    type Error = ValueError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::FloatSeq(v) => Ok(v),
            other => Err(other.mismatch(PortKind::FloatSeq)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_follows_variant() {
        assert_eq!(Value::from(42i64).kind(), PortKind::Int);
        assert_eq!(Value::from(7i32).kind(), PortKind::Int);
        assert_eq!(Value::from(1.5).kind(), PortKind::Float);
        assert_eq!(Value::from(vec![1i64, 2]).kind(), PortKind::IntSeq);
        assert_eq!(Value::from(vec![0.5f64]).kind(), PortKind::FloatSeq);
    }

    #[test]
    fn test_try_from_reports_mismatch() {
        let err = i64::try_from(Value::Float(2.0)).unwrap_err();
        assert_eq!(err.expected, PortKind::Int);
        assert_eq!(err.actual, PortKind::Float);
        assert_eq!(err.to_string(), "expected a int value, got float");

        assert_eq!(Vec::<i64>::try_from(Value::IntSeq(vec![3, 4])).unwrap(), vec![3, 4]);
    }

    #[test]
    fn test_accessors() {
        let seq = Value::FloatSeq(vec![0.25, 0.5]);
        assert_eq!(seq.as_float_seq(), Some(&[0.25, 0.5][..]));
        assert_eq!(seq.as_int(), None);
        assert_eq!(Value::Int(-3).as_int(), Some(-3));
    }
}
