//! Runtime values.

use prewasm_types::ValueType;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{EvalError, EvalResult};

/// A value held in a local, a thread-local or on the evaluation stack.
///
/// Narrow integers live in `I32`, as they do in the interpreter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Value {
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Void,
}

impl Value {
    /// The initial value of a local or thread-local of type `ty`.
    pub fn zero(ty: ValueType) -> Self {
        match ty {
            ValueType::Void => Self::Void,
            ValueType::I8 | ValueType::I16 | ValueType::I32 => Self::I32(0),
            ValueType::I64 => Self::I64(0),
            ValueType::F32 => Self::F32(0.0),
            ValueType::F64 => Self::F64(0.0),
        }
    }

    pub fn ty(&self) -> ValueType {
        match self {
            Self::I32(_) => ValueType::I32,
            Self::I64(_) => ValueType::I64,
            Self::F32(_) => ValueType::F32,
            Self::F64(_) => ValueType::F64,
            Self::Void => ValueType::Void,
        }
    }

    /// Whether this value may be stored where `ty` is expected.
    pub fn fits(&self, ty: ValueType) -> bool {
        self.ty() == ty.simplified()
    }

    pub fn is_zero(&self) -> bool {
        match *self {
            Self::I32(v) => v == 0,
            Self::I64(v) => v == 0,
            Self::F32(v) => v == 0.0,
            Self::F64(v) => v == 0.0,
            Self::Void => false,
        }
    }

    pub fn as_i32(&self) -> EvalResult<i32> {
        match *self {
            Self::I32(v) => Ok(v),
            other => Err(EvalError::TypeMismatch(format!("expected i32, got {}", other.ty()))),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::I32(v) => write!(f, "{v}i32"),
            Self::I64(v) => write!(f, "{v}i64"),
            Self::F32(v) => write!(f, "{v}f32"),
            Self::F64(v) => write!(f, "{v}f64"),
            Self::Void => write!(f, "void"),
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::I32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::I64(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Self::F32(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::F64(v)
    }
}
