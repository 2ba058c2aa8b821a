//! Runtime error types for the prewasm evaluator.

use std::fmt;

/// Evaluation error: runtime traps and malformed input.
#[derive(Debug, Clone, PartialEq)]
pub enum EvalError {
    /// Integer division by zero or signed division overflow.
    Trap(String),
    /// A load or store outside linear memory.
    OutOfBounds { address: u32, size: u32 },
    /// Operand, argument or return value of the wrong type.
    TypeMismatch(String),
    /// No function with that name, or a bad indirect-call uid.
    UnknownFunction(String),
    /// A non-void function ran off the end of its body.
    MissingReturn(String),
    /// Error reported by the host for an extern call.
    Host(String),
    /// Call nesting exceeded [`crate::MAX_CALL_DEPTH`].
    StackOverflow,
    /// Step limit exhausted.
    GasExhausted,
    /// A tree the passes should never have produced.
    Malformed(String),
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Trap(msg) => write!(f, "trap: {msg}"),
            Self::OutOfBounds { address, size } => {
                write!(f, "out of bounds memory access: {size} bytes at {address}")
            }
            Self::TypeMismatch(msg) => write!(f, "type mismatch: {msg}"),
            Self::UnknownFunction(name) => write!(f, "unknown function: {name}"),
            Self::MissingReturn(name) => write!(f, "function `{name}` ended without a return value"),
            Self::Host(msg) => write!(f, "host error: {msg}"),
            Self::StackOverflow => write!(f, "call stack exhausted"),
            Self::GasExhausted => write!(f, "gas exhausted"),
            Self::Malformed(msg) => write!(f, "malformed module: {msg}"),
        }
    }
}

impl std::error::Error for EvalError {}

/// Result alias for evaluator operations.
pub type EvalResult<T> = Result<T, EvalError>;
