//! Codegen error types.

use thiserror::Error;

/// Errors that can occur while encoding a module.
///
/// All of them are fatal: by the time a module reaches the encoder every
/// user-facing problem has been reported by earlier passes, so these
/// indicate a gap in lowering or a program too large for the format.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodegenError {
    /// An operation or type combination with no encoding.
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// A value does not fit the field it is written to.
    #[error("encoding range exceeded: {what} = {value} (allowed {min}..={max})")]
    EncodingRange {
        what: String,
        value: i128,
        min: i128,
        max: i128,
    },

    /// An internal consistency check failed.
    #[error("internal codegen error: {0}")]
    Internal(String),
}

impl CodegenError {
    pub(crate) fn range(what: &str, value: i128, min: i128, max: i128) -> Self {
        Self::EncodingRange {
            what: what.to_string(),
            value,
            min,
            max,
        }
    }
}

/// Codegen result type alias.
pub type CodegenResult<T> = Result<T, CodegenError>;

/// Errors decoding an encoded module.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReadError {
    #[error("unexpected end of input at offset {offset} (needed {needed} bytes)")]
    UnexpectedEof { offset: usize, needed: usize },

    #[error("invalid type code {code} at offset {offset}")]
    BadTypeCode { offset: usize, code: u8 },

    #[error("string at offset {offset} is not NUL-terminated ASCII")]
    BadString { offset: usize },

    #[error("{what} offset {offset} points outside the module")]
    BadOffset { what: &'static str, offset: u32 },
}
