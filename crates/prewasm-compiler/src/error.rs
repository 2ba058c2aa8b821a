//! Pipeline error type.

use prewasm_codegen::CodegenError;
use prewasm_types::FatalError;
use thiserror::Error;

/// Why a compilation stopped.
///
/// User mistakes are reported through [`prewasm_types::Diagnostics`]; by the
/// time the pipeline returns `Diagnostics`, every message has already been
/// emitted and only the count is carried here.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("compilation failed with {count} error(s)")]
    Diagnostics { count: usize },

    #[error(transparent)]
    Fatal(#[from] FatalError),

    #[error(transparent)]
    Codegen(#[from] CodegenError),
}

impl CompileError {
    /// Whether this is an internal failure rather than bad user input.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Diagnostics { .. })
    }
}
