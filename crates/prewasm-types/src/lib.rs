//! Shared types for the prewasm compiler.
//!
//! This crate defines the raw parse tree handed over by the parser, the
//! typed AST produced by semantic analysis, source spans, diagnostics,
//! value/memory types and the operator classification tables shared by
//! every later pass.

mod config;
mod error;
mod span;
pub mod ast;
pub mod ops;
pub mod parsed;
pub mod ty;

pub use config::{Config, ConfigPathError, ConfigValue, DEFAULT_FIXED_MEMORY};
pub use error::{
    Diagnostic, DiagnosticKind, DiagnosticSink, Diagnostics, FatalError, FatalResult, LogSink,
    MAX_ERRORS,
};
pub use span::Span;
pub use ty::{FuncType, MemType, StorageClass, ValueType};
