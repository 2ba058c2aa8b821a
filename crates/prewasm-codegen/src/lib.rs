//! prewasm binary encoder: compiles a pruned, lowered module into the
//! compact bytecode format executed by the prewasm interpreter.
//!
//! # Format
//!
//! All values are little-endian.
//!
//! - Header: `u8 address_bits, u8 memory_exported, u16 globals,
//!   u16 records, u16 segments`
//! - Records, externs first, sharing one uid space:
//!   `u8 argc, u8 ret, u8 param*, u32 name, u32 begin, u32 end,
//!   u16 locals[4], u8 exported, u8 is_extern`
//! - Segment records: `u32 ptr, u32 data, u32 len, u8 1`
//! - Function bodies, segment data, then the NUL-terminated name table
//!
//! See [`opcodes`] for the instruction set.

pub mod compiler;
pub mod error;
pub mod expr;
pub mod locals;
pub mod opcodes;
pub mod reader;
pub mod source_map;
pub mod stmt;
pub mod strings;
pub mod writer;

pub use compiler::{address_bits, compile, compile_with_source_map};
pub use error::{CodegenError, CodegenResult, ReadError};
pub use reader::{read_module, ModuleInfo};
pub use source_map::SourceMap;
