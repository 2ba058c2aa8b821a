//! prewasm tree-walking evaluator: reference implementation.
//!
//! Executes lowered modules directly from the typed AST, with the same
//! integer wrap-around, break-depth and memory semantics the bytecode
//! interpreter implements. Used to check that lowering preserves behaviour.

pub mod error;
pub mod evaluator;
pub mod frame;
pub mod memory;
pub mod value;

pub use error::{EvalError, EvalResult};
pub use evaluator::{Evaluator, Host, NoHost, DEFAULT_GAS_LIMIT, MAX_CALL_DEPTH};
pub use frame::Frame;
pub use memory::Memory;
pub use value::Value;
