//! Bytecode compiler for Dem trees.
//!
//! Transforms an [`crate::ast::Node`] into a [`crate::vm::Chunk`] in a single
//! pass, resolving types along the way.
//!
//! ## Design
//!
//! - Type resolution asks [`crate::types::Type`] for operation results; a
//!   missing answer becomes a `TypeMismatch` at the node's span
//! - Script-level bindings are globals; everything else lives in frame slots
//! - Closures capture by value when they are created
//! - Forward jumps reserve two slots so a `WideArg` prefix can be patched in
//! - Operand stack depth is tracked per function to size frames exactly

mod bytecode;
mod error;
mod scope;


pub use bytecode::BytecodeCompiler;
pub use error::CompileError;
