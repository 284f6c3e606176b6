//! Bytecode compilation errors.

use thiserror::Error;

use crate::{
    ast::Span,
    errors::{Error, ErrorKind},
};

/// Resource limits that can legitimately be hit by very large programs.
///
/// Type errors are reported directly as [`ErrorKind::TypeMismatch`]; these
/// surface as [`ErrorKind::ResourceExceeded`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("too many local variables (limit: 65535 slots per frame)")]
    TooManyLocals,
    #[error("too many constants (limit: 16777216)")]
    TooManyConstants,
    #[error("too many captured variables (limit: 255)")]
    TooManyUpvalues,
    #[error("too many operands (limit: 255 arguments, elements or parameters)")]
    TooManyOperands,
    #[error("jump distance too large (limit: 65535 instructions)")]
    JumpTooFar,
    #[error("operand stack too deep (limit: 65535)")]
    StackTooDeep,
}

impl CompileError {
    pub fn at(self, span: &Span) -> Error {
        Error::compiler(ErrorKind::ResourceExceeded, span, self.to_string())
    }
}
