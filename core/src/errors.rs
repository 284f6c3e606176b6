//! The diagnostic type shared by every stage of the toolchain.
//!
//! Type resolution never produces an [`Error`]: it answers with `Option` and
//! the compiler turns an absent answer into a [`ErrorKind::TypeMismatch`].
//! Natives answer with [`crate::stdlib::NativeError`], which the VM converts.

use core::fmt;

use thiserror::Error;

use crate::{
    ast::Span, compression::CompressionError, stdlib::NativeError, types::encoding::DecodeError,
    values::OpError,
};

/// Where a diagnostic originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Parser,
    Compiler,
    VirtualMachine,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Parser => write!(f, "parser"),
            Stage::Compiler => write!(f, "compiler"),
            Stage::VirtualMachine => write!(f, "virtual machine"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ErrorKind {
    #[error("type mismatch")]
    TypeMismatch,
    #[error("syntax error")]
    Syntax,
    #[error("undefined name")]
    Undefined,
    #[error("bounds violation")]
    BoundsViolation,
    #[error("division by zero")]
    DivisionByZero,
    #[error("native call failed")]
    Native,
    #[error("resource limit exceeded")]
    ResourceExceeded,
    #[error("internal error: {0}")]
    Internal(#[source] InternalError),
}

impl ErrorKind {
    /// Short machine-friendly name, used as the report code.
    pub fn name(&self) -> &'static str {
        match self {
            ErrorKind::TypeMismatch => "TypeMismatch",
            ErrorKind::Syntax => "Syntax",
            ErrorKind::Undefined => "Undefined",
            ErrorKind::BoundsViolation => "BoundsViolation",
            ErrorKind::DivisionByZero => "DivisionByZero",
            ErrorKind::Native => "Native",
            ErrorKind::ResourceExceeded => "ResourceExceeded",
            ErrorKind::Internal(_) => "Internal",
        }
    }
}

/// Unrecoverable failures. The original cause is kept as the error source.
#[derive(Debug, Error)]
pub enum InternalError {
    #[error("i/o failure")]
    Io(#[from] std::io::Error),
    #[error("malformed bytecode")]
    Decode(#[from] DecodeError),
    #[error("compression failure")]
    Compression(#[from] CompressionError),
    #[error("{0}")]
    Message(String),
}

#[derive(Debug, Error)]
#[error("{stage}: {kind}{}", render_details(.details))]
pub struct Error {
    pub stage: Stage,
    #[source]
    pub kind: ErrorKind,
    pub span: Option<Span>,
    pub details: Vec<String>,
}

fn render_details(details: &[String]) -> String {
    match details.first() {
        Some(first) => format!(": {first}"),
        None => String::new(),
    }
}

impl Error {
    pub fn new(stage: Stage, kind: ErrorKind) -> Self {
        Error {
            stage,
            kind,
            span: None,
            details: Vec::new(),
        }
    }

    pub fn compiler(kind: ErrorKind, span: &Span, detail: impl Into<String>) -> Self {
        Error::new(Stage::Compiler, kind)
            .with_span(span.clone())
            .with_detail(detail)
    }

    pub fn type_mismatch(span: &Span, detail: impl Into<String>) -> Self {
        Error::compiler(ErrorKind::TypeMismatch, span, detail)
    }

    pub fn runtime(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Error::new(Stage::VirtualMachine, kind).with_detail(detail)
    }

    pub fn internal(stage: Stage, err: impl Into<InternalError>) -> Self {
        Error::new(stage, ErrorKind::Internal(err.into()))
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.details.push(detail.into());
        self
    }

    pub fn is_kind(&self, name: &str) -> bool {
        self.kind.name() == name
    }
}

impl From<OpError> for Error {
    fn from(err: OpError) -> Self {
        let kind = match &err {
            OpError::DivisionByZero => ErrorKind::DivisionByZero,
            OpError::OutOfBounds { .. } => ErrorKind::BoundsViolation,
            OpError::NoMember { .. } | OpError::Detached(_) => ErrorKind::Undefined,
            OpError::TooLarge { .. } => ErrorKind::ResourceExceeded,
            _ => ErrorKind::TypeMismatch,
        };
        Error::runtime(kind, err.to_string())
    }
}

impl From<NativeError> for Error {
    fn from(err: NativeError) -> Self {
        match err {
            NativeError::OutOfBounds { .. } => {
                Error::runtime(ErrorKind::BoundsViolation, err.to_string())
            }
            NativeError::Failed { .. } => Error::runtime(ErrorKind::Native, err.to_string()),
            NativeError::Runtime(inner) => *inner,
        }
    }
}
