//! Dem Standard Library
//!
//! Native functions callable from Dem code through `Library.method(...)`
//! calls. The libraries are:
//! - System: printing, time, assertions
//! - Math: numeric functions (memoizable)
//! - List, Map, String: collection and text helpers
//! - Memory: a flat byte-addressable heap
//! - types: conversions and runtime type queries
//!
//! Natives are registered explicitly at startup into a [`NativeRegistry`].
//! The compiler checks calls against each native's [`Signature`] and the VM
//! dispatches on library, method and arity.

use hashbrown::HashMap;
use once_cell::sync::Lazy;
use thiserror::Error;

use crate::{
    errors::Error,
    values::{OpError, Value},
    vm::Vm,
};

pub mod list;
pub mod map;
pub mod math;
pub mod memory;
pub mod string;
pub mod system;
pub mod types;

#[cfg(test)]
mod stdlib_test;

/// Failure reported by a native. Natives never panic across the boundary.
#[derive(Debug, Error)]
pub enum NativeError {
    #[error("index {index} out of bounds for length {len}")]
    OutOfBounds { index: i64, len: usize },
    #[error("{name}: {reason}")]
    Failed { name: String, reason: String },
    /// A callback into the VM failed.
    #[error(transparent)]
    Runtime(Box<Error>),
}

impl NativeError {
    pub fn failed(name: &str, reason: impl Into<String>) -> Self {
        NativeError::Failed {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<OpError> for NativeError {
    fn from(err: OpError) -> Self {
        match err {
            OpError::OutOfBounds { index, len } => NativeError::OutOfBounds { index, len },
            other => NativeError::Runtime(Box::new(other.into())),
        }
    }
}

impl From<Error> for NativeError {
    fn from(err: Error) -> Self {
        NativeError::Runtime(Box::new(err))
    }
}

pub type NativeFn = fn(&mut Vm<'_, '_>, &[Value]) -> Result<Value, NativeError>;

/// Declared parameter and return types, as builtin type names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature {
    pub params: &'static [&'static str],
    pub ret: &'static str,
}

#[derive(Clone, Copy)]
pub struct NativeFunction {
    pub func: NativeFn,
    pub ty: Signature,
    /// Results depend only on the arguments and may be cached.
    pub memoizable: bool,
}

impl NativeFunction {
    pub fn new(params: &'static [&'static str], ret: &'static str, func: NativeFn) -> Self {
        NativeFunction {
            func,
            ty: Signature { params, ret },
            memoizable: false,
        }
    }

    pub fn memoized(mut self) -> Self {
        self.memoizable = true;
        self
    }

    pub fn arity(&self) -> usize {
        self.ty.params.len()
    }
}

impl core::fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("NativeFunction")
            .field("ty", &self.ty)
            .field("memoizable", &self.memoizable)
            .finish_non_exhaustive()
    }
}

/// One native library: methods overloaded by arity.
#[derive(Debug, Clone, Default)]
pub struct Library {
    methods: HashMap<&'static str, Vec<NativeFunction>>,
}

impl Library {
    pub fn method_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.methods.keys().copied()
    }
}

#[derive(Debug, Clone, Default)]
pub struct NativeRegistry {
    libraries: HashMap<&'static str, Library>,
}

impl NativeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every standard library.
    pub fn with_stdlib() -> Self {
        let mut registry = Self::new();
        register_stdlib(&mut registry);
        registry
    }

    /// Registers `function`, replacing any overload with the same arity.
    pub fn register(&mut self, library: &'static str, method: &'static str, function: NativeFunction) {
        let overloads = self
            .libraries
            .entry(library)
            .or_default()
            .methods
            .entry(method)
            .or_default();
        overloads.retain(|f| f.arity() != function.arity());
        overloads.push(function);
    }

    pub fn lookup(&self, library: &str, method: &str, arity: usize) -> Option<&NativeFunction> {
        self.libraries
            .get(library)?
            .methods
            .get(method)?
            .iter()
            .find(|f| f.arity() == arity)
    }

    pub fn library(&self, name: &str) -> Option<&Library> {
        self.libraries.get(name)
    }

    pub fn library_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.libraries.keys().copied()
    }
}

/// The standard libraries, built on first use.
pub static DEFAULT_REGISTRY: Lazy<NativeRegistry> = Lazy::new(NativeRegistry::with_stdlib);

/// Registers all standard library packages.
///
/// Use individual `register` functions (`math::register`, ...) for finer
/// control over which libraries a host exposes.
pub fn register_stdlib(registry: &mut NativeRegistry) {
    system::register(registry);
    math::register(registry);
    list::register(registry);
    map::register(registry);
    string::register(registry);
    memory::register(registry);
    types::register(registry);
}

// ============================================================================
// Argument helpers
// ============================================================================

pub(crate) fn arg_i64(name: &str, args: &[Value], i: usize) -> Result<i64, NativeError> {
    args.get(i).and_then(Value::as_i64).ok_or_else(|| {
        NativeError::failed(name, format!("argument {} must be an integer", i + 1))
    })
}

pub(crate) fn arg_f64(name: &str, args: &[Value], i: usize) -> Result<f64, NativeError> {
    args.get(i)
        .and_then(Value::as_f64)
        .ok_or_else(|| NativeError::failed(name, format!("argument {} must be a number", i + 1)))
}

pub(crate) fn arg_str<'v>(name: &str, args: &'v [Value], i: usize) -> Result<&'v str, NativeError> {
    args.get(i)
        .and_then(Value::as_str)
        .ok_or_else(|| NativeError::failed(name, format!("argument {} must be a string", i + 1)))
}

pub(crate) fn arg_usize(name: &str, args: &[Value], i: usize) -> Result<usize, NativeError> {
    let n = arg_i64(name, args, i)?;
    usize::try_from(n).map_err(|_| {
        NativeError::failed(name, format!("argument {} must not be negative, got {n}", i + 1))
    })
}

/// Converts an item count back into an int value.
pub(crate) fn len_value(len: usize) -> Value {
    i32::try_from(len).map_or_else(|_| Value::long(len as i64), Value::int)
}
