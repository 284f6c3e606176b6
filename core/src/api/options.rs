//! Configuration options for the Dem engine.

use crate::compression::CompressionMethod;

/// Configuration options for compilation.
///
/// # Example
///
/// ```
/// use dem_core::api::CompileOptions;
///
/// let options = CompileOptions { optimize: false };
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompileOptions {
    /// Fold constant subtrees before emitting code.
    ///
    /// Default: true
    pub optimize: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self { optimize: true }
    }
}

/// Configuration options for execution.
///
/// These control resource limits during a run.
///
/// # Example
///
/// ```
/// use dem_core::api::ExecutionOptions;
///
/// let options = ExecutionOptions {
///     max_depth: 500,
///     ..ExecutionOptions::default()
/// };
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionOptions {
    /// Maximum call depth (for recursion protection).
    ///
    /// Default: 1000
    pub max_depth: usize,

    /// Maximum number of value stack slots.
    ///
    /// Default: 65536
    pub max_stack_size: usize,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            max_depth: 1000,
            max_stack_size: 1 << 16,
        }
    }
}

/// Configuration options for the Dem engine.
///
/// These set the defaults for compilation and execution, which can be
/// overridden on a per-call basis. The compression method is fixed for the
/// engine's lifetime.
///
/// # Example
///
/// ```
/// use dem_core::api::EngineOptions;
/// use dem_core::compression::CompressionMethod;
///
/// let options = EngineOptions {
///     compression: CompressionMethod::Gzip,
///     ..EngineOptions::default()
/// };
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineOptions {
    pub compression: CompressionMethod,
    pub compile: CompileOptions,
    pub execution: ExecutionOptions,
}
