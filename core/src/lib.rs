//! Dem core: the typed bytecode runtime.
//!
//! Types are resolved by [`types`], compiled by [`compiler`] into a
//! [`vm::Chunk`], persisted through [`compression`] and executed by
//! [`vm::Vm`] with host functions from [`stdlib`].

pub mod api;
pub mod ast;
pub mod compiler;
pub mod compression;
pub mod errors;
pub mod memo;
pub mod stdlib;
pub mod types;
pub mod values;
pub mod vm;

/// Test utilities for enabling logging in tests
#[cfg(test)]
pub mod test_utils {
    /// Initialize tracing subscriber for tests with DEBUG level
    /// Call this at the start of tests where you want to see logging output
    ///
    /// # Example
    /// ```ignore
    /// #[test]
    /// fn test_huffman_tree() {
    ///     test_utils::init_test_logging();
    ///     // ... your test code
    /// }
    /// ```
    pub fn init_test_logging() {
        use tracing_subscriber::{EnvFilter, fmt};

        // Try to initialize, ignore error if already initialized
        let _ = fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
            )
            .with_test_writer()
            .try_init();
    }
}
