//! Public API for the Dem runtime.
//!
//! [`Engine`] ties the pieces together: it compiles trees into chunks,
//! runs them, and persists them as compressed artifacts.
//!
//! # Example
//!
//! ```
//! use bumpalo::Bump;
//! use dem_core::api::{Engine, EngineOptions};
//! use dem_core::ast::Node;
//! use dem_core::values::Value;
//!
//! let arena = Bump::new();
//! let engine = Engine::new(&arena, EngineOptions::default());
//!
//! let program = Node::native("String", "upper", vec![Node::str("dem")]);
//! let chunk = engine.compile(&program).unwrap();
//! let bytes = engine.encode(&chunk).unwrap();
//! let loaded = engine.decode(&bytes).unwrap();
//! assert_eq!(engine.run(&loaded).unwrap(), Value::str("DEM"));
//! ```

pub mod artifact;
pub mod engine;
pub mod options;

pub use engine::Engine;
pub use options::{CompileOptions, EngineOptions, ExecutionOptions};
