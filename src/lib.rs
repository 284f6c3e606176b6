//! Dem - a typed bytecode runtime
//!
//! # Overview
//!
//! Dem programs are type-checked and compiled into a compact bytecode
//! [`Chunk`], which can be executed immediately or persisted as a compressed
//! artifact and run later. Host applications extend the language with
//! native libraries callable as `Library.method(...)`.
//!
//! # Quick Start
//!
//! ```
//! use dem::{Engine, EngineOptions, Value};
//! use dem::ast::{Node, Operator};
//! use bumpalo::Bump;
//!
//! // Types live in an arena owned by the host
//! let arena = Bump::new();
//! let engine = Engine::new(&arena, EngineOptions::default());
//!
//! // Compile a program
//! let program = Node::block(vec![
//!     Node::let_("x", Node::int(20)),
//!     Node::binary(Operator::Add, Node::var("x"), Node::int(22)),
//! ]);
//! let chunk = engine.compile(&program).unwrap();
//!
//! // Run it, or save it and run it later
//! assert_eq!(engine.run(&chunk).unwrap(), Value::int(42));
//! let bytes = engine.encode(&chunk).unwrap();
//! assert_eq!(engine.run(&engine.decode(&bytes).unwrap()).unwrap(), Value::int(42));
//! ```
//!
//! # Host Functions
//!
//! Register natives when building the engine:
//!
//! ```
//! use dem::{Engine, EngineOptions, NativeFunction, Value};
//! use dem::ast::Node;
//! use bumpalo::Bump;
//!
//! let arena = Bump::new();
//! let engine = Engine::with_natives(&arena, EngineOptions::default(), |registry| {
//!     registry.register(
//!         "Host",
//!         "version",
//!         NativeFunction::new(&[], "str", |_, _| Ok(Value::str("1.0"))),
//!     );
//! });
//! let chunk = engine.compile(&Node::native("Host", "version", vec![])).unwrap();
//! assert_eq!(engine.run(&chunk).unwrap(), Value::str("1.0"));
//! ```

mod error_renderer;

// Re-export public API from dem_core
pub use dem_core::api::{
    CompileOptions, Engine, EngineOptions, ExecutionOptions,
    artifact::{self, ARTIFACT_EXTENSION, SOURCE_EXTENSION},
};
pub use dem_core::compression::CompressionMethod;
pub use dem_core::errors::{Error, ErrorKind, Stage};
pub use dem_core::vm::{Chunk, Constant, Instruction};
pub use dem_core::{ast, stdlib, types, values};

// Re-export commonly used types and values
pub use dem_core::stdlib::{NativeError, NativeFunction, NativeRegistry};
pub use dem_core::types::{Type, TypeManager};
pub use dem_core::values::Value;

pub use error_renderer::{
    render_error, render_error_to, render_error_to_string, render_error_to_string_no_color,
};
