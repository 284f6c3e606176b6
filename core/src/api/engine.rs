//! The Dem compilation engine.

use std::{io::Write, path::Path};

use bumpalo::Bump;

use super::{CompileOptions, EngineOptions, ExecutionOptions, artifact};
use crate::{
    ast::Node,
    compiler::BytecodeCompiler,
    errors::Error,
    stdlib::{DEFAULT_REGISTRY, NativeRegistry},
    types::TypeManager,
    values::Value,
    vm::{Chunk, Vm},
};

/// The Dem compilation and execution engine.
///
/// The engine manages:
/// - Type system (TypeManager)
/// - Host functions (NativeRegistry)
/// - Configuration (EngineOptions), including the artifact compression
///   method, which is fixed for the engine's lifetime
///
/// # Lifetimes
///
/// - `'arena`: Lifetime of the arena holding types. Every chunk the engine
///   compiles or loads borrows from it.
///
/// # Example
///
/// ```
/// use bumpalo::Bump;
/// use dem_core::api::{Engine, EngineOptions};
/// use dem_core::ast::{Node, Operator};
/// use dem_core::values::Value;
///
/// let arena = Bump::new();
/// let engine = Engine::new(&arena, EngineOptions::default());
///
/// let program = Node::binary(Operator::Mul, Node::int(6), Node::int(7));
/// let chunk = engine.compile(&program).unwrap();
/// assert_eq!(engine.run(&chunk).unwrap(), Value::int(42));
/// ```
pub struct Engine<'arena> {
    type_manager: &'arena TypeManager<'arena>,
    natives: NativeRegistry,
    options: EngineOptions,
}

impl<'arena> Engine<'arena> {
    /// Create an engine with the standard libraries.
    pub fn new(arena: &'arena Bump, options: EngineOptions) -> Self {
        Self::with_natives(arena, options, |_| {})
    }

    /// Create an engine whose registry is extended by `init`.
    ///
    /// The registry starts with the standard libraries; `init` may add
    /// libraries or replace overloads.
    ///
    /// # Example
    ///
    /// ```
    /// use bumpalo::Bump;
    /// use dem_core::api::{Engine, EngineOptions};
    /// use dem_core::stdlib::NativeFunction;
    /// use dem_core::values::Value;
    ///
    /// let arena = Bump::new();
    /// let engine = Engine::with_natives(&arena, EngineOptions::default(), |registry| {
    ///     registry.register(
    ///         "Host",
    ///         "answer",
    ///         NativeFunction::new(&[], "int", |_, _| Ok(Value::int(42))),
    ///     );
    /// });
    /// assert!(engine.natives().lookup("Host", "answer", 0).is_some());
    /// ```
    pub fn with_natives(
        arena: &'arena Bump,
        options: EngineOptions,
        init: impl FnOnce(&mut NativeRegistry),
    ) -> Self {
        let mut natives = DEFAULT_REGISTRY.clone();
        init(&mut natives);
        Self {
            type_manager: TypeManager::new(arena),
            natives,
            options,
        }
    }

    /// Access the type manager.
    ///
    /// Useful for creating types when building programs by hand.
    pub fn type_manager(&self) -> &'arena TypeManager<'arena> {
        self.type_manager
    }

    pub fn natives(&self) -> &NativeRegistry {
        &self.natives
    }

    pub fn natives_mut(&mut self) -> &mut NativeRegistry {
        &mut self.natives
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Compile a program with the engine's default options.
    pub fn compile(&self, program: &Node) -> Result<Chunk<'arena>, Error> {
        self.compile_with(self.options.compile, program)
    }

    pub fn compile_with(
        &self,
        options: CompileOptions,
        program: &Node,
    ) -> Result<Chunk<'arena>, Error> {
        BytecodeCompiler::compile(self.type_manager, &self.natives, options, program)
    }

    /// Run a chunk on a fresh VM, printing to stdout.
    pub fn run(&self, chunk: &Chunk<'arena>) -> Result<Value, Error> {
        Vm::new(chunk, &self.natives, self.options.execution).run()
    }

    /// Run a chunk with explicit limits and output sink.
    pub fn run_with<'c>(
        &'c self,
        chunk: &'c Chunk<'arena>,
        options: ExecutionOptions,
        out: Box<dyn Write + 'c>,
    ) -> Result<Value, Error> {
        Vm::new(chunk, &self.natives, options).with_output(out).run()
    }

    /// Serialize a chunk into an artifact using the engine's method.
    pub fn encode(&self, chunk: &Chunk<'arena>) -> Result<Vec<u8>, Error> {
        artifact::encode(chunk, self.options.compression)
    }

    /// Read an artifact. The stored method wins over the engine's.
    pub fn decode(&self, bytes: &[u8]) -> Result<Chunk<'arena>, Error> {
        artifact::decode(self.type_manager, bytes).map(|(chunk, _)| chunk)
    }

    pub fn save(&self, chunk: &Chunk<'arena>, path: impl AsRef<Path>) -> Result<(), Error> {
        artifact::save(chunk, self.options.compression, path.as_ref())
    }

    pub fn load(&self, path: impl AsRef<Path>) -> Result<Chunk<'arena>, Error> {
        artifact::load(self.type_manager, path.as_ref()).map(|(chunk, _)| chunk)
    }
}
