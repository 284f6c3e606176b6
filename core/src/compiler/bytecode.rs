//! Bytecode compiler implementation.

use std::rc::Rc;

use hashbrown::HashMap;
use tracing::{debug, trace};

use super::{
    CompileError,
    scope::{Capture, FunctionState},
};
use crate::{
    api::CompileOptions,
    ast::{FunctionDecl, Literal, MatchArm, Node, NodeKind, Operator, Span, TypeExpr, Variant},
    errors::{Error, ErrorKind, InternalError, Stage},
    stdlib::NativeRegistry,
    types::{Type, TypeManager},
    values::{FunctionProto, Value},
    vm::{Chunk, Constant, Instruction},
};

type Ty<'t> = &'t Type<'t>;

/// Largest operand reachable with three `WideArg` prefixes.
const MAX_OPERAND: u32 = 0xFF_FFFF;

/// Largest jump distance a two-slot placeholder can encode.
const MAX_JUMP: usize = 0xFFFF;

/// A name resolved against the scopes visible from the current function.
#[derive(Clone, Copy)]
enum Resolved<'t> {
    Local(u16, Ty<'t>),
    Upvalue(u8, Ty<'t>),
    Global(Ty<'t>),
}

impl<'t> Resolved<'t> {
    fn ty(self) -> Ty<'t> {
        match self {
            Resolved::Local(_, ty) | Resolved::Upvalue(_, ty) | Resolved::Global(ty) => ty,
        }
    }
}

/// Single-pass compiler from a Dem tree to a [`Chunk`].
///
/// Every node leaves exactly one value on the operand stack; statements
/// such as `let` leave `null`. Types are resolved while emitting, and the
/// operand stack is tracked per function to size each frame exactly.
///
/// Function bodies are emitted inline, behind a forward jump, so the whole
/// program shares one instruction stream.
pub struct BytecodeCompiler<'c, 't> {
    types: &'t TypeManager<'t>,
    natives: &'c NativeRegistry,

    /// Constant pool, deduplicated on insertion.
    constants: Vec<Constant<'t>>,

    instructions: Vec<Instruction>,

    /// Source map; a new entry is recorded whenever the span changes.
    positions: Vec<(u32, Span)>,

    /// Span of the node being compiled.
    span: Span,

    /// Function being compiled is last; the script is first.
    functions: Vec<FunctionState<'t>>,

    /// Types of the script's top-level bindings.
    globals: HashMap<String, Ty<'t>>,

    /// Declared enums by name, for annotations and `match`.
    enums: HashMap<String, Ty<'t>>,
}

impl<'c, 't> BytecodeCompiler<'c, 't> {
    pub fn new(types: &'t TypeManager<'t>, natives: &'c NativeRegistry) -> Self {
        Self {
            types,
            natives,
            constants: Vec::new(),
            instructions: Vec::new(),
            positions: Vec::new(),
            span: Span::default(),
            functions: vec![FunctionState::script()],
            globals: HashMap::new(),
            enums: HashMap::new(),
        }
    }

    /// Convenience method to compile a program in one call.
    ///
    /// A top-level block is the script body: its bindings become globals.
    pub fn compile(
        types: &'t TypeManager<'t>,
        natives: &'c NativeRegistry,
        options: CompileOptions,
        node: &Node,
    ) -> Result<Chunk<'t>, Error> {
        let optimized;
        let node = if options.optimize {
            optimized = node.clone().optimize();
            &optimized
        } else {
            node
        };

        let mut compiler = Self::new(types, natives);
        compiler.span = node.span.clone();
        let ty = match &node.kind {
            NodeKind::Block(nodes) => compiler.compile_sequence(nodes)?,
            _ => compiler.compile_node(node)?,
        };
        compiler.emit(Instruction::Return);
        compiler.pop_stack();
        debug!(
            result = %ty,
            instructions = compiler.instructions.len(),
            constants = compiler.constants.len(),
            "compiled script"
        );
        compiler.finalize()
    }

    /// Finalize compilation and return the chunk.
    pub fn finalize(self) -> Result<Chunk<'t>, Error> {
        let script = &self.functions[0];
        let num_locals =
            u16::try_from(script.num_locals()).map_err(|_| self.limit(CompileError::TooManyLocals))?;
        let max_stack_size = u16::try_from(script.max_depth())
            .map_err(|_| self.limit(CompileError::StackTooDeep))?;
        Ok(Chunk {
            constants: self.constants,
            instructions: self.instructions,
            positions: self.positions,
            num_locals,
            max_stack_size,
        })
    }

    fn limit(&self, err: CompileError) -> Error {
        err.at(&self.span)
    }

    fn mismatch(&self, detail: String) -> Error {
        Error::type_mismatch(&self.span, detail)
    }

    fn current(&self) -> &FunctionState<'t> {
        // The script state is never popped.
        &self.functions[self.functions.len() - 1]
    }

    fn current_mut(&mut self) -> &mut FunctionState<'t> {
        let last = self.functions.len() - 1;
        &mut self.functions[last]
    }

    // === Stack Management ===

    fn push_stack(&mut self) {
        self.current_mut().push(1);
    }

    fn pop_stack(&mut self) {
        self.current_mut().pop(1);
    }

    fn pop_stack_n(&mut self, n: usize) {
        self.current_mut().pop(n);
    }

    // === Instruction Emission ===

    fn emit(&mut self, instruction: Instruction) {
        let at = self.instructions.len() as u32;
        if self
            .positions
            .last()
            .is_none_or(|(_, span)| *span != self.span)
        {
            self.positions.push((at, self.span.clone()));
        }
        self.instructions.push(instruction);
    }

    /// Emits `make(arg)`, preceded by `WideArg` prefixes when the operand
    /// does not fit a byte.
    fn emit_arg(&mut self, make: fn(u8) -> Instruction, arg: u32) {
        debug_assert!(arg <= MAX_OPERAND, "operand {arg} out of range");
        let [_, b2, b1, b0] = arg.to_be_bytes();
        if b2 > 0 {
            self.emit(Instruction::WideArg(b2));
        }
        if b2 > 0 || b1 > 0 {
            self.emit(Instruction::WideArg(b1));
        }
        self.emit(make(b0));
    }

    fn emit_int(&mut self, value: i32) -> Result<(), Error> {
        match i8::try_from(value) {
            Ok(small) => self.emit(Instruction::ConstInt(small)),
            Err(_) => {
                let index = self.add_constant(Constant::Value(Value::int(value)))?;
                self.emit_arg(Instruction::ConstLoad, index);
            }
        }
        self.push_stack();
        Ok(())
    }

    fn emit_null(&mut self) -> Ty<'t> {
        self.emit(Instruction::ConstNull);
        self.push_stack();
        self.types.null()
    }

    fn emit_load(&mut self, name: &str, target: Resolved<'t>) -> Result<(), Error> {
        match target {
            Resolved::Local(slot, _) => self.emit_arg(Instruction::LoadLocal, slot.into()),
            Resolved::Upvalue(index, _) => self.emit(Instruction::LoadUpvalue(index)),
            Resolved::Global(_) => {
                let index = self.name_constant(name)?;
                self.emit_arg(Instruction::LoadGlobal, index);
            }
        }
        self.push_stack();
        Ok(())
    }

    fn emit_store(&mut self, name: &str, target: Resolved<'t>) -> Result<(), Error> {
        match target {
            Resolved::Local(slot, _) => self.emit_arg(Instruction::StoreLocal, slot.into()),
            Resolved::Upvalue(index, _) => self.emit(Instruction::StoreUpvalue(index)),
            Resolved::Global(_) => {
                let index = self.name_constant(name)?;
                self.emit_arg(Instruction::StoreGlobal, index);
            }
        }
        self.pop_stack();
        Ok(())
    }

    // === Variables ===

    fn at_global_scope(&self) -> bool {
        self.functions.len() == 1 && self.current().scope_depth() == 1
    }

    /// Binds the value on top of the stack to `name` in the current scope.
    fn define(&mut self, name: &str, ty: Ty<'t>) -> Result<(), Error> {
        if self.at_global_scope() {
            self.globals.insert(name.to_string(), ty);
            self.emit_store(name, Resolved::Global(ty))
        } else {
            let slot = self
                .current_mut()
                .declare(name, ty)
                .map_err(|err| err.at(&self.span))?;
            self.emit_store(name, Resolved::Local(slot, ty))
        }
    }

    /// Locals first, then the function itself, then captures from enclosing
    /// functions, then globals.
    fn resolve(&mut self, name: &str) -> Result<Resolved<'t>, Error> {
        let level = self.functions.len() - 1;
        if let Some((slot, ty)) = self.current().lookup(name) {
            return Ok(Resolved::Local(slot, ty));
        }
        if let Some(ty) = self.current().self_type(name) {
            return Ok(Resolved::Local(0, ty));
        }
        if let Some((index, ty)) = self
            .resolve_upvalue(level, name)
            .map_err(|err| err.at(&self.span))?
        {
            return Ok(Resolved::Upvalue(index, ty));
        }
        if let Some(&ty) = self.globals.get(name) {
            return Ok(Resolved::Global(ty));
        }
        Err(Error::compiler(
            ErrorKind::Undefined,
            &self.span,
            format!("`{name}` is not defined"),
        ))
    }

    /// Captures `name` into the function at `level`, threading it through
    /// every function in between.
    fn resolve_upvalue(
        &mut self,
        level: usize,
        name: &str,
    ) -> Result<Option<(u8, Ty<'t>)>, CompileError> {
        if level == 0 {
            return Ok(None);
        }
        if let Some(found) = self.functions[level].upvalue(name) {
            return Ok(Some(found));
        }
        let parent = &self.functions[level - 1];
        let (capture, ty) = if let Some((slot, ty)) = parent.lookup(name) {
            (Capture::Local(slot), ty)
        } else if let Some(ty) = parent.self_type(name) {
            (Capture::Local(0), ty)
        } else if let Some((index, ty)) = self.resolve_upvalue(level - 1, name)? {
            (Capture::Upvalue(index), ty)
        } else {
            return Ok(None);
        };
        trace!(name, level, ?capture, "captured");
        let index = self.functions[level].add_upvalue(name, capture, ty)?;
        Ok(Some((index, ty)))
    }

    // === Type Annotations ===

    fn resolve_type(&self, expr: &TypeExpr) -> Result<Ty<'t>, Error> {
        self.resolve_type_with(expr, &[])
    }

    /// Builtin names, then generic parameters in scope, then enums.
    fn resolve_type_with(&self, expr: &TypeExpr, generics: &[String]) -> Result<Ty<'t>, Error> {
        match expr {
            TypeExpr::Named(name) => {
                if let Some(ty) = self.types.builtin(name) {
                    return Ok(ty);
                }
                let in_scope = generics.iter().any(|g| g == name)
                    || self
                        .functions
                        .iter()
                        .any(|f| f.generics.iter().any(|g| g == name));
                if in_scope {
                    return Ok(self.types.generic(name));
                }
                if self.enums.contains_key(name) {
                    return Ok(self.types.object(name));
                }
                Err(Error::compiler(
                    ErrorKind::Undefined,
                    &self.span,
                    format!("unknown type `{name}`"),
                ))
            }
            TypeExpr::Function { params, ret } => {
                let params = params
                    .iter()
                    .map(|p| self.resolve_type_with(p, generics))
                    .collect::<Result<Vec<_>, _>>()?;
                let ret = self.resolve_type_with(ret, generics)?;
                Ok(self.types.function(&params, ret))
            }
        }
    }

    // === Constant Pool Management ===

    fn add_constant(&mut self, constant: Constant<'t>) -> Result<u32, Error> {
        let index = match self.constants.iter().position(|c| *c == constant) {
            Some(index) => index,
            None => {
                self.constants.push(constant);
                self.constants.len() - 1
            }
        };
        u32::try_from(index)
            .ok()
            .filter(|i| *i <= MAX_OPERAND)
            .ok_or_else(|| self.limit(CompileError::TooManyConstants))
    }

    fn name_constant(&mut self, name: &str) -> Result<u32, Error> {
        self.add_constant(Constant::Value(Value::str(name)))
    }

    // === Jump Patching Infrastructure ===

    /// Reserve two slots for a forward jump and return the first one's index.
    ///
    /// Two slots leave room for a `WideArg` prefix, giving a 16-bit range.
    fn jump_placeholder(&mut self) -> usize {
        let placeholder_index = self.label();
        self.emit(Instruction::Nop);
        self.emit(Instruction::Nop);
        placeholder_index
    }

    fn label(&self) -> usize {
        self.instructions.len()
    }

    fn patch_jump(
        &mut self,
        placeholder_index: usize,
        target_label: usize,
        make_jump: fn(u8) -> Instruction,
    ) -> Result<(), Error> {
        // The jump sits in the second slot; offsets count from the
        // instruction after it.
        let offset = target_label - (placeholder_index + 2);
        if offset > MAX_JUMP {
            return Err(self.limit(CompileError::JumpTooFar));
        }
        let [high, low] = (offset as u16).to_be_bytes();
        self.instructions[placeholder_index] = if high > 0 {
            Instruction::WideArg(high)
        } else {
            Instruction::Nop
        };
        self.instructions[placeholder_index + 1] = make_jump(low);
        Ok(())
    }

    /// Emits a backward jump to `loop_start`.
    fn emit_loop(&mut self, loop_start: usize) -> Result<(), Error> {
        let mut offset = self.label() + 1 - loop_start;
        if offset > u8::MAX as usize {
            // The prefix pushes the jump one slot further away.
            offset += 1;
        }
        if offset > MAX_JUMP {
            return Err(self.limit(CompileError::JumpTooFar));
        }
        let [high, low] = (offset as u16).to_be_bytes();
        if high > 0 {
            self.emit(Instruction::WideArg(high));
        }
        self.emit(Instruction::JumpBackward(low));
        Ok(())
    }

    // === Nodes ===

    fn compile_node(&mut self, node: &Node) -> Result<Ty<'t>, Error> {
        let outer = core::mem::replace(&mut self.span, node.span.clone());
        let result = self.compile_kind(&node.kind);
        self.span = outer;
        result
    }

    fn compile_kind(&mut self, kind: &NodeKind) -> Result<Ty<'t>, Error> {
        let types = self.types;
        match kind {
            NodeKind::Literal(literal) => self.compile_literal(literal),

            NodeKind::Variable(name) => {
                let target = self.resolve(name)?;
                self.emit_load(name, target)?;
                Ok(target.ty())
            }

            NodeKind::Let { name, ty, value } => {
                let value_ty = self.compile_node(value)?;
                let binding_ty = match ty {
                    Some(annotation) => {
                        let declared = self.resolve_type(annotation)?;
                        if !value_ty.is_assignable_to(declared) {
                            return Err(self.mismatch(format!(
                                "cannot bind {value_ty} to `{name}` of type {declared}"
                            )));
                        }
                        declared
                    }
                    None => value_ty,
                };
                self.define(name, binding_ty)?;
                Ok(self.emit_null())
            }

            NodeKind::Assign { name, value } => {
                let target = self.resolve(name)?;
                let value_ty = self.compile_node(value)?;
                if !value_ty.is_assignable_to(target.ty()) {
                    return Err(self.mismatch(format!(
                        "cannot assign {value_ty} to `{name}` of type {}",
                        target.ty()
                    )));
                }
                self.emit(Instruction::DupN(0));
                self.push_stack();
                self.emit_store(name, target)?;
                Ok(value_ty)
            }

            NodeKind::Binary { op, left, right } if op.is_logical() => {
                // Short-circuit: the left value stays as the result when it
                // decides the outcome.
                let left_ty = self.compile_node(left)?;
                let skip = self.jump_placeholder();
                self.pop_stack();
                let right_ty = self.compile_node(right)?;
                let ty = left_ty.operation(*op, right_ty, types).ok_or_else(|| {
                    self.mismatch(format!(
                        "cannot apply `{}` to {left_ty} and {right_ty}",
                        op.symbol()
                    ))
                })?;
                let end = self.label();
                let jump = if *op == Operator::And {
                    Instruction::JumpIfFalseOrPop
                } else {
                    Instruction::JumpIfTrueOrPop
                };
                self.patch_jump(skip, end, jump)?;
                Ok(ty)
            }

            NodeKind::Binary { op, left, right } => {
                let left_ty = self.compile_node(left)?;
                let right_ty = self.compile_node(right)?;
                self.binary(*op, left_ty, right_ty)
            }

            NodeKind::Index { target, index } => {
                let target_ty = self.compile_node(target)?;
                let index_ty = self.compile_node(index)?;
                self.binary(Operator::Index, target_ty, index_ty)
            }

            NodeKind::Unary { op, operand } => {
                let operand_ty = self.compile_node(operand)?;
                let ty = operand_ty.unary(*op, types).ok_or_else(|| {
                    self.mismatch(format!("cannot apply `{}` to {operand_ty}", op.symbol()))
                })?;
                self.emit(Instruction::UnOp(*op));
                Ok(ty)
            }

            NodeKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                let cond_ty = self.compile_node(cond)?;
                self.expect_condition(cond_ty)?;
                let else_jump = self.jump_placeholder();
                self.pop_stack();

                // Only one branch runs, so both start from the same depth.
                let depth_before_branches = self.current().depth();
                let then_ty = self.compile_node(then_branch)?;
                let end_jump = self.jump_placeholder();

                let else_label = self.label();
                self.patch_jump(else_jump, else_label, Instruction::PopJumpIfFalse)?;
                self.current_mut().set_depth(depth_before_branches);
                let else_ty = match else_branch {
                    Some(branch) => self.compile_node(branch)?,
                    None => self.emit_null(),
                };

                let end_label = self.label();
                self.patch_jump(end_jump, end_label, Instruction::JumpForward)?;
                self.current_mut().set_depth(depth_before_branches + 1);
                Ok(then_ty.join(else_ty, types))
            }

            NodeKind::While { cond, body } => {
                let loop_start = self.label();
                let cond_ty = self.compile_node(cond)?;
                self.expect_condition(cond_ty)?;
                let exit_jump = self.jump_placeholder();
                self.pop_stack();

                self.compile_node(body)?;
                self.emit(Instruction::Pop);
                self.pop_stack();
                self.emit_loop(loop_start)?;

                let exit_label = self.label();
                self.patch_jump(exit_jump, exit_label, Instruction::PopJumpIfFalse)?;
                Ok(self.emit_null())
            }

            NodeKind::Block(nodes) => {
                self.current_mut().push_scope();
                let result = self.compile_sequence(nodes);
                self.current_mut().pop_scope();
                result
            }

            NodeKind::Function(decl) => self.compile_function(decl),

            NodeKind::Call {
                callee,
                generics,
                args,
            } => {
                let callee_ty = self.compile_node(callee)?;
                let mut arg_tys = Vec::with_capacity(args.len());
                for arg in args {
                    arg_tys.push(self.compile_node(arg)?);
                }
                let generic_tys = generics
                    .iter()
                    .map(|g| self.resolve_type(g))
                    .collect::<Result<Vec<_>, _>>()?;
                let ty = callee_ty
                    .call(&arg_tys, &generic_tys, types)
                    .ok_or_else(|| {
                        self.mismatch(format!(
                            "cannot call {callee_ty} with ({})",
                            type_list(&arg_tys)
                        ))
                    })?;
                let argc = u32::try_from(args.len())
                    .ok()
                    .filter(|n| *n <= MAX_OPERAND)
                    .ok_or_else(|| self.limit(CompileError::TooManyOperands))?;
                self.emit_arg(Instruction::Call, argc);
                self.pop_stack_n(args.len() + 1);
                self.push_stack();
                Ok(ty)
            }

            NodeKind::Return(value) => {
                let ty = match value {
                    Some(value) => self.compile_node(value)?,
                    None => self.emit_null(),
                };
                if let Some(ret) = self.current().ret
                    && *ret != Type::Null
                    && !ty.is_assignable_to(ret)
                {
                    return Err(self.mismatch(format!("cannot return {ty} from a function returning {ret}")));
                }
                self.emit(Instruction::Return);
                // Control never falls through, but the node still counts as
                // one value for the enclosing expression.
                Ok(types.any())
            }

            NodeKind::List(items) => {
                for item in items {
                    self.compile_node(item)?;
                }
                let count = self.operand_count(items.len())?;
                self.emit_arg(Instruction::MakeList, count);
                self.pop_stack_n(items.len());
                self.push_stack();
                Ok(types.list())
            }

            NodeKind::Map(entries) => {
                for (key, value) in entries {
                    let key_ty = self.compile_node(key)?;
                    if !is_hashable(key_ty) {
                        return Err(Error::type_mismatch(
                            &key.span,
                            format!("{key_ty} cannot be used as a map key"),
                        ));
                    }
                    self.compile_node(value)?;
                }
                let count = self.operand_count(entries.len())?;
                self.emit_arg(Instruction::MakeMap, count);
                self.pop_stack_n(entries.len() * 2);
                self.push_stack();
                Ok(types.map())
            }

            NodeKind::SetIndex {
                target,
                index,
                value,
            } => {
                let target_ty = self.compile_node(target)?;
                let index_ty = self.compile_node(index)?;
                let value_ty = self.compile_node(value)?;
                let assignable = match target_ty {
                    Type::List => index_ty.is_integral() || index_ty.is_dynamic(),
                    Type::Map => is_hashable(index_ty),
                    other => other.is_dynamic(),
                };
                if !assignable {
                    return Err(self.mismatch(format!(
                        "cannot assign into {target_ty} at {index_ty}"
                    )));
                }
                self.emit(Instruction::StoreIndex);
                self.pop_stack_n(3);
                self.push_stack();
                Ok(value_ty)
            }

            NodeKind::Access { target, name } => {
                let target_ty = self.compile_node(target)?;
                let ty = target_ty.access(name, types).ok_or_else(|| {
                    self.mismatch(format!("{target_ty} has no member `{name}`"))
                })?;
                let index = self.name_constant(name)?;
                self.emit_arg(Instruction::GetField, index);
                Ok(ty)
            }

            NodeKind::NativeCall {
                library,
                method,
                args,
            } => self.compile_native(library, method, args),

            NodeKind::Enum { name, variants } => self.compile_enum(name, variants),

            NodeKind::Match {
                subject,
                arms,
                default,
            } => self.compile_match(subject, arms, default.as_deref()),
        }
    }

    fn compile_literal(&mut self, literal: &Literal) -> Result<Ty<'t>, Error> {
        let types = self.types;
        let (value, ty) = match literal {
            Literal::Null => return Ok(self.emit_null()),
            Literal::Bool(b) => {
                self.emit(Instruction::ConstBool(*b as u8));
                self.push_stack();
                return Ok(types.bool());
            }
            Literal::Int(i) => {
                self.emit_int(*i)?;
                return Ok(types.int());
            }
            Literal::Byte(b) => (Value::byte(*b), types.byte()),
            Literal::Short(s) => (Value::short(*s), types.short()),
            Literal::Long(l) => (Value::long(*l), types.long()),
            Literal::Float(f) => (Value::float(*f), types.float()),
            Literal::Double(d) => (Value::double(*d), types.double()),
            Literal::Str(s) => (Value::str(s), types.str()),
            Literal::Bytes(b) => (Value::bytes(b), types.bytes()),
        };
        let index = self.add_constant(Constant::Value(value))?;
        self.emit_arg(Instruction::ConstLoad, index);
        self.push_stack();
        Ok(ty)
    }

    fn binary(&mut self, op: Operator, left: Ty<'t>, right: Ty<'t>) -> Result<Ty<'t>, Error> {
        let ty = left.operation(op, right, self.types).ok_or_else(|| {
            self.mismatch(format!(
                "cannot apply `{}` to {left} and {right}",
                op.symbol()
            ))
        })?;
        if op.is_equality() || op.is_ordering() {
            self.emit(Instruction::CmpOp(op));
        } else {
            self.emit(Instruction::BinOp(op));
        }
        self.pop_stack_n(2);
        self.push_stack();
        Ok(ty)
    }

    fn compile_sequence(&mut self, nodes: &[Node]) -> Result<Ty<'t>, Error> {
        let Some((last, init)) = nodes.split_last() else {
            return Ok(self.emit_null());
        };
        for node in init {
            self.compile_node(node)?;
            self.emit(Instruction::Pop);
            self.pop_stack();
        }
        self.compile_node(last)
    }

    fn expect_condition(&self, ty: Ty<'t>) -> Result<(), Error> {
        if *ty == Type::Bool || ty.is_dynamic() {
            Ok(())
        } else {
            Err(self.mismatch(format!("condition must be bool, found {ty}")))
        }
    }

    fn operand_count(&self, n: usize) -> Result<u32, Error> {
        u32::try_from(n)
            .ok()
            .filter(|n| *n <= MAX_OPERAND)
            .ok_or_else(|| self.limit(CompileError::TooManyOperands))
    }

    // === Functions ===

    fn compile_function(&mut self, decl: &FunctionDecl) -> Result<Ty<'t>, Error> {
        let types = self.types;
        let arity =
            u8::try_from(decl.params.len()).map_err(|_| self.limit(CompileError::TooManyOperands))?;
        let mut params = Vec::with_capacity(decl.params.len());
        for param in &decl.params {
            params.push((
                param.name.clone(),
                self.resolve_type_with(&param.ty, &decl.generics)?,
            ));
        }
        let ret = self.resolve_type_with(&decl.ret, &decl.generics)?;
        let param_tys: Vec<Ty<'t>> = params.iter().map(|(_, ty)| *ty).collect();
        let fn_ty = types.generic_function(&decl.generics, &param_tys, ret);

        // Top-level functions may call themselves and earlier functions
        // through globals.
        if let Some(name) = &decl.name
            && self.at_global_scope()
        {
            self.globals.insert(name.clone(), fn_ty);
        }

        let skip = self.jump_placeholder();
        let entry = self.label();
        let state = FunctionState::function(
            decl.name.clone(),
            fn_ty,
            decl.generics.clone(),
            ret,
            params,
        )
        .map_err(|err| err.at(&self.span))?;
        self.functions.push(state);
        let body = self.compile_body(&decl.body, ret);
        let state = self.functions.pop().ok_or_else(|| {
            Error::internal(
                Stage::Compiler,
                InternalError::Message("function state stack is empty".to_string()),
            )
        })?;
        body?;
        let after = self.label();
        self.patch_jump(skip, after, Instruction::JumpForward)?;

        let proto = FunctionProto {
            name: Rc::from(decl.name.as_deref().unwrap_or("<anonymous>")),
            arity,
            upvalue_count: state.upvalues.len() as u8,
            num_locals: u16::try_from(state.num_locals())
                .map_err(|_| self.limit(CompileError::TooManyLocals))?,
            max_stack: u16::try_from(state.max_depth())
                .map_err(|_| self.limit(CompileError::StackTooDeep))?,
            entry: entry as u32,
        };
        debug!(
            name = %proto.name,
            arity,
            upvalues = proto.upvalue_count,
            locals = proto.num_locals,
            max_stack = proto.max_stack,
            "compiled function"
        );

        for upvalue in &state.upvalues {
            match upvalue.capture {
                Capture::Local(slot) => self.emit_arg(Instruction::LoadLocal, slot.into()),
                Capture::Upvalue(index) => self.emit(Instruction::LoadUpvalue(index)),
            }
            self.push_stack();
        }
        let index = self.add_constant(Constant::Function(Rc::new(proto)))?;
        self.emit_arg(Instruction::MakeClosure, index);
        self.pop_stack_n(state.upvalues.len());
        self.push_stack();

        match &decl.name {
            Some(name) => {
                self.define(name, fn_ty)?;
                Ok(self.emit_null())
            }
            None => Ok(fn_ty),
        }
    }

    /// The body's value is the implicit return value.
    fn compile_body(&mut self, body: &Node, ret: Ty<'t>) -> Result<(), Error> {
        let body_ty = self.compile_node(body)?;
        if *ret == Type::Null {
            self.emit(Instruction::Pop);
            self.pop_stack();
            self.emit_null();
        } else if !body_ty.is_assignable_to(ret) {
            return Err(Error::type_mismatch(
                &body.span,
                format!("function body produces {body_ty}, expected {ret}"),
            ));
        }
        self.emit(Instruction::Return);
        self.pop_stack();
        Ok(())
    }

    // === Natives ===

    fn compile_native(
        &mut self,
        library: &str,
        method: &str,
        args: &[Node],
    ) -> Result<Ty<'t>, Error> {
        let types = self.types;
        let native = self
            .natives
            .lookup(library, method, args.len())
            .copied()
            .ok_or_else(|| {
                Error::compiler(
                    ErrorKind::Undefined,
                    &self.span,
                    format!(
                        "no native {library}.{method} taking {} argument(s)",
                        args.len()
                    ),
                )
            })?;
        let arity =
            u8::try_from(args.len()).map_err(|_| self.limit(CompileError::TooManyOperands))?;

        for (arg, param) in args.iter().zip(native.ty.params) {
            let arg_ty = self.compile_node(arg)?;
            let param_ty = types.builtin(param).unwrap_or_else(|| types.any());
            if !arg_ty.is_assignable_to(param_ty) {
                return Err(Error::type_mismatch(
                    &arg.span,
                    format!("{library}.{method} expects {param_ty}, found {arg_ty}"),
                ));
            }
        }

        let index = self.add_constant(Constant::Native {
            library: Rc::from(library),
            method: Rc::from(method),
            arity,
        })?;
        self.emit_arg(Instruction::CallNative, index);
        self.pop_stack_n(args.len());
        self.push_stack();
        Ok(types.builtin(native.ty.ret).unwrap_or_else(|| types.any()))
    }

    // === Enums ===

    fn compile_enum(&mut self, name: &str, variants: &[Variant]) -> Result<Ty<'t>, Error> {
        for (i, variant) in variants.iter().enumerate() {
            if variants[..i].iter().any(|v| v.name == variant.name) {
                return Err(self.mismatch(format!(
                    "variant `{}` declared twice in enum {name}",
                    variant.name
                )));
            }
        }
        let declared: Vec<(&str, Vec<&str>)> = variants
            .iter()
            .map(|v| {
                (
                    v.name.as_str(),
                    v.properties.iter().map(String::as_str).collect(),
                )
            })
            .collect();
        let ty = self.types.enum_type(name, &declared);
        self.enums.insert(name.to_string(), ty);

        let index = self.add_constant(Constant::Type(ty))?;
        self.emit_arg(Instruction::MakeEnum, index);
        self.push_stack();
        self.define(name, ty)?;
        Ok(self.emit_null())
    }

    /// The subject goes to a hidden slot; each arm compares its `$child`
    /// ordinal and binds the variant's properties positionally.
    fn compile_match(
        &mut self,
        subject: &Node,
        arms: &[MatchArm],
        default: Option<&Node>,
    ) -> Result<Ty<'t>, Error> {
        let types = self.types;
        let subject_ty = self.compile_node(subject)?;
        let enum_ty = match subject_ty {
            Type::Object(name) => self.enums.get(*name).copied(),
            _ => None,
        };
        let Some(Type::Enum { children, .. }) = enum_ty else {
            return Err(self.mismatch(format!(
                "cannot match on {subject_ty}, expected an enum instance"
            )));
        };
        let children: &'t [Ty<'t>] = children;

        self.current_mut().push_scope();
        let subject_slot = self
            .current_mut()
            .declare("$match", subject_ty)
            .map_err(|err| err.at(&self.span))?;
        self.emit_arg(Instruction::StoreLocal, subject_slot.into());
        self.pop_stack();

        let child_field = self.name_constant("$child")?;
        let depth = self.current().depth();
        let mut end_jumps = Vec::with_capacity(arms.len());
        let mut result: Option<Ty<'t>> = None;

        for arm in arms {
            let Some((ordinal, properties)) = variant(children, &arm.variant) else {
                return Err(Error::compiler(
                    ErrorKind::Undefined,
                    &self.span,
                    format!("{subject_ty} has no variant `{}`", arm.variant),
                ));
            };
            if arm.bindings.len() > properties.len() {
                return Err(self.mismatch(format!(
                    "variant `{}` has {} properties, {} bound",
                    arm.variant,
                    properties.len(),
                    arm.bindings.len()
                )));
            }

            self.current_mut().set_depth(depth);
            self.emit_arg(Instruction::LoadLocal, subject_slot.into());
            self.push_stack();
            self.emit_arg(Instruction::GetField, child_field);
            self.emit_int(i32::try_from(ordinal).unwrap_or(i32::MAX))?;
            self.emit(Instruction::CmpOp(Operator::Eq));
            self.pop_stack();
            let next_arm = self.jump_placeholder();
            self.pop_stack();

            self.current_mut().push_scope();
            for (binding, property) in arm.bindings.iter().zip(properties) {
                self.emit_arg(Instruction::LoadLocal, subject_slot.into());
                self.push_stack();
                let field = self.name_constant(property)?;
                self.emit_arg(Instruction::GetField, field);
                let slot = self
                    .current_mut()
                    .declare(binding, types.any())
                    .map_err(|err| err.at(&self.span))?;
                self.emit_arg(Instruction::StoreLocal, slot.into());
                self.pop_stack();
            }
            let arm_ty = self.compile_node(&arm.body)?;
            self.current_mut().pop_scope();

            end_jumps.push(self.jump_placeholder());
            let next_label = self.label();
            self.patch_jump(next_arm, next_label, Instruction::PopJumpIfFalse)?;
            result = Some(match result {
                Some(ty) => ty.join(arm_ty, types),
                None => arm_ty,
            });
        }

        self.current_mut().set_depth(depth);
        let default_ty = match default {
            Some(node) => self.compile_node(node)?,
            None => self.emit_null(),
        };
        let end_label = self.label();
        for jump in end_jumps {
            self.patch_jump(jump, end_label, Instruction::JumpForward)?;
        }
        self.current_mut().set_depth(depth + 1);
        self.current_mut().pop_scope();

        let exhaustive = children.iter().all(|child| {
            matches!(child, Type::EnumChild { name, .. } if arms.iter().any(|arm| arm.variant == *name))
        });
        Ok(match result {
            Some(ty) if exhaustive && default.is_none() => ty,
            Some(ty) => ty.join(default_ty, types),
            None => default_ty,
        })
    }
}

fn variant<'t>(children: &'t [Ty<'t>], name: &str) -> Option<(u32, &'t [&'t str])> {
    children.iter().find_map(|child| match child {
        Type::EnumChild {
            name: child_name,
            ordinal,
            properties,
            ..
        } if *child_name == name => Some((*ordinal, *properties)),
        _ => None,
    })
}

fn is_hashable(ty: &Type<'_>) -> bool {
    !matches!(
        ty,
        Type::List
            | Type::Map
            | Type::Function { .. }
            | Type::Object(_)
            | Type::Enum { .. }
            | Type::EnumChild { .. }
    )
}

fn type_list(tys: &[Ty<'_>]) -> String {
    tys.iter()
        .map(|ty| ty.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
