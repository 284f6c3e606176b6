use std::{io::Write, rc::Rc};

use hashbrown::HashMap;
use tracing::{debug, trace};

use super::{Chunk, Constant, Instruction, Stack};
use crate::{
    api::ExecutionOptions,
    errors::{Error, ErrorKind, InternalError, Stage},
    memo::MemoCache,
    stdlib::{NativeRegistry, memory::Heap},
    types::Type,
    values::{Closure, FunctionProto, LanguageEnum, OpError, Value, ops},
};

struct CallFrame {
    /// `None` for the script frame.
    closure: Option<Rc<Closure>>,
    return_ip: usize,
    /// Stack index of slot 0 (the callee).
    base: usize,
}

enum Flow {
    Continue,
    Wide(usize),
    Return(Value),
}

fn internal(message: impl Into<String>) -> Error {
    Error::internal(Stage::VirtualMachine, InternalError::Message(message.into()))
}

fn stack_underflow() -> Error {
    internal("value stack underflow")
}

/// Stack-based interpreter for one [`Chunk`].
///
/// Each frame's slots live on the value stack: slot 0 holds the callee, then
/// the parameters, then the locals. Operands are pushed above them.
pub struct Vm<'c, 't> {
    chunk: &'c Chunk<'t>,
    natives: &'c NativeRegistry,
    options: ExecutionOptions,
    stack: Stack<Value>,
    frames: Vec<CallFrame>,
    globals: HashMap<Rc<str>, Value>,
    memo: MemoCache,
    heap: Heap,
    /// Keeps enum descriptors alive for their children's back-references.
    enums: Vec<Rc<LanguageEnum>>,
    out: Box<dyn Write + 'c>,
    ip: usize,
}

impl<'c, 't> Vm<'c, 't> {
    pub fn new(chunk: &'c Chunk<'t>, natives: &'c NativeRegistry, options: ExecutionOptions) -> Self {
        Vm {
            chunk,
            natives,
            options,
            stack: Stack::new(options.max_stack_size),
            frames: Vec::new(),
            globals: HashMap::new(),
            memo: MemoCache::new(),
            heap: Heap::new(),
            enums: Vec::new(),
            out: Box::new(std::io::stdout()),
            ip: 0,
        }
    }

    /// Redirects `System.print` output.
    pub fn with_output(mut self, out: Box<dyn Write + 'c>) -> Self {
        self.out = out;
        self
    }

    /// Runs the script from its first instruction and returns the value of
    /// its last expression.
    pub fn run(&mut self) -> Result<Value, Error> {
        self.stack.truncate(0);
        self.frames.clear();
        self.globals.clear();

        let needed = 1 + self.chunk.num_locals as usize + self.chunk.max_stack_size as usize;
        if needed > self.stack.capacity() {
            return Err(Error::runtime(
                ErrorKind::ResourceExceeded,
                format!(
                    "script needs {needed} stack slots, limit is {}",
                    self.stack.capacity()
                ),
            ));
        }
        debug!(
            instructions = self.chunk.instructions.len(),
            constants = self.chunk.constants.len(),
            "starting run"
        );

        self.push(Value::Null)?;
        self.push_n(Value::Null, self.chunk.num_locals as usize)?;
        self.frames.push(CallFrame {
            closure: None,
            return_ip: self.chunk.instructions.len(),
            base: 0,
        });
        self.ip = 0;
        let result = self.execute(0);
        let _ = self.out.flush();
        result
    }

    /// Calls a closure or enum variant from host code, typically a native
    /// that takes a callback.
    pub fn call_value(&mut self, callee: &Value, args: &[Value]) -> Result<Value, Error> {
        match callee {
            Value::Closure(closure) => {
                if self.stack.len() + 1 + args.len() > self.stack.capacity() {
                    return Err(self.stack_exhausted());
                }
                let base = self.stack.len();
                let depth = self.frames.len();
                let saved_ip = self.ip;
                self.push(callee.clone())?;
                for arg in args {
                    self.push(arg.clone())?;
                }
                let result = self
                    .enter(closure.clone(), base, args.len())
                    .and_then(|()| self.execute(depth));
                if result.is_err() {
                    self.frames.truncate(depth);
                    self.stack.truncate(base);
                }
                self.ip = saved_ip;
                result
            }
            Value::EnumChild(child) => Ok(Value::Instance(child.create(args)?)),
            other => Err(OpError::NotCallable(other.type_name()).into()),
        }
    }

    pub fn global(&self, name: &str) -> Option<&Value> {
        self.globals.get(name)
    }

    pub fn memo(&self) -> &MemoCache {
        &self.memo
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn heap_mut(&mut self) -> &mut Heap {
        &mut self.heap
    }

    pub fn output(&mut self) -> &mut dyn Write {
        self.out.as_mut()
    }

    /// Current call depth, the script frame included.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    fn execute(&mut self, stop_depth: usize) -> Result<Value, Error> {
        let mut wide_arg: usize = 0;
        loop {
            let addr = self.ip;
            let Some(&instruction) = self.chunk.instructions.get(addr) else {
                return Err(internal(format!("instruction pointer {addr} out of range")));
            };
            self.ip += 1;

            match self.step(instruction, wide_arg, stop_depth) {
                Ok(Flow::Continue) => wide_arg = 0,
                Ok(Flow::Wide(wide)) => wide_arg = wide,
                Ok(Flow::Return(value)) => return Ok(value),
                Err(err) => return Err(self.locate(err, addr)),
            }
        }
    }

    fn locate(&self, err: Error, addr: usize) -> Error {
        if err.span.is_some() {
            return err;
        }
        match self.chunk.span_at(addr) {
            Some(span) => err.with_span(span),
            None => err,
        }
    }

    fn step(
        &mut self,
        instruction: Instruction,
        wide_arg: usize,
        stop_depth: usize,
    ) -> Result<Flow, Error> {
        use Instruction::*;
        let arg = |a: u8| wide_arg | a as usize;

        match instruction {
            Halt => return Ok(Flow::Return(self.stack.pop().unwrap_or_default())),
            ConstLoad(a) => {
                let value = self.constant_value(arg(a))?;
                self.push(value)?;
            }
            ConstInt(v) => self.push(Value::int(v as i32))?,
            ConstBool(a) => self.push(Value::Bool(a != 0))?,
            WideArg(a) => return Ok(Flow::Wide(arg(a) << 8)),
            ConstNull => self.push(Value::Null)?,
            DupN(depth) => {
                let value = self
                    .stack
                    .peek_at(depth as usize)
                    .cloned()
                    .ok_or_else(stack_underflow)?;
                self.push(value)?;
            }
            Pop => {
                self.pop()?;
            }
            Swap => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.push(b)?;
                self.push(a)?;
            }
            LoadLocal(a) => {
                let slot = self.slot_index(arg(a));
                let value = self.stack.get(slot).cloned().ok_or_else(stack_underflow)?;
                self.push(value)?;
            }
            StoreLocal(a) => {
                let value = self.pop()?;
                let slot = self.slot_index(arg(a));
                *self.stack.get_mut(slot).ok_or_else(stack_underflow)? = value;
            }
            LoadUpvalue(a) => {
                let value = self
                    .current_closure()?
                    .upvalue(arg(a))
                    .ok_or_else(|| internal(format!("no upvalue {}", arg(a))))?;
                self.push(value)?;
            }
            StoreUpvalue(a) => {
                let value = self.pop()?;
                if !self.current_closure()?.set_upvalue(arg(a), value) {
                    return Err(internal(format!("no upvalue {}", arg(a))));
                }
            }
            LoadGlobal(a) => {
                let name = self.constant_name(arg(a))?;
                let value = self.globals.get(name).cloned().ok_or_else(|| {
                    Error::runtime(ErrorKind::Undefined, format!("`{name}` is not defined"))
                })?;
                self.push(value)?;
            }
            StoreGlobal(a) => {
                let name = self.constant_name(arg(a))?;
                let value = self.pop()?;
                self.globals.insert(Rc::from(name), value);
            }
            BinOp(op) | CmpOp(op) => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.push(ops::binary(op, &a, &b)?)?;
            }
            UnOp(op) => {
                let a = self.pop()?;
                self.push(ops::unary(op, &a)?)?;
            }
            JumpForward(a) => self.ip += arg(a),
            JumpBackward(a) => {
                self.ip = self
                    .ip
                    .checked_sub(arg(a))
                    .ok_or_else(|| internal("jump before start of code"))?;
            }
            PopJumpIfFalse(a) => {
                if !self.pop_condition()? {
                    self.ip += arg(a);
                }
            }
            PopJumpIfTrue(a) => {
                if self.pop_condition()? {
                    self.ip += arg(a);
                }
            }
            JumpIfFalseOrPop(a) => {
                if self.peek_condition()? {
                    self.pop()?;
                } else {
                    self.ip += arg(a);
                }
            }
            JumpIfTrueOrPop(a) => {
                if self.peek_condition()? {
                    self.ip += arg(a);
                } else {
                    self.pop()?;
                }
            }
            Return => {
                let result = self.pop()?;
                let frame = self
                    .frames
                    .pop()
                    .ok_or_else(|| internal("return without a frame"))?;
                self.stack.truncate(frame.base);
                self.ip = frame.return_ip;
                if self.frames.len() <= stop_depth {
                    return Ok(Flow::Return(result));
                }
                self.push(result)?;
            }
            Call(a) => self.call(arg(a))?,
            CallNative(a) => self.call_native(arg(a))?,
            MakeClosure(a) => {
                let proto = self.constant_function(arg(a))?;
                let upvalues = self
                    .stack
                    .pop_n(proto.upvalue_count as usize)
                    .ok_or_else(stack_underflow)?;
                self.push(Value::Closure(Rc::new(Closure::new(proto, upvalues))))?;
            }
            MakeEnum(a) => {
                let ty = self.constant_type(arg(a))?;
                let descriptor = LanguageEnum::from_type(ty)
                    .ok_or_else(|| internal(format!("`{ty}` is not an enum")))?;
                self.enums.push(descriptor.clone());
                self.push(Value::Enum(descriptor))?;
            }
            MakeList(a) => {
                let items = self.stack.pop_n(arg(a)).ok_or_else(stack_underflow)?;
                self.push(Value::list(items))?;
            }
            MakeMap(a) => {
                let items = self.stack.pop_n(arg(a) * 2).ok_or_else(stack_underflow)?;
                let mut items = items.into_iter();
                let mut entries = Vec::with_capacity(arg(a));
                while let (Some(k), Some(v)) = (items.next(), items.next()) {
                    entries.push((k, v));
                }
                self.push(Value::map(entries)?)?;
            }
            StoreIndex => {
                let value = self.pop()?;
                let index = self.pop()?;
                let target = self.pop()?;
                ops::set_index(&target, &index, value.clone())?;
                self.push(value)?;
            }
            GetField(a) => {
                let name = self.constant_name(arg(a))?;
                let target = self.pop()?;
                self.push(ops::get_field(&target, name)?)?;
            }
            SetField(a) => {
                let name = self.constant_name(arg(a))?;
                let value = self.pop()?;
                let target = self.pop()?;
                ops::set_field(&target, name, value.clone())?;
                self.push(value)?;
            }
            Nop => {}
        }
        Ok(Flow::Continue)
    }

    fn call(&mut self, argc: usize) -> Result<(), Error> {
        let base = self
            .stack
            .len()
            .checked_sub(argc + 1)
            .ok_or_else(stack_underflow)?;
        let callee = self.stack.get(base).cloned().ok_or_else(stack_underflow)?;
        match callee {
            Value::Closure(closure) => self.enter(closure, base, argc),
            Value::EnumChild(child) => {
                let args = self.stack.pop_n(argc).ok_or_else(stack_underflow)?;
                self.stack.truncate(base);
                let instance = child.create(&args)?;
                self.push(Value::Instance(instance))?;
                Ok(())
            }
            other => Err(OpError::NotCallable(other.type_name()).into()),
        }
    }

    /// Pushes a frame for `closure` whose callee and arguments already sit
    /// at `base`.
    fn enter(&mut self, closure: Rc<Closure>, base: usize, argc: usize) -> Result<(), Error> {
        let proto: &FunctionProto = &closure.proto;
        if argc != proto.arity as usize {
            return Err(OpError::Arity {
                name: proto.name.to_string(),
                expected: proto.arity as usize,
                got: argc,
            }
            .into());
        }
        if self.frames.len() >= self.options.max_depth {
            return Err(Error::runtime(
                ErrorKind::ResourceExceeded,
                format!("maximum call depth of {} exceeded", self.options.max_depth),
            ));
        }
        if base + proto.frame_size() + proto.max_stack as usize > self.stack.capacity() {
            return Err(self.stack_exhausted());
        }
        trace!(name = %proto.name, depth = self.frames.len(), "call");

        self.push_n(Value::Null, proto.num_locals as usize)?;
        self.ip = {
            let entry = proto.entry as usize;
            self.frames.push(CallFrame {
                closure: Some(closure.clone()),
                return_ip: self.ip,
                base,
            });
            entry
        };
        Ok(())
    }

    fn call_native(&mut self, index: usize) -> Result<(), Error> {
        let chunk: &'c Chunk<'t> = self.chunk;
        let Some(Constant::Native {
            library,
            method,
            arity,
        }) = chunk.constants.get(index)
        else {
            return Err(internal(format!("constant {index} is not a native")));
        };
        let native = *self
            .natives
            .lookup(library, method, *arity as usize)
            .ok_or_else(|| {
                Error::runtime(
                    ErrorKind::Undefined,
                    format!("no native {library}.{method} taking {arity} argument(s)"),
                )
            })?;
        let args = self
            .stack
            .pop_n(*arity as usize)
            .ok_or_else(stack_underflow)?;

        let result = if native.memoizable {
            let key = format!("{library}.{method}");
            match self.memo.get(&key, &args) {
                Some(hit) => {
                    trace!(%key, "memo hit");
                    hit
                }
                None => {
                    self.memo.stack(&key, &args);
                    match (native.func)(self, &args) {
                        Ok(value) => {
                            self.memo.store(value.clone());
                            value
                        }
                        Err(err) => {
                            self.memo.discard();
                            return Err(err.into());
                        }
                    }
                }
            }
        } else {
            (native.func)(self, &args)?
        };
        self.push(result)?;
        Ok(())
    }

    fn stack_exhausted(&self) -> Error {
        Error::runtime(
            ErrorKind::ResourceExceeded,
            format!("value stack limit of {} exceeded", self.stack.capacity()),
        )
    }

    fn push(&mut self, value: Value) -> Result<(), Error> {
        self.stack.push(value).map_err(|_| self.stack_exhausted())
    }

    fn push_n(&mut self, value: Value, count: usize) -> Result<(), Error> {
        self.stack.push_n(value, count).map_err(|_| self.stack_exhausted())
    }

    fn pop(&mut self) -> Result<Value, Error> {
        self.stack.pop().ok_or_else(stack_underflow)
    }

    fn pop_condition(&mut self) -> Result<bool, Error> {
        let value = self.pop()?;
        condition(&value)
    }

    fn peek_condition(&self) -> Result<bool, Error> {
        condition(self.stack.peek().ok_or_else(stack_underflow)?)
    }

    fn slot_index(&self, slot: usize) -> usize {
        self.frames.last().map_or(0, |frame| frame.base) + slot
    }

    fn current_closure(&self) -> Result<Rc<Closure>, Error> {
        self.frames
            .last()
            .and_then(|frame| frame.closure.clone())
            .ok_or_else(|| internal("upvalue access outside a closure"))
    }

    fn constant(&self, index: usize) -> Result<&'c Constant<'t>, Error> {
        let chunk: &'c Chunk<'t> = self.chunk;
        chunk
            .constants
            .get(index)
            .ok_or_else(|| internal(format!("constant {index} out of range")))
    }

    fn constant_value(&self, index: usize) -> Result<Value, Error> {
        match self.constant(index)? {
            Constant::Value(value) => Ok(value.clone()),
            _ => Err(internal(format!("constant {index} is not a value"))),
        }
    }

    fn constant_name(&self, index: usize) -> Result<&'c str, Error> {
        self.constant(index)?
            .as_str()
            .ok_or_else(|| internal(format!("constant {index} is not a name")))
    }

    fn constant_function(&self, index: usize) -> Result<Rc<FunctionProto>, Error> {
        match self.constant(index)? {
            Constant::Function(proto) => Ok(proto.clone()),
            _ => Err(internal(format!("constant {index} is not a function"))),
        }
    }

    fn constant_type(&self, index: usize) -> Result<&'t Type<'t>, Error> {
        match self.constant(index)? {
            Constant::Type(ty) => Ok(*ty),
            _ => Err(internal(format!("constant {index} is not a type"))),
        }
    }
}

fn condition(value: &Value) -> Result<bool, Error> {
    value.as_bool().ok_or_else(|| {
        Error::runtime(
            ErrorKind::TypeMismatch,
            format!("expected bool condition, got {}", value.type_name()),
        )
    })
}
