//! Per-function compilation state: lexical scopes, frame slots, captured
//! variables and operand stack depth.

use super::CompileError;
use crate::types::Type;

struct Local<'t> {
    name: String,
    slot: u16,
    ty: &'t Type<'t>,
}

struct Scope<'t> {
    /// First slot handed out in this scope; reclaimed when it closes.
    start: u16,
    locals: Vec<Local<'t>>,
}

/// Where the enclosing function finds a value captured by a new closure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Capture {
    Local(u16),
    Upvalue(u8),
}

pub(super) struct Upvalue<'t> {
    name: String,
    pub capture: Capture,
    ty: &'t Type<'t>,
}

pub(super) struct FunctionState<'t> {
    pub name: Option<String>,
    /// Type of the running callee in slot 0; `None` for the script.
    pub ty: Option<&'t Type<'t>>,
    pub generics: Vec<String>,
    /// Declared return type; `None` for the script.
    pub ret: Option<&'t Type<'t>>,
    pub arity: usize,
    pub upvalues: Vec<Upvalue<'t>>,
    scopes: Vec<Scope<'t>>,
    next_slot: u16,
    max_slots: u16,
    depth: usize,
    max_depth: usize,
}

impl<'t> FunctionState<'t> {
    pub fn script() -> Self {
        FunctionState {
            name: None,
            ty: None,
            generics: Vec::new(),
            ret: None,
            arity: 0,
            upvalues: Vec::new(),
            scopes: vec![Scope {
                start: 1,
                locals: Vec::new(),
            }],
            next_slot: 1,
            max_slots: 1,
            depth: 0,
            max_depth: 0,
        }
    }

    /// State for a function body; parameters take slots `1..=arity`.
    pub fn function(
        name: Option<String>,
        ty: &'t Type<'t>,
        generics: Vec<String>,
        ret: &'t Type<'t>,
        params: Vec<(String, &'t Type<'t>)>,
    ) -> Result<Self, CompileError> {
        let mut state = FunctionState {
            name,
            ty: Some(ty),
            generics,
            ret: Some(ret),
            arity: params.len(),
            ..FunctionState::script()
        };
        for (param, ty) in params {
            state.declare(&param, ty)?;
        }
        Ok(state)
    }

    // === Scopes & Slots ===

    pub fn push_scope(&mut self) {
        self.scopes.push(Scope {
            start: self.next_slot,
            locals: Vec::new(),
        });
    }

    pub fn pop_scope(&mut self) {
        if let Some(scope) = self.scopes.pop() {
            self.next_slot = scope.start;
        }
    }

    pub fn scope_depth(&self) -> usize {
        self.scopes.len()
    }

    /// Binds `name` to a fresh slot in the innermost scope.
    pub fn declare(&mut self, name: &str, ty: &'t Type<'t>) -> Result<u16, CompileError> {
        let slot = self.next_slot;
        self.next_slot = slot.checked_add(1).ok_or(CompileError::TooManyLocals)?;
        self.max_slots = self.max_slots.max(self.next_slot);
        if let Some(scope) = self.scopes.last_mut() {
            scope.locals.push(Local {
                name: name.to_string(),
                slot,
                ty,
            });
        }
        Ok(slot)
    }

    /// Innermost binding of `name` among this function's locals.
    pub fn lookup(&self, name: &str) -> Option<(u16, &'t Type<'t>)> {
        self.scopes
            .iter()
            .rev()
            .flat_map(|scope| scope.locals.iter().rev())
            .find(|local| local.name == name)
            .map(|local| (local.slot, local.ty))
    }

    /// Type of the function itself when `name` refers to it.
    pub fn self_type(&self, name: &str) -> Option<&'t Type<'t>> {
        self.ty.filter(|_| self.name.as_deref() == Some(name))
    }

    /// Slots past the callee and parameters that the frame must reserve.
    pub fn num_locals(&self) -> usize {
        (self.max_slots as usize).saturating_sub(1 + self.arity)
    }

    // === Captures ===

    pub fn upvalue(&self, name: &str) -> Option<(u8, &'t Type<'t>)> {
        self.upvalues
            .iter()
            .position(|up| up.name == name)
            .map(|i| (i as u8, self.upvalues[i].ty))
    }

    pub fn add_upvalue(
        &mut self,
        name: &str,
        capture: Capture,
        ty: &'t Type<'t>,
    ) -> Result<u8, CompileError> {
        let index = u8::try_from(self.upvalues.len()).map_err(|_| CompileError::TooManyUpvalues)?;
        self.upvalues.push(Upvalue {
            name: name.to_string(),
            capture,
            ty,
        });
        Ok(index)
    }

    // === Operand Stack ===

    pub fn push(&mut self, n: usize) {
        self.depth += n;
        self.max_depth = self.max_depth.max(self.depth);
    }

    pub fn pop(&mut self, n: usize) {
        debug_assert!(
            self.depth >= n,
            "stack underflow: popping {n} at depth {}",
            self.depth
        );
        self.depth = self.depth.saturating_sub(n);
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Rewinds the depth when compiling an alternative branch.
    pub fn set_depth(&mut self, depth: usize) {
        self.depth = depth;
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }
}
