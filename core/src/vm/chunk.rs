use std::rc::Rc;

use hashbrown::{HashMap, HashSet};

use crate::{
    ast::Span,
    types::Type,
    values::{FunctionProto, Value},
    vm::Instruction,
};

/// Constant pool entry.
///
/// Only scalar values (null, bool, numbers, str, bytes) are pooled; the
/// compiler builds containers and objects at runtime.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant<'t> {
    Value(Value),
    Type(&'t Type<'t>),
    Function(Rc<FunctionProto>),
    Native {
        library: Rc<str>,
        method: Rc<str>,
        arity: u8,
    },
}

impl Constant<'_> {
    /// Tag written before the constant in a dump.
    pub fn tag(&self) -> u8 {
        match self {
            Constant::Value(_) => 0,
            Constant::Type(_) => 1,
            Constant::Function(_) => 2,
            Constant::Native { .. } => 3,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Constant::Value(Value::Str(s)) => Some(s),
            _ => None,
        }
    }
}

/// A compiled program: the script's code followed by every function body.
#[derive(Clone, PartialEq, Default)]
pub struct Chunk<'t> {
    pub constants: Vec<Constant<'t>>,
    pub instructions: Vec<Instruction>,
    /// `(instruction index, source span)`, sorted by index.
    pub positions: Vec<(u32, Span)>,
    /// Slots the script frame reserves past its callee slot.
    pub num_locals: u16,
    pub max_stack_size: u16,
}

impl Chunk<'_> {
    /// Source span of the instruction at `ip`: the closest recorded position
    /// at or before it.
    pub fn span_at(&self, ip: usize) -> Option<Span> {
        let ip = u32::try_from(ip).ok()?;
        let idx = self.positions.partition_point(|(at, _)| *at <= ip);
        idx.checked_sub(1).map(|i| self.positions[i].1.clone())
    }

    /// Function prototypes in pool order.
    pub fn functions(&self) -> impl Iterator<Item = &Rc<FunctionProto>> {
        self.constants.iter().filter_map(|c| match c {
            Constant::Function(proto) => Some(proto),
            _ => None,
        })
    }
}

/// Jump target of the instruction at `addr`, given the accumulated wide prefix.
fn jump_target(addr: usize, instr: &Instruction, wide_arg: usize) -> Option<usize> {
    if let Some(offset) = instr.forward_offset() {
        return Some(addr + 1 + (wide_arg | offset as usize));
    }
    match instr {
        Instruction::JumpBackward(offset) => {
            (addr + 1).checked_sub(wide_arg | *offset as usize)
        }
        _ => None,
    }
}

impl core::fmt::Debug for Chunk<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        writeln!(f, "Chunk {{")?;
        writeln!(f, "  num_locals: {}", self.num_locals)?;
        writeln!(f, "  max_stack_size: {}", self.max_stack_size)?;

        if !self.constants.is_empty() {
            writeln!(f, "  constants: [")?;
            for (i, constant) in self.constants.iter().enumerate() {
                match constant {
                    Constant::Value(v) => writeln!(f, "    [{i}] = {v:?}")?,
                    Constant::Type(ty) => writeln!(f, "    [{i}] = type {ty}")?,
                    Constant::Function(p) => writeln!(
                        f,
                        "    [{i}] = fn {}/{} @{} (upvalues: {}, locals: {})",
                        p.name, p.arity, p.entry, p.upvalue_count, p.num_locals
                    )?,
                    Constant::Native {
                        library,
                        method,
                        arity,
                    } => writeln!(f, "    [{i}] = native {library}.{method}/{arity}")?,
                }
            }
            writeln!(f, "  ]")?;
        } else {
            writeln!(f, "  constants: []")?;
        }

        // First pass: collect jump targets and function entries so they get labels.
        let mut jump_targets: HashSet<usize> = HashSet::new();
        let mut wide_arg: usize = 0;
        for (addr, instr) in self.instructions.iter().enumerate() {
            if let Instruction::WideArg(high) = instr {
                wide_arg = (wide_arg | (*high as usize)) << 8;
                continue;
            }
            if let Some(target) = jump_target(addr, instr, wide_arg) {
                jump_targets.insert(target);
            }
            wide_arg = 0;
        }

        let mut sorted_targets: Vec<_> = jump_targets.into_iter().collect();
        sorted_targets.sort();
        let label_map: HashMap<usize, usize> = sorted_targets
            .into_iter()
            .enumerate()
            .map(|(i, addr)| (addr, i))
            .collect();
        let entries: HashMap<usize, &str> = self
            .functions()
            .map(|p| (p.entry as usize, &*p.name))
            .collect();

        writeln!(f, "  instructions:")?;
        wide_arg = 0;
        for (addr, instr) in self.instructions.iter().enumerate() {
            if let Some(name) = entries.get(&addr) {
                writeln!(f, "  <{name}>:")?;
            }
            let label_prefix = label_map
                .get(&addr)
                .map(|l| format!("L{l}:"))
                .unwrap_or_default();

            if let Instruction::WideArg(high) = instr {
                wide_arg = (wide_arg | (*high as usize)) << 8;
                writeln!(f, "    {addr:4} {label_prefix:>4}  {instr:?}")?;
                continue;
            }

            if let Some(target) = jump_target(addr, instr, wide_arg) {
                let target_label = label_map
                    .get(&target)
                    .map(|l| format!("L{l}"))
                    .unwrap_or_else(|| format!("@{target}"));
                writeln!(
                    f,
                    "    {addr:4} {label_prefix:>4}  {instr:?} (to {target_label})"
                )?;
            } else {
                writeln!(f, "    {addr:4} {label_prefix:>4}  {instr:?}")?;
            }
            wide_arg = 0;
        }

        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Operator;
    use Instruction::*;

    #[test]
    fn test_span_lookup_uses_closest_preceding_position() {
        let chunk = Chunk {
            instructions: vec![ConstInt(1), ConstInt(0), BinOp(Operator::Div), Return],
            positions: vec![(0, Span::new(0, 1)), (2, Span::new(0, 5))],
            ..Chunk::default()
        };
        assert_eq!(chunk.span_at(1), Some(Span::new(0, 1)));
        assert_eq!(chunk.span_at(2), Some(Span::new(0, 5)));
        assert_eq!(chunk.span_at(3), Some(Span::new(0, 5)));
        assert_eq!(Chunk::default().span_at(0), None);
    }

    #[test]
    fn test_disassembly_labels_jumps() {
        let chunk = Chunk {
            constants: vec![Constant::Value(Value::str("x"))],
            instructions: vec![
                ConstBool(1),
                Nop,
                PopJumpIfFalse(1),
                ConstInt(1),
                ConstInt(2),
                JumpBackward(6),
                Return,
            ],
            ..Chunk::default()
        };
        let text = format!("{chunk:?}");
        assert!(text.contains("[0] = \"x\""), "{text}");
        assert!(text.contains("PopJumpIfFalse     1 (to L1)"), "{text}");
        assert!(text.contains("JumpBackward(6) (to L0)"), "{text}");
        assert!(text.contains("L0:  ConstBool(true)"), "{text}");
    }
}
