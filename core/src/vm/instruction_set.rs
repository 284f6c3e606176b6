//! Dem VM Instructions - Fixed 16-bit Format
//!
//! # Instruction Format
//!
//! **ALL instructions are exactly 16 bits (2 bytes)**:
//! ```text
//! ┌────────────┬────────────┐
//! │    Tag     │  Operand   │
//! │  (8 bits)  │  (8 bits)  │
//! └────────────┴────────────┘
//! ```
//!
//! Using `#[repr(C, u8)]`, the enum naturally maps to this 2-byte layout.
//! Instructions without an operand are written with a zero operand byte.
//!
//! # Wide Arguments
//!
//! For operands > 255, use the `WideArg` prefix:
//! ```ignore
//! WideArg(high_byte)      // Sets high byte for next instruction
//! ConstLoad(low_byte)     // Combined: (high << 8) | low = 16-bit index
//! ```
//!
//! # Jumps
//!
//! Jump offsets count instructions and are relative to the instruction
//! following the jump: `target = addr + 1 ± offset`.
//!
//! # Stack Discipline
//!
//! Stack effect notation: `[..., operand1, operand2] -> [..., result]`

use core::fmt;

use crate::{
    ast::{Operator, UnaryOp},
    types::encoding::DecodeError,
};

#[repr(C, u8)]
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    /// Halt execution. Kept at 0x00 so zeroed memory never executes.
    Halt = 0x00,

    // ========================================================================
    // Stack & Constants (0x01 - 0x0F)
    // ========================================================================
    /// Push constant from pool
    /// Operand: index | Stack: [...] -> [..., value]
    ConstLoad(u8) = 0x01,

    /// Push small signed integer (-128 to 127)
    /// Does not support WideArg.
    ConstInt(i8) = 0x02,

    /// Push the Bool value (arg != 0)
    ConstBool(u8) = 0x04,

    /// Wide argument prefix: the next operand becomes `(this << 8) | next`.
    WideArg(u8) = 0x05,

    /// Stack: [...] -> [..., null]
    ConstNull = 0x06,

    /// Duplicate value at depth N (top is N=0)
    DupN(u8) = 0x07,

    /// Stack: [..., a] -> [...]
    Pop = 0x08,

    /// Stack: [..., a, b] -> [..., b, a]
    Swap = 0x09,

    /// Load frame slot. Slot 0 is the running callee.
    LoadLocal(u8) = 0x0A,

    /// Store top into frame slot (pops)
    StoreLocal(u8) = 0x0B,

    /// Load captured value of the running closure
    LoadUpvalue(u8) = 0x0C,

    /// Store into the running closure's captured value (pops)
    StoreUpvalue(u8) = 0x0D,

    /// Load global. Operand: name constant index
    LoadGlobal(u8) = 0x0E,

    /// Define or overwrite global (pops). Operand: name constant index
    StoreGlobal(u8) = 0x0F,

    // ========================================================================
    // Operators (0x10 - 0x1F)
    // ========================================================================
    /// Arithmetic, bitwise, logical, concatenation and indexing.
    /// Stack: [..., a, b] -> [..., a op b]
    BinOp(Operator) = 0x10,

    /// Stack: [..., a] -> [..., op a]
    UnOp(UnaryOp) = 0x11,

    /// Equality and ordering.
    /// Stack: [..., a, b] -> [..., result: Bool]
    CmpOp(Operator) = 0x14,

    // ========================================================================
    // Control Flow (0x38 - 0x4F)
    // ========================================================================
    JumpForward(u8) = 0x38,

    /// Operand: offset | Stack: [..., cond: Bool] -> [...]
    PopJumpIfFalse(u8) = 0x39,

    /// Operand: offset | Stack: [..., cond: Bool] -> [...]
    PopJumpIfTrue(u8) = 0x3A,

    JumpBackward(u8) = 0x3B,

    /// Short-circuit `&&`: keep the false condition and jump, otherwise pop.
    JumpIfFalseOrPop(u8) = 0x3C,

    /// Short-circuit `||`: keep the true condition and jump, otherwise pop.
    JumpIfTrueOrPop(u8) = 0x3D,

    /// Return from function
    /// Stack: [..., retval] -> caller's [..., retval]
    Return = 0x3E,

    /// Call closure or enum variant
    /// Operand: argc | Stack: [..., callee, args...] -> [..., result]
    Call(u8) = 0x3F,

    /// Call host function
    /// Operand: native constant index | Stack: [..., args...] -> [..., result]
    CallNative(u8) = 0x40,

    // ========================================================================
    // Functions & Enums (0x50 - 0x5F)
    // ========================================================================
    /// Create closure from a function constant, popping its upvalues.
    /// Stack: [..., upval1, ..., upvalN] -> [..., closure]
    MakeClosure(u8) = 0x50,

    /// Create enum descriptor from a type constant
    /// Stack: [...] -> [..., enum]
    MakeEnum(u8) = 0x51,

    // ========================================================================
    // Containers & Fields (0x60 - 0x6F)
    // ========================================================================
    /// Stack: [..., e1, ..., eN] -> [..., list]
    MakeList(u8) = 0x60,

    /// Stack: [..., k1, v1, ..., kN, vN] -> [..., map]
    MakeMap(u8) = 0x61,

    /// Stack: [..., target, index, value] -> [..., value]
    StoreIndex = 0x63,

    /// Operand: name constant index | Stack: [..., target] -> [..., value]
    GetField(u8) = 0x64,

    /// Operand: name constant index | Stack: [..., target, value] -> [..., value]
    SetField(u8) = 0x65,

    // ========================================================================
    // Meta (0xD0 - 0xDF)
    // ========================================================================
    Nop = 0xD0,
}
static_assertions::assert_eq_size!(Instruction, [u8; 2]);

impl Instruction {
    /// Size of an instruction in bytes
    pub const SIZE: usize = 2;

    pub fn tag(&self) -> u8 {
        self.to_bytes()[0]
    }

    pub fn to_bytes(self) -> [u8; 2] {
        use Instruction::*;
        match self {
            Halt => [0x00, 0],
            ConstLoad(a) => [0x01, a],
            ConstInt(v) => [0x02, v as u8],
            ConstBool(a) => [0x04, a],
            WideArg(a) => [0x05, a],
            ConstNull => [0x06, 0],
            DupN(a) => [0x07, a],
            Pop => [0x08, 0],
            Swap => [0x09, 0],
            LoadLocal(a) => [0x0A, a],
            StoreLocal(a) => [0x0B, a],
            LoadUpvalue(a) => [0x0C, a],
            StoreUpvalue(a) => [0x0D, a],
            LoadGlobal(a) => [0x0E, a],
            StoreGlobal(a) => [0x0F, a],
            BinOp(op) => [0x10, op as u8],
            UnOp(op) => [0x11, op as u8],
            CmpOp(op) => [0x14, op as u8],
            JumpForward(a) => [0x38, a],
            PopJumpIfFalse(a) => [0x39, a],
            PopJumpIfTrue(a) => [0x3A, a],
            JumpBackward(a) => [0x3B, a],
            JumpIfFalseOrPop(a) => [0x3C, a],
            JumpIfTrueOrPop(a) => [0x3D, a],
            Return => [0x3E, 0],
            Call(a) => [0x3F, a],
            CallNative(a) => [0x40, a],
            MakeClosure(a) => [0x50, a],
            MakeEnum(a) => [0x51, a],
            MakeList(a) => [0x60, a],
            MakeMap(a) => [0x61, a],
            StoreIndex => [0x63, 0],
            GetField(a) => [0x64, a],
            SetField(a) => [0x65, a],
            Nop => [0xD0, 0],
        }
    }

    /// Decodes one instruction. `offset` is only used for error reporting.
    pub fn decode(bytes: [u8; 2], offset: usize) -> Result<Self, DecodeError> {
        use Instruction::*;
        let [tag, a] = bytes;
        let invalid = || DecodeError::InvalidInstruction {
            offset,
            tag,
            operand: a,
        };
        let no_operand = |instruction: Instruction| {
            if a == 0 { Ok(instruction) } else { Err(invalid()) }
        };
        match tag {
            0x00 => no_operand(Halt),
            0x01 => Ok(ConstLoad(a)),
            0x02 => Ok(ConstInt(a as i8)),
            0x04 => Ok(ConstBool(a)),
            0x05 => Ok(WideArg(a)),
            0x06 => no_operand(ConstNull),
            0x07 => Ok(DupN(a)),
            0x08 => no_operand(Pop),
            0x09 => no_operand(Swap),
            0x0A => Ok(LoadLocal(a)),
            0x0B => Ok(StoreLocal(a)),
            0x0C => Ok(LoadUpvalue(a)),
            0x0D => Ok(StoreUpvalue(a)),
            0x0E => Ok(LoadGlobal(a)),
            0x0F => Ok(StoreGlobal(a)),
            0x10 => match Operator::from_u8(a) {
                Some(op) if !op.is_equality() && !op.is_ordering() => Ok(BinOp(op)),
                _ => Err(invalid()),
            },
            0x11 => UnaryOp::from_u8(a).map(UnOp).ok_or_else(invalid),
            0x14 => match Operator::from_u8(a) {
                Some(op) if op.is_equality() || op.is_ordering() => Ok(CmpOp(op)),
                _ => Err(invalid()),
            },
            0x38 => Ok(JumpForward(a)),
            0x39 => Ok(PopJumpIfFalse(a)),
            0x3A => Ok(PopJumpIfTrue(a)),
            0x3B => Ok(JumpBackward(a)),
            0x3C => Ok(JumpIfFalseOrPop(a)),
            0x3D => Ok(JumpIfTrueOrPop(a)),
            0x3E => no_operand(Return),
            0x3F => Ok(Call(a)),
            0x40 => Ok(CallNative(a)),
            0x50 => Ok(MakeClosure(a)),
            0x51 => Ok(MakeEnum(a)),
            0x60 => Ok(MakeList(a)),
            0x61 => Ok(MakeMap(a)),
            0x63 => no_operand(StoreIndex),
            0x64 => Ok(GetField(a)),
            0x65 => Ok(SetField(a)),
            0xD0 => no_operand(Nop),
            _ => Err(invalid()),
        }
    }

    /// Operand of forward jumps.
    pub const fn forward_offset(&self) -> Option<u8> {
        match self {
            Self::JumpForward(offset)
            | Self::PopJumpIfFalse(offset)
            | Self::PopJumpIfTrue(offset)
            | Self::JumpIfFalseOrPop(offset)
            | Self::JumpIfTrueOrPop(offset) => Some(*offset),
            _ => None,
        }
    }

    /// Check if this instruction can produce a runtime error
    pub const fn can_error(&self) -> bool {
        matches!(
            self,
            Self::BinOp(_)
                | Self::UnOp(_)
                | Self::CmpOp(_)
                | Self::LoadGlobal(_)
                | Self::Call(_)
                | Self::CallNative(_)
                | Self::StoreIndex
                | Self::GetField(_)
                | Self::SetField(_)
                | Self::MakeMap(_)
        )
    }

    pub const fn is_control_flow(&self) -> bool {
        matches!(
            self,
            Self::JumpForward(_)
                | Self::JumpBackward(_)
                | Self::PopJumpIfFalse(_)
                | Self::PopJumpIfTrue(_)
                | Self::JumpIfFalseOrPop(_)
                | Self::JumpIfTrueOrPop(_)
                | Self::Return
                | Self::Halt
                | Self::Call(_)
                | Self::CallNative(_)
        )
    }
}

impl fmt::Debug for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BinOp(op) => write!(f, "BinOp({op})"),
            Self::UnOp(op) => write!(f, "UnOp({op})"),
            Self::CmpOp(op) => write!(f, "CmpOp({op})"),

            Self::Halt => write!(f, "Halt"),
            Self::ConstLoad(idx) => write!(f, "ConstLoad({idx})"),
            Self::ConstInt(val) => write!(f, "ConstInt({val})"),
            Self::ConstBool(val) => write!(f, "ConstBool({})", *val != 0),
            Self::WideArg(high) => write!(f, "WideArg(0x{high:02X})"),
            Self::ConstNull => write!(f, "ConstNull"),
            Self::DupN(depth) => write!(f, "DupN({depth})"),
            Self::Pop => write!(f, "Pop"),
            Self::Swap => write!(f, "Swap"),
            Self::LoadLocal(idx) => write!(f, "LoadLocal({idx})"),
            Self::StoreLocal(idx) => write!(f, "StoreLocal({idx})"),
            Self::LoadUpvalue(idx) => write!(f, "LoadUpvalue({idx})"),
            Self::StoreUpvalue(idx) => write!(f, "StoreUpvalue({idx})"),
            Self::LoadGlobal(idx) => write!(f, "LoadGlobal({idx})"),
            Self::StoreGlobal(idx) => write!(f, "StoreGlobal({idx})"),
            Self::JumpForward(offset) => write!(f, "JumpForward({offset})"),
            Self::JumpBackward(offset) => write!(f, "JumpBackward({offset})"),
            Self::PopJumpIfFalse(offset) => write!(f, "{:18} {}", "PopJumpIfFalse", offset),
            Self::PopJumpIfTrue(offset) => write!(f, "{:18} {}", "PopJumpIfTrue", offset),
            Self::JumpIfFalseOrPop(offset) => write!(f, "{:18} {}", "JumpIfFalseOrPop", offset),
            Self::JumpIfTrueOrPop(offset) => write!(f, "{:18} {}", "JumpIfTrueOrPop", offset),
            Self::Return => write!(f, "Return"),
            Self::Call(argc) => write!(f, "Call({argc})"),
            Self::CallNative(idx) => write!(f, "CallNative({idx})"),
            Self::MakeClosure(idx) => write!(f, "MakeClosure({idx})"),
            Self::MakeEnum(idx) => write!(f, "MakeEnum({idx})"),
            Self::MakeList(count) => write!(f, "MakeList({count})"),
            Self::MakeMap(count) => write!(f, "MakeMap({count})"),
            Self::StoreIndex => write!(f, "StoreIndex"),
            Self::GetField(idx) => write!(f, "GetField({idx})"),
            Self::SetField(idx) => write!(f, "SetField({idx})"),
            Self::Nop => write!(f, "Nop"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instruction_size() {
        // Critical: instructions must be exactly 2 bytes
        assert_eq!(core::mem::size_of::<Instruction>(), 2);
        assert_eq!(Instruction::SIZE, 2);
    }

    #[test]
    fn test_instruction_alignment() {
        assert_eq!(core::mem::align_of::<Instruction>(), 1);
    }

    #[test]
    fn test_decode_inverts_to_bytes() {
        use Instruction::*;
        let all = [
            Halt,
            ConstLoad(7),
            ConstInt(-3),
            ConstBool(1),
            WideArg(0xFF),
            ConstNull,
            DupN(2),
            Pop,
            Swap,
            LoadLocal(1),
            StoreLocal(2),
            LoadUpvalue(0),
            StoreUpvalue(4),
            LoadGlobal(9),
            StoreGlobal(9),
            BinOp(Operator::Pow),
            UnOp(UnaryOp::BitNot),
            CmpOp(Operator::Le),
            JumpForward(3),
            PopJumpIfFalse(4),
            PopJumpIfTrue(5),
            JumpBackward(6),
            JumpIfFalseOrPop(1),
            JumpIfTrueOrPop(1),
            Return,
            Call(2),
            CallNative(3),
            MakeClosure(0),
            MakeEnum(1),
            MakeList(4),
            MakeMap(2),
            StoreIndex,
            GetField(5),
            SetField(5),
            Nop,
        ];
        for instruction in all {
            let bytes = instruction.to_bytes();
            assert_eq!(Instruction::decode(bytes, 0), Ok(instruction));
            assert_eq!(instruction.tag(), bytes[0]);
        }
    }

    #[test]
    fn test_decode_rejects_bad_input() {
        // Unknown opcode.
        assert_eq!(
            Instruction::decode([0xEE, 0], 10),
            Err(DecodeError::InvalidInstruction {
                offset: 10,
                tag: 0xEE,
                operand: 0
            })
        );
        // Comparison operator under BinOp, arithmetic under CmpOp.
        assert!(Instruction::decode([0x10, b'<'], 0).is_err());
        assert!(Instruction::decode([0x14, b'+'], 0).is_err());
        // Unknown operator byte.
        assert!(Instruction::decode([0x10, b'#'], 0).is_err());
        // Operand on an operand-less instruction.
        assert!(Instruction::decode([0x08, 1], 0).is_err());
    }

    #[test]
    fn test_control_flow() {
        assert!(Instruction::JumpForward(10).is_control_flow());
        assert!(Instruction::Return.is_control_flow());
        assert!(!Instruction::BinOp(Operator::Add).is_control_flow());
        assert_eq!(Instruction::PopJumpIfTrue(4).forward_offset(), Some(4));
        assert_eq!(Instruction::JumpBackward(4).forward_offset(), None);
    }

    #[test]
    fn test_debug_formatting() {
        assert_eq!(format!("{:?}", Instruction::BinOp(Operator::Add)), "BinOp(+)");
        assert_eq!(format!("{:?}", Instruction::CmpOp(Operator::Lt)), "CmpOp(<)");
        assert_eq!(format!("{:?}", Instruction::WideArg(1)), "WideArg(0x01)");
    }
}
