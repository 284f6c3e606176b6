//! Operators shared by the AST, the type system and the instruction set.
//!
//! Discriminants are part of the bytecode format: `BinOp`, `CmpOp` and
//! `UnOp` instructions carry them as their operand byte.

use core::fmt;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Add = b'+',
    Sub = b'-',
    Mul = b'*',
    Div = b'/',
    Rem = b'%',
    Pow = b'P',
    BitAnd = b'&',
    BitOr = b'|',
    BitXor = b'^',
    Shl = b'{',
    Shr = b'}',
    Eq = b'=',
    Ne = b'!',
    Lt = b'<',
    Le = b'l',
    Gt = b'>',
    Ge = b'g',
    And = b'a',
    Or = b'o',
    Index = b'[',
}

impl Operator {
    pub const ALL: [Operator; 20] = [
        Operator::Add,
        Operator::Sub,
        Operator::Mul,
        Operator::Div,
        Operator::Rem,
        Operator::Pow,
        Operator::BitAnd,
        Operator::BitOr,
        Operator::BitXor,
        Operator::Shl,
        Operator::Shr,
        Operator::Eq,
        Operator::Ne,
        Operator::Lt,
        Operator::Le,
        Operator::Gt,
        Operator::Ge,
        Operator::And,
        Operator::Or,
        Operator::Index,
    ];

    pub fn from_u8(byte: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|op| *op as u8 == byte)
    }

    pub const fn symbol(self) -> &'static str {
        match self {
            Operator::Add => "+",
            Operator::Sub => "-",
            Operator::Mul => "*",
            Operator::Div => "/",
            Operator::Rem => "%",
            Operator::Pow => "**",
            Operator::BitAnd => "&",
            Operator::BitOr => "|",
            Operator::BitXor => "^",
            Operator::Shl => "<<",
            Operator::Shr => ">>",
            Operator::Eq => "==",
            Operator::Ne => "!=",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::And => "&&",
            Operator::Or => "||",
            Operator::Index => "[]",
        }
    }

    pub const fn is_arithmetic(self) -> bool {
        matches!(
            self,
            Operator::Add
                | Operator::Sub
                | Operator::Mul
                | Operator::Div
                | Operator::Rem
                | Operator::Pow
        )
    }

    pub const fn is_bitwise(self) -> bool {
        matches!(
            self,
            Operator::BitAnd | Operator::BitOr | Operator::BitXor | Operator::Shl | Operator::Shr
        )
    }

    /// Ordering comparisons. Equality is handled separately because it is
    /// defined for every pair of operands.
    pub const fn is_ordering(self) -> bool {
        matches!(
            self,
            Operator::Lt | Operator::Le | Operator::Gt | Operator::Ge
        )
    }

    pub const fn is_equality(self) -> bool {
        matches!(self, Operator::Eq | Operator::Ne)
    }

    pub const fn is_logical(self) -> bool {
        matches!(self, Operator::And | Operator::Or)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg = b'-',
    Not = b'!',
    BitNot = b'~',
}

impl UnaryOp {
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            b'-' => Some(UnaryOp::Neg),
            b'!' => Some(UnaryOp::Not),
            b'~' => Some(UnaryOp::BitNot),
            _ => None,
        }
    }

    pub const fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::Not => "!",
            UnaryOp::BitNot => "~",
        }
    }
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}
