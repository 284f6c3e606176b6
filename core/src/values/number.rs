use core::{cmp::Ordering, fmt};

use crate::ast::{Operator, UnaryOp};

use super::ops::OpError;

/// Numeric payload. The variant is the runtime width.
#[derive(Debug, Clone, Copy)]
pub enum Number {
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
}

impl Number {
    pub fn rank(self) -> u8 {
        match self {
            Number::Byte(_) => 0,
            Number::Short(_) => 1,
            Number::Int(_) => 2,
            Number::Long(_) => 3,
            Number::Float(_) => 4,
            Number::Double(_) => 5,
        }
    }

    pub fn kind_name(self) -> &'static str {
        match self {
            Number::Byte(_) => "byte",
            Number::Short(_) => "short",
            Number::Int(_) => "int",
            Number::Long(_) => "long",
            Number::Float(_) => "float",
            Number::Double(_) => "double",
        }
    }

    pub fn is_integral(self) -> bool {
        self.rank() <= 3
    }

    pub fn as_i64(self) -> i64 {
        match self {
            Number::Byte(v) => v as i64,
            Number::Short(v) => v as i64,
            Number::Int(v) => v as i64,
            Number::Long(v) => v,
            Number::Float(v) => v as i64,
            Number::Double(v) => v as i64,
        }
    }

    pub fn as_f64(self) -> f64 {
        match self {
            Number::Byte(v) => v as f64,
            Number::Short(v) => v as f64,
            Number::Int(v) => v as f64,
            Number::Long(v) => v as f64,
            Number::Float(v) => v as f64,
            Number::Double(v) => v,
        }
    }

    /// Narrows an `i64` to the integral width of `rank`, wrapping.
    fn integral_of_rank(rank: u8, v: i64) -> Number {
        match rank {
            0 => Number::Byte(v as i8),
            1 => Number::Short(v as i16),
            2 => Number::Int(v as i32),
            _ => Number::Long(v),
        }
    }

    fn float_of_rank(rank: u8, v: f64) -> Number {
        if rank == 4 {
            Number::Float(v as f32)
        } else {
            Number::Double(v)
        }
    }

    /// Arithmetic and bitwise operators. The result takes the wider operand's width.
    pub fn binary(self, op: Operator, rhs: Number) -> Result<Number, OpError> {
        let rank = self.rank().max(rhs.rank());
        if rank <= 3 {
            let (a, b) = (self.as_i64(), rhs.as_i64());
            let v = match op {
                Operator::Add => a.wrapping_add(b),
                Operator::Sub => a.wrapping_sub(b),
                Operator::Mul => a.wrapping_mul(b),
                Operator::Div | Operator::Rem if b == 0 => return Err(OpError::DivisionByZero),
                Operator::Div => a.wrapping_div(b),
                Operator::Rem => a.wrapping_rem(b),
                Operator::Pow => match u32::try_from(b) {
                    Ok(exp) => a.wrapping_pow(exp),
                    // Negative exponent: truncated toward zero.
                    Err(_) => (a as f64).powf(b as f64) as i64,
                },
                Operator::BitAnd => a & b,
                Operator::BitOr => a | b,
                Operator::BitXor => a ^ b,
                Operator::Shl => a.wrapping_shl(b as u32),
                Operator::Shr => a.wrapping_shr(b as u32),
                _ => return Err(OpError::unsupported(op, self.kind_name(), rhs.kind_name())),
            };
            return Ok(Number::integral_of_rank(rank, v));
        }

        let (a, b) = (self.as_f64(), rhs.as_f64());
        let v = match op {
            Operator::Add => a + b,
            Operator::Sub => a - b,
            Operator::Mul => a * b,
            Operator::Div => a / b,
            Operator::Rem => a % b,
            Operator::Pow => a.powf(b),
            _ => return Err(OpError::unsupported(op, self.kind_name(), rhs.kind_name())),
        };
        Ok(Number::float_of_rank(rank, v))
    }

    pub fn unary(self, op: UnaryOp) -> Result<Number, OpError> {
        let result = match (op, self) {
            (UnaryOp::Neg, Number::Byte(v)) => Number::Byte(v.wrapping_neg()),
            (UnaryOp::Neg, Number::Short(v)) => Number::Short(v.wrapping_neg()),
            (UnaryOp::Neg, Number::Int(v)) => Number::Int(v.wrapping_neg()),
            (UnaryOp::Neg, Number::Long(v)) => Number::Long(v.wrapping_neg()),
            (UnaryOp::Neg, Number::Float(v)) => Number::Float(-v),
            (UnaryOp::Neg, Number::Double(v)) => Number::Double(-v),
            (UnaryOp::BitNot, Number::Byte(v)) => Number::Byte(!v),
            (UnaryOp::BitNot, Number::Short(v)) => Number::Short(!v),
            (UnaryOp::BitNot, Number::Int(v)) => Number::Int(!v),
            (UnaryOp::BitNot, Number::Long(v)) => Number::Long(!v),
            _ => {
                return Err(OpError::UnsupportedUnary {
                    op: op.symbol(),
                    operand: self.kind_name(),
                });
            }
        };
        Ok(result)
    }

    /// Numeric comparison across widths.
    pub fn compare(self, rhs: Number) -> Option<Ordering> {
        if self.is_integral() && rhs.is_integral() {
            Some(self.as_i64().cmp(&rhs.as_i64()))
        } else {
            self.as_f64().partial_cmp(&rhs.as_f64())
        }
    }

    /// Total order used for map keys.
    pub fn total_cmp(self, rhs: Number) -> Ordering {
        if self.is_integral() && rhs.is_integral() {
            self.as_i64().cmp(&rhs.as_i64())
        } else {
            self.as_f64().total_cmp(&rhs.as_f64())
        }
    }

    /// Same width and same bits.
    pub fn identical(self, rhs: Number) -> bool {
        match (self, rhs) {
            (Number::Float(a), Number::Float(b)) => a.to_bits() == b.to_bits(),
            (Number::Double(a), Number::Double(b)) => a.to_bits() == b.to_bits(),
            (a, b) => a.rank() == b.rank() && a.as_i64() == b.as_i64(),
        }
    }
}

impl PartialEq for Number {
    fn eq(&self, other: &Self) -> bool {
        self.compare(*other) == Some(Ordering::Equal)
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Byte(v) => write!(f, "{v}"),
            Number::Short(v) => write!(f, "{v}"),
            Number::Int(v) => write!(f, "{v}"),
            Number::Long(v) => write!(f, "{v}"),
            Number::Float(v) => write!(f, "{v:?}"),
            Number::Double(v) => write!(f, "{v:?}"),
        }
    }
}
