//! Runtime semantics of operators, indexing and member access.
//!
//! The compiler has already checked operand types, but `any`-typed operands
//! reach this module unchecked, so every combination is handled.

use core::cmp::Ordering;
use std::{cell::RefCell, rc::Rc};

use thiserror::Error;

use super::{Value, value::MapKey};
use crate::ast::{Operator, UnaryOp};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum OpError {
    #[error("unsupported operand types for {op}: {left} and {right}")]
    Unsupported {
        op: &'static str,
        left: &'static str,
        right: &'static str,
    },
    #[error("unsupported operand type for {op}: {operand}")]
    UnsupportedUnary {
        op: &'static str,
        operand: &'static str,
    },
    #[error("division by zero")]
    DivisionByZero,
    #[error("index {index} out of bounds for length {len}")]
    OutOfBounds { index: i64, len: usize },
    #[error("{0} values cannot be used as map keys")]
    Unhashable(&'static str),
    #[error("{name} expects {expected} argument(s), got {got}")]
    Arity {
        name: String,
        expected: usize,
        got: usize,
    },
    #[error("no member `{name}` on {kind}")]
    NoMember { name: String, kind: &'static str },
    #[error("{0} is not callable")]
    NotCallable(&'static str),
    #[error("enum `{0}` is no longer alive")]
    Detached(String),
    #[error("result of {op} would be {len} bytes, over the string size limit")]
    TooLarge { op: &'static str, len: u128 },
}

/// Largest string `str * int` may produce.
pub const MAX_REPEAT_LEN: usize = 1 << 30;

impl OpError {
    pub fn unsupported(op: Operator, left: &'static str, right: &'static str) -> Self {
        OpError::Unsupported {
            op: op.symbol(),
            left,
            right,
        }
    }
}

fn unsupported(op: Operator, lhs: &Value, rhs: &Value) -> OpError {
    OpError::unsupported(op, lhs.type_name(), rhs.type_name())
}

/// Checks `index` against `len`. Negative indices are out of bounds.
pub fn checked_index(index: i64, len: usize) -> Result<usize, OpError> {
    usize::try_from(index)
        .ok()
        .filter(|i| *i < len)
        .ok_or(OpError::OutOfBounds { index, len })
}

pub fn binary(op: Operator, lhs: &Value, rhs: &Value) -> Result<Value, OpError> {
    match op {
        Operator::Eq => return Ok(Value::Bool(lhs.equals(rhs))),
        Operator::Ne => return Ok(Value::Bool(!lhs.equals(rhs))),
        Operator::Index => return index(lhs, rhs),
        _ => {}
    }
    if op.is_ordering() {
        let ordering = match (lhs, rhs) {
            (Value::Number(a), Value::Number(b)) => a.compare(*b),
            (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
            _ => return Err(unsupported(op, lhs, rhs)),
        };
        let result = match ordering {
            // NaN compares false with everything.
            None => false,
            Some(ordering) => match op {
                Operator::Lt => ordering == Ordering::Less,
                Operator::Le => ordering != Ordering::Greater,
                Operator::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            },
        };
        return Ok(Value::Bool(result));
    }

    match (op, lhs, rhs) {
        (Operator::And, Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(*a && *b)),
        (Operator::Or, Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(*a || *b)),
        (Operator::Add, Value::Str(a), b) => Ok(Value::str(&format!("{a}{b}"))),
        (Operator::Mul, Value::Str(s), Value::Number(n)) if n.is_integral() => {
            let count = usize::try_from(n.as_i64()).unwrap_or(0);
            match s.len().checked_mul(count) {
                Some(len) if len <= MAX_REPEAT_LEN => Ok(Value::str(&s.repeat(count))),
                _ => Err(OpError::TooLarge {
                    op: op.symbol(),
                    len: s.len() as u128 * count as u128,
                }),
            }
        }
        (Operator::Add, Value::Bytes(a), Value::Bytes(b)) => {
            let mut out = a.to_vec();
            out.extend_from_slice(b);
            Ok(Value::bytes(&out))
        }
        (Operator::Add, Value::List(a), Value::List(b)) => {
            let mut out = a.borrow().clone();
            out.extend(b.borrow().iter().cloned());
            Ok(Value::list(out))
        }
        (Operator::Add, Value::Map(a), Value::Map(b)) => {
            let mut out = a.borrow().clone();
            for (k, v) in b.borrow().iter() {
                out.insert(k.clone(), v.clone());
            }
            Ok(Value::Map(Rc::new(RefCell::new(out))))
        }
        (_, Value::Number(a), Value::Number(b)) => Ok(Value::Number(a.binary(op, *b)?)),
        _ => Err(unsupported(op, lhs, rhs)),
    }
}

pub fn unary(op: UnaryOp, operand: &Value) -> Result<Value, OpError> {
    match (op, operand) {
        (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
        (_, Value::Number(n)) => Ok(Value::Number(n.unary(op)?)),
        _ => Err(OpError::UnsupportedUnary {
            op: op.symbol(),
            operand: operand.type_name(),
        }),
    }
}

pub fn index(target: &Value, idx: &Value) -> Result<Value, OpError> {
    match (target, idx) {
        (Value::List(items), Value::Number(n)) if n.is_integral() => {
            let items = items.borrow();
            let i = checked_index(n.as_i64(), items.len())?;
            Ok(items[i].clone())
        }
        (Value::Str(s), Value::Number(n)) if n.is_integral() => {
            let len = s.chars().count();
            let i = checked_index(n.as_i64(), len)?;
            let c = s.chars().nth(i).unwrap_or_default();
            Ok(Value::str(c.encode_utf8(&mut [0; 4])))
        }
        (Value::Bytes(b), Value::Number(n)) if n.is_integral() => {
            let i = checked_index(n.as_i64(), b.len())?;
            Ok(Value::int(b[i] as i32))
        }
        (Value::Map(map), key) => Ok(map
            .borrow()
            .get(&MapKey::new(key.clone())?)
            .cloned()
            .unwrap_or(Value::Null)),
        _ => Err(unsupported(Operator::Index, target, idx)),
    }
}

pub fn set_index(target: &Value, idx: &Value, value: Value) -> Result<(), OpError> {
    match (target, idx) {
        (Value::List(items), Value::Number(n)) if n.is_integral() => {
            let mut items = items.borrow_mut();
            let i = checked_index(n.as_i64(), items.len())?;
            items[i] = value;
            Ok(())
        }
        (Value::Map(map), key) => {
            map.borrow_mut().insert(MapKey::new(key.clone())?, value);
            Ok(())
        }
        _ => Err(unsupported(Operator::Index, target, idx)),
    }
}

pub fn get_field(target: &Value, name: &str) -> Result<Value, OpError> {
    let no_member = || OpError::NoMember {
        name: name.to_string(),
        kind: target.type_name(),
    };
    match target {
        Value::Instance(instance) => instance.field(name).ok_or_else(no_member),
        Value::Enum(descriptor) => descriptor
            .child(name)
            .map(Value::EnumChild)
            .ok_or_else(no_member),
        Value::Map(map) => Ok(map
            .borrow()
            .get(&MapKey::new(Value::str(name))?)
            .cloned()
            .unwrap_or(Value::Null)),
        Value::Str(s) if name == "length" => Ok(Value::int(s.chars().count() as i32)),
        Value::Bytes(b) if name == "length" => Ok(Value::int(b.len() as i32)),
        Value::List(items) if name == "length" => Ok(Value::int(items.borrow().len() as i32)),
        _ => Err(no_member()),
    }
}

pub fn set_field(target: &Value, name: &str, value: Value) -> Result<(), OpError> {
    match target {
        Value::Instance(instance) => {
            instance.set_field(name, value);
            Ok(())
        }
        Value::Map(map) => {
            map.borrow_mut().insert(MapKey::new(Value::str(name))?, value);
            Ok(())
        }
        _ => Err(OpError::NoMember {
            name: name.to_string(),
            kind: target.type_name(),
        }),
    }
}
