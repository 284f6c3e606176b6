//! Operator, call and member resolution.
//!
//! Every function here is pure and answers `None` when the operation is not
//! defined for the operand types.

use hashbrown::HashMap;

use super::{Type, manager::TypeManager};
use crate::ast::{Operator, UnaryOp};

/// Generic name to concrete type.
pub type Substitution<'a> = HashMap<&'a str, &'a Type<'a>>;

/// Result of an arithmetic operator on two numeric types.
fn arithmetic<'a>(lhs: &Type<'a>, rhs: &Type<'a>, types: &TypeManager<'a>) -> Option<&'a Type<'a>> {
    use Type::*;
    let result = match (lhs, rhs) {
        (Byte, Byte) => types.byte(),
        (Short, Byte | Short) => types.short(),
        (Int, Int) => types.int(),
        (Int | Long, Long) | (Long, Int) => types.long(),
        (Int | Long | Float, Float) | (Float, Int | Long) => types.float(),
        (Int | Long | Float | Double, Double) | (Double, Int | Long | Float) => types.double(),
        _ => return None,
    };
    Some(result)
}

fn bitwise<'a>(lhs: &Type<'a>, rhs: &Type<'a>, types: &TypeManager<'a>) -> Option<&'a Type<'a>> {
    use Type::*;
    let result = match (lhs, rhs) {
        (Byte, Byte) => types.byte(),
        (Short, Byte | Short) => types.short(),
        (Int, Int) => types.int(),
        (Int, Long) | (Long, Int | Long) => types.long(),
        _ => return None,
    };
    Some(result)
}

impl<'a> Type<'a> {
    /// Result type of `self <op> other`.
    pub fn operation(
        &'a self,
        op: Operator,
        other: &'a Type<'a>,
        types: &TypeManager<'a>,
    ) -> Option<&'a Type<'a>> {
        if op.is_equality() {
            return Some(types.bool());
        }
        if op.is_logical() {
            return match (self, other) {
                (Type::Bool, Type::Bool) => Some(types.bool()),
                _ if self.is_dynamic() && (other.is_dynamic() || *other == Type::Bool) => {
                    Some(types.bool())
                }
                (Type::Bool, _) if other.is_dynamic() => Some(types.bool()),
                _ => None,
            };
        }
        if op.is_ordering() {
            return match (self, other) {
                (Type::Str, Type::Str) => Some(types.bool()),
                _ if self.is_dynamic() || other.is_dynamic() => Some(types.bool()),
                _ => arithmetic(self, other, types).map(|_| types.bool()),
            };
        }

        match (op, self, other) {
            (Operator::Index, Type::Str, Type::Int) => Some(types.str()),
            (Operator::Index, Type::Bytes, Type::Int) => Some(types.int()),
            (Operator::Index, Type::List, idx) if idx.is_integral() || idx.is_dynamic() => {
                Some(types.any())
            }
            (Operator::Index, Type::Map, _) => Some(types.any()),
            (Operator::Index, Type::Str | Type::Bytes, idx) if idx.is_dynamic() => {
                Some(types.any())
            }
            (Operator::Index, lhs, _) if lhs.is_dynamic() => Some(types.any()),
            (Operator::Index, _, _) => None,

            (Operator::Add, Type::Str, _) => Some(types.str()),
            (Operator::Mul, Type::Str, Type::Int) => Some(types.str()),
            (Operator::Add, Type::Bytes, Type::Bytes) => Some(types.bytes()),
            (Operator::Add, Type::List, Type::List) => Some(types.list()),
            (Operator::Add, Type::Map, Type::Map) => Some(types.map()),

            (op, lhs, rhs) if op.is_arithmetic() || op.is_bitwise() => {
                if lhs.is_dynamic() {
                    return Some(types.any());
                }
                if rhs.is_dynamic() {
                    return lhs.is_numeric().then(|| types.any());
                }
                if op.is_bitwise() {
                    bitwise(lhs, rhs, types)
                } else {
                    arithmetic(lhs, rhs, types)
                }
            }
            _ => None,
        }
    }

    /// Result type of `<op> self`.
    pub fn unary(&'a self, op: UnaryOp, types: &TypeManager<'a>) -> Option<&'a Type<'a>> {
        match op {
            UnaryOp::Neg if self.is_numeric() => Some(self),
            UnaryOp::BitNot if self.is_integral() => Some(self),
            UnaryOp::Neg | UnaryOp::BitNot if self.is_dynamic() => Some(types.any()),
            UnaryOp::Not if *self == Type::Bool || self.is_dynamic() => Some(types.bool()),
            _ => None,
        }
    }

    /// Result type of calling `self` with arguments of the given types.
    ///
    /// Explicit generics, when given, must cover every generic parameter;
    /// otherwise generics are inferred from the first argument bound to them.
    pub fn call(
        &'a self,
        args: &[&'a Type<'a>],
        generics: &[&'a Type<'a>],
        types: &TypeManager<'a>,
    ) -> Option<&'a Type<'a>> {
        match self {
            Type::Any => Some(types.any()),
            Type::EnumChild {
                parent, properties, ..
            } => (args.len() == properties.len() && generics.is_empty())
                .then(|| types.object(parent)),
            Type::Function {
                generics: names,
                params,
                ret,
            } => {
                if params.len() != args.len() {
                    return None;
                }
                let mut subst = Substitution::new();
                if !generics.is_empty() {
                    if generics.len() != names.len() {
                        return None;
                    }
                    subst.extend(names.iter().copied().zip(generics.iter().copied()));
                } else {
                    for (param, arg) in params.iter().zip(args) {
                        if let Type::Generic(name) = param {
                            subst.entry(*name).or_insert(*arg);
                        }
                    }
                }
                for (param, arg) in params.iter().zip(args) {
                    if !arg.is_assignable_to(param.apply_generics(&subst, types)) {
                        return None;
                    }
                }
                Some(ret.apply_generics(&subst, types))
            }
            _ => None,
        }
    }

    /// Result type of `self.name`.
    pub fn access(&'a self, name: &str, types: &TypeManager<'a>) -> Option<&'a Type<'a>> {
        match self {
            Type::Enum { children, .. } => children
                .iter()
                .copied()
                .find(|child| matches!(child, Type::EnumChild { name: n, .. } if *n == name)),
            Type::Object(_) if name == "$child" => Some(types.int()),
            Type::Object(_) | Type::List | Type::Map | Type::Any | Type::Generic(_) => {
                Some(types.any())
            }
            Type::Str | Type::Bytes if name == "length" => Some(types.int()),
            _ => None,
        }
    }

    /// Substitutes generic placeholders. Placeholders missing from `subst`
    /// resolve to themselves.
    pub fn apply_generics(
        &'a self,
        subst: &Substitution<'a>,
        types: &TypeManager<'a>,
    ) -> &'a Type<'a> {
        match self {
            Type::Generic(name) => subst.get(name).copied().unwrap_or(self),
            Type::Function {
                generics,
                params,
                ret,
            } if self.is_generic() => {
                let params: Vec<&'a Type<'a>> = params
                    .iter()
                    .map(|p| p.apply_generics(subst, types))
                    .collect();
                let remaining: Vec<&str> = generics
                    .iter()
                    .copied()
                    .filter(|g| !subst.contains_key(g))
                    .collect();
                types.generic_function(&remaining, &params, ret.apply_generics(subst, types))
            }
            _ => self,
        }
    }

    /// Least common type of two branches.
    pub fn join(&'a self, other: &'a Type<'a>, types: &TypeManager<'a>) -> &'a Type<'a> {
        if core::ptr::eq(self, other) {
            self
        } else if *other == Type::Null && Type::Null.is_assignable_to(self) {
            self
        } else if *self == Type::Null && Type::Null.is_assignable_to(other) {
            other
        } else {
            types.any()
        }
    }
}
