//! The runtime value model.
//!
//! A [`Value`] is a plain Rust enum; containers and objects are reference
//! counted so that copies made by the VM stack share state the way the
//! language expects.

mod number;
mod object;
pub mod ops;
mod value;

#[cfg(test)]
mod value_test;

pub use number::Number;
pub use object::{
    CHILD_FIELD, Closure, FunctionProto, Instance, LanguageEnum, LanguageEnumChild, PARENT_FIELD,
};
pub use ops::OpError;
pub use value::{MapKey, Value};
