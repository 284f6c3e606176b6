//! types Package
//!
//! Functions: typeOf, toInt, toLong, toFloat, toDouble, toString, isNull
//!
//! Numeric conversions accept numbers of any width, bools and numeric
//! strings. Narrowing conversions truncate.

use core::str::FromStr;

use super::{NativeError, NativeFunction, NativeRegistry};
use crate::{values::Value, vm::Vm};

/// Runtime kind name; instances report their class.
fn types_type_of(_vm: &mut Vm<'_, '_>, args: &[Value]) -> Result<Value, NativeError> {
    Ok(match &args[0] {
        Value::Instance(instance) => Value::Str(instance.class.clone()),
        other => Value::str(other.type_name()),
    })
}

fn parse<T: FromStr>(name: &str, s: &str) -> Result<T, NativeError> {
    s.trim()
        .parse()
        .map_err(|_| NativeError::failed(name, format!("cannot convert {s:?}")))
}

fn integral(name: &str, value: &Value) -> Result<i64, NativeError> {
    match value {
        Value::Number(n) => Ok(n.as_i64()),
        Value::Bool(b) => Ok(*b as i64),
        Value::Str(s) => parse(name, s),
        other => Err(NativeError::failed(
            name,
            format!("cannot convert {} to a number", other.type_name()),
        )),
    }
}

fn floating(name: &str, value: &Value) -> Result<f64, NativeError> {
    match value {
        Value::Number(n) => Ok(n.as_f64()),
        Value::Bool(b) => Ok(*b as i64 as f64),
        Value::Str(s) => parse(name, s),
        other => Err(NativeError::failed(
            name,
            format!("cannot convert {} to a number", other.type_name()),
        )),
    }
}

fn types_to_int(_vm: &mut Vm<'_, '_>, args: &[Value]) -> Result<Value, NativeError> {
    Ok(Value::int(integral("types.toInt", &args[0])? as i32))
}

fn types_to_long(_vm: &mut Vm<'_, '_>, args: &[Value]) -> Result<Value, NativeError> {
    Ok(Value::long(integral("types.toLong", &args[0])?))
}

fn types_to_float(_vm: &mut Vm<'_, '_>, args: &[Value]) -> Result<Value, NativeError> {
    Ok(Value::float(floating("types.toFloat", &args[0])? as f32))
}

fn types_to_double(_vm: &mut Vm<'_, '_>, args: &[Value]) -> Result<Value, NativeError> {
    Ok(Value::double(floating("types.toDouble", &args[0])?))
}

fn types_to_string(_vm: &mut Vm<'_, '_>, args: &[Value]) -> Result<Value, NativeError> {
    Ok(match &args[0] {
        s @ Value::Str(_) => s.clone(),
        other => Value::str(&other.to_string()),
    })
}

fn types_is_null(_vm: &mut Vm<'_, '_>, args: &[Value]) -> Result<Value, NativeError> {
    Ok(Value::Bool(args[0].is_null()))
}

pub fn register(registry: &mut NativeRegistry) {
    registry.register(
        "types",
        "typeOf",
        NativeFunction::new(&["any"], "str", types_type_of),
    );
    registry.register(
        "types",
        "toInt",
        NativeFunction::new(&["any"], "int", types_to_int),
    );
    registry.register(
        "types",
        "toLong",
        NativeFunction::new(&["any"], "long", types_to_long),
    );
    registry.register(
        "types",
        "toFloat",
        NativeFunction::new(&["any"], "float", types_to_float),
    );
    registry.register(
        "types",
        "toDouble",
        NativeFunction::new(&["any"], "double", types_to_double),
    );
    registry.register(
        "types",
        "toString",
        NativeFunction::new(&["any"], "str", types_to_string),
    );
    registry.register(
        "types",
        "isNull",
        NativeFunction::new(&["any"], "bool", types_is_null),
    );
}
