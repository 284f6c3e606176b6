//! String Package
//!
//! Functions: len, upper, lower, substring, contains, indexOf, split, replace,
//! trim, chars
//!
//! Positions and lengths count characters, not bytes.

use super::{NativeError, NativeFunction, NativeRegistry, arg_str, len_value, list::slice_bounds};
use crate::{values::Value, vm::Vm};

fn string_len(_vm: &mut Vm<'_, '_>, args: &[Value]) -> Result<Value, NativeError> {
    let s = arg_str("String.len", args, 0)?;
    Ok(len_value(s.chars().count()))
}

fn string_upper(_vm: &mut Vm<'_, '_>, args: &[Value]) -> Result<Value, NativeError> {
    Ok(Value::str(&arg_str("String.upper", args, 0)?.to_uppercase()))
}

fn string_lower(_vm: &mut Vm<'_, '_>, args: &[Value]) -> Result<Value, NativeError> {
    Ok(Value::str(&arg_str("String.lower", args, 0)?.to_lowercase()))
}

/// Characters `[start, end)`.
fn string_substring(_vm: &mut Vm<'_, '_>, args: &[Value]) -> Result<Value, NativeError> {
    let s = arg_str("String.substring", args, 0)?;
    let (start, end) = slice_bounds("String.substring", args, s.chars().count())?;
    let sub: String = s.chars().skip(start).take(end - start).collect();
    Ok(Value::str(&sub))
}

fn string_contains(_vm: &mut Vm<'_, '_>, args: &[Value]) -> Result<Value, NativeError> {
    let s = arg_str("String.contains", args, 0)?;
    let needle = arg_str("String.contains", args, 1)?;
    Ok(Value::Bool(s.contains(needle)))
}

/// Character position of the first occurrence, -1 when absent.
fn string_index_of(_vm: &mut Vm<'_, '_>, args: &[Value]) -> Result<Value, NativeError> {
    let s = arg_str("String.indexOf", args, 0)?;
    let needle = arg_str("String.indexOf", args, 1)?;
    let position = s
        .find(needle)
        .map_or(-1, |byte| s[..byte].chars().count() as i32);
    Ok(Value::int(position))
}

fn string_split(_vm: &mut Vm<'_, '_>, args: &[Value]) -> Result<Value, NativeError> {
    let s = arg_str("String.split", args, 0)?;
    let separator = arg_str("String.split", args, 1)?;
    if separator.is_empty() {
        return Err(NativeError::failed("String.split", "separator must not be empty"));
    }
    Ok(Value::list(s.split(separator).map(Value::str).collect()))
}

fn string_replace(_vm: &mut Vm<'_, '_>, args: &[Value]) -> Result<Value, NativeError> {
    let s = arg_str("String.replace", args, 0)?;
    let from = arg_str("String.replace", args, 1)?;
    let to = arg_str("String.replace", args, 2)?;
    if from.is_empty() {
        return Ok(args[0].clone());
    }
    Ok(Value::str(&s.replace(from, to)))
}

fn string_trim(_vm: &mut Vm<'_, '_>, args: &[Value]) -> Result<Value, NativeError> {
    Ok(Value::str(arg_str("String.trim", args, 0)?.trim()))
}

fn string_chars(_vm: &mut Vm<'_, '_>, args: &[Value]) -> Result<Value, NativeError> {
    let s = arg_str("String.chars", args, 0)?;
    let chars = s
        .chars()
        .map(|c| Value::str(c.encode_utf8(&mut [0; 4])))
        .collect();
    Ok(Value::list(chars))
}

pub fn register(registry: &mut NativeRegistry) {
    registry.register("String", "len", NativeFunction::new(&["str"], "int", string_len));
    registry.register(
        "String",
        "upper",
        NativeFunction::new(&["str"], "str", string_upper),
    );
    registry.register(
        "String",
        "lower",
        NativeFunction::new(&["str"], "str", string_lower),
    );
    registry.register(
        "String",
        "substring",
        NativeFunction::new(&["str", "int", "int"], "str", string_substring),
    );
    registry.register(
        "String",
        "contains",
        NativeFunction::new(&["str", "str"], "bool", string_contains),
    );
    registry.register(
        "String",
        "indexOf",
        NativeFunction::new(&["str", "str"], "int", string_index_of),
    );
    registry.register(
        "String",
        "split",
        NativeFunction::new(&["str", "str"], "list", string_split),
    );
    registry.register(
        "String",
        "replace",
        NativeFunction::new(&["str", "str", "str"], "str", string_replace),
    );
    registry.register("String", "trim", NativeFunction::new(&["str"], "str", string_trim));
    registry.register(
        "String",
        "chars",
        NativeFunction::new(&["str"], "list", string_chars),
    );
}
