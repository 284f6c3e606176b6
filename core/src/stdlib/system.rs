//! System Package
//!
//! Functions: print, println, time, assert

use std::time::{SystemTime, UNIX_EPOCH};

use super::{NativeError, NativeFunction, NativeRegistry, arg_str};
use crate::{values::Value, vm::Vm};

fn write_out(vm: &mut Vm<'_, '_>, name: &str, text: &str) -> Result<(), NativeError> {
    vm.output()
        .write_all(text.as_bytes())
        .map_err(|e| NativeError::failed(name, e.to_string()))
}

/// Writes the value without a trailing newline.
fn system_print(vm: &mut Vm<'_, '_>, args: &[Value]) -> Result<Value, NativeError> {
    write_out(vm, "System.print", &args[0].to_string())?;
    Ok(Value::Null)
}

fn system_println(vm: &mut Vm<'_, '_>, args: &[Value]) -> Result<Value, NativeError> {
    write_out(vm, "System.println", &format!("{}\n", args[0]))?;
    Ok(Value::Null)
}

/// Milliseconds since the Unix epoch.
fn system_time(_vm: &mut Vm<'_, '_>, _args: &[Value]) -> Result<Value, NativeError> {
    let elapsed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| NativeError::failed("System.time", e.to_string()))?;
    Ok(Value::long(elapsed.as_millis() as i64))
}

fn system_assert(_vm: &mut Vm<'_, '_>, args: &[Value]) -> Result<Value, NativeError> {
    let message = arg_str("System.assert", args, 1)?;
    match args[0] {
        Value::Bool(true) => Ok(Value::Null),
        Value::Bool(false) => Err(NativeError::failed("System.assert", message)),
        ref other => Err(NativeError::failed(
            "System.assert",
            format!("condition must be a bool, got {}", other.type_name()),
        )),
    }
}

pub fn register(registry: &mut NativeRegistry) {
    registry.register("System", "print", NativeFunction::new(&["any"], "null", system_print));
    registry.register(
        "System",
        "println",
        NativeFunction::new(&["any"], "null", system_println),
    );
    registry.register("System", "time", NativeFunction::new(&[], "long", system_time));
    registry.register(
        "System",
        "assert",
        NativeFunction::new(&["bool", "str"], "null", system_assert),
    );
}
