//! Map Package
//!
//! Functions: len, get, put, has, remove, keys, values
//!
//! Keys must be scalars (null, bool, numbers, str, bytes). Iteration order is
//! the key order: by kind, then by value.

use std::{cell::RefCell, collections::BTreeMap, rc::Rc};

use super::{NativeError, NativeFunction, NativeRegistry, len_value};
use crate::{
    values::{MapKey, Value},
    vm::Vm,
};

type Entries = Rc<RefCell<BTreeMap<MapKey, Value>>>;

fn map_arg(name: &str, args: &[Value]) -> Result<Entries, NativeError> {
    match args.first() {
        Some(Value::Map(entries)) => Ok(entries.clone()),
        Some(other) => Err(NativeError::failed(
            name,
            format!("expected a map, got {}", other.type_name()),
        )),
        None => Err(NativeError::failed(name, "missing map argument")),
    }
}

fn key_arg(name: &str, args: &[Value]) -> Result<MapKey, NativeError> {
    MapKey::new(args[1].clone()).map_err(|e| NativeError::failed(name, e.to_string()))
}

fn map_len(_vm: &mut Vm<'_, '_>, args: &[Value]) -> Result<Value, NativeError> {
    let len = map_arg("Map.len", args)?.borrow().len();
    Ok(len_value(len))
}

/// Value stored under the key, null when absent.
fn map_get(_vm: &mut Vm<'_, '_>, args: &[Value]) -> Result<Value, NativeError> {
    let entries = map_arg("Map.get", args)?;
    let key = key_arg("Map.get", args)?;
    let value = entries.borrow().get(&key).cloned();
    Ok(value.unwrap_or_default())
}

/// Inserts or overwrites; returns the previous value or null.
fn map_put(_vm: &mut Vm<'_, '_>, args: &[Value]) -> Result<Value, NativeError> {
    let entries = map_arg("Map.put", args)?;
    let key = key_arg("Map.put", args)?;
    let previous = entries.borrow_mut().insert(key, args[2].clone());
    Ok(previous.unwrap_or_default())
}

fn map_has(_vm: &mut Vm<'_, '_>, args: &[Value]) -> Result<Value, NativeError> {
    let entries = map_arg("Map.has", args)?;
    let key = key_arg("Map.has", args)?;
    let found = entries.borrow().contains_key(&key);
    Ok(Value::Bool(found))
}

fn map_remove(_vm: &mut Vm<'_, '_>, args: &[Value]) -> Result<Value, NativeError> {
    let entries = map_arg("Map.remove", args)?;
    let key = key_arg("Map.remove", args)?;
    let removed = entries.borrow_mut().remove(&key);
    Ok(removed.unwrap_or_default())
}

fn map_keys(_vm: &mut Vm<'_, '_>, args: &[Value]) -> Result<Value, NativeError> {
    let entries = map_arg("Map.keys", args)?;
    let keys = entries.borrow().keys().map(|k| k.value().clone()).collect();
    Ok(Value::list(keys))
}

fn map_values(_vm: &mut Vm<'_, '_>, args: &[Value]) -> Result<Value, NativeError> {
    let entries = map_arg("Map.values", args)?;
    let values = entries.borrow().values().cloned().collect();
    Ok(Value::list(values))
}

pub fn register(registry: &mut NativeRegistry) {
    registry.register("Map", "len", NativeFunction::new(&["map"], "int", map_len));
    registry.register("Map", "get", NativeFunction::new(&["map", "any"], "any", map_get));
    registry.register(
        "Map",
        "put",
        NativeFunction::new(&["map", "any", "any"], "any", map_put),
    );
    registry.register("Map", "has", NativeFunction::new(&["map", "any"], "bool", map_has));
    registry.register(
        "Map",
        "remove",
        NativeFunction::new(&["map", "any"], "any", map_remove),
    );
    registry.register("Map", "keys", NativeFunction::new(&["map"], "list", map_keys));
    registry.register("Map", "values", NativeFunction::new(&["map"], "list", map_values));
}
