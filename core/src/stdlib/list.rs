//! List Package
//!
//! Functions: len, push, pop, get, set, insert, remove, slice, contains, map, filter
//!
//! Lists are shared and mutated in place. Index violations are reported as
//! [`NativeError::OutOfBounds`].

use std::{cell::RefCell, rc::Rc};

use super::{NativeError, NativeFunction, NativeRegistry, arg_i64, len_value};
use crate::{
    values::{Value, ops::checked_index},
    vm::Vm,
};

type Items = Rc<RefCell<Vec<Value>>>;

fn list_arg(name: &str, args: &[Value]) -> Result<Items, NativeError> {
    match args.first() {
        Some(Value::List(items)) => Ok(items.clone()),
        Some(other) => Err(NativeError::failed(
            name,
            format!("expected a list, got {}", other.type_name()),
        )),
        None => Err(NativeError::failed(name, "missing list argument")),
    }
}

fn list_len(_vm: &mut Vm<'_, '_>, args: &[Value]) -> Result<Value, NativeError> {
    let items = list_arg("List.len", args)?;
    let len = items.borrow().len();
    Ok(len_value(len))
}

fn list_push(_vm: &mut Vm<'_, '_>, args: &[Value]) -> Result<Value, NativeError> {
    list_arg("List.push", args)?.borrow_mut().push(args[1].clone());
    Ok(Value::Null)
}

fn list_pop(_vm: &mut Vm<'_, '_>, args: &[Value]) -> Result<Value, NativeError> {
    list_arg("List.pop", args)?
        .borrow_mut()
        .pop()
        .ok_or(NativeError::OutOfBounds { index: 0, len: 0 })
}

fn list_get(_vm: &mut Vm<'_, '_>, args: &[Value]) -> Result<Value, NativeError> {
    let items = list_arg("List.get", args)?;
    let items = items.borrow();
    let i = checked_index(arg_i64("List.get", args, 1)?, items.len())?;
    Ok(items[i].clone())
}

fn list_set(_vm: &mut Vm<'_, '_>, args: &[Value]) -> Result<Value, NativeError> {
    let items = list_arg("List.set", args)?;
    let mut items = items.borrow_mut();
    let i = checked_index(arg_i64("List.set", args, 1)?, items.len())?;
    items[i] = args[2].clone();
    Ok(Value::Null)
}

/// Inserts before position `i`; `i == len` appends.
fn list_insert(_vm: &mut Vm<'_, '_>, args: &[Value]) -> Result<Value, NativeError> {
    let items = list_arg("List.insert", args)?;
    let mut items = items.borrow_mut();
    let index = arg_i64("List.insert", args, 1)?;
    let i = checked_index(index, items.len() + 1).map_err(|_| NativeError::OutOfBounds {
        index,
        len: items.len(),
    })?;
    items.insert(i, args[2].clone());
    Ok(Value::Null)
}

fn list_remove(_vm: &mut Vm<'_, '_>, args: &[Value]) -> Result<Value, NativeError> {
    let items = list_arg("List.remove", args)?;
    let mut items = items.borrow_mut();
    let i = checked_index(arg_i64("List.remove", args, 1)?, items.len())?;
    Ok(items.remove(i))
}

/// Copies `[start, end)` into a new list.
fn list_slice(_vm: &mut Vm<'_, '_>, args: &[Value]) -> Result<Value, NativeError> {
    let items = list_arg("List.slice", args)?;
    let items = items.borrow();
    let (start, end) = slice_bounds("List.slice", args, items.len())?;
    Ok(Value::list(items[start..end].to_vec()))
}

/// Validates `args[1]..args[2]` against `len`.
pub(super) fn slice_bounds(
    name: &str,
    args: &[Value],
    len: usize,
) -> Result<(usize, usize), NativeError> {
    let start = arg_i64(name, args, 1)?;
    let end = arg_i64(name, args, 2)?;
    let check = |index: i64| {
        usize::try_from(index)
            .ok()
            .filter(|i| *i <= len)
            .ok_or(NativeError::OutOfBounds { index, len })
    };
    let (s, e) = (check(start)?, check(end)?);
    if s > e {
        return Err(NativeError::OutOfBounds { index: start, len: e });
    }
    Ok((s, e))
}

fn list_contains(_vm: &mut Vm<'_, '_>, args: &[Value]) -> Result<Value, NativeError> {
    let items = list_arg("List.contains", args)?;
    let found = items.borrow().iter().any(|item| item.equals(&args[1]));
    Ok(Value::Bool(found))
}

fn list_map(vm: &mut Vm<'_, '_>, args: &[Value]) -> Result<Value, NativeError> {
    // The callback may mutate the list, so iterate over a snapshot.
    let items = list_arg("List.map", args)?.borrow().clone();
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        out.push(vm.call_value(&args[1], &[item])?);
    }
    Ok(Value::list(out))
}

fn list_filter(vm: &mut Vm<'_, '_>, args: &[Value]) -> Result<Value, NativeError> {
    let items = list_arg("List.filter", args)?.borrow().clone();
    let mut out = Vec::new();
    for item in items {
        match vm.call_value(&args[1], std::slice::from_ref(&item))? {
            Value::Bool(true) => out.push(item),
            Value::Bool(false) => {}
            other => {
                return Err(NativeError::failed(
                    "List.filter",
                    format!("predicate must return a bool, got {}", other.type_name()),
                ));
            }
        }
    }
    Ok(Value::list(out))
}

pub fn register(registry: &mut NativeRegistry) {
    registry.register("List", "len", NativeFunction::new(&["list"], "int", list_len));
    registry.register(
        "List",
        "push",
        NativeFunction::new(&["list", "any"], "null", list_push),
    );
    registry.register("List", "pop", NativeFunction::new(&["list"], "any", list_pop));
    registry.register(
        "List",
        "get",
        NativeFunction::new(&["list", "int"], "any", list_get),
    );
    registry.register(
        "List",
        "set",
        NativeFunction::new(&["list", "int", "any"], "null", list_set),
    );
    registry.register(
        "List",
        "insert",
        NativeFunction::new(&["list", "int", "any"], "null", list_insert),
    );
    registry.register(
        "List",
        "remove",
        NativeFunction::new(&["list", "int"], "any", list_remove),
    );
    registry.register(
        "List",
        "slice",
        NativeFunction::new(&["list", "int", "int"], "list", list_slice),
    );
    registry.register(
        "List",
        "contains",
        NativeFunction::new(&["list", "any"], "bool", list_contains),
    );
    registry.register(
        "List",
        "map",
        NativeFunction::new(&["list", "any"], "list", list_map),
    );
    registry.register(
        "List",
        "filter",
        NativeFunction::new(&["list", "any"], "list", list_filter),
    );
}
