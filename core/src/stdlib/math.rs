//! Math Package
//!
//! Functions: abs, sqrt, pow, floor, ceil, round, sin, cos, min, max, fib
//!
//! Every function is pure and registered as memoizable.

use super::{NativeError, NativeFn, NativeFunction, NativeRegistry, arg_f64, arg_i64};
use crate::{
    values::{Number, Value},
    vm::Vm,
};

fn number(name: &str, args: &[Value], i: usize) -> Result<Number, NativeError> {
    args.get(i)
        .and_then(Value::as_number)
        .ok_or_else(|| NativeError::failed(name, format!("argument {} must be a number", i + 1)))
}

// ============================================================================
// Basic Operations
// ============================================================================

/// Absolute value, keeping the argument's width. Integer minimums wrap.
fn math_abs(_vm: &mut Vm<'_, '_>, args: &[Value]) -> Result<Value, NativeError> {
    let n = match number("Math.abs", args, 0)? {
        Number::Byte(v) => Number::Byte(v.wrapping_abs()),
        Number::Short(v) => Number::Short(v.wrapping_abs()),
        Number::Int(v) => Number::Int(v.wrapping_abs()),
        Number::Long(v) => Number::Long(v.wrapping_abs()),
        Number::Float(v) => Number::Float(v.abs()),
        Number::Double(v) => Number::Double(v.abs()),
    };
    Ok(Value::Number(n))
}

/// Smaller of two numbers; the result keeps the chosen argument's width.
fn math_min(_vm: &mut Vm<'_, '_>, args: &[Value]) -> Result<Value, NativeError> {
    let a = number("Math.min", args, 0)?;
    let b = number("Math.min", args, 1)?;
    Ok(Value::Number(if b.as_f64() < a.as_f64() { b } else { a }))
}

fn math_max(_vm: &mut Vm<'_, '_>, args: &[Value]) -> Result<Value, NativeError> {
    let a = number("Math.max", args, 0)?;
    let b = number("Math.max", args, 1)?;
    Ok(Value::Number(if b.as_f64() > a.as_f64() { b } else { a }))
}

// ============================================================================
// Rounding Functions
// ============================================================================

fn math_floor(_vm: &mut Vm<'_, '_>, args: &[Value]) -> Result<Value, NativeError> {
    Ok(Value::long(arg_f64("Math.floor", args, 0)?.floor() as i64))
}

fn math_ceil(_vm: &mut Vm<'_, '_>, args: &[Value]) -> Result<Value, NativeError> {
    Ok(Value::long(arg_f64("Math.ceil", args, 0)?.ceil() as i64))
}

/// Rounds half away from zero.
fn math_round(_vm: &mut Vm<'_, '_>, args: &[Value]) -> Result<Value, NativeError> {
    Ok(Value::long(arg_f64("Math.round", args, 0)?.round() as i64))
}

// ============================================================================
// Exponentiation and Trigonometry
// ============================================================================

fn math_sqrt(_vm: &mut Vm<'_, '_>, args: &[Value]) -> Result<Value, NativeError> {
    Ok(Value::double(arg_f64("Math.sqrt", args, 0)?.sqrt()))
}

fn math_pow(_vm: &mut Vm<'_, '_>, args: &[Value]) -> Result<Value, NativeError> {
    let base = arg_f64("Math.pow", args, 0)?;
    let exp = arg_f64("Math.pow", args, 1)?;
    Ok(Value::double(base.powf(exp)))
}

fn math_sin(_vm: &mut Vm<'_, '_>, args: &[Value]) -> Result<Value, NativeError> {
    Ok(Value::double(arg_f64("Math.sin", args, 0)?.sin()))
}

fn math_cos(_vm: &mut Vm<'_, '_>, args: &[Value]) -> Result<Value, NativeError> {
    Ok(Value::double(arg_f64("Math.cos", args, 0)?.cos()))
}

// ============================================================================
// Sequences
// ============================================================================

/// `fib(0) = 0`, `fib(1) = 1`, wrapping on overflow.
fn math_fib(_vm: &mut Vm<'_, '_>, args: &[Value]) -> Result<Value, NativeError> {
    let n = arg_i64("Math.fib", args, 0)?;
    if n < 0 {
        return Err(NativeError::failed(
            "Math.fib",
            format!("argument must not be negative, got {n}"),
        ));
    }
    let (mut a, mut b) = (0i64, 1i64);
    for _ in 0..n {
        (a, b) = (b, a.wrapping_add(b));
    }
    Ok(Value::long(a))
}

pub fn register(registry: &mut NativeRegistry) {
    let unary = |func: NativeFn| NativeFunction::new(&["any"], "any", func).memoized();
    let to_long = |func: NativeFn| NativeFunction::new(&["any"], "long", func).memoized();
    let to_double = |func: NativeFn| NativeFunction::new(&["any"], "double", func).memoized();

    registry.register("Math", "abs", unary(math_abs));
    registry.register(
        "Math",
        "min",
        NativeFunction::new(&["any", "any"], "any", math_min).memoized(),
    );
    registry.register(
        "Math",
        "max",
        NativeFunction::new(&["any", "any"], "any", math_max).memoized(),
    );

    registry.register("Math", "floor", to_long(math_floor));
    registry.register("Math", "ceil", to_long(math_ceil));
    registry.register("Math", "round", to_long(math_round));

    registry.register("Math", "sqrt", to_double(math_sqrt));
    registry.register(
        "Math",
        "pow",
        NativeFunction::new(&["any", "any"], "double", math_pow).memoized(),
    );
    registry.register("Math", "sin", to_double(math_sin));
    registry.register("Math", "cos", to_double(math_cos));

    registry.register("Math", "fib", to_long(math_fib));
}
