use std::rc::Rc;

use super::{CHILD_FIELD, LanguageEnum, MapKey, Number, OpError, PARENT_FIELD, Value, ops};
use crate::ast::{Operator, UnaryOp};
use crate::types::TypeManager;
use bumpalo::Bump;
use pretty_assertions::assert_eq;

#[test]
fn test_enum_variant_creation_binds_fields() {
    let shape = LanguageEnum::new("Shape", &[("Point", &[]), ("Rect", &["p0", "p1"])]);
    let rect = shape.child("Rect").unwrap();
    assert_eq!(rect.ordinal, 1);

    let instance = rect.create(&[Value::int(3), Value::str("wide")]).unwrap();
    let names: Vec<String> = instance
        .field_names()
        .iter()
        .map(|n| n.to_string())
        .collect();
    assert_eq!(names, vec!["p0", "p1", CHILD_FIELD, PARENT_FIELD]);
    assert_eq!(instance.field("p0"), Some(Value::int(3)));
    assert_eq!(instance.field("p1"), Some(Value::str("wide")));
    assert_eq!(instance.field(CHILD_FIELD), Some(Value::int(1)));
    match instance.field(PARENT_FIELD) {
        Some(Value::Enum(parent)) => assert!(Rc::ptr_eq(&parent, &shape)),
        other => panic!("expected parent enum, got {other:?}"),
    }
    assert_eq!(&*instance.class, "Shape");
    assert_eq!(instance.to_string(), "Shape(p0: 3, p1: \"wide\")");
}

#[test]
fn test_enum_variant_arity_mismatch() {
    let shape = LanguageEnum::new("Shape", &[("Rect", &["w", "h"])]);
    let rect = shape.child("Rect").unwrap();
    assert_eq!(
        rect.create(&[Value::int(1)]).unwrap_err(),
        OpError::Arity {
            name: "Rect".to_string(),
            expected: 2,
            got: 1
        }
    );
}

#[test]
fn test_enum_child_outliving_parent_is_detached() {
    let shape = LanguageEnum::new("Shape", &[("Point", &[])]);
    let point = shape.child("Point").unwrap();
    drop(shape);
    assert!(point.parent().is_none());
    assert!(matches!(point.create(&[]), Err(OpError::Detached(_))));
}

#[test]
fn test_enum_from_type_preserves_order() {
    let bump = Bump::new();
    let types = TypeManager::new(&bump);
    let ty = types.enum_type("Color", &[("Red", vec![]), ("Rgb", vec!["r", "g", "b"])]);

    let color = LanguageEnum::from_type(ty).unwrap();
    assert_eq!(&*color.name, "Color");
    let children: Vec<(&str, u32, usize)> = color
        .children
        .iter()
        .map(|c| (&*c.name, c.ordinal, c.arity()))
        .collect();
    assert_eq!(children, vec![("Red", 0, 0), ("Rgb", 1, 3)]);
    assert!(LanguageEnum::from_type(types.int()).is_none());
}

#[test]
fn test_language_equality_crosses_widths() {
    assert!(Value::int(3).equals(&Value::long(3)));
    assert!(Value::byte(2).equals(&Value::double(2.0)));
    assert_ne!(Value::int(3), Value::long(3));
    assert!(!Value::str("3").equals(&Value::int(3)));
    assert!(Value::list(vec![Value::int(1)]).equals(&Value::list(vec![Value::long(1)])));
    assert!(!Value::Null.equals(&Value::Bool(false)));
}

#[test]
fn test_arithmetic_widens() {
    let sum = ops::binary(Operator::Add, &Value::int(2), &Value::double(0.5)).unwrap();
    assert_eq!(sum, Value::double(2.5));
    let product = ops::binary(Operator::Mul, &Value::int(6), &Value::long(7)).unwrap();
    assert_eq!(product, Value::long(42));
    let wrapped = ops::binary(Operator::Add, &Value::byte(127), &Value::byte(1)).unwrap();
    assert_eq!(wrapped, Value::byte(-128));
    assert_eq!(
        ops::binary(Operator::Pow, &Value::int(2), &Value::int(10)).unwrap(),
        Value::int(1024)
    );
}

#[test]
fn test_division_by_zero() {
    assert_eq!(
        ops::binary(Operator::Div, &Value::int(1), &Value::int(0)),
        Err(OpError::DivisionByZero)
    );
    assert_eq!(
        ops::binary(Operator::Rem, &Value::long(1), &Value::int(0)),
        Err(OpError::DivisionByZero)
    );
    // Floating point division follows IEEE.
    let inf = ops::binary(Operator::Div, &Value::double(1.0), &Value::int(0)).unwrap();
    assert_eq!(inf.as_f64(), Some(f64::INFINITY));
}

#[test]
fn test_comparisons_and_nan() {
    let lt = ops::binary(Operator::Lt, &Value::int(1), &Value::double(1.5)).unwrap();
    assert_eq!(lt, Value::Bool(true));
    let nan = Value::double(f64::NAN);
    for op in [Operator::Lt, Operator::Le, Operator::Gt, Operator::Ge] {
        assert_eq!(ops::binary(op, &nan, &nan).unwrap(), Value::Bool(false));
    }
    let ge = ops::binary(Operator::Ge, &Value::str("b"), &Value::str("a")).unwrap();
    assert_eq!(ge, Value::Bool(true));
    assert!(matches!(
        ops::binary(Operator::Lt, &Value::str("a"), &Value::int(1)),
        Err(OpError::Unsupported { .. })
    ));
}

#[test]
fn test_string_operators() {
    let joined = ops::binary(Operator::Add, &Value::str("n="), &Value::int(4)).unwrap();
    assert_eq!(joined, Value::str("n=4"));
    let repeated = ops::binary(Operator::Mul, &Value::str("ab"), &Value::int(3)).unwrap();
    assert_eq!(repeated, Value::str("ababab"));
    let empty = ops::binary(Operator::Mul, &Value::str("ab"), &Value::int(-1)).unwrap();
    assert_eq!(empty, Value::str(""));
    assert_eq!(
        ops::index(&Value::str("héllo"), &Value::int(1)).unwrap(),
        Value::str("é")
    );
}

#[test]
fn test_string_repeat_is_capped() {
    for count in [Value::long(i64::MAX), Value::long(1 << 40)] {
        let err = ops::binary(Operator::Mul, &Value::str("ab"), &count).unwrap_err();
        assert!(matches!(err, OpError::TooLarge { .. }), "{err}");

        let err = crate::errors::Error::from(err);
        assert!(err.is_kind("ResourceExceeded"), "{err}");
        assert_eq!(err.stage, crate::errors::Stage::VirtualMachine);
    }
    let empty = ops::binary(Operator::Mul, &Value::str(""), &Value::long(i64::MAX)).unwrap();
    assert_eq!(empty, Value::str(""));
}

#[test]
fn test_indexing_bounds() {
    let list = Value::list(vec![Value::int(10), Value::int(20)]);
    assert_eq!(ops::index(&list, &Value::int(1)).unwrap(), Value::int(20));
    assert_eq!(
        ops::index(&list, &Value::int(2)),
        Err(OpError::OutOfBounds { index: 2, len: 2 })
    );
    assert_eq!(
        ops::index(&list, &Value::int(-1)),
        Err(OpError::OutOfBounds { index: -1, len: 2 })
    );
    assert_eq!(
        ops::index(&Value::bytes(&[7, 255]), &Value::int(1)).unwrap(),
        Value::int(255)
    );

    ops::set_index(&list, &Value::int(0), Value::str("x")).unwrap();
    assert_eq!(list.to_string(), "[\"x\", 20]");
}

#[test]
fn test_map_keys_unify_numeric_widths() {
    let map = Value::map([
        (Value::int(1), Value::str("one")),
        (Value::str("k"), Value::Bool(true)),
    ])
    .unwrap();
    assert_eq!(ops::index(&map, &Value::long(1)).unwrap(), Value::str("one"));
    assert_eq!(ops::index(&map, &Value::int(9)).unwrap(), Value::Null);
    assert_eq!(ops::get_field(&map, "k").unwrap(), Value::Bool(true));
    assert_eq!(
        MapKey::new(Value::list(vec![])).unwrap_err(),
        OpError::Unhashable("list")
    );
    // Keys print in their total order: numbers before strings.
    assert_eq!(map.to_string(), "{1: \"one\", \"k\": true}");
}

#[test]
fn test_unary() {
    assert_eq!(
        ops::unary(UnaryOp::Neg, &Value::int(5)).unwrap(),
        Value::int(-5)
    );
    assert_eq!(
        ops::unary(UnaryOp::Not, &Value::Bool(true)).unwrap(),
        Value::Bool(false)
    );
    assert_eq!(
        ops::unary(UnaryOp::BitNot, &Value::long(0)).unwrap(),
        Value::long(-1)
    );
    assert!(matches!(
        ops::unary(UnaryOp::BitNot, &Value::double(1.0)),
        Err(OpError::UnsupportedUnary { .. })
    ));
}

#[test]
fn test_display() {
    assert_eq!(Value::Null.to_string(), "null");
    assert_eq!(Value::double(1.0).to_string(), "1.0");
    assert_eq!(Value::str("hi").to_string(), "hi");
    assert_eq!(format!("{:?}", Value::str("hi")), "\"hi\"");
    assert_eq!(Value::bytes(b"a\n").to_string(), "b\"a\\n\"");
    assert_eq!(
        Value::list(vec![Value::int(1), Value::str("a"), Value::Null]).to_string(),
        "[1, \"a\", null]"
    );
    assert_eq!(Value::Number(Number::Float(0.5)).type_name(), "float");
}

#[test]
fn test_lists_are_shared() {
    let list = Value::list(vec![]);
    let alias = list.clone();
    alias.as_list().unwrap().borrow_mut().push(Value::int(1));
    assert_eq!(list.as_list().unwrap().borrow().len(), 1);
}
