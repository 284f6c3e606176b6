//! End-to-end tests for the standard libraries: programs are compiled and
//! run so that signatures, dispatch and error mapping are all exercised.

use bumpalo::Bump;
use pretty_assertions::assert_eq;

use super::{NativeError, NativeFunction, NativeRegistry, DEFAULT_REGISTRY};
use crate::{
    api::{CompileOptions, ExecutionOptions},
    ast::{FunctionDecl, Node, Operator, Param, TypeExpr},
    compiler::BytecodeCompiler,
    errors::{Error, Stage},
    types::TypeManager,
    values::Value,
    vm::Vm,
};

/// Runs `node` and returns its result together with everything it printed.
fn run_capturing(node: Node) -> (Result<Value, Error>, String) {
    let arena = Bump::new();
    let types = TypeManager::new(&arena);
    let mut out: Vec<u8> = Vec::new();
    let result = BytecodeCompiler::compile(
        types,
        &DEFAULT_REGISTRY,
        CompileOptions { optimize: false },
        &node,
    )
    .and_then(|chunk| {
        Vm::new(&chunk, &DEFAULT_REGISTRY, ExecutionOptions::default())
            .with_output(Box::new(&mut out))
            .run()
    });
    (result, String::from_utf8_lossy(&out).into_owned())
}

fn run(node: Node) -> Result<Value, Error> {
    run_capturing(node).0
}

fn call(library: &str, method: &str, args: Vec<Node>) -> Node {
    Node::native(library, method, args)
}

fn strs(items: &[&str]) -> Value {
    Value::list(items.iter().map(|s| Value::str(s)).collect())
}

fn ints(items: &[i32]) -> Value {
    Value::list(items.iter().copied().map(Value::int).collect())
}

fn lambda(param: &str, ret: &str, body: Node) -> Node {
    Node::function(FunctionDecl {
        name: None,
        generics: Vec::new(),
        params: vec![Param {
            name: param.to_string(),
            ty: TypeExpr::named("int"),
        }],
        ret: TypeExpr::named(ret),
        body,
    })
}

// ============================================================================
// Registry
// ============================================================================

#[test]
fn test_default_registry_has_every_library() {
    let mut names: Vec<_> = DEFAULT_REGISTRY.library_names().collect();
    names.sort_unstable();
    assert_eq!(
        names,
        vec!["List", "Map", "Math", "Memory", "String", "System", "types"]
    );
}

#[test]
fn test_lookup_by_arity() {
    assert!(DEFAULT_REGISTRY.lookup("List", "get", 2).is_some());
    assert!(DEFAULT_REGISTRY.lookup("List", "get", 3).is_none());
    assert!(DEFAULT_REGISTRY.lookup("List", "shuffle", 1).is_none());
    assert!(DEFAULT_REGISTRY.lookup("Nope", "len", 1).is_none());
}

#[test]
fn test_register_replaces_same_arity() {
    fn one(_: &mut Vm<'_, '_>, _: &[Value]) -> Result<Value, NativeError> {
        Ok(Value::int(1))
    }
    fn two(_: &mut Vm<'_, '_>, _: &[Value]) -> Result<Value, NativeError> {
        Ok(Value::int(2))
    }

    let mut registry = NativeRegistry::new();
    registry.register("Host", "pick", NativeFunction::new(&["int"], "int", one));
    registry.register("Host", "pick", NativeFunction::new(&[], "int", one));
    registry.register("Host", "pick", NativeFunction::new(&["any"], "int", two));

    let unary = registry.lookup("Host", "pick", 1).unwrap();
    assert_eq!(unary.ty.params, &["any"]);
    assert!(registry.lookup("Host", "pick", 0).is_some());
    assert_eq!(registry.library("Host").unwrap().method_names().count(), 1);
}

#[test]
fn test_math_is_memoizable() {
    assert!(DEFAULT_REGISTRY.lookup("Math", "fib", 1).unwrap().memoizable);
    assert!(!DEFAULT_REGISTRY.lookup("System", "time", 0).unwrap().memoizable);
}

// ============================================================================
// System
// ============================================================================

#[test]
fn test_print_and_println() {
    let (result, out) = run_capturing(Node::block(vec![
        call("System", "print", vec![Node::str("a")]),
        call("System", "print", vec![Node::int(1)]),
        call("System", "println", vec![Node::bool(true)]),
        call("System", "println", vec![Node::null()]),
    ]));
    assert_eq!(result.unwrap(), Value::Null);
    assert_eq!(out, "a1true\nnull\n");
}

#[test]
fn test_println_list_quotes_strings() {
    let (_, out) = run_capturing(call(
        "System",
        "println",
        vec![Node::list(vec![Node::str("x"), Node::int(2)])],
    ));
    assert_eq!(out, "[\"x\", 2]\n");
}

#[test]
fn test_time_is_positive() {
    let value = run(call("System", "time", vec![])).unwrap();
    assert!(value.as_i64().unwrap() > 0);
}

#[test]
fn test_assert() {
    let ok = call("System", "assert", vec![Node::bool(true), Node::str("fine")]);
    assert_eq!(run(ok).unwrap(), Value::Null);

    let failing = call(
        "System",
        "assert",
        vec![
            Node::binary(Operator::Eq, Node::int(1), Node::int(2)),
            Node::str("one is not two"),
        ],
    );
    let err = run(failing).unwrap_err();
    assert!(err.is_kind("Native"), "{err}");
    assert_eq!(err.stage, Stage::VirtualMachine);
    assert!(err.to_string().contains("one is not two"), "{err}");
}

// ============================================================================
// Math
// ============================================================================

#[test]
fn test_math_integer_results() {
    assert_eq!(run(call("Math", "abs", vec![Node::int(-5)])).unwrap(), Value::int(5));
    assert_eq!(
        run(call("Math", "min", vec![Node::int(3), Node::int(-2)])).unwrap(),
        Value::int(-2)
    );
    assert_eq!(
        run(call("Math", "max", vec![Node::int(3), Node::int(-2)])).unwrap(),
        Value::int(3)
    );
    assert_eq!(run(call("Math", "floor", vec![Node::double(2.7)])).unwrap(), Value::long(2));
    assert_eq!(run(call("Math", "ceil", vec![Node::double(2.1)])).unwrap(), Value::long(3));
    assert_eq!(run(call("Math", "round", vec![Node::double(2.5)])).unwrap(), Value::long(3));
    assert_eq!(run(call("Math", "fib", vec![Node::int(20)])).unwrap(), Value::long(6765));
}

#[test]
fn test_math_floating_results() {
    assert_eq!(
        run(call("Math", "sqrt", vec![Node::int(16)])).unwrap(),
        Value::double(4.0)
    );
    assert_eq!(
        run(call("Math", "pow", vec![Node::int(2), Node::int(10)])).unwrap(),
        Value::double(1024.0)
    );
    assert_eq!(run(call("Math", "sin", vec![Node::int(0)])).unwrap(), Value::double(0.0));
    assert_eq!(run(call("Math", "cos", vec![Node::int(0)])).unwrap(), Value::double(1.0));
}

#[test]
fn test_math_rejects_non_numbers() {
    let err = run(call("Math", "sqrt", vec![Node::str("four")])).unwrap_err();
    assert!(err.is_kind("Native"), "{err}");
}

#[test]
fn test_repeated_pure_call_is_cached() {
    let arena = Bump::new();
    let types = TypeManager::new(&arena);
    let node = Node::block(vec![
        Node::let_("a", call("Math", "pow", vec![Node::int(3), Node::int(4)])),
        Node::let_("b", call("Math", "pow", vec![Node::int(3), Node::int(4)])),
        Node::let_("c", call("Math", "pow", vec![Node::int(4), Node::int(3)])),
        Node::binary(Operator::Add, Node::var("a"), Node::var("b")),
    ]);
    let chunk = BytecodeCompiler::compile(
        types,
        &DEFAULT_REGISTRY,
        CompileOptions::default(),
        &node,
    )
    .unwrap();
    let mut vm = Vm::new(&chunk, &DEFAULT_REGISTRY, ExecutionOptions::default());
    assert_eq!(vm.run().unwrap(), Value::double(162.0));
    assert_eq!(vm.memo().len(), 2);
    assert_eq!(vm.memo().pending(), 0);
}

#[test]
fn test_cached_result_keeps_argument_width() {
    let result = run(Node::block(vec![
        Node::let_("a", call("Math", "abs", vec![Node::int(-2)])),
        call("Math", "abs", vec![Node::double(-2.0)]),
    ]))
    .unwrap();
    assert_eq!(result, Value::double(2.0));

    let result = run(Node::block(vec![
        Node::let_("a", call("Math", "max", vec![Node::int(1), Node::int(3)])),
        call("Math", "max", vec![Node::double(1.0), Node::double(3.0)]),
    ]))
    .unwrap();
    assert_eq!(result, Value::double(3.0));
}

#[test]
fn test_failed_pure_call_is_not_cached() {
    let arena = Bump::new();
    let types = TypeManager::new(&arena);
    let node = call("Math", "abs", vec![Node::str("x")]);
    let chunk = BytecodeCompiler::compile(
        types,
        &DEFAULT_REGISTRY,
        CompileOptions::default(),
        &node,
    )
    .unwrap();
    let mut vm = Vm::new(&chunk, &DEFAULT_REGISTRY, ExecutionOptions::default());
    assert!(vm.run().is_err());
    assert!(vm.memo().is_empty());
    assert_eq!(vm.memo().pending(), 0);
}

// ============================================================================
// List
// ============================================================================

fn with_list(body: Vec<Node>) -> Node {
    let mut nodes = vec![Node::let_(
        "xs",
        Node::list(vec![Node::int(1), Node::int(2), Node::int(3)]),
    )];
    nodes.extend(body);
    Node::block(nodes)
}

#[test]
fn test_list_mutation() {
    let program = with_list(vec![
        call("List", "push", vec![Node::var("xs"), Node::int(4)]),
        call("List", "insert", vec![Node::var("xs"), Node::int(0), Node::int(0)]),
        call("List", "set", vec![Node::var("xs"), Node::int(2), Node::int(20)]),
        call("List", "remove", vec![Node::var("xs"), Node::int(1)]),
        Node::var("xs"),
    ]);
    assert_eq!(run(program).unwrap(), ints(&[0, 20, 3, 4]));
}

#[test]
fn test_list_queries() {
    let len = with_list(vec![call("List", "len", vec![Node::var("xs")])]);
    assert_eq!(run(len).unwrap(), Value::int(3));

    let get = with_list(vec![call("List", "get", vec![Node::var("xs"), Node::int(1)])]);
    assert_eq!(run(get).unwrap(), Value::int(2));

    let pop = with_list(vec![call("List", "pop", vec![Node::var("xs")])]);
    assert_eq!(run(pop).unwrap(), Value::int(3));

    let contains = with_list(vec![call(
        "List",
        "contains",
        vec![Node::var("xs"), Node::int(2)],
    )]);
    assert_eq!(run(contains).unwrap(), Value::Bool(true));

    let slice = with_list(vec![call(
        "List",
        "slice",
        vec![Node::var("xs"), Node::int(1), Node::int(3)],
    )]);
    assert_eq!(run(slice).unwrap(), ints(&[2, 3]));
}

#[test]
fn test_list_map_and_filter() {
    let doubled = with_list(vec![call(
        "List",
        "map",
        vec![
            Node::var("xs"),
            lambda(
                "x",
                "int",
                Node::binary(Operator::Mul, Node::var("x"), Node::int(2)),
            ),
        ],
    )]);
    assert_eq!(run(doubled).unwrap(), ints(&[2, 4, 6]));

    let odd = with_list(vec![call(
        "List",
        "filter",
        vec![
            Node::var("xs"),
            lambda(
                "x",
                "bool",
                Node::binary(
                    Operator::Eq,
                    Node::binary(Operator::Rem, Node::var("x"), Node::int(2)),
                    Node::int(1),
                ),
            ),
        ],
    )]);
    assert_eq!(run(odd).unwrap(), ints(&[1, 3]));
}

#[test]
fn test_filter_requires_bool_predicate() {
    let program = with_list(vec![call(
        "List",
        "filter",
        vec![Node::var("xs"), lambda("x", "int", Node::var("x"))],
    )]);
    let err = run(program).unwrap_err();
    assert!(err.is_kind("Native"), "{err}");
}

#[test]
fn test_list_bounds_violations() {
    let get = with_list(vec![call("List", "get", vec![Node::var("xs"), Node::int(3)])]);
    let err = run(get).unwrap_err();
    assert!(err.is_kind("BoundsViolation"), "{err}");
    assert_eq!(err.stage, Stage::VirtualMachine);

    let negative = with_list(vec![call("List", "get", vec![Node::var("xs"), Node::int(-1)])]);
    assert!(run(negative).unwrap_err().is_kind("BoundsViolation"));

    let empty = call("List", "pop", vec![Node::list(vec![])]);
    assert!(run(empty).unwrap_err().is_kind("BoundsViolation"));

    let backwards = with_list(vec![call(
        "List",
        "slice",
        vec![Node::var("xs"), Node::int(2), Node::int(1)],
    )]);
    assert!(run(backwards).unwrap_err().is_kind("BoundsViolation"));
}

#[test]
fn test_list_argument_types_are_checked() {
    let err = run(call("List", "len", vec![Node::str("abc")])).unwrap_err();
    assert!(err.is_kind("TypeMismatch"), "{err}");
    assert_eq!(err.stage, Stage::Compiler);
}

// ============================================================================
// Map
// ============================================================================

fn with_map(body: Vec<Node>) -> Node {
    let mut nodes = vec![Node::let_(
        "m",
        Node::map(vec![
            (Node::str("b"), Node::int(2)),
            (Node::str("a"), Node::int(1)),
        ]),
    )];
    nodes.extend(body);
    Node::block(nodes)
}

#[test]
fn test_map_operations() {
    let len = with_map(vec![call("Map", "len", vec![Node::var("m")])]);
    assert_eq!(run(len).unwrap(), Value::int(2));

    let get = with_map(vec![call("Map", "get", vec![Node::var("m"), Node::str("a")])]);
    assert_eq!(run(get).unwrap(), Value::int(1));

    let missing = with_map(vec![call("Map", "get", vec![Node::var("m"), Node::str("z")])]);
    assert_eq!(run(missing).unwrap(), Value::Null);

    let has = with_map(vec![call("Map", "has", vec![Node::var("m"), Node::str("b")])]);
    assert_eq!(run(has).unwrap(), Value::Bool(true));
}

#[test]
fn test_map_put_returns_previous() {
    let replaced = with_map(vec![call(
        "Map",
        "put",
        vec![Node::var("m"), Node::str("a"), Node::int(10)],
    )]);
    assert_eq!(run(replaced).unwrap(), Value::int(1));

    let program = with_map(vec![
        call("Map", "put", vec![Node::var("m"), Node::str("c"), Node::int(3)]),
        call("Map", "remove", vec![Node::var("m"), Node::str("b")]),
        call("Map", "values", vec![Node::var("m")]),
    ]);
    assert_eq!(run(program).unwrap(), ints(&[1, 3]));
}

#[test]
fn test_map_keys_are_ordered() {
    let program = with_map(vec![call("Map", "keys", vec![Node::var("m")])]);
    assert_eq!(run(program).unwrap(), strs(&["a", "b"]));
}

#[test]
fn test_map_rejects_unhashable_key() {
    let program = with_map(vec![call(
        "Map",
        "put",
        vec![Node::var("m"), Node::list(vec![]), Node::int(0)],
    )]);
    assert!(run(program).unwrap_err().is_kind("Native"));
}

// ============================================================================
// String
// ============================================================================

#[test]
fn test_string_case_and_trim() {
    assert_eq!(
        run(call("String", "upper", vec![Node::str("dem")])).unwrap(),
        Value::str("DEM")
    );
    assert_eq!(
        run(call("String", "lower", vec![Node::str("DeM")])).unwrap(),
        Value::str("dem")
    );
    assert_eq!(
        run(call("String", "trim", vec![Node::str("  pad  ")])).unwrap(),
        Value::str("pad")
    );
}

#[test]
fn test_string_counts_characters() {
    assert_eq!(
        run(call("String", "len", vec![Node::str("héllo")])).unwrap(),
        Value::int(5)
    );
    assert_eq!(
        run(call("String", "indexOf", vec![Node::str("héllo"), Node::str("l")])).unwrap(),
        Value::int(2)
    );
    assert_eq!(
        run(call(
            "String",
            "substring",
            vec![Node::str("héllo"), Node::int(1), Node::int(3)]
        ))
        .unwrap(),
        Value::str("él")
    );
    assert_eq!(
        run(call("String", "chars", vec![Node::str("ab")])).unwrap(),
        strs(&["a", "b"])
    );
}

#[test]
fn test_string_search_and_split() {
    assert_eq!(
        run(call("String", "indexOf", vec![Node::str("abc"), Node::str("z")])).unwrap(),
        Value::int(-1)
    );
    assert_eq!(
        run(call("String", "contains", vec![Node::str("abc"), Node::str("bc")])).unwrap(),
        Value::Bool(true)
    );
    assert_eq!(
        run(call("String", "split", vec![Node::str("a,b,,c"), Node::str(",")])).unwrap(),
        strs(&["a", "b", "", "c"])
    );
    assert_eq!(
        run(call(
            "String",
            "replace",
            vec![Node::str("a-b-c"), Node::str("-"), Node::str("+")]
        ))
        .unwrap(),
        Value::str("a+b+c")
    );
}

#[test]
fn test_string_errors() {
    let err = run(call("String", "split", vec![Node::str("abc"), Node::str("")])).unwrap_err();
    assert!(err.is_kind("Native"), "{err}");

    let err = run(call(
        "String",
        "substring",
        vec![Node::str("abc"), Node::int(1), Node::int(9)],
    ))
    .unwrap_err();
    assert!(err.is_kind("BoundsViolation"), "{err}");
}

// ============================================================================
// Memory
// ============================================================================

fn with_block(size: i32, body: Vec<Node>) -> Node {
    let mut nodes = vec![Node::let_("p", call("Memory", "alloc", vec![Node::int(size)]))];
    nodes.extend(body);
    Node::block(nodes)
}

fn at(offset: i32) -> Node {
    Node::binary(Operator::Add, Node::var("p"), Node::int(offset))
}

#[test]
fn test_memory_store_and_load() {
    let program = with_block(
        16,
        vec![
            call("Memory", "storeInt", vec![at(0), Node::int(-7)]),
            call("Memory", "storeDouble", vec![at(8), Node::double(1.5)]),
            Node::list(vec![
                call("Memory", "loadInt", vec![at(0)]),
                call("Memory", "loadByte", vec![at(0)]),
                call("Memory", "loadDouble", vec![at(8)]),
                call("Memory", "size", vec![Node::var("p")]),
            ]),
        ],
    );
    assert_eq!(
        run(program).unwrap(),
        Value::list(vec![
            Value::int(-7),
            Value::byte(-7),
            Value::double(1.5),
            Value::int(16),
        ])
    );
}

#[test]
fn test_memory_blocks_start_zeroed() {
    let program = with_block(8, vec![call("Memory", "loadLong", vec![Node::var("p")])]);
    assert_eq!(run(program).unwrap(), Value::long(0));
}

#[test]
fn test_memory_realloc_and_copy() {
    let program = with_block(
        4,
        vec![
            call("Memory", "storeShort", vec![at(0), Node::int(513)]),
            call("Memory", "realloc", vec![Node::var("p"), Node::int(8)]),
            call("Memory", "copy", vec![at(4), at(0), Node::int(2)]),
            Node::list(vec![
                call("Memory", "loadShort", vec![at(4)]),
                call("Memory", "size", vec![Node::var("p")]),
            ]),
        ],
    );
    assert_eq!(
        run(program).unwrap(),
        Value::list(vec![Value::short(513), Value::int(8)])
    );
}

#[test]
fn test_memory_out_of_block() {
    let program = with_block(4, vec![call("Memory", "loadInt", vec![at(2)])]);
    let err = run(program).unwrap_err();
    assert!(err.is_kind("BoundsViolation"), "{err}");
}

#[test]
fn test_memory_use_after_free() {
    let program = with_block(
        4,
        vec![
            call("Memory", "free", vec![Node::var("p")]),
            call("Memory", "loadInt", vec![Node::var("p")]),
        ],
    );
    let err = run(program).unwrap_err();
    assert!(err.is_kind("Native"), "{err}");
    assert!(err.to_string().contains("invalid address"), "{err}");

    let double_free = with_block(
        4,
        vec![
            call("Memory", "free", vec![Node::var("p")]),
            call("Memory", "free", vec![Node::var("p")]),
        ],
    );
    assert!(run(double_free).unwrap_err().is_kind("Native"));
}

#[test]
fn test_memory_free_rejects_interior_address() {
    let program = with_block(8, vec![call("Memory", "free", vec![at(4)])]);
    let err = run(program).unwrap_err();
    assert!(err.to_string().contains("not the start of a block"), "{err}");
}

#[test]
fn test_memory_rejects_negative_size() {
    let err = run(call("Memory", "alloc", vec![Node::int(-1)])).unwrap_err();
    assert!(err.is_kind("Native"), "{err}");
}

// ============================================================================
// types
// ============================================================================

#[test]
fn test_type_of() {
    assert_eq!(
        run(call("types", "typeOf", vec![Node::int(1)])).unwrap(),
        Value::str(Value::int(1).type_name())
    );
    assert_eq!(
        run(call("types", "typeOf", vec![Node::str("s")])).unwrap(),
        Value::str(Value::str("s").type_name())
    );
    assert_eq!(
        run(call("types", "isNull", vec![Node::null()])).unwrap(),
        Value::Bool(true)
    );
}

#[test]
fn test_numeric_conversions() {
    assert_eq!(
        run(call("types", "toInt", vec![Node::double(3.9)])).unwrap(),
        Value::int(3)
    );
    assert_eq!(
        run(call("types", "toInt", vec![Node::str(" 42 ")])).unwrap(),
        Value::int(42)
    );
    assert_eq!(
        run(call("types", "toLong", vec![Node::bool(true)])).unwrap(),
        Value::long(1)
    );
    assert_eq!(
        run(call("types", "toDouble", vec![Node::str("2.5")])).unwrap(),
        Value::double(2.5)
    );
    assert_eq!(
        run(call("types", "toFloat", vec![Node::int(2)])).unwrap(),
        Value::float(2.0)
    );
}

#[test]
fn test_to_string() {
    assert_eq!(
        run(call("types", "toString", vec![Node::int(12)])).unwrap(),
        Value::str("12")
    );
    assert_eq!(
        run(call("types", "toString", vec![Node::str("same")])).unwrap(),
        Value::str("same")
    );
}

#[test]
fn test_bad_conversion() {
    let err = run(call("types", "toInt", vec![Node::str("twelve")])).unwrap_err();
    assert!(err.is_kind("Native"), "{err}");
    let err = run(call("types", "toDouble", vec![Node::list(vec![])])).unwrap_err();
    assert!(err.is_kind("Native"), "{err}");
}
