//! Whole programs compiled and run through the public engine API.

use bumpalo::Bump;
use dem_core::{
    api::{CompileOptions, Engine, EngineOptions, ExecutionOptions},
    ast::{FunctionDecl, MatchArm, Node, Operator, Param, Span, TypeExpr},
    errors::Stage,
    stdlib::{NativeError, NativeFunction},
    values::Value,
    vm::Vm,
};
use pretty_assertions::assert_eq;

fn func(name: Option<&str>, params: &[(&str, &str)], ret: &str, body: Node) -> Node {
    Node::function(FunctionDecl {
        name: name.map(str::to_string),
        generics: Vec::new(),
        params: params
            .iter()
            .map(|(name, ty)| Param {
                name: name.to_string(),
                ty: TypeExpr::named(ty),
            })
            .collect(),
        ret: TypeExpr::named(ret),
        body,
    })
}

fn bin(op: Operator, left: Node, right: Node) -> Node {
    Node::binary(op, left, right)
}

fn call(name: &str, args: Vec<Node>) -> Node {
    Node::call(Node::var(name), args)
}

fn run(program: &Node) -> Result<Value, dem_core::errors::Error> {
    let arena = Bump::new();
    let engine = Engine::new(&arena, EngineOptions::default());
    let chunk = engine.compile(program)?;
    engine.run_with(&chunk, ExecutionOptions::default(), Box::new(std::io::sink()))
}

#[test]
fn test_recursive_factorial() {
    let fact = func(
        Some("fact"),
        &[("n", "int")],
        "int",
        Node::if_(
            bin(Operator::Le, Node::var("n"), Node::int(1)),
            Node::int(1),
            Some(bin(
                Operator::Mul,
                Node::var("n"),
                call("fact", vec![bin(Operator::Sub, Node::var("n"), Node::int(1))]),
            )),
        ),
    );
    let program = Node::block(vec![fact, call("fact", vec![Node::int(10)])]);
    assert_eq!(run(&program).unwrap(), Value::int(3_628_800));
}

#[test]
fn test_loop_accumulates() {
    let program = Node::block(vec![
        Node::let_("i", Node::int(0)),
        Node::let_("total", Node::int(0)),
        Node::while_(
            bin(Operator::Lt, Node::var("i"), Node::int(100)),
            Node::block(vec![
                Node::assign("i", bin(Operator::Add, Node::var("i"), Node::int(1))),
                Node::assign("total", bin(Operator::Add, Node::var("total"), Node::var("i"))),
            ]),
        ),
        Node::var("total"),
    ]);
    assert_eq!(run(&program).unwrap(), Value::int(5050));
}

#[test]
fn test_optimizer_preserves_results() {
    let program = Node::block(vec![
        Node::let_("x", bin(Operator::Mul, Node::int(6), Node::int(7))),
        bin(Operator::Sub, Node::var("x"), bin(Operator::Add, Node::int(1), Node::int(1))),
    ]);

    let arena = Bump::new();
    let engine = Engine::new(&arena, EngineOptions::default());
    let folded = engine
        .compile_with(CompileOptions { optimize: true }, &program)
        .unwrap();
    let plain = engine
        .compile_with(CompileOptions { optimize: false }, &program)
        .unwrap();

    assert!(folded.instructions.len() < plain.instructions.len());
    assert_eq!(engine.run(&folded).unwrap(), Value::int(40));
    assert_eq!(engine.run(&plain).unwrap(), Value::int(40));
}

#[test]
fn test_closures_are_independent() {
    let make_adder = func(
        Some("adder"),
        &[("n", "int")],
        "any",
        func(None, &[("x", "int")], "int", bin(Operator::Add, Node::var("x"), Node::var("n"))),
    );
    let program = Node::block(vec![
        make_adder,
        Node::let_("inc", call("adder", vec![Node::int(1)])),
        Node::let_("ten", call("adder", vec![Node::int(10)])),
        Node::list(vec![
            call("inc", vec![Node::int(5)]),
            call("ten", vec![Node::int(5)]),
        ]),
    ]);
    assert_eq!(
        run(&program).unwrap(),
        Value::list(vec![Value::int(6), Value::int(15)])
    );
}

#[test]
fn test_enum_dispatch() {
    let arm = |variant: &str, bindings: &[&str], body: Node| MatchArm {
        variant: variant.to_string(),
        bindings: bindings.iter().map(|b| b.to_string()).collect(),
        body,
    };
    let describe = func(
        Some("describe"),
        &[("t", "Token")],
        "str",
        Node::match_(
            Node::var("t"),
            vec![
                arm("Word", &["text"], Node::var("text")),
                arm("Number", &["value"], Node::native("types", "toString", vec![Node::var("value")])),
            ],
            Some(Node::str("end")),
        ),
    );
    let token = |variant: &str, args: Vec<Node>| {
        Node::call(Node::access(Node::var("Token"), variant), args)
    };
    let program = Node::block(vec![
        Node::enum_("Token", &[("Word", &["text"]), ("Number", &["value"]), ("End", &[])]),
        describe,
        Node::list(vec![
            call("describe", vec![token("Word", vec![Node::str("let")])]),
            call("describe", vec![token("Number", vec![Node::int(7)])]),
            call("describe", vec![token("End", vec![])]),
        ]),
    ]);
    assert_eq!(
        run(&program).unwrap(),
        Value::list(vec![Value::str("let"), Value::str("7"), Value::str("end")])
    );
}

#[test]
fn test_host_native() {
    fn twice(_: &mut Vm<'_, '_>, args: &[Value]) -> Result<Value, NativeError> {
        let n = args[0]
            .as_i64()
            .ok_or_else(|| NativeError::failed("Host.twice", "expected an integer"))?;
        Ok(Value::long(n * 2))
    }

    let arena = Bump::new();
    let engine = Engine::with_natives(&arena, EngineOptions::default(), |registry| {
        registry.register("Host", "twice", NativeFunction::new(&["long"], "long", twice));
    });
    let program = Node::native("Host", "twice", vec![Node::long(21)]);
    let chunk = engine.compile(&program).unwrap();
    assert_eq!(engine.run(&chunk).unwrap(), Value::long(42));

    let unknown = Node::native("Host", "thrice", vec![Node::long(1)]);
    let err = engine.compile(&unknown).unwrap_err();
    assert!(err.is_kind("Undefined"), "{err}");
}

#[test]
fn test_output_goes_to_sink() {
    let program = Node::block(vec![
        Node::let_("names", Node::list(vec![Node::str("ada"), Node::str("bob")])),
        Node::let_("i", Node::int(0)),
        Node::while_(
            bin(
                Operator::Lt,
                Node::var("i"),
                Node::native("List", "len", vec![Node::var("names")]),
            ),
            Node::block(vec![
                Node::native(
                    "System",
                    "println",
                    vec![Node::native(
                        "List",
                        "get",
                        vec![Node::var("names"), Node::var("i")],
                    )],
                ),
                Node::assign("i", bin(Operator::Add, Node::var("i"), Node::int(1))),
            ]),
        ),
    ]);

    let arena = Bump::new();
    let engine = Engine::new(&arena, EngineOptions::default());
    let chunk = engine.compile(&program).unwrap();
    let mut out: Vec<u8> = Vec::new();
    engine
        .run_with(&chunk, ExecutionOptions::default(), Box::new(&mut out))
        .unwrap();
    assert_eq!(String::from_utf8(out).unwrap(), "ada\nbob\n");
}

#[test]
fn test_runtime_error_location() {
    let program = Node::block(vec![
        Node::let_("zero", Node::int(0)).with_span(Span::new(0, 12)),
        bin(Operator::Div, Node::int(10), Node::var("zero")).with_span(Span::new(13, 22)),
    ]);
    let err = run(&program).unwrap_err();
    assert!(err.is_kind("DivisionByZero"), "{err}");
    assert_eq!(err.stage, Stage::VirtualMachine);
    assert_eq!(err.span, Some(Span::new(13, 22)));
}

#[test]
fn test_native_bounds_violation() {
    let program = Node::native(
        "List",
        "get",
        vec![Node::list(vec![Node::int(1)]), Node::int(5)],
    );
    let err = run(&program).unwrap_err();
    assert!(err.is_kind("BoundsViolation"), "{err}");
    assert_eq!(err.stage, Stage::VirtualMachine);
}

#[test]
fn test_runaway_recursion_is_bounded() {
    let forever = func(Some("forever"), &[("n", "int")], "int", call("forever", vec![Node::var("n")]));
    let program = Node::block(vec![forever, call("forever", vec![Node::int(0)])]);

    let arena = Bump::new();
    let engine = Engine::new(&arena, EngineOptions::default());
    let chunk = engine.compile(&program).unwrap();
    let options = ExecutionOptions {
        max_depth: 64,
        ..ExecutionOptions::default()
    };
    let err = engine
        .run_with(&chunk, options, Box::new(std::io::sink()))
        .unwrap_err();
    assert!(err.is_kind("ResourceExceeded"), "{err}");
}

#[test]
fn test_heap_program() {
    let at = |offset: i32| bin(Operator::Add, Node::var("buf"), Node::int(offset * 4));
    let program = Node::block(vec![
        Node::let_("buf", Node::native("Memory", "alloc", vec![Node::int(40)])),
        Node::let_("i", Node::int(0)),
        Node::while_(
            bin(Operator::Lt, Node::var("i"), Node::int(10)),
            Node::block(vec![
                Node::native(
                    "Memory",
                    "storeInt",
                    vec![
                        bin(
                            Operator::Add,
                            Node::var("buf"),
                            bin(Operator::Mul, Node::var("i"), Node::int(4)),
                        ),
                        bin(Operator::Mul, Node::var("i"), Node::var("i")),
                    ],
                ),
                Node::assign("i", bin(Operator::Add, Node::var("i"), Node::int(1))),
            ]),
        ),
        Node::let_(
            "sum",
            bin(
                Operator::Add,
                Node::native("Memory", "loadInt", vec![at(3)]),
                Node::native("Memory", "loadInt", vec![at(9)]),
            ),
        ),
        Node::native("Memory", "free", vec![Node::var("buf")]),
        Node::var("sum"),
    ]);
    assert_eq!(run(&program).unwrap(), Value::int(90));
}

#[test]
fn test_compile_errors_have_spans() {
    let program = Node::block(vec![
        Node::let_("x", Node::int(1)),
        bin(Operator::Add, Node::var("x"), Node::str("one")).with_span(Span::new(4, 11)),
    ]);
    let arena = Bump::new();
    let engine = Engine::new(&arena, EngineOptions::default());
    let err = engine.compile(&program).unwrap_err();
    assert!(err.is_kind("TypeMismatch"), "{err}");
    assert_eq!(err.stage, Stage::Compiler);
    assert_eq!(err.span, Some(Span::new(4, 11)));
}
