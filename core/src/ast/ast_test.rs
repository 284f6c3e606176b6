use super::*;
use pretty_assertions::assert_eq;

#[test]
fn test_fold_integer_arithmetic() {
    let node = Node::binary(
        Operator::Mul,
        Node::binary(Operator::Add, Node::int(2), Node::int(3)),
        Node::int(4),
    );
    assert_eq!(node.optimize(), Node::int(20));
}

#[test]
fn test_fold_keeps_mixed_kinds() {
    // Widening is the type system's job; the optimizer only folds same-kind literals.
    let node = Node::binary(Operator::Add, Node::int(1), Node::double(2.0));
    assert_eq!(node.clone().optimize(), node);
}

#[test]
fn test_fold_does_not_touch_division() {
    let node = Node::binary(Operator::Div, Node::int(1), Node::int(0));
    assert_eq!(node.clone().optimize(), node);
}

#[test]
fn test_fold_string_concat() {
    let node = Node::binary(Operator::Add, Node::str("ab"), Node::str("cd"));
    assert_eq!(node.optimize(), Node::str("abcd"));
}

#[test]
fn test_fold_unary() {
    assert_eq!(Node::unary(UnaryOp::Neg, Node::int(5)).optimize(), Node::int(-5));
    assert_eq!(
        Node::unary(UnaryOp::Not, Node::bool(true)).optimize(),
        Node::bool(false)
    );
}

#[test]
fn test_fold_constant_if() {
    let node = Node::if_(Node::bool(false), Node::int(1), Some(Node::int(2)));
    assert_eq!(node.optimize(), Node::int(2));

    let node = Node::if_(
        Node::binary(Operator::Lt, Node::int(1), Node::int(2)),
        Node::str("yes"),
        None,
    );
    assert_eq!(node.optimize(), Node::str("yes"));
}

#[test]
fn test_optimize_preserves_span() {
    let node = Node::binary(Operator::Add, Node::int(1), Node::int(1)).with_span(Span::new(3, 8));
    assert_eq!(node.optimize().span, Span::new(3, 8));
}

#[test]
fn test_children_order() {
    let node = Node::call(Node::var("f"), vec![Node::int(1), Node::int(2)]);
    let children: Vec<String> = node.children().iter().map(|c| c.visualize()).collect();
    assert_eq!(children, vec!["f", "1", "2"]);

    let node = Node::if_(Node::var("c"), Node::int(1), None);
    assert_eq!(node.children().len(), 2);
}

#[test]
fn test_visualize() {
    let node = Node::block(vec![
        Node::let_("x", Node::binary(Operator::Add, Node::int(1), Node::long(2))),
        Node::native("System", "println", vec![Node::var("x")]),
    ]);
    assert_eq!(
        node.visualize(),
        "(block (let x (+ 1 2L)) (System.println x))"
    );
}

#[test]
fn test_visualize_enum_and_function() {
    let node = Node::enum_("Shape", &[("Circle", &["r"]), ("Square", &["side"])]);
    assert_eq!(node.visualize(), "(enum Shape Circle Square)");

    let node = Node::function(FunctionDecl {
        name: Some("id".to_string()),
        generics: vec!["T".to_string()],
        params: vec![Param {
            name: "x".to_string(),
            ty: TypeExpr::named("T"),
        }],
        ret: TypeExpr::named("T"),
        body: Node::var("x"),
    });
    assert_eq!(node.visualize(), "(fn id[x] x)");
}
