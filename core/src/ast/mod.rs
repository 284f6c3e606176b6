//! The AST consumed by the compiler.
//!
//! The textual frontend lives outside this crate; it hands over a tree of
//! [`Node`]s. Every node can be optimized into an equivalent node, exposes its
//! children and renders a human-readable visualization.

mod ops;
mod optimize;

#[cfg(test)]
mod ast_test;

use core::ops::Range;

pub use ops::{Operator, UnaryOp};

/// Byte range into the source text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Span(pub Range<usize>);

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Span(start..end)
    }

    pub fn start(&self) -> usize {
        self.0.start
    }

    pub fn end(&self) -> usize {
        self.0.end
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Str(String),
    Bytes(Vec<u8>),
}

/// Type annotation as written by the user.
///
/// Named annotations are resolved by the compiler: builtin names (`int`,
/// `list`, ...), the function's generic parameters, then declared enums.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeExpr {
    Named(String),
    Function {
        params: Vec<TypeExpr>,
        ret: Box<TypeExpr>,
    },
}

impl TypeExpr {
    pub fn named(name: &str) -> Self {
        TypeExpr::Named(name.to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: TypeExpr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Variant {
    pub name: String,
    pub properties: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchArm {
    /// Variant name, resolved against the subject's enum.
    pub variant: String,
    /// Names bound positionally to the variant's properties.
    pub bindings: Vec<String>,
    pub body: Node,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    pub name: Option<String>,
    pub generics: Vec<String>,
    pub params: Vec<Param>,
    pub ret: TypeExpr,
    pub body: Node,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Literal(Literal),
    Variable(String),
    Let {
        name: String,
        ty: Option<TypeExpr>,
        value: Box<Node>,
    },
    Assign {
        name: String,
        value: Box<Node>,
    },
    Binary {
        op: Operator,
        left: Box<Node>,
        right: Box<Node>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Node>,
    },
    If {
        cond: Box<Node>,
        then_branch: Box<Node>,
        else_branch: Option<Box<Node>>,
    },
    While {
        cond: Box<Node>,
        body: Box<Node>,
    },
    Block(Vec<Node>),
    Function(Box<FunctionDecl>),
    Call {
        callee: Box<Node>,
        generics: Vec<TypeExpr>,
        args: Vec<Node>,
    },
    Return(Option<Box<Node>>),
    List(Vec<Node>),
    Map(Vec<(Node, Node)>),
    Index {
        target: Box<Node>,
        index: Box<Node>,
    },
    SetIndex {
        target: Box<Node>,
        index: Box<Node>,
        value: Box<Node>,
    },
    Access {
        target: Box<Node>,
        name: String,
    },
    NativeCall {
        library: String,
        method: String,
        args: Vec<Node>,
    },
    Enum {
        name: String,
        variants: Vec<Variant>,
    },
    Match {
        subject: Box<Node>,
        arms: Vec<MatchArm>,
        default: Option<Box<Node>>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    pub span: Span,
}

impl Node {
    pub fn new(kind: NodeKind) -> Self {
        Node {
            kind,
            span: Span::default(),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    // Builders used by hosts that construct trees programmatically.

    pub fn literal(lit: Literal) -> Self {
        Node::new(NodeKind::Literal(lit))
    }
    pub fn null() -> Self {
        Node::literal(Literal::Null)
    }
    pub fn bool(value: bool) -> Self {
        Node::literal(Literal::Bool(value))
    }
    pub fn int(value: i32) -> Self {
        Node::literal(Literal::Int(value))
    }
    pub fn long(value: i64) -> Self {
        Node::literal(Literal::Long(value))
    }
    pub fn double(value: f64) -> Self {
        Node::literal(Literal::Double(value))
    }
    pub fn str(value: &str) -> Self {
        Node::literal(Literal::Str(value.to_string()))
    }
    pub fn var(name: &str) -> Self {
        Node::new(NodeKind::Variable(name.to_string()))
    }
    pub fn let_(name: &str, value: Node) -> Self {
        Node::new(NodeKind::Let {
            name: name.to_string(),
            ty: None,
            value: Box::new(value),
        })
    }
    pub fn assign(name: &str, value: Node) -> Self {
        Node::new(NodeKind::Assign {
            name: name.to_string(),
            value: Box::new(value),
        })
    }
    pub fn binary(op: Operator, left: Node, right: Node) -> Self {
        Node::new(NodeKind::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }
    pub fn unary(op: UnaryOp, operand: Node) -> Self {
        Node::new(NodeKind::Unary {
            op,
            operand: Box::new(operand),
        })
    }
    pub fn if_(cond: Node, then_branch: Node, else_branch: Option<Node>) -> Self {
        Node::new(NodeKind::If {
            cond: Box::new(cond),
            then_branch: Box::new(then_branch),
            else_branch: else_branch.map(Box::new),
        })
    }
    pub fn while_(cond: Node, body: Node) -> Self {
        Node::new(NodeKind::While {
            cond: Box::new(cond),
            body: Box::new(body),
        })
    }
    pub fn block(nodes: Vec<Node>) -> Self {
        Node::new(NodeKind::Block(nodes))
    }
    pub fn function(decl: FunctionDecl) -> Self {
        Node::new(NodeKind::Function(Box::new(decl)))
    }
    pub fn call(callee: Node, args: Vec<Node>) -> Self {
        Node::new(NodeKind::Call {
            callee: Box::new(callee),
            generics: Vec::new(),
            args,
        })
    }
    pub fn ret(value: Option<Node>) -> Self {
        Node::new(NodeKind::Return(value.map(Box::new)))
    }
    pub fn list(items: Vec<Node>) -> Self {
        Node::new(NodeKind::List(items))
    }
    pub fn map(entries: Vec<(Node, Node)>) -> Self {
        Node::new(NodeKind::Map(entries))
    }
    pub fn index(target: Node, index: Node) -> Self {
        Node::new(NodeKind::Index {
            target: Box::new(target),
            index: Box::new(index),
        })
    }
    pub fn set_index(target: Node, index: Node, value: Node) -> Self {
        Node::new(NodeKind::SetIndex {
            target: Box::new(target),
            index: Box::new(index),
            value: Box::new(value),
        })
    }
    pub fn access(target: Node, name: &str) -> Self {
        Node::new(NodeKind::Access {
            target: Box::new(target),
            name: name.to_string(),
        })
    }
    pub fn native(library: &str, method: &str, args: Vec<Node>) -> Self {
        Node::new(NodeKind::NativeCall {
            library: library.to_string(),
            method: method.to_string(),
            args,
        })
    }
    pub fn enum_(name: &str, variants: &[(&str, &[&str])]) -> Self {
        Node::new(NodeKind::Enum {
            name: name.to_string(),
            variants: variants
                .iter()
                .map(|(name, props)| Variant {
                    name: name.to_string(),
                    properties: props.iter().map(|p| p.to_string()).collect(),
                })
                .collect(),
        })
    }
    pub fn match_(subject: Node, arms: Vec<MatchArm>, default: Option<Node>) -> Self {
        Node::new(NodeKind::Match {
            subject: Box::new(subject),
            arms,
            default: default.map(Box::new),
        })
    }

    /// Direct children in evaluation order.
    pub fn children(&self) -> Vec<&Node> {
        match &self.kind {
            NodeKind::Literal(_) | NodeKind::Variable(_) | NodeKind::Enum { .. } => Vec::new(),
            NodeKind::Let { value, .. } | NodeKind::Assign { value, .. } => vec![&**value],
            NodeKind::Binary { left, right, .. } => vec![&**left, &**right],
            NodeKind::Unary { operand, .. } => vec![&**operand],
            NodeKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                let mut out = vec![&**cond, &**then_branch];
                out.extend(else_branch.as_deref());
                out
            }
            NodeKind::While { cond, body } => vec![&**cond, &**body],
            NodeKind::Block(nodes) | NodeKind::List(nodes) => nodes.iter().collect(),
            NodeKind::Function(decl) => vec![&decl.body],
            NodeKind::Call { callee, args, .. } => {
                let mut out = vec![&**callee];
                out.extend(args.iter());
                out
            }
            NodeKind::Return(value) => value.as_deref().into_iter().collect(),
            NodeKind::Map(entries) => entries.iter().flat_map(|(k, v)| [k, v]).collect(),
            NodeKind::Index { target, index } => vec![&**target, &**index],
            NodeKind::SetIndex {
                target,
                index,
                value,
            } => vec![&**target, &**index, &**value],
            NodeKind::Access { target, .. } => vec![&**target],
            NodeKind::NativeCall { args, .. } => args.iter().collect(),
            NodeKind::Match {
                subject,
                arms,
                default,
            } => {
                let mut out = vec![&**subject];
                out.extend(arms.iter().map(|arm| &arm.body));
                out.extend(default.as_deref());
                out
            }
        }
    }

    /// Renders the tree as an s-expression.
    pub fn visualize(&self) -> String {
        let mut out = String::new();
        self.visualize_into(&mut out);
        out
    }

    fn visualize_into(&self, out: &mut String) {
        use core::fmt::Write;

        let list = |out: &mut String, head: &str, children: &[&Node]| {
            out.push('(');
            out.push_str(head);
            for child in children {
                out.push(' ');
                child.visualize_into(out);
            }
            out.push(')');
        };

        match &self.kind {
            NodeKind::Literal(lit) => match lit {
                Literal::Null => out.push_str("null"),
                Literal::Bool(b) => {
                    let _ = write!(out, "{b}");
                }
                Literal::Byte(v) => {
                    let _ = write!(out, "{v}b");
                }
                Literal::Short(v) => {
                    let _ = write!(out, "{v}s");
                }
                Literal::Int(v) => {
                    let _ = write!(out, "{v}");
                }
                Literal::Long(v) => {
                    let _ = write!(out, "{v}L");
                }
                Literal::Float(v) => {
                    let _ = write!(out, "{v:?}f");
                }
                Literal::Double(v) => {
                    let _ = write!(out, "{v:?}");
                }
                Literal::Str(s) => {
                    let _ = write!(out, "{s:?}");
                }
                Literal::Bytes(b) => {
                    let _ = write!(out, "b{b:?}");
                }
            },
            NodeKind::Variable(name) => out.push_str(name),
            NodeKind::Let { name, .. } => list(out, &format!("let {name}"), &self.children()),
            NodeKind::Assign { name, .. } => list(out, &format!("set {name}"), &self.children()),
            NodeKind::Binary { op, .. } => list(out, op.symbol(), &self.children()),
            NodeKind::Unary { op, .. } => list(out, op.symbol(), &self.children()),
            NodeKind::If { .. } => list(out, "if", &self.children()),
            NodeKind::While { .. } => list(out, "while", &self.children()),
            NodeKind::Block(_) => list(out, "block", &self.children()),
            NodeKind::Function(decl) => {
                let params: Vec<&str> = decl.params.iter().map(|p| p.name.as_str()).collect();
                let head = format!(
                    "fn {}[{}]",
                    decl.name.as_deref().unwrap_or("<anonymous>"),
                    params.join(" ")
                );
                list(out, &head, &self.children())
            }
            NodeKind::Call { .. } => list(out, "call", &self.children()),
            NodeKind::Return(_) => list(out, "return", &self.children()),
            NodeKind::List(_) => list(out, "list", &self.children()),
            NodeKind::Map(_) => list(out, "map", &self.children()),
            NodeKind::Index { .. } => list(out, "[]", &self.children()),
            NodeKind::SetIndex { .. } => list(out, "[]=", &self.children()),
            NodeKind::Access { name, .. } => list(out, &format!(".{name}"), &self.children()),
            NodeKind::NativeCall {
                library, method, ..
            } => list(out, &format!("{library}.{method}"), &self.children()),
            NodeKind::Enum { name, variants } => {
                let names: Vec<&str> = variants.iter().map(|v| v.name.as_str()).collect();
                let _ = write!(out, "(enum {name} {})", names.join(" "));
            }
            NodeKind::Match { .. } => list(out, "match", &self.children()),
        }
    }
}
