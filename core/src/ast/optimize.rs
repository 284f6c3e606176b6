//! Tree-level constant folding.
//!
//! `optimize` returns a node that evaluates to the same value. Only folds that
//! cannot fail at runtime are applied: integer division, out-of-range indexing
//! and anything with side effects are left for the VM.

use super::{Literal, Node, NodeKind, Operator, UnaryOp};

impl Node {
    pub fn optimize(self) -> Node {
        let span = self.span;
        let kind = match self.kind {
            NodeKind::Binary { op, left, right } => {
                let left = left.optimize();
                let right = right.optimize();
                match (&left.kind, &right.kind) {
                    (NodeKind::Literal(l), NodeKind::Literal(r)) => match fold_binary(op, l, r) {
                        Some(lit) => NodeKind::Literal(lit),
                        None => NodeKind::Binary {
                            op,
                            left: Box::new(left),
                            right: Box::new(right),
                        },
                    },
                    _ => NodeKind::Binary {
                        op,
                        left: Box::new(left),
                        right: Box::new(right),
                    },
                }
            }
            NodeKind::Unary { op, operand } => {
                let operand = operand.optimize();
                match &operand.kind {
                    NodeKind::Literal(lit) => match fold_unary(op, lit) {
                        Some(lit) => NodeKind::Literal(lit),
                        None => NodeKind::Unary {
                            op,
                            operand: Box::new(operand),
                        },
                    },
                    _ => NodeKind::Unary {
                        op,
                        operand: Box::new(operand),
                    },
                }
            }
            NodeKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                let cond = cond.optimize();
                let then_branch = then_branch.optimize();
                let else_branch = else_branch.map(|e| Box::new(e.optimize()));
                match &cond.kind {
                    NodeKind::Literal(Literal::Bool(true)) => return then_branch,
                    NodeKind::Literal(Literal::Bool(false)) => {
                        return match else_branch {
                            Some(e) => *e,
                            None => Node::null().with_span(span),
                        };
                    }
                    _ => NodeKind::If {
                        cond: Box::new(cond),
                        then_branch: Box::new(then_branch),
                        else_branch,
                    },
                }
            }
            NodeKind::Let { name, ty, value } => NodeKind::Let {
                name,
                ty,
                value: Box::new(value.optimize()),
            },
            NodeKind::Assign { name, value } => NodeKind::Assign {
                name,
                value: Box::new(value.optimize()),
            },
            NodeKind::While { cond, body } => NodeKind::While {
                cond: Box::new(cond.optimize()),
                body: Box::new(body.optimize()),
            },
            NodeKind::Block(nodes) => NodeKind::Block(nodes.into_iter().map(Node::optimize).collect()),
            NodeKind::Function(mut decl) => {
                decl.body = decl.body.optimize();
                NodeKind::Function(decl)
            }
            NodeKind::Call {
                callee,
                generics,
                args,
            } => NodeKind::Call {
                callee: Box::new(callee.optimize()),
                generics,
                args: args.into_iter().map(Node::optimize).collect(),
            },
            NodeKind::Return(value) => NodeKind::Return(value.map(|v| Box::new(v.optimize()))),
            NodeKind::List(items) => NodeKind::List(items.into_iter().map(Node::optimize).collect()),
            NodeKind::Map(entries) => NodeKind::Map(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.optimize(), v.optimize()))
                    .collect(),
            ),
            NodeKind::Index { target, index } => NodeKind::Index {
                target: Box::new(target.optimize()),
                index: Box::new(index.optimize()),
            },
            NodeKind::SetIndex {
                target,
                index,
                value,
            } => NodeKind::SetIndex {
                target: Box::new(target.optimize()),
                index: Box::new(index.optimize()),
                value: Box::new(value.optimize()),
            },
            NodeKind::Access { target, name } => NodeKind::Access {
                target: Box::new(target.optimize()),
                name,
            },
            NodeKind::NativeCall {
                library,
                method,
                args,
            } => NodeKind::NativeCall {
                library,
                method,
                args: args.into_iter().map(Node::optimize).collect(),
            },
            NodeKind::Match {
                subject,
                arms,
                default,
            } => NodeKind::Match {
                subject: Box::new(subject.optimize()),
                arms: arms
                    .into_iter()
                    .map(|mut arm| {
                        arm.body = arm.body.optimize();
                        arm
                    })
                    .collect(),
                default: default.map(|d| Box::new(d.optimize())),
            },
            kind @ (NodeKind::Literal(_) | NodeKind::Variable(_) | NodeKind::Enum { .. }) => kind,
        };
        Node { kind, span }
    }
}

fn fold_binary(op: Operator, left: &Literal, right: &Literal) -> Option<Literal> {
    use Literal::*;
    match (left, right) {
        (Int(a), Int(b)) => match op {
            Operator::Add => Some(Int(a.wrapping_add(*b))),
            Operator::Sub => Some(Int(a.wrapping_sub(*b))),
            Operator::Mul => Some(Int(a.wrapping_mul(*b))),
            _ => fold_comparison(op, a, b),
        },
        (Long(a), Long(b)) => match op {
            Operator::Add => Some(Long(a.wrapping_add(*b))),
            Operator::Sub => Some(Long(a.wrapping_sub(*b))),
            Operator::Mul => Some(Long(a.wrapping_mul(*b))),
            _ => fold_comparison(op, a, b),
        },
        (Double(a), Double(b)) => match op {
            Operator::Add => Some(Double(a + b)),
            Operator::Sub => Some(Double(a - b)),
            Operator::Mul => Some(Double(a * b)),
            Operator::Div => Some(Double(a / b)),
            _ => fold_comparison(op, a, b),
        },
        (Bool(a), Bool(b)) => match op {
            Operator::And => Some(Bool(*a && *b)),
            Operator::Or => Some(Bool(*a || *b)),
            Operator::Eq => Some(Bool(a == b)),
            Operator::Ne => Some(Bool(a != b)),
            _ => None,
        },
        (Str(a), Str(b)) if op == Operator::Add => Some(Str(format!("{a}{b}"))),
        _ => None,
    }
}

fn fold_comparison<T: PartialOrd>(op: Operator, a: &T, b: &T) -> Option<Literal> {
    let result = match op {
        Operator::Eq => a == b,
        Operator::Ne => a != b,
        Operator::Lt => a < b,
        Operator::Le => a <= b,
        Operator::Gt => a > b,
        Operator::Ge => a >= b,
        _ => return None,
    };
    Some(Literal::Bool(result))
}

fn fold_unary(op: UnaryOp, lit: &Literal) -> Option<Literal> {
    match (op, lit) {
        (UnaryOp::Neg, Literal::Int(v)) => Some(Literal::Int(v.wrapping_neg())),
        (UnaryOp::Neg, Literal::Long(v)) => Some(Literal::Long(v.wrapping_neg())),
        (UnaryOp::Neg, Literal::Double(v)) => Some(Literal::Double(-v)),
        (UnaryOp::Neg, Literal::Float(v)) => Some(Literal::Float(-v)),
        (UnaryOp::Not, Literal::Bool(b)) => Some(Literal::Bool(!b)),
        (UnaryOp::BitNot, Literal::Int(v)) => Some(Literal::Int(!v)),
        (UnaryOp::BitNot, Literal::Long(v)) => Some(Literal::Long(!v)),
        _ => None,
    }
}
