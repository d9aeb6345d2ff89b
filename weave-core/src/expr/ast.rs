//! Expression syntax tree.

use std::sync::Arc;

use crate::value::Value;

/// A parsed expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Number, string, boolean, `null` or `undefined`.
    Literal(Value),
    Ident(String),
    Array(Vec<Element>),
    Object(Vec<Property>),
    /// `x => body`, `(a, b) => body`, `() => body`.
    Lambda {
        params: Arc<[String]>,
        body: Arc<Expr>,
    },
    /// `object.name`
    Member {
        object: Box<Expr>,
        name: String,
    },
    /// `object[index]`
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Element>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Logical {
        op: LogicalOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Conditional {
        test: Box<Expr>,
        consequent: Box<Expr>,
        alternate: Box<Expr>,
    },
    /// `target = value`. Compound assignments are desugared by the parser.
    Assign {
        target: Box<Expr>,
        value: Box<Expr>,
    },
    /// `a; b; c` evaluates each in turn and yields the last.
    Sequence(Vec<Expr>),
}

/// An array literal element or call argument.
#[derive(Debug, Clone, PartialEq)]
pub enum Element {
    Item(Expr),
    Spread(Expr),
}

/// An object literal member.
#[derive(Debug, Clone, PartialEq)]
pub enum Property {
    /// `name: value`, `"name": value` or shorthand `name`.
    Static { key: String, value: Expr },
    /// `[key]: value`
    Computed { key: Expr, value: Expr },
    /// `...source`
    Spread(Expr),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
    Plus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    StrictEq,
    StrictNe,
    Lt,
    Gt,
    Le,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
    Nullish,
}

impl Expr {
    /// Whether the expression is a valid assignment target.
    pub fn is_assignable(&self) -> bool {
        matches!(self, Expr::Ident(_) | Expr::Member { .. } | Expr::Index { .. })
    }
}
