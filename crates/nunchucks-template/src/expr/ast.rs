//! Expression syntax tree.

use crate::value::Value;

/// A parsed expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A literal value.
    Literal(Value),
    /// A variable reference.
    Name(String),
    /// `[a, b, c]`
    List(Vec<Expr>),
    /// `{key: value, ...}`
    Dict(Vec<(Expr, Expr)>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    /// Short-circuit `and`; yields a boolean.
    And(Box<Expr>, Box<Expr>),
    /// Short-circuit `or`; yields a boolean.
    Or(Box<Expr>, Box<Expr>),
    /// A comparison chain: `a < b < c`, `x in xs`, `n is odd`.
    Compare(Box<Expr>, Vec<Comparison>),
    /// `then if cond else otherwise`
    Conditional {
        then: Box<Expr>,
        cond: Box<Expr>,
        otherwise: Option<Box<Expr>>,
    },
    /// `target.name`
    Attr(Box<Expr>, String),
    /// `target[index]`
    Index(Box<Expr>, Box<Expr>),
    /// `target(args, name=value)`
    Call {
        target: Box<Expr>,
        args: Vec<Expr>,
        kwargs: Vec<(String, Expr)>,
    },
    /// `target | name(args)`
    Filter(Box<Expr>, FilterCall),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
    Pos,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// One link of a comparison chain. Each link compares against the value
/// produced by the previous one.
#[derive(Debug, Clone, PartialEq)]
pub enum Comparison {
    Op(CompareOp, Expr),
    /// `in` / `not in`
    In { negated: bool, container: Expr },
    /// `is [not] name(args)` for a known test name.
    Test {
        negated: bool,
        name: String,
        args: Vec<Expr>,
    },
    /// `is [not] expr` when the name is not a test: plain equality.
    IsEq { negated: bool, other: Expr },
}

/// A filter application: `name` or `name(args)`.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterCall {
    pub name: String,
    pub args: Vec<Expr>,
}
