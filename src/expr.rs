//! Typed expressions consumed by the transfer relation.
//!
//! One closed tagged union covers every expression kind the engine models;
//! anything the front end cannot express here (array accesses, unions,
//! floating point, unknown externs) arrives as [`Expr::Unknown`] and
//! degrades soundly downstream.

use std::fmt;

use num_bigint::BigInt;

/// A variable name qualified by its owning function scope.
///
/// Globals have no function; locals and parameters are scoped so that a
/// returning function's predicates can be identified and forgotten.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopedName {
    pub function: Option<String>,
    pub name: String,
}

impl ScopedName {
    pub fn global(name: impl Into<String>) -> Self {
        Self {
            function: None,
            name: name.into(),
        }
    }

    pub fn local(function: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            function: Some(function.into()),
            name: name.into(),
        }
    }

    /// True when this name belongs to the given function's scope.
    pub fn is_scoped_to(&self, function: &str) -> bool {
        self.function.as_deref() == Some(function)
    }
}

impl fmt::Display for ScopedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.function {
            Some(func) => write!(f, "{}::{}", func, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Resolved machine type of an expression: bit width and signedness.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct CType {
    pub width: usize,
    pub signed: bool,
}

impl CType {
    pub fn new(width: usize, signed: bool) -> Self {
        assert!(width > 0, "Type width must be positive");
        Self { width, signed }
    }

    /// One-bit boolean-like type.
    pub fn boolean() -> Self {
        Self::new(1, false)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    /// Arithmetic negation: `-e`
    Neg,
    /// Logical complement: `!e`
    Not,
    /// Bitwise complement: `~e`
    BitNot,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Shl,
    Shr,
    BitAnd,
    BitOr,
    BitXor,
    LogicalAnd,
    LogicalOr,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Expression tree over scoped variables and integer literals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    /// Integer literal.
    Literal(BigInt),
    /// Variable reference.
    Var(ScopedName),
    /// Unary operation.
    Unary(UnaryOp, Box<Expr>),
    /// Binary operation.
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    /// Explicit cast; `CType` is the operand's resolved *source* type. The
    /// surrounding context supplies the target width, and the source
    /// signedness decides the extension mode.
    Cast(CType, Box<Expr>),
    /// Unmodeled construct (array, union, float, extern call result).
    Unknown,
}

impl Expr {
    pub fn literal(value: impl Into<BigInt>) -> Self {
        Expr::Literal(value.into())
    }

    pub fn var(name: ScopedName) -> Self {
        Expr::Var(name)
    }

    pub fn unary(op: UnaryOp, e: Expr) -> Self {
        Expr::Unary(op, Box::new(e))
    }

    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary(op, Box::new(lhs), Box::new(rhs))
    }

    pub fn cast(ty: CType, e: Expr) -> Self {
        Expr::Cast(ty, Box::new(e))
    }

    /// Whether `name` occurs as a subterm — the self-reference test that
    /// decides the temp-binding path during assignment.
    pub fn contains_var(&self, name: &ScopedName) -> bool {
        match self {
            Expr::Literal(_) | Expr::Unknown => false,
            Expr::Var(v) => v == name,
            Expr::Unary(_, e) | Expr::Cast(_, e) => e.contains_var(name),
            Expr::Binary(_, lhs, rhs) => lhs.contains_var(name) || rhs.contains_var(name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scoped_name_display() {
        assert_eq!(ScopedName::global("g").to_string(), "g");
        assert_eq!(ScopedName::local("main", "x").to_string(), "main::x");
        assert!(ScopedName::local("main", "x").is_scoped_to("main"));
        assert!(!ScopedName::global("g").is_scoped_to("main"));
    }

    #[test]
    fn test_contains_var() {
        let a = ScopedName::local("f", "a");
        let b = ScopedName::local("f", "b");
        // a = !a is the classic self-reference.
        let e = Expr::unary(UnaryOp::Not, Expr::var(a.clone()));
        assert!(e.contains_var(&a));
        assert!(!e.contains_var(&b));

        let e = Expr::binary(
            BinaryOp::Add,
            Expr::literal(1),
            Expr::cast(CType::new(8, true), Expr::var(b.clone())),
        );
        assert!(e.contains_var(&b));
        assert!(!e.contains_var(&a));
        assert!(!Expr::Unknown.contains_var(&a));
    }
}
