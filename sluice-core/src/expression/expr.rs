use crate::{BinaryOpType, UnaryOpType, Value};
use std::{borrow::Cow, ops::Not};

/// Which record a member access refers to inside a two-record join predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

/// Predicate expression tree.
///
/// Usually produced by the `expr!` macro from closure syntax, where every access on a
/// closure parameter becomes a [`Expr::Column`] and everything else is evaluated on the
/// spot into a [`Expr::Value`].
///
/// ```rust
/// use sluice_core::Expr;
/// let expr = Expr::column("code")
///     .starts_with(Expr::value("AB"))
///     .and(Expr::column("deleted").equal(Expr::value(false)));
/// assert_eq!(expr.kind(), "And");
/// ```
#[derive(Debug, Clone)]
pub enum Expr {
    /// Member access on one of the predicate records.
    Column {
        member: Cow<'static, str>,
        side: Option<Side>,
    },
    /// Captured value, bound as a parameter.
    Value(Value),
    Binary {
        op: BinaryOpType,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Unary {
        op: UnaryOpType,
        arg: Box<Expr>,
    },
    Call {
        method: Cow<'static, str>,
        target: Box<Expr>,
        args: Vec<Expr>,
    },
    Conditional {
        condition: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    Index {
        target: Box<Expr>,
        index: Box<Expr>,
    },
}

impl Expr {
    pub fn column(member: impl Into<Cow<'static, str>>) -> Self {
        Expr::Column {
            member: member.into(),
            side: None,
        }
    }
    pub fn left(member: impl Into<Cow<'static, str>>) -> Self {
        Expr::Column {
            member: member.into(),
            side: Some(Side::Left),
        }
    }
    pub fn right(member: impl Into<Cow<'static, str>>) -> Self {
        Expr::Column {
            member: member.into(),
            side: Some(Side::Right),
        }
    }
    pub fn value(value: impl Into<Value>) -> Self {
        Expr::Value(value.into())
    }
    pub fn null() -> Self {
        Expr::Value(Value::Null)
    }

    pub fn binary(self, op: BinaryOpType, rhs: impl Into<Expr>) -> Self {
        Expr::Binary {
            op,
            lhs: Box::new(self),
            rhs: Box::new(rhs.into()),
        }
    }
    pub fn equal(self, rhs: impl Into<Expr>) -> Self {
        self.binary(BinaryOpType::Equal, rhs)
    }
    pub fn not_equal(self, rhs: impl Into<Expr>) -> Self {
        self.binary(BinaryOpType::NotEqual, rhs)
    }
    pub fn less(self, rhs: impl Into<Expr>) -> Self {
        self.binary(BinaryOpType::Less, rhs)
    }
    pub fn less_equal(self, rhs: impl Into<Expr>) -> Self {
        self.binary(BinaryOpType::LessEqual, rhs)
    }
    pub fn greater(self, rhs: impl Into<Expr>) -> Self {
        self.binary(BinaryOpType::Greater, rhs)
    }
    pub fn greater_equal(self, rhs: impl Into<Expr>) -> Self {
        self.binary(BinaryOpType::GreaterEqual, rhs)
    }
    pub fn and(self, rhs: impl Into<Expr>) -> Self {
        self.binary(BinaryOpType::And, rhs)
    }
    pub fn or(self, rhs: impl Into<Expr>) -> Self {
        self.binary(BinaryOpType::Or, rhs)
    }

    pub fn call(self, method: impl Into<Cow<'static, str>>, args: Vec<Expr>) -> Self {
        Expr::Call {
            method: method.into(),
            target: Box::new(self),
            args,
        }
    }
    pub fn starts_with(self, pattern: impl Into<Expr>) -> Self {
        self.call("starts_with", vec![pattern.into()])
    }
    pub fn ends_with(self, pattern: impl Into<Expr>) -> Self {
        self.call("ends_with", vec![pattern.into()])
    }
    pub fn contains(self, pattern: impl Into<Expr>) -> Self {
        self.call("contains", vec![pattern.into()])
    }
    pub fn equals(self, other: impl Into<Expr>) -> Self {
        self.call("equals", vec![other.into()])
    }
    /// Membership test against a list value, any other collection fails the compilation.
    pub fn is_in(self, collection: impl Into<Expr>) -> Self {
        self.call("is_in", vec![collection.into()])
    }

    /// Short name of the node, used in error messages.
    pub fn kind(&self) -> String {
        match self {
            Expr::Column { .. } => "Column".into(),
            Expr::Value(..) => "Value".into(),
            Expr::Binary { op, .. } => op.to_string(),
            Expr::Unary { op, .. } => op.to_string(),
            Expr::Call { method, .. } => format!("Call({method})"),
            Expr::Conditional { .. } => "Conditional".into(),
            Expr::Index { .. } => "Index".into(),
        }
    }

    pub fn is_null_value(&self) -> bool {
        matches!(self, Expr::Value(v) if v.is_null())
    }
}

impl Not for Expr {
    type Output = Expr;
    fn not(self) -> Self::Output {
        Expr::Unary {
            op: UnaryOpType::Not,
            arg: Box::new(self),
        }
    }
}

impl From<Value> for Expr {
    fn from(value: Value) -> Self {
        Expr::Value(value)
    }
}
