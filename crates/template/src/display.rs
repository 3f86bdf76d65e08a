//! Template and value stringification

use crate::{
    Template, TemplateChunk, Value,
    expression::{Expression, Literal, UnaryOp},
    parse::{EXPRESSION_CLOSE, EXPRESSION_OPEN, FALSE, NULL, TRUE},
};
use itertools::Itertools;
use std::{
    borrow::Cow,
    fmt::{self, Display, Write},
};

impl Template {
    /// Convert the template back to a string. This will only allocate for
    /// dynamic templates. This is not guaranteed to return the exact string
    /// that was parsed to create the template, as whitespace within
    /// expressions is variable.
    pub fn display(&self) -> Cow<'_, str> {
        match self.chunks.as_slice() {
            [] => Cow::Borrowed(""),
            [TemplateChunk::Raw(text)] => Cow::Borrowed(text),
            chunks => {
                let mut buf = String::new();
                for chunk in chunks {
                    match chunk {
                        TemplateChunk::Raw(text) => buf.push_str(text),
                        TemplateChunk::Expression(expression) => write!(
                            buf,
                            "{EXPRESSION_OPEN} {expression} {EXPRESSION_CLOSE}"
                        )
                        .expect("writing to string is infallible"),
                    }
                }
                Cow::Owned(buf)
            }
        }
    }
}

impl Expression {
    /// Binding strength, used to re-insert parentheses where a child binds
    /// more loosely than its parent
    fn precedence(&self) -> u8 {
        use crate::expression::BinaryOp::*;
        match self {
            Self::Binary { op, .. } => match op {
                Or => 1,
                And => 2,
                Eq | Ne | Lt | Le | Gt | Ge => 4,
                Add | Sub => 5,
                Mul | Div | FloorDiv | Rem => 6,
            },
            Self::Unary {
                op: UnaryOp::Not, ..
            } => 3,
            Self::Unary {
                op: UnaryOp::Neg, ..
            } => 7,
            Self::Attribute { .. }
            | Self::Index { .. }
            | Self::Slice { .. }
            | Self::Filter { .. } => 8,
            Self::Literal(_)
            | Self::Field(_)
            | Self::Array(_)
            | Self::Object(_) => 9,
        }
    }
}

/// Wrapper that parenthesizes its expression when it binds more loosely than
/// the given minimum precedence
struct Operand<'a>(&'a Expression, u8);

impl Display for Operand<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Self(expression, minimum) = self;
        if expression.precedence() < *minimum {
            write!(f, "({expression})")
        } else {
            write!(f, "{expression}")
        }
    }
}

impl Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(literal) => write!(f, "{literal}"),
            Self::Field(identifier) => write!(f, "{identifier}"),
            Self::Array(expressions) => {
                write!(f, "[{}]", expressions.iter().format(", "))
            }
            Self::Object(entries) => write!(
                f,
                "{{{}}}",
                entries.iter().format_with(", ", |(key, value), f| f(
                    &format_args!("{key}: {value}")
                ))
            ),
            Self::Unary { op, operand } => {
                let precedence = self.precedence();
                match op {
                    UnaryOp::Not => {
                        write!(f, "not {}", Operand(operand, precedence))
                    }
                    UnaryOp::Neg => {
                        write!(f, "-{}", Operand(operand, precedence))
                    }
                }
            }
            Self::Binary { op, lhs, rhs } => {
                let precedence = self.precedence();
                // Operators are left-associative, so the right side needs
                // parentheses even at equal precedence
                write!(
                    f,
                    "{} {} {}",
                    Operand(lhs, precedence),
                    op.symbol(),
                    Operand(rhs, precedence + 1),
                )
            }
            Self::Attribute { object, attribute } => {
                write!(f, "{}.{attribute}", Operand(object, 8))
            }
            Self::Index { object, index } => {
                write!(f, "{}[{index}]", Operand(object, 8))
            }
            Self::Slice { object, start, end } => {
                write!(f, "{}[", Operand(object, 8))?;
                if let Some(start) = start {
                    write!(f, "{start}")?;
                }
                write!(f, ":")?;
                if let Some(end) = end {
                    write!(f, "{end}")?;
                }
                write!(f, "]")
            }
            Self::Filter { operand, filter } => {
                write!(f, "{} | {filter}", Operand(operand, 8))
            }
        }
    }
}

impl Display for Literal {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Null => write!(fmt, "{NULL}"),
            Literal::Boolean(b) => write!(fmt, "{b}"),
            Literal::Integer(i) => write!(fmt, "{i}"),
            Literal::Float(f) => write!(fmt, "{f}"),
            Literal::String(s) => write!(fmt, "'{s}'"),
        }
    }
}

/// Stringify values in the same form the constant parser accepts, so nested
/// collections can survive a stringify/reinterpret round trip
impl Display for Value {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(fmt, "{NULL}"),
            Self::Boolean(false) => write!(fmt, "{FALSE}"),
            Self::Boolean(true) => write!(fmt, "{TRUE}"),
            Self::Integer(i) => write!(fmt, "{i}"),
            Self::Float(f) => write!(fmt, "{f}"),
            Self::String(s) => write!(fmt, "'{s}'"),
            Self::Array(array) => {
                write!(fmt, "[{}]", array.iter().format(", "))
            }
            Self::Object(object) => {
                write!(
                    fmt,
                    "{{{}}}",
                    object.iter().format_with(", ", |(k, v), f| f(
                        &format_args!("'{k}': {v}")
                    ))
                )
            }
        }
    }
}
