//! Template expression definitions and evaluation

use crate::{Context, RenderError, Value};
use derive_more::{Deref, Display};
use indexmap::IndexMap;
use read_break_util::{resolve_index, slice_bounds};
use std::{collections::HashSet, str::FromStr};

/// A dynamic segment of a template that will be computed at render time.
/// Expressions are pure: they read variables from the context and combine
/// them with the operators below, nothing else.
#[derive(Clone, Debug, PartialEq)]
pub enum Expression {
    /// A literal value such as `3`, `false`, or `'hello'`
    Literal(Literal),
    /// Variable reference, resolved by [Context::get]
    Field(Identifier),
    /// Array literal: `[1, 'hello', x]`
    Array(Vec<Self>),
    /// Object literal: `{'a': 1}`. Store a vec here instead of a map because
    /// we don't want to deduplicate keys until after evaluating them
    Object(Vec<(Self, Self)>),
    /// Unary operator: `not x`, `-x`
    Unary { op: UnaryOp, operand: Box<Self> },
    /// Binary operator: `a + b`, `a and b`, ...
    Binary {
        op: BinaryOp,
        lhs: Box<Self>,
        rhs: Box<Self>,
    },
    /// Attribute access on an object: `params.R2_S2`
    Attribute {
        object: Box<Self>,
        attribute: Identifier,
    },
    /// Single-element access: `seq[3]`, `table['key']`
    Index { object: Box<Self>, index: Box<Self> },
    /// Range access with optional bounds: `seq[2:8]`, `seq[:4]`
    Slice {
        object: Box<Self>,
        start: Option<Box<Self>>,
        end: Option<Box<Self>>,
    },
    /// Jinja-style filter application: `value | length`
    Filter { operand: Box<Self>, filter: Filter },
}

impl Expression {
    /// Evaluate this expression to a value using variables from the context
    pub fn eval<Ctx: Context>(
        &self,
        context: &Ctx,
    ) -> Result<Value, RenderError> {
        match self {
            Self::Literal(literal) => Ok(literal.into()),
            Self::Field(field) => context.get(field),
            Self::Array(expressions) => {
                let values = expressions
                    .iter()
                    .map(|expression| expression.eval(context))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::Array(values))
            }
            Self::Object(entries) => {
                // Keys are deduped here, with the last taking priority
                let map = entries
                    .iter()
                    .map(|(key, value)| {
                        let key = key.eval(context)?.try_into_string()?;
                        Ok((key, value.eval(context)?))
                    })
                    .collect::<Result<IndexMap<_, _>, RenderError>>()?;
                Ok(Value::Object(map))
            }
            Self::Unary { op, operand } => op.apply(operand.eval(context)?),
            Self::Binary { op, lhs, rhs } => op.apply(lhs, rhs, context),
            Self::Attribute { object, attribute } => {
                match object.eval(context)? {
                    Value::Object(map) => map.get(attribute.as_str()).cloned().ok_or_else(
                        || RenderError::AttributeUnknown {
                            attribute: attribute.clone(),
                        },
                    ),
                    actual => Err(RenderError::Type {
                        expected: "object",
                        actual,
                    }),
                }
            }
            Self::Index { object, index } => {
                eval_index(object.eval(context)?, index.eval(context)?)
            }
            Self::Slice { object, start, end } => {
                let start = start
                    .as_ref()
                    .map(|bound| bound.eval(context)?.try_into_int())
                    .transpose()?;
                let end = end
                    .as_ref()
                    .map(|bound| bound.eval(context)?.try_into_int())
                    .transpose()?;
                eval_slice(object.eval(context)?, start, end)
            }
            Self::Filter { operand, filter } => {
                filter.apply(operand.eval(context)?)
            }
        }
    }

    /// Collect the names of all variables this expression reads from the
    /// context. Only the *root* of an access chain counts: `params.R2_S2`
    /// contributes `params`. Used to decide whether a template can be frozen
    /// against the globals alone.
    pub(crate) fn collect_free_variables<'a>(
        &'a self,
        variables: &mut HashSet<&'a str>,
    ) {
        match self {
            Self::Literal(_) => {}
            Self::Field(field) => {
                variables.insert(field.as_str());
            }
            Self::Array(expressions) => {
                for expression in expressions {
                    expression.collect_free_variables(variables);
                }
            }
            Self::Object(entries) => {
                for (key, value) in entries {
                    key.collect_free_variables(variables);
                    value.collect_free_variables(variables);
                }
            }
            Self::Unary { operand, .. } => {
                operand.collect_free_variables(variables);
            }
            Self::Binary { lhs, rhs, .. } => {
                lhs.collect_free_variables(variables);
                rhs.collect_free_variables(variables);
            }
            Self::Attribute { object, .. } => {
                object.collect_free_variables(variables);
            }
            Self::Index { object, index } => {
                object.collect_free_variables(variables);
                index.collect_free_variables(variables);
            }
            Self::Slice { object, start, end } => {
                object.collect_free_variables(variables);
                if let Some(start) = start {
                    start.collect_free_variables(variables);
                }
                if let Some(end) = end {
                    end.collect_free_variables(variables);
                }
            }
            Self::Filter { operand, .. } => {
                operand.collect_free_variables(variables);
            }
        }
    }
}

impl From<Literal> for Expression {
    fn from(literal: Literal) -> Self {
        Self::Literal(literal)
    }
}

impl From<i64> for Expression {
    fn from(i: i64) -> Self {
        Self::Literal(Literal::Integer(i))
    }
}

impl From<&str> for Expression {
    fn from(value: &str) -> Self {
        Self::Literal(Literal::String(value.to_owned()))
    }
}

/// Literal primitive value
#[derive(Clone, Debug, PartialEq)]
pub enum Literal {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl From<bool> for Literal {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<i64> for Literal {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

impl From<f64> for Literal {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<&str> for Literal {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<&Literal> for Value {
    fn from(literal: &Literal) -> Self {
        match literal {
            Literal::Null => Value::Null,
            Literal::Boolean(b) => Value::Boolean(*b),
            Literal::Integer(i) => Value::Integer(*i),
            Literal::Float(f) => Value::Float(*f),
            Literal::String(s) => Value::String(s.clone()),
        }
    }
}

/// Unary operator
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum UnaryOp {
    /// Boolean negation by truthiness: `not x`
    Not,
    /// Numeric negation: `-x`
    Neg,
}

impl UnaryOp {
    fn apply(self, operand: Value) -> Result<Value, RenderError> {
        match (self, operand) {
            (Self::Not, operand) => Ok(Value::Boolean(!operand.to_bool())),
            (Self::Neg, Value::Integer(i)) => i
                .checked_neg()
                .map(Value::Integer)
                .ok_or(RenderError::Overflow),
            (Self::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
            (Self::Neg, actual) => Err(RenderError::Type {
                expected: "number",
                actual,
            }),
        }
    }
}

/// Binary operator. Numeric operators follow Python semantics: `/` is true
/// division (always a float), `//` floors toward negative infinity, and the
/// sign of `%` follows the divisor.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Rem,
}

impl BinaryOp {
    /// The operator's source form, for stringification and error messages
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Or => "or",
            Self::And => "and",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::FloorDiv => "//",
            Self::Rem => "%",
        }
    }

    fn apply<Ctx: Context>(
        self,
        lhs: &Expression,
        rhs: &Expression,
        context: &Ctx,
    ) -> Result<Value, RenderError> {
        // Boolean operators short-circuit and yield the deciding operand
        match self {
            Self::Or => {
                let lhs = lhs.eval(context)?;
                return if lhs.to_bool() { Ok(lhs) } else { rhs.eval(context) };
            }
            Self::And => {
                let lhs = lhs.eval(context)?;
                return if lhs.to_bool() { rhs.eval(context) } else { Ok(lhs) };
            }
            _ => {}
        }

        let lhs = lhs.eval(context)?;
        let rhs = rhs.eval(context)?;
        match self {
            Self::Or | Self::And => unreachable!("handled above"),
            Self::Eq => Ok(Value::Boolean(loose_eq(&lhs, &rhs))),
            Self::Ne => Ok(Value::Boolean(!loose_eq(&lhs, &rhs))),
            Self::Lt => compare(self, lhs, rhs).map(|ord| ord.is_lt().into()),
            Self::Le => compare(self, lhs, rhs).map(|ord| ord.is_le().into()),
            Self::Gt => compare(self, lhs, rhs).map(|ord| ord.is_gt().into()),
            Self::Ge => compare(self, lhs, rhs).map(|ord| ord.is_ge().into()),
            Self::Add => add(lhs, rhs),
            Self::Sub | Self::Mul | Self::Div | Self::FloorDiv | Self::Rem => {
                arithmetic(self, lhs, rhs)
            }
        }
    }
}

/// Equality across types never errors: mismatched types are simply unequal,
/// except that ints and floats compare numerically
fn loose_eq(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::Integer(i), Value::Float(f))
        | (Value::Float(f), Value::Integer(i)) => *i as f64 == *f,
        (lhs, rhs) => lhs == rhs,
    }
}

/// Ordering comparison. Unlike equality, comparing values of mismatched
/// types is an error
fn compare(
    op: BinaryOp,
    lhs: Value,
    rhs: Value,
) -> Result<std::cmp::Ordering, RenderError> {
    let ordering = match (&lhs, &rhs) {
        (Value::Integer(a), Value::Integer(b)) => a.cmp(b),
        (Value::String(a), Value::String(b)) => a.cmp(b),
        (Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),
        (a, b) => match (a.as_float(), b.as_float()) {
            (Some(a), Some(b)) => {
                a.partial_cmp(&b).ok_or(RenderError::Operands {
                    op: op.symbol(),
                    lhs: lhs.clone(),
                    rhs: rhs.clone(),
                })?
            }
            _ => {
                return Err(RenderError::Operands {
                    op: op.symbol(),
                    lhs,
                    rhs,
                });
            }
        },
    };
    Ok(ordering)
}

/// `+` supports numbers, string concatenation, and array concatenation
fn add(lhs: Value, rhs: Value) -> Result<Value, RenderError> {
    match (lhs, rhs) {
        (Value::Integer(a), Value::Integer(b)) => a
            .checked_add(b)
            .map(Value::Integer)
            .ok_or(RenderError::Overflow),
        (Value::String(mut a), Value::String(b)) => {
            a.push_str(&b);
            Ok(Value::String(a))
        }
        (Value::Array(mut a), Value::Array(b)) => {
            a.extend(b);
            Ok(Value::Array(a))
        }
        (lhs, rhs) => match (lhs.as_float(), rhs.as_float()) {
            (Some(a), Some(b)) => Ok(Value::Float(a + b)),
            _ => Err(RenderError::Operands {
                op: BinaryOp::Add.symbol(),
                lhs,
                rhs,
            }),
        },
    }
}

/// The numeric-only operators: `- * / // %`
fn arithmetic(
    op: BinaryOp,
    lhs: Value,
    rhs: Value,
) -> Result<Value, RenderError> {
    // Integer pairs keep integer results, except for true division
    if let (Value::Integer(a), Value::Integer(b)) = (&lhs, &rhs) {
        let (a, b) = (*a, *b);
        match op {
            BinaryOp::Sub => {
                return a
                    .checked_sub(b)
                    .map(Value::Integer)
                    .ok_or(RenderError::Overflow);
            }
            BinaryOp::Mul => {
                return a
                    .checked_mul(b)
                    .map(Value::Integer)
                    .ok_or(RenderError::Overflow);
            }
            BinaryOp::FloorDiv => {
                if b == 0 {
                    return Err(RenderError::DivisionByZero);
                }
                let quotient = a / b;
                // Floor toward negative infinity like Python
                let floored = if a % b != 0 && (a < 0) != (b < 0) {
                    quotient - 1
                } else {
                    quotient
                };
                return Ok(Value::Integer(floored));
            }
            BinaryOp::Rem => {
                if b == 0 {
                    return Err(RenderError::DivisionByZero);
                }
                let remainder = a % b;
                let adjusted = if remainder != 0 && (remainder < 0) != (b < 0)
                {
                    remainder + b
                } else {
                    remainder
                };
                return Ok(Value::Integer(adjusted));
            }
            // True division always produces a float; fall through
            BinaryOp::Div => {}
            _ => unreachable!("non-arithmetic operator"),
        }
    }

    let (Some(a), Some(b)) = (lhs.as_float(), rhs.as_float()) else {
        return Err(RenderError::Operands {
            op: op.symbol(),
            lhs,
            rhs,
        });
    };
    match op {
        BinaryOp::Sub => Ok(Value::Float(a - b)),
        BinaryOp::Mul => Ok(Value::Float(a * b)),
        BinaryOp::Div => {
            if b == 0.0 {
                Err(RenderError::DivisionByZero)
            } else {
                Ok(Value::Float(a / b))
            }
        }
        BinaryOp::FloorDiv => {
            if b == 0.0 {
                Err(RenderError::DivisionByZero)
            } else {
                Ok(Value::Float((a / b).floor()))
            }
        }
        BinaryOp::Rem => {
            if b == 0.0 {
                Err(RenderError::DivisionByZero)
            } else {
                Ok(Value::Float(a - b * (a / b).floor()))
            }
        }
        _ => unreachable!("non-arithmetic operator"),
    }
}

fn eval_index(object: Value, index: Value) -> Result<Value, RenderError> {
    match (object, index) {
        (Value::String(s), Value::Integer(i)) => {
            let chars: Vec<char> = s.chars().collect();
            let position = resolve_index(chars.len(), i).ok_or(
                RenderError::IndexOutOfRange {
                    index: i,
                    len: chars.len(),
                },
            )?;
            Ok(Value::String(chars[position].to_string()))
        }
        (Value::Array(array), Value::Integer(i)) => {
            let position = resolve_index(array.len(), i).ok_or(
                RenderError::IndexOutOfRange {
                    index: i,
                    len: array.len(),
                },
            )?;
            Ok(array[position].clone())
        }
        (Value::Object(map), Value::String(key)) => map
            .get(&key)
            .cloned()
            .ok_or(RenderError::KeyUnknown { key }),
        (actual, _) => Err(RenderError::Type {
            expected: "string, array, or object",
            actual,
        }),
    }
}

fn eval_slice(
    object: Value,
    start: Option<i64>,
    end: Option<i64>,
) -> Result<Value, RenderError> {
    match object {
        Value::String(s) => {
            let chars: Vec<char> = s.chars().collect();
            let (start, end) = slice_bounds(chars.len(), start, end);
            Ok(Value::String(chars[start..end].iter().collect()))
        }
        Value::Array(array) => {
            let (start, end) = slice_bounds(array.len(), start, end);
            Ok(Value::Array(array[start..end].to_vec()))
        }
        actual => Err(RenderError::Type {
            expected: "string or array",
            actual,
        }),
    }
}

/// A named value transformation applied with the `|` operator. The set is
/// fixed at build time; unknown names are rejected at parse time.
#[derive(Copy, Clone, Debug, Display, PartialEq)]
pub enum Filter {
    /// Element count of a string (in characters), array, or object
    #[display("length")]
    Length,
    /// Integer coercion: truncates floats, parses strings
    #[display("int")]
    Int,
    /// Float coercion
    #[display("float")]
    Float,
    #[display("lower")]
    Lower,
    #[display("upper")]
    Upper,
    /// Strip leading/trailing whitespace
    #[display("trim")]
    Trim,
}

impl Filter {
    fn apply(self, operand: Value) -> Result<Value, RenderError> {
        match (self, operand) {
            (Self::Length, Value::String(s)) => {
                Ok(Value::Integer(s.chars().count() as i64))
            }
            (Self::Length, Value::Array(array)) => {
                Ok(Value::Integer(array.len() as i64))
            }
            (Self::Length, Value::Object(map)) => {
                Ok(Value::Integer(map.len() as i64))
            }
            (Self::Length, actual) => Err(RenderError::Type {
                expected: "string, array, or object",
                actual,
            }),
            (Self::Int, operand) => operand.try_into_int().map(Value::Integer),
            (Self::Float, operand) => {
                operand.try_into_float().map(Value::Float)
            }
            (Self::Lower, Value::String(s)) => {
                Ok(Value::String(s.to_lowercase()))
            }
            (Self::Upper, Value::String(s)) => {
                Ok(Value::String(s.to_uppercase()))
            }
            (Self::Trim, Value::String(s)) => {
                Ok(Value::String(s.trim().to_owned()))
            }
            (Self::Lower | Self::Upper | Self::Trim, actual) => {
                Err(RenderError::Type {
                    expected: "string",
                    actual,
                })
            }
        }
    }
}

impl FromStr for Filter {
    type Err = UnknownFilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "length" => Ok(Self::Length),
            "int" => Ok(Self::Int),
            "float" => Ok(Self::Float),
            "lower" => Ok(Self::Lower),
            "upper" => Ok(Self::Upper),
            "trim" => Ok(Self::Trim),
            _ => Err(UnknownFilterError(s.to_owned())),
        }
    }
}

/// A filter name outside the fixed registry
#[derive(Debug, thiserror::Error)]
#[error(
    "Unknown filter `{0}`; expected one of length, int, float, lower, \
    upper, trim"
)]
pub struct UnknownFilterError(String);

/// An identifier usable as a variable name, attribute name, or filter name.
/// A valid identifier is a non-empty string of alphanumeric characters and
/// `_`, not starting with a digit.
///
/// Construct via [FromStr](std::str::FromStr)
#[derive(Clone, Debug, Deref, Default, Display, Eq, Hash, PartialEq)]
pub struct Identifier(pub(crate) String);

impl Identifier {
    /// Is the character allowed in an identifier?
    pub(crate) fn is_char_allowed(c: char) -> bool {
        Self::is_char_allowed_first(c) || c.is_numeric()
    }

    /// Is the character allowed as the first character in an identifier?
    pub(crate) fn is_char_allowed_first(c: char) -> bool {
        c.is_alphabetic() || c == '_'
    }
}

/// A shortcut for creating identifiers from static strings. Since the string
/// is defined in code we're assuming it's valid.
impl From<&'static str> for Identifier {
    fn from(value: &'static str) -> Self {
        value.parse().unwrap()
    }
}
