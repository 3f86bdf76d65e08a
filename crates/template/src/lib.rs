//! Evaluate `{{ … }}` expression templates against dynamic data. This engine
//! is focused on rendering templates, and is generally agnostic of its usage
//! in the rest of the app. As such, there is no logic in here relating to
//! reads, pipelines, or other read-break concepts.
//!
//! The expression language is a small, pure subset of what Jinja offers:
//! variables, literals, arithmetic/comparison/boolean operators, attribute
//! access, string indexing and slicing, and a fixed set of filters. There is
//! no way to call out of the sandbox, perform I/O, or mutate anything.

mod display;
mod error;
mod expression;
mod parse;

pub use error::{RenderError, TemplateParseError};
pub use expression::{
    BinaryOp, Expression, Filter, Identifier, Literal, UnaryOp,
    UnknownFilterError,
};

use crate::parse::{FALSE, NULL, TRUE};
use derive_more::From;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, sync::Arc};

/// `Context` defines how template variables are resolved. Lookups are strict:
/// an implementor should return [RenderError::FieldUnknown] for a variable it
/// doesn't know, never a silent default.
pub trait Context {
    /// Get the value of a variable from the context
    fn get(&self, identifier: &Identifier) -> Result<Value, RenderError>;
}

/// Variables resolved from an ordered map, with a fallback namespace exposed
/// under a single name. This is the shape pipeline evaluation uses: the
/// per-read context map, plus the resolved globals reachable as e.g.
/// `params.R1_ADAPTER`.
#[derive(Debug)]
pub struct MapContext<'a> {
    /// Per-render variables
    pub variables: &'a IndexMap<String, Value>,
    /// Name under which `namespace` is exposed; shadows any variable of the
    /// same name
    pub namespace_key: &'a str,
    /// The namespace object (e.g. resolved globals)
    pub namespace: &'a Value,
}

impl Context for MapContext<'_> {
    fn get(&self, identifier: &Identifier) -> Result<Value, RenderError> {
        // The namespace shadows a context variable of the same name
        if identifier.as_str() == self.namespace_key {
            Ok(self.namespace.clone())
        } else if let Some(value) = self.variables.get(identifier.as_str()) {
            Ok(value.clone())
        } else {
            Err(RenderError::FieldUnknown {
                field: identifier.clone(),
            })
        }
    }
}

/// A parsed template, which can contain raw and/or templated content. The
/// string is parsed during creation to identify expressions, hence the
/// immutability.
///
/// The original string is *not* stored. To recover the source string, use
/// [Self::display].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Template {
    /// Pre-parsed chunks of the template. For raw chunks we store the text;
    /// for expressions, the parsed AST ready to evaluate.
    pub(crate) chunks: Vec<TemplateChunk>,
}

impl Template {
    /// Render the template using values from the given context. The output is
    /// converted to a [Value] by these rules:
    /// - A template that is a single expression yields that expression's
    ///   typed value directly
    /// - Any other template is rendered to a string by stringifying each
    ///   chunk and concatenating
    /// - String output (from either path) is reinterpreted as a typed value
    ///   iff it parses as an integer/float/boolean/null/array/object
    ///   constant; otherwise the string is returned as-is
    ///
    /// A template that is a single raw chunk (no `{{` at all) skips
    /// reinterpretation: plain strings are always returned verbatim.
    pub fn render<Ctx: Context>(
        &self,
        context: &Ctx,
    ) -> Result<Value, RenderError> {
        match self.chunks.as_slice() {
            [] => Ok(Value::String(String::new())),
            [TemplateChunk::Raw(text)] => {
                Ok(Value::String(text.to_string()))
            }
            [TemplateChunk::Expression(expression)] => {
                match expression.eval(context)? {
                    Value::String(s) => Ok(reinterpret(s)),
                    value => Ok(value),
                }
            }
            chunks => {
                let mut buf = String::new();
                for chunk in chunks {
                    match chunk {
                        TemplateChunk::Raw(text) => buf.push_str(text),
                        TemplateChunk::Expression(expression) => {
                            let value = expression.eval(context)?;
                            buf.push_str(&value.try_into_string()?);
                        }
                    }
                }
                Ok(reinterpret(buf))
            }
        }
    }

    /// Collect the names of all variables this template reads from the
    /// context. Only the root of an access chain counts: `params.R2_S2`
    /// contributes `params`. A template whose free variables are all
    /// satisfiable from the globals namespace can be rendered once at
    /// compile time.
    pub fn free_variables(&self) -> HashSet<&str> {
        let mut variables = HashSet::new();
        for chunk in &self.chunks {
            if let TemplateChunk::Expression(expression) = chunk {
                expression.collect_free_variables(&mut variables);
            }
        }
        variables
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

/// Interpret rendered output as a constant if it parses as one, otherwise
/// keep the raw string
fn reinterpret(s: String) -> Value {
    parse::parse_constant(&s).unwrap_or(Value::String(s))
}

#[cfg(test)]
impl From<&str> for Template {
    fn from(value: &str) -> Self {
        value.parse().unwrap()
    }
}

#[cfg(test)]
impl<const N: usize> From<[TemplateChunk; N]> for Template {
    fn from(chunks: [TemplateChunk; N]) -> Self {
        Self {
            chunks: chunks.into(),
        }
    }
}

/// A parsed piece of a template. After parsing, each chunk is either raw text
/// or an expression, ready to be rendered.
#[derive(Clone, Debug, PartialEq)]
pub enum TemplateChunk {
    /// Raw unprocessed text, i.e. everything **outside** the `{{ }}`. This is
    /// stored in an `Arc` so clones of a template can share cheaply. Raw
    /// chunks are never empty.
    Raw(Arc<str>),
    /// Dynamic expression to be computed at render time
    Expression(Expression),
}

#[cfg(test)]
impl From<Expression> for TemplateChunk {
    fn from(expression: Expression) -> Self {
        Self::Expression(expression)
    }
}

/// A runtime template value. The kinds mirror what YAML scalars and the
/// expression language can produce.
#[derive(Clone, Debug, From, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    #[from(skip)] // We use a generic impl instead
    Array(Vec<Self>),
    Object(IndexMap<String, Self>),
}

impl Value {
    /// Convert this value to a boolean, according to its truthiness.
    /// Truthiness/falsiness is defined for each type as:
    /// - `null` - `false`
    /// - `bool` - Own value
    /// - `integer` - `false` if zero
    /// - `float` - `false` if zero
    /// - `string` - `false` if empty
    /// - `array` - `false` if empty
    /// - `object` - `false` if empty
    ///
    /// These correspond to the truthiness rules from Python.
    pub fn to_bool(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Boolean(b) => *b,
            Self::Integer(i) => *i != 0,
            Self::Float(f) => *f != 0.0,
            Self::String(s) => !s.is_empty(),
            Self::Array(array) => !array.is_empty(),
            Self::Object(object) => !object.is_empty(),
        }
    }

    /// Numeric view of this value, if it has one
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Integer(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Convert this value to a string. Strings are returned as-is; scalars
    /// stringify to their source form; collections use the constant syntax.
    /// This is infallible, but returns `Result` so call sites compose with
    /// the other coercions.
    pub fn try_into_string(self) -> Result<String, RenderError> {
        match self {
            Self::Null => Ok(NULL.into()),
            Self::Boolean(false) => Ok(FALSE.into()),
            Self::Boolean(true) => Ok(TRUE.into()),
            Self::Integer(i) => Ok(i.to_string()),
            Self::Float(f) => Ok(f.to_string()),
            Self::String(s) => Ok(s),
            // Use the display impl
            Self::Array(_) | Self::Object(_) => Ok(self.to_string()),
        }
    }

    /// Coerce this value to an integer, the way Python's `int()` does:
    /// floats truncate toward zero, booleans become 0/1, and strings are
    /// parsed (with surrounding whitespace allowed). Anything else is a type
    /// error.
    pub fn try_into_int(self) -> Result<i64, RenderError> {
        match self {
            Self::Integer(i) => Ok(i),
            Self::Float(f) if f.is_finite() => Ok(f.trunc() as i64),
            Self::Boolean(b) => Ok(b.into()),
            Self::String(s) => {
                s.trim().parse().map_err(|_| RenderError::Type {
                    expected: "integer",
                    actual: Self::String(s),
                })
            }
            actual => Err(RenderError::Type {
                expected: "integer",
                actual,
            }),
        }
    }

    /// Coerce this value to a float, the way Python's `float()` does
    pub fn try_into_float(self) -> Result<f64, RenderError> {
        match self {
            Self::Integer(i) => Ok(i as f64),
            Self::Float(f) => Ok(f),
            Self::Boolean(b) => Ok(if b { 1.0 } else { 0.0 }),
            Self::String(s) => {
                s.trim().parse().map_err(|_| RenderError::Type {
                    expected: "float",
                    actual: Self::String(s),
                })
            }
            actual => Err(RenderError::Type {
                expected: "float",
                actual,
            }),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.into())
    }
}

impl<T> From<Vec<T>> for Value
where
    Value: From<T>,
{
    fn from(value: Vec<T>) -> Self {
        Self::Array(value.into_iter().map(Self::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::indexmap;
    use pretty_assertions::assert_eq;
    use read_break_util::assert_err;
    use rstest::rstest;

    /// Evaluate expressions against a fixed context, checking the typed
    /// output value
    #[rstest]
    // Variables and globals namespace
    #[case::field("{{ s1_start }}", Value::Integer(3))]
    #[case::namespace("{{ params }}", test_globals())]
    #[case::namespace_attr("{{ params.LT_LEN }}", Value::Integer(15))]
    // Arithmetic
    #[case::add("{{ s1_start + 6 }}", Value::Integer(9))]
    #[case::sub("{{ s1_start - 5 }}", Value::Integer(-2))]
    #[case::mul("{{ s1_start * 2 }}", Value::Integer(6))]
    #[case::true_division("{{ 7 / 2 }}", Value::Float(3.5))]
    #[case::floor_division("{{ 7 // 2 }}", Value::Integer(3))]
    #[case::floor_division_negative("{{ -7 // 2 }}", Value::Integer(-4))]
    #[case::modulo("{{ 7 % 2 }}", Value::Integer(1))]
    #[case::modulo_negative("{{ -7 % 2 }}", Value::Integer(1))]
    #[case::precedence("{{ 1 + 2 * 3 }}", Value::Integer(7))]
    #[case::parens("{{ (1 + 2) * 3 }}", Value::Integer(9))]
    #[case::neg_field("{{ -s1_start }}", Value::Integer(-3))]
    // Comparison
    #[case::eq_true("{{ s1_start == 3 }}", Value::Boolean(true))]
    #[case::eq_cross_type("{{ 3 == 3.0 }}", Value::Boolean(true))]
    #[case::eq_mismatched("{{ 3 == 'x' }}", Value::Boolean(false))]
    #[case::ne("{{ s1_start != 3 }}", Value::Boolean(false))]
    #[case::lt("{{ s1_start < 4 }}", Value::Boolean(true))]
    #[case::ge_strings("{{ 'b' >= 'a' }}", Value::Boolean(true))]
    // Boolean logic: short-circuiting yields the deciding operand
    #[case::and_true("{{ s1_start == 3 and tag == 'CTAG' }}", Value::Boolean(true))]
    #[case::or_picks_lhs("{{ s1_start or 99 }}", Value::Integer(3))]
    #[case::or_picks_rhs("{{ 0 or 99 }}", Value::Integer(99))]
    #[case::and_picks_lhs("{{ 0 and 99 }}", Value::Integer(0))]
    #[case::not("{{ not (s1_start == 0) }}", Value::Boolean(true))]
    // Strings
    #[case::concat("{{ tag + '!' }}", Value::String("CTAG!".into()))]
    #[case::length("{{ tag | length }}", Value::Integer(4))]
    #[case::namespace_length("{{ params.R2_S2 | length }}", Value::Integer(6))]
    #[case::index("{{ tag[0] }}", Value::String("C".into()))]
    #[case::index_negative("{{ tag[-1] }}", Value::String("G".into()))]
    #[case::slice("{{ tag[1:3] }}", Value::String("TA".into()))]
    #[case::slice_clamped("{{ tag[2:99] }}", Value::String("AG".into()))]
    #[case::filter_chain("{{ '  acgt  ' | trim | upper }}", Value::String("ACGT".into()))]
    #[case::filter_int("{{ '12' | int + 1 }}", Value::Integer(13))]
    // Reinterpretation of string results
    #[case::string_looks_like_int("{{ count }}", Value::Integer(42))]
    #[case::string_stays_string("{{ tag }}", Value::String("CTAG".into()))]
    // Multi-chunk templates concatenate, then reinterpret
    #[case::concat_chunks("{{ s1_start }}{{ s1_start }}", Value::Integer(33))]
    #[case::concat_raw("pos={{ s1_start }}", Value::String("pos=3".into()))]
    // Literals pass through
    #[case::null("{{ null }}", Value::Null)]
    #[case::array_literal("{{ [1, tag] }}", Value::Array(vec![
        Value::Integer(1),
        Value::String("CTAG".into()),
    ]))]
    fn test_render(#[case] template: Template, #[case] expected: Value) {
        assert_eq!(template.render(&test_context()).unwrap(), expected);
    }

    /// Strict mode: unknown variables and bad operands are errors
    #[rstest]
    #[case::unknown_field("{{ bogus }}", "Unknown variable `bogus`")]
    #[case::unknown_attribute(
        "{{ params.BOGUS }}",
        "Unknown attribute `BOGUS`"
    )]
    #[case::attr_on_scalar("{{ s1_start.x }}", "expected object")]
    #[case::bad_operands("{{ tag - 1 }}", "Unsupported operands for `-`")]
    #[case::division_by_zero("{{ 1 / 0 }}", "Division by zero")]
    #[case::index_out_of_range("{{ tag[10] }}", "out of range")]
    #[case::compare_mismatched("{{ tag < 3 }}", "Unsupported operands")]
    fn test_render_error(
        #[case] template: Template,
        #[case] expected_error: &str,
    ) {
        assert_err!(
            template
                .render(&test_context())
                .map_err(anyhow::Error::from),
            expected_error
        );
    }

    /// Free variables are the roots of access chains, across all chunks
    #[rstest]
    #[case::empty("", &[])]
    #[case::raw_only("just text", &[])]
    #[case::field("{{ s1_start }}", &["s1_start"])]
    #[case::namespace_only("{{ params.A + params.B | length }}", &["params"])]
    #[case::mixed(
        "{{ s1_start + params.LT_LEN }}:{{ tag }}",
        &["s1_start", "params", "tag"],
    )]
    #[case::slice_bound("{{ seq[a:b] }}", &["seq", "a", "b"])]
    fn test_free_variables(
        #[case] template: Template,
        #[case] expected: &[&str],
    ) {
        assert_eq!(
            template.free_variables(),
            expected.iter().copied().collect()
        );
    }

    /// Coercions follow Python's int()/float()/bool() conversions
    #[rstest]
    #[case::int_from_float(Value::Float(3.9), Ok(3))]
    #[case::int_from_bool(Value::Boolean(true), Ok(1))]
    #[case::int_from_string(Value::String(" 12 ".into()), Ok(12))]
    #[case::int_from_bad_string(Value::String("3.5".into()), Err(()))]
    #[case::int_from_null(Value::Null, Err(()))]
    fn test_try_into_int(
        #[case] value: Value,
        #[case] expected: Result<i64, ()>,
    ) {
        assert_eq!(value.try_into_int().map_err(|_| ()), expected);
    }

    fn test_globals() -> Value {
        Value::Object(indexmap! {
            "LT_LEN".into() => Value::Integer(15),
            "R2_S2".into() => Value::String("AAAGGG".into()),
        })
    }

    fn test_context() -> OwnedContext {
        OwnedContext {
            variables: indexmap! {
                "s1_start".into() => Value::Integer(3),
                "tag".into() => Value::String("CTAG".into()),
                "count".into() => Value::String("42".into()),
                "seq".into() => Value::String("ACGTACGT".into()),
                "a".into() => Value::Integer(1),
                "b".into() => Value::Integer(3),
            },
            globals: test_globals(),
        }
    }

    /// Owning equivalent of [MapContext], to keep the fixtures simple
    struct OwnedContext {
        variables: IndexMap<String, Value>,
        globals: Value,
    }

    impl Context for OwnedContext {
        fn get(&self, identifier: &Identifier) -> Result<Value, RenderError> {
            MapContext {
                variables: &self.variables,
                namespace_key: "params",
                namespace: &self.globals,
            }
            .get(identifier)
        }
    }
}
