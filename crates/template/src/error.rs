use crate::{Value, expression::Identifier};
use thiserror::Error;
use winnow::error::{ContextError, ParseError};

/// An error while parsing a template. The message is provided by winnow
#[derive(Debug, Error)]
#[error("{0}")]
pub struct TemplateParseError(String);

/// Convert winnow's error type into ours. This stringifies the error so we
/// can drop the reference to the input
impl From<ParseError<&str, ContextError>> for TemplateParseError {
    fn from(error: ParseError<&str, ContextError>) -> Self {
        Self(error.to_string())
    }
}

/// Any error that can occur while evaluating a template.
///
/// The error always holds owned data so it can be detached from the lifetime
/// of the template and context. This requires a mild amount of cloning in
/// error cases, but those should be infrequent so it's fine.
#[derive(Debug, Error)]
pub enum RenderError {
    /// Strict mode: a referenced variable is not defined in the context
    #[error("Unknown variable `{field}`")]
    FieldUnknown { field: Identifier },

    /// Attribute access on an object that doesn't have the attribute
    #[error("Unknown attribute `{attribute}`")]
    AttributeUnknown { attribute: Identifier },

    /// String key lookup on an object that doesn't have the key
    #[error("Unknown key `{key}`")]
    KeyUnknown { key: String },

    /// A value had the wrong type for the operation applied to it
    #[error("Type error: expected {expected}, got `{actual}`")]
    Type {
        expected: &'static str,
        actual: Value,
    },

    /// A binary operator was applied to values it doesn't support
    #[error("Unsupported operands for `{op}`: `{lhs}` and `{rhs}`")]
    Operands {
        op: &'static str,
        lhs: Value,
        rhs: Value,
    },

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Integer overflow")]
    Overflow,

    /// Index applied to a string or array that doesn't have that position
    #[error("Index {index} out of range for length {len}")]
    IndexOutOfRange { index: i64, len: usize },

    /// External error type, e.g. from an integer coercion
    #[error(transparent)]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl RenderError {
    /// Create a [RenderError::Other] from another error
    pub fn other(
        error: impl 'static + Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Other(error.into())
    }
}
