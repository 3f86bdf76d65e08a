//! Template parsing

use crate::{
    Template, TemplateChunk, Value,
    error::TemplateParseError,
    expression::{
        BinaryOp, Expression, Filter, Identifier, Literal, UnaryOp,
    },
};
use indexmap::IndexMap;
use std::{str::FromStr, sync::Arc};
use winnow::{
    ModalParser, ModalResult, Parser,
    ascii::{dec_int, escaped, float, multispace0},
    combinator::{
        alt, cut_err, delimited, eof, fail, not, opt, peek, preceded, repeat,
        repeat_till, separated, separated_pair, terminated,
    },
    error::{ContextError, StrContext, StrContextValue},
    stream::Accumulate,
    token::{any, one_of, take_till, take_while},
};

/// Marks the start of a template expression
pub(crate) const EXPRESSION_OPEN: &str = "{{";
/// Marks the end of a template expression
pub(crate) const EXPRESSION_CLOSE: &str = "}}";
pub(crate) const NULL: &str = "null";
pub(crate) const FALSE: &str = "false";
pub(crate) const TRUE: &str = "true";

/// Parse a template, extracting all expression chunks
impl FromStr for Template {
    type Err = TemplateParseError;

    fn from_str(template: &str) -> Result<Self, Self::Err> {
        let chunks = all_chunks.parse(template)?;
        Ok(Self { chunks })
    }
}

impl FromStr for Identifier {
    type Err = TemplateParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(identifier.parse(s)?)
    }
}

/// Interpret a rendered string as a constant value, the way the engine
/// reinterprets template output: integers, floats, booleans, `null`, and
/// (possibly nested) array/object literals parse to their typed value.
/// Anything else returns `None` and the caller keeps the raw string.
pub(crate) fn parse_constant(input: &str) -> Option<Value> {
    constant.parse(input).ok()
}

/// Parse a template into expressions and raw text
fn all_chunks(input: &mut &str) -> ModalResult<Vec<TemplateChunk>> {
    repeat_till(
        0..,
        alt((
            expression_chunk.map(TemplateChunk::Expression),
            raw.map(TemplateChunk::Raw),
        ))
        .context(ctx_label("template chunk")),
        eof,
    )
    .map(|(chunks, _)| chunks)
    .context(ctx_label("template"))
    .parse_next(input)
}

/// Parse raw text, until we hit an expression opening or end of input
fn raw(input: &mut &str) -> ModalResult<Arc<str>> {
    repeat(1.., (not(EXPRESSION_OPEN), any).take())
        .map(String::into)
        .context(ctx_label("raw text"))
        .parse_next(input)
}

/// Parse a template expression with its bounding `{{ }}`
fn expression_chunk(input: &mut &str) -> ModalResult<Expression> {
    preceded(
        EXPRESSION_OPEN,
        // Any error inside an expression is fatal, including an unclosed one
        cut_err(terminated(expression, EXPRESSION_CLOSE)),
    )
    .context(ctx_label("expression"))
    .parse_next(input)
}

/// Parse the contents of an expression (inside the `{{ }}` or nested within
/// another expression). Precedence is Python's: `or` binds loosest, then
/// `and`, `not`, comparisons, `+ -`, `* / // %`, unary `-`, and finally the
/// postfix forms (attribute, index/slice, filter).
fn expression(input: &mut &str) -> ModalResult<Expression> {
    let first = and_expression.parse_next(input)?;
    let rest: Vec<Expression> =
        repeat(0.., preceded(ws(keyword("or")), and_expression))
            .parse_next(input)?;
    Ok(rest.into_iter().fold(first, |lhs, rhs| binary(BinaryOp::Or, lhs, rhs)))
}

fn and_expression(input: &mut &str) -> ModalResult<Expression> {
    let first = not_expression.parse_next(input)?;
    let rest: Vec<Expression> =
        repeat(0.., preceded(ws(keyword("and")), not_expression))
            .parse_next(input)?;
    Ok(rest
        .into_iter()
        .fold(first, |lhs, rhs| binary(BinaryOp::And, lhs, rhs)))
}

fn not_expression(input: &mut &str) -> ModalResult<Expression> {
    alt((
        preceded(ws(keyword("not")), not_expression).map(|operand| {
            Expression::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            }
        }),
        comparison,
    ))
    .parse_next(input)
}

/// A single (non-chained) comparison between two sums
fn comparison(input: &mut &str) -> ModalResult<Expression> {
    let first = sum.parse_next(input)?;
    let rest: Option<(BinaryOp, Expression)> =
        opt((ws(comparison_op), sum)).parse_next(input)?;
    Ok(match rest {
        Some((op, rhs)) => binary(op, first, rhs),
        None => first,
    })
}

fn comparison_op(input: &mut &str) -> ModalResult<BinaryOp> {
    alt((
        "==".value(BinaryOp::Eq),
        "!=".value(BinaryOp::Ne),
        "<=".value(BinaryOp::Le),
        ">=".value(BinaryOp::Ge),
        "<".value(BinaryOp::Lt),
        ">".value(BinaryOp::Gt),
    ))
    .parse_next(input)
}

fn sum(input: &mut &str) -> ModalResult<Expression> {
    let first = term.parse_next(input)?;
    let rest: Vec<(BinaryOp, Expression)> = repeat(
        0..,
        (
            ws(alt(('+'.value(BinaryOp::Add), '-'.value(BinaryOp::Sub)))),
            term,
        ),
    )
    .parse_next(input)?;
    Ok(rest
        .into_iter()
        .fold(first, |lhs, (op, rhs)| binary(op, lhs, rhs)))
}

fn term(input: &mut &str) -> ModalResult<Expression> {
    let first = unary.parse_next(input)?;
    let rest: Vec<(BinaryOp, Expression)> = repeat(
        0..,
        (
            // `//` must be tried before `/`
            ws(alt((
                "//".value(BinaryOp::FloorDiv),
                '*'.value(BinaryOp::Mul),
                '/'.value(BinaryOp::Div),
                '%'.value(BinaryOp::Rem),
            ))),
            unary,
        ),
    )
    .parse_next(input)?;
    Ok(rest
        .into_iter()
        .fold(first, |lhs, (op, rhs)| binary(op, lhs, rhs)))
}

fn unary(input: &mut &str) -> ModalResult<Expression> {
    alt((
        preceded(ws('-'), unary).map(|operand| Expression::Unary {
            op: UnaryOp::Neg,
            operand: Box::new(operand),
        }),
        postfix,
    ))
    .parse_next(input)
}

/// A postfix operation applied to a primary expression
enum PostfixOp {
    Attribute(Identifier),
    Index(Expression),
    Slice(Option<Expression>, Option<Expression>),
    Filter(Filter),
}

fn postfix(input: &mut &str) -> ModalResult<Expression> {
    let first = primary.parse_next(input)?;
    let ops: Vec<PostfixOp> = repeat(0.., postfix_op).parse_next(input)?;
    Ok(ops.into_iter().fold(first, |object, op| match op {
        PostfixOp::Attribute(attribute) => Expression::Attribute {
            object: Box::new(object),
            attribute,
        },
        PostfixOp::Index(index) => Expression::Index {
            object: Box::new(object),
            index: Box::new(index),
        },
        PostfixOp::Slice(start, end) => Expression::Slice {
            object: Box::new(object),
            start: start.map(Box::new),
            end: end.map(Box::new),
        },
        PostfixOp::Filter(filter) => Expression::Filter {
            operand: Box::new(object),
            filter,
        },
    }))
}

fn postfix_op(input: &mut &str) -> ModalResult<PostfixOp> {
    alt((
        preceded(ws('.'), cut_err(identifier))
            .map(PostfixOp::Attribute)
            .context(ctx_label("attribute access")),
        delimited(
            ws('['),
            alt((
                // Try a slice first; an index is a lone expression. The colon
                // is what distinguishes them, so the slice branch backtracks
                // cheaply when it isn't there
                separated_pair(opt(expression), ws(':'), opt(expression))
                    .map(|(start, end)| PostfixOp::Slice(start, end)),
                expression.map(PostfixOp::Index),
            )),
            cut_err(']').context(StrContext::Expected(
                StrContextValue::CharLiteral(']'),
            )),
        )
        .context(ctx_label("index")),
        preceded(ws('|'), cut_err(filter_name))
            .map(PostfixOp::Filter)
            .context(ctx_label("filter")),
    ))
    .parse_next(input)
}

/// Parse a filter name from the fixed registry. Unknown names are rejected
/// here, at parse time
fn filter_name(input: &mut &str) -> ModalResult<Filter> {
    identifier
        .try_map(|name| name.as_str().parse::<Filter>())
        .context(ctx_label("filter name"))
        .parse_next(input)
}

fn primary(input: &mut &str) -> ModalResult<Expression> {
    ws(terminated(
        alt((
            // Parenthesized subexpression. The open paren is unambiguous so
            // any error after it is fatal
            preceded('(', cut_err(terminated(expression, ws(')'))))
                .context(ctx_label("parenthesized expression")),
            literal.map(Expression::Literal),
            array.map(Expression::Array),
            object.map(Expression::Object),
            identifier.map(Expression::Field),
            // If all cases fail, the error from the last case is used. But
            // we want to report an error of "invalid expression" instead
            fail.context(ctx_expected("literal"))
                .context(ctx_expected("array"))
                .context(ctx_expected("variable")),
        )),
        boundary,
    ))
    .context(ctx_label("expression"))
    .parse_next(input)
}

/// Detect the end of a token without consuming any input. This parser is
/// used after parsing a primary expression to ensure we got the entire
/// token. For example, it prevents parsing `1user` as a number with
/// lingering input.
fn boundary(input: &mut &str) -> ModalResult<()> {
    // A token boundary is the same set of characters that cannot be included
    // in an identifier, as an identifier is a superset of what's allowed in
    // number literals.
    match input.chars().next() {
        None => Ok(()),
        Some(c) if !Identifier::is_char_allowed(c) => Ok(()),
        Some(_) => cut_err(fail)
            .context(ctx_expected("end of token"))
            .parse_next(input),
    }
}

/// Parse a literal: null, bool, int, float, string
fn literal(input: &mut &str) -> ModalResult<Literal> {
    alt((
        keyword(NULL).map(|_| Literal::Null),
        keyword(FALSE).map(|_| Literal::Boolean(false)),
        keyword(TRUE).map(|_| Literal::Boolean(true)),
        // If we see a number with a . or e/E (for scientific notation), it's a
        // float. Otherwise it's an int. We need to do this peek check to
        // prevent the int parser from eating the first half of a float and
        // leaving us in an unrecoverable state. We can't put the float parser
        // first because it would consume all ints.
        preceded(
            peek((
                opt('-'),
                take_while(1.., |c: char| c.is_ascii_digit()),
                one_of(['.', 'e', 'E']),
            )),
            float.map(Literal::Float).context(ctx_label("float")),
        ),
        dec_int.map(Literal::Integer).context(ctx_label("int")),
        string_literal,
    ))
    .parse_next(input)
}

/// Parse a string literal: '...' or "..."
fn string_literal(input: &mut &str) -> ModalResult<Literal> {
    alt((quoted_string('\''), quoted_string('"')))
        .map(Literal::String)
        .context(ctx_label("string literal"))
        .parse_next(input)
}

/// Parse an array: [expr, ...]
fn array(input: &mut &str) -> ModalResult<Vec<Expression>> {
    delimited_list('[', expression, ']')
        .context(ctx_label("array"))
        .parse_next(input)
}

/// Parse an object: {'key': expr, ...}
fn object(input: &mut &str) -> ModalResult<Vec<(Expression, Expression)>> {
    delimited_list('{', separated_pair(expression, ws(':'), expression), '}')
        .context(ctx_label("object"))
        .parse_next(input)
}

/// Parse a constant value: a literal, or arrays/objects of constants. This
/// is the grammar used for reinterpreting rendered output, so unlike the
/// expression grammar it evaluates directly to [Value]
fn constant(input: &mut &str) -> ModalResult<Value> {
    ws(alt((
        literal.map(|literal| Value::from(&literal)),
        delimited_list('[', constant, ']').map(Value::Array),
        delimited_list('{', separated_pair(constant, ws(':'), constant), '}')
            .try_map(|entries: Vec<(Value, Value)>| {
                entries
                    .into_iter()
                    .map(|(key, value)| Ok((key.try_into_string()?, value)))
                    .collect::<Result<IndexMap<_, _>, crate::RenderError>>()
            })
            .map(Value::Object),
    )))
    .parse_next(input)
}

/// Create a parser for a comma-separated list with bounding delimiters.
/// Supports an optional trailing comma and whitespace around each element.
/// The open delimiter must be unambiguous, such that any error after the open
/// is fatal.
fn delimited_list<'a, O, Acc, F>(
    open: char,
    parser: F,
    close: char,
) -> impl ModalParser<&'a str, Acc, ContextError>
where
    F: ModalParser<&'a str, O, ContextError>,
    Acc: Accumulate<O>,
{
    preceded(
        open,
        cut_err(terminated(
            ws(terminated(
                separated(0.., parser, ws(",")), // Comma-separated elements
                opt(ws(",")),                    // Optional trailing comma
            )),
            close.context(StrContext::Expected(StrContextValue::CharLiteral(
                close,
            ))),
        )),
    )
}

/// Create a parser for a quote-delimited string literal supporting the
/// common escape sequences
fn quoted_string<'a>(
    quote_char: char,
) -> impl ModalParser<&'a str, String, ContextError> {
    // The opening quote is unambiguous, so once we've seen it, errors are
    // fatal
    preceded(
        quote_char,
        cut_err(terminated(
            escaped(
                // escaped() requires this to take 1+ chars
                take_till(1.., move |c| c == quote_char || c == '\\'),
                '\\',
                alt((
                    "\\".value('\\'),
                    "n".value('\n'),
                    "r".value('\r'),
                    "t".value('\t'),
                    quote_char,
                )),
            ),
            cut_err(quote_char.context(StrContext::Expected(
                StrContextValue::CharLiteral(quote_char),
            ))),
        )),
    )
}

/// Create a parser for a keyword: the literal string not followed by an
/// identifier character, so that e.g. `nullable` parses as a variable and
/// not as `null` with trailing junk
fn keyword<'a>(
    word: &'static str,
) -> impl ModalParser<&'a str, &'a str, ContextError> {
    terminated(word, not(one_of(Identifier::is_char_allowed)))
}

/// Wrap a parser to allow whitespace on either side of it
fn ws<'a, O, F>(parser: F) -> impl ModalParser<&'a str, O, ContextError>
where
    F: ModalParser<&'a str, O, ContextError>,
{
    delimited(multispace0, parser, multispace0)
}

/// Parse a variable/attribute name. See [Identifier] for the allowed syntax
fn identifier(input: &mut &str) -> ModalResult<Identifier> {
    (
        // The first char must be a letter or underscore, so if we see that
        // we're unambiguously in an identifier. Any error after is fatal.
        take_while(1, Identifier::is_char_allowed_first),
        cut_err(take_while(0.., Identifier::is_char_allowed)),
    )
        .take()
        .map(|id: &str| Identifier(id.to_owned()))
        .context(ctx_label("identifier"))
        .parse_next(input)
}

fn binary(op: BinaryOp, lhs: Expression, rhs: Expression) -> Expression {
    Expression::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    }
}

/// Create a [StrContext::Label]
fn ctx_label(label: &'static str) -> StrContext {
    StrContext::Label(label)
}

/// Create a [StrContext::Expected]
fn ctx_expected(expected: &'static str) -> StrContext {
    StrContext::Expected(StrContextValue::Description(expected))
}

#[cfg(test)]
mod tests {
    use super::*;
    use read_break_util::assert_err;
    use rstest::rstest;

    /// Test round tripping between raw strings and templates. Parse, display,
    /// make sure we get the same thing back.
    ///
    /// The round trip doesn't always give the same thing back as whitespace
    /// within expressions is variable. This test uses standard whitespace in
    /// the expressions to enable round tripping; one-way parses are tested
    /// separately.
    #[rstest]
    #[case::empty("", [])]
    #[case::whitespace("   ", [raw("   ")])]
    #[case::raw("raw", [raw("raw")])]
    #[case::unopened_key("unopened}}", [raw("unopened}}")])]
    #[case::field("{{ field1 }}", [field_chunk("field1")])]
    #[case::mixed(
        "intro\n{{ read_id }} and {{ tag }}\noutro",
        [
            raw("intro\n"),
            field_chunk("read_id"),
            raw(" and "),
            field_chunk("tag"),
            raw("\noutro"),
        ],
    )]
    fn test_parse_display_template(
        #[case] input: &'static str,
        #[case] expected: impl Into<Template>,
    ) {
        let expected = expected.into();
        let parsed: Template = input.parse().expect("Parsing failed");
        assert_eq!(parsed, expected, "incorrect parsed template");
        let stringified = parsed.display();
        assert_eq!(stringified, input, "incorrect stringified template");
    }

    /// Test parsing with non-standard whitespace. These strings don't round
    /// trip to the same thing so they're separate from test_parse_display
    #[rstest]
    #[case::no_whitespace("{{field1}}", [field_chunk("field1")])]
    #[case::bonus_whitespace("{{   field1   }}", [field_chunk("field1")])]
    #[case::object(
        "{{{'a': 1}}}", [object([(literal("a"), literal(1))]).into()],
    )]
    fn test_parse_template(
        #[case] input: &'static str,
        #[case] expected: impl Into<Template>,
    ) {
        let parsed: Template = input.parse().expect("Parsing failed");
        assert_eq!(parsed, expected.into(), "incorrect parsed template");
    }

    /// Test parsing error cases
    #[rstest]
    #[case::unclosed_expression("{{", "invalid expression")]
    #[case::empty_expression("{{}}", "invalid expression")]
    #[case::invalid_expression("{{.}}", "invalid expression")]
    #[case::unclosed_object("{{{'a': 1}}", "expected `}`")]
    fn test_parse_template_error(
        #[case] template: &str,
        #[case] expected_error: &str,
    ) {
        assert_err!(template.parse::<Template>(), expected_error);
    }

    /// Test round tripping between raw strings and expressions. It's easier
    /// to test individual expressions outside the context of a template.
    #[rstest]
    // ===== Primitive literals =====
    #[case::literal_null("null", literal(Literal::Null), None)]
    #[case::literal_bool_false("false", literal(false), None)]
    #[case::literal_bool_true("true", literal(true), None)]
    #[case::literal_int_positive("17", literal(17), None)]
    // The unary-minus branch can't parse the magnitude as an i64, so this
    // backtracks to the signed int literal parser
    #[case::literal_int_min("-9223372036854775808", literal(i64::MIN), None)]
    #[case::literal_float_positive("3.5", literal(3.5), None)]
    #[case::literal_float_scientific("3.5e3", literal(3500.0), Some("3500"))]
    // ===== String literals =====
    #[case::literal_string_single("'hello'", literal("hello"), None)]
    #[case::literal_string_single_empty("''", literal(""), None)]
    #[case::literal_string_single_escape(
        r"'hello \'\n\t\r\\'",
        literal("hello '\n\t\r\\"),
        None
    )]
    // Double quote strings display back to single quotes
    #[case::literal_string_double(
        "\"hello\"",
        literal("hello"),
        Some("'hello'")
    )]
    // ===== Array literals =====
    #[case::array(
        "[1, 'hi', field]",
        array([literal(1), literal("hi"), field("field")]),
        None,
    )]
    #[case::array_trailing_comma("[1,]", array([literal(1)]), Some("[1]"))]
    // ===== Object literals =====
    #[case::object(
        "{'a': 'hi', 1: 2}",
        object([
            (literal("a"), literal("hi")),
            (literal(1), literal(2)),
        ]),
        None,
    )]
    // ===== Fields =====
    #[case::field("field1", field("field1"), None)]
    #[case::field_not_a_keyword("nullable", field("nullable"), None)]
    // ===== Operators =====
    #[case::add("a + 1", binary_expr(BinaryOp::Add, field("a"), literal(1)), None)]
    #[case::add_no_space("a+1", binary_expr(BinaryOp::Add, field("a"), literal(1)), Some("a + 1"))]
    #[case::sub_chain(
        "a - 1 - 2",
        binary_expr(
            BinaryOp::Sub,
            binary_expr(BinaryOp::Sub, field("a"), literal(1)),
            literal(2),
        ),
        None,
    )]
    #[case::precedence_mul(
        "a + b * 2",
        binary_expr(
            BinaryOp::Add,
            field("a"),
            binary_expr(BinaryOp::Mul, field("b"), literal(2)),
        ),
        None,
    )]
    #[case::floor_div("a // 2", binary_expr(BinaryOp::FloorDiv, field("a"), literal(2)), None)]
    #[case::rem("a % 2", binary_expr(BinaryOp::Rem, field("a"), literal(2)), None)]
    #[case::comparison("a <= 5", binary_expr(BinaryOp::Le, field("a"), literal(5)), None)]
    #[case::bool_ops(
        "a and b or c",
        binary_expr(
            BinaryOp::Or,
            binary_expr(BinaryOp::And, field("a"), field("b")),
            field("c"),
        ),
        None,
    )]
    #[case::not("not a", unary_not(field("a")), None)]
    #[case::not_comparison(
        "not a == b",
        unary_not(binary_expr(BinaryOp::Eq, field("a"), field("b"))),
        None,
    )]
    #[case::neg("-a", neg(field("a")), None)]
    #[case::parens(
        "(a + 1) * 2",
        binary_expr(
            BinaryOp::Mul,
            binary_expr(BinaryOp::Add, field("a"), literal(1)),
            literal(2),
        ),
        None,
    )]
    // ===== Postfix =====
    #[case::attribute("params.R2_S2", attribute(field("params"), "R2_S2"), None)]
    #[case::attribute_chain(
        "params.a.b",
        attribute(attribute(field("params"), "a"), "b"),
        None,
    )]
    #[case::index("seq[0]", index(field("seq"), literal(0)), None)]
    #[case::index_negative("seq[-1]", index(field("seq"), neg(literal(1))), None)]
    #[case::slice(
        "seq[2:8]",
        slice(field("seq"), Some(literal(2)), Some(literal(8))),
        None,
    )]
    #[case::slice_open_start(
        "seq[:4]",
        slice(field("seq"), None, Some(literal(4))),
        None,
    )]
    #[case::slice_open_end(
        "seq[4:]",
        slice(field("seq"), Some(literal(4)), None),
        None,
    )]
    #[case::filter("params.R2_S2 | length", filter(attribute(field("params"), "R2_S2"), Filter::Length), None)]
    #[case::filter_binds_tight(
        "a + b | length",
        binary_expr(BinaryOp::Add, field("a"), filter(field("b"), Filter::Length)),
        None,
    )]
    #[case::filter_chain(
        "a | trim | upper",
        filter(filter(field("a"), Filter::Trim), Filter::Upper),
        None,
    )]
    fn test_parse_display_expression(
        #[case] input: &'static str,
        #[case] expected: Expression,
        #[case] expected_display: Option<&'static str>,
    ) {
        let parsed: Expression = expression
            .parse(input)
            .unwrap_or_else(|error| panic!("{error}"));
        assert_eq!(parsed, expected, "incorrect parsed expression");
        let stringified = parsed.to_string();
        let expected_str = expected_display.unwrap_or(input);
        assert_eq!(
            stringified, expected_str,
            "incorrect stringified expression"
        );
    }

    /// Test parsing error cases for expressions
    #[rstest]
    #[case::field_leading_number("1user", "invalid expression")]
    #[case::unknown_filter("a | reverse", "invalid filter")]
    #[case::filter_missing_name("a |", "invalid identifier")]
    #[case::array_incomplete("[bogus", "invalid array")]
    #[case::string_incomplete("'bogus", "invalid string")]
    #[case::trailing_dot("bogus.", "invalid identifier")]
    fn test_parse_expression_error(
        #[case] input: &str,
        #[case] expected_error: &str,
    ) {
        assert_err!(
            expression.parse(input).map_err(|error| {
                anyhow::Error::msg(error.to_string())
            }),
            expected_error
        );
    }

    /// Rendered output reinterpretation: only constants parse
    #[rstest]
    #[case::int("12", Some(Value::Integer(12)))]
    #[case::int_negative("-3", Some(Value::Integer(-3)))]
    #[case::int_whitespace(" 12 ", Some(Value::Integer(12)))]
    #[case::float("2.5", Some(Value::Float(2.5)))]
    #[case::boolean("true", Some(Value::Boolean(true)))]
    #[case::null("null", Some(Value::Null))]
    #[case::array("[1, 2]", Some(Value::Array(vec![
        Value::Integer(1),
        Value::Integer(2),
    ])))]
    #[case::object("{'a': 1}", Some(Value::Object(
        [("a".to_owned(), Value::Integer(1))].into_iter().collect(),
    )))]
    #[case::bare_string("ACGT", None)]
    #[case::numeric_prefix("3 reads", None)]
    #[case::sequence_of_digits_with_letters("12ab", None)]
    fn test_parse_constant(
        #[case] input: &str,
        #[case] expected: Option<Value>,
    ) {
        assert_eq!(parse_constant(input), expected);
    }

    /// Shorthand for creating a new raw chunk
    fn raw(value: &str) -> TemplateChunk {
        TemplateChunk::Raw(value.to_owned().into())
    }

    /// Shorthand for creating a field expression chunk
    fn field_chunk(f: &'static str) -> TemplateChunk {
        TemplateChunk::Expression(field(f))
    }

    /// Shorthand for creating a literal expression
    fn literal(l: impl Into<Literal>) -> Expression {
        Expression::Literal(l.into())
    }

    /// Shorthand for creating a field expression
    fn field(f: &'static str) -> Expression {
        Expression::Field(f.into())
    }

    /// Shorthand for creating an array literal expression
    fn array<const N: usize>(expressions: [Expression; N]) -> Expression {
        Expression::Array(expressions.into())
    }

    /// Shorthand for creating an object literal expression
    fn object<const N: usize>(
        entries: [(Expression, Expression); N],
    ) -> Expression {
        Expression::Object(entries.into())
    }

    fn binary_expr(
        op: BinaryOp,
        lhs: Expression,
        rhs: Expression,
    ) -> Expression {
        binary(op, lhs, rhs)
    }

    fn unary_not(operand: Expression) -> Expression {
        Expression::Unary {
            op: UnaryOp::Not,
            operand: Box::new(operand),
        }
    }

    fn neg(operand: Expression) -> Expression {
        Expression::Unary {
            op: UnaryOp::Neg,
            operand: Box::new(operand),
        }
    }

    fn attribute(object: Expression, name: &'static str) -> Expression {
        Expression::Attribute {
            object: Box::new(object),
            attribute: name.into(),
        }
    }

    fn index(object: Expression, index: Expression) -> Expression {
        Expression::Index {
            object: Box::new(object),
            index: Box::new(index),
        }
    }

    fn slice(
        object: Expression,
        start: Option<Expression>,
        end: Option<Expression>,
    ) -> Expression {
        Expression::Slice {
            object: Box::new(object),
            start: start.map(Box::new),
            end: end.map(Box::new),
        }
    }

    fn filter(operand: Expression, filter: Filter) -> Expression {
        Expression::Filter {
            operand: Box::new(operand),
            filter,
        }
    }
}
