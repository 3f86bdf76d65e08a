//! The plain data types that make up a pipeline specification, as loaded
//! from YAML and before compilation.

use crate::seq::Metric;
use indexmap::IndexMap;
use read_break_template::{
    Context, RenderError, Template, TemplateParseError, Value,
};
use read_break_util::{ResultTraced, parse_yaml};
use serde::{Deserialize, de::Error as _};
use std::{fmt, fs::File, path::Path};
use tracing::info;

/// A declarative read-parsing pipeline: an ordered list of steps plus the
/// global constants (`params`) their templates can reference.
#[derive(Debug, Default, Deserialize)]
pub struct PipelineConfig {
    pub pipeline: Vec<StepConfig>,
    /// Global constants. Values may themselves be templates referencing
    /// other globals; they are resolved to a fixed point at compile time.
    #[serde(default)]
    pub params: IndexMap<String, Value>,
}

impl PipelineConfig {
    /// Load a pipeline spec from a YAML file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        info!(?path, "Loading pipeline spec");
        (|| {
            let file = File::open(path)?;
            let config = parse_yaml::<Self>(&file)?;
            Ok::<_, anyhow::Error>(config)
        })()
        .map_err(|error| {
            error.context(format!("Error loading pipeline spec from {path:?}"))
        })
        .traced()
    }
}

/// One step of a pipeline. The operation payload is flattened in the spec,
/// so a step looks like `{id: ..., op: match, read: 1, ref: ..., ...}`.
#[derive(Clone, Debug, Deserialize)]
pub struct StepConfig {
    /// Stable identifier for logging and failure reporting. Defaults to
    /// `step_<index>` when omitted.
    #[serde(default)]
    pub id: Option<String>,
    /// Which read the step operates on. `test` and `compute` steps omit it.
    #[serde(default)]
    pub read: Option<ReadEnd>,
    /// When true (the default), a failure of this step fails the whole read
    #[serde(default = "default_must_pass")]
    pub must_pass: bool,
    #[serde(flatten)]
    pub op: Op,
}

fn default_must_pass() -> bool {
    true
}

/// Selects which of the pair's sequences a step sees
#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(try_from = "u8")]
pub enum ReadEnd {
    R1 = 1,
    R2 = 2,
}

impl TryFrom<u8> for ReadEnd {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::R1),
            2 => Ok(Self::R2),
            other => Err(format!("invalid read `{other}`; expected 1 or 2")),
        }
    }
}

/// An operation and its fields. Fields that accept templates are [Param]s;
/// fields that name context keys are plain strings and are never rendered.
#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Op {
    /// Approximate positional search for a reference within the read
    Match {
        #[serde(rename = "ref")]
        reference: Param,
        max_wobble: Param,
        max_mismatch: Param,
        #[serde(default)]
        base_offset: Option<Param>,
        hamming_fn: Metric,
        /// Receives the *relative* match offset, or null on an optional miss
        store_pos_as: String,
    },
    /// Substring copy with an optional whitelist membership check
    Extract {
        start: Param,
        length: Param,
        store_seq_as: String,
        #[serde(default)]
        whitelist: Option<String>,
        /// Key for the whitelist check result; defaults to `<id>_ok`
        #[serde(default)]
        store_match_as: Option<String>,
    },
    /// Fixed-position mismatch-count check
    HammingTest {
        #[serde(rename = "ref")]
        reference: Param,
        start: Param,
        length: Param,
        max_mismatch: Param,
        hamming_fn: Metric,
        /// Key for the boolean result; defaults to the step id
        #[serde(default)]
        store_result_as: Option<String>,
    },
    /// Boolean expression over the context
    Test {
        expression: Param,
        #[serde(default)]
        store_result_as: Option<String>,
    },
    /// Search with a named, precompiled regex
    RegexSearch {
        pattern: String,
        store_pos_as: String,
        #[serde(default)]
        store_match_as: Option<String>,
        /// Stored under `store_pos_as` when the regex doesn't match
        #[serde(default)]
        default: Option<Value>,
    },
    /// Value-producing expression with an optional pass condition
    Compute {
        expression: Param,
        store_as: String,
        #[serde(default)]
        pass_if: Option<Param>,
    },
}

impl Op {
    /// The operation name as written in specs
    pub fn name(&self) -> &'static str {
        match self {
            Self::Match { .. } => "match",
            Self::Extract { .. } => "extract",
            Self::HammingTest { .. } => "hamming_test",
            Self::Test { .. } => "test",
            Self::RegexSearch { .. } => "regex_search",
            Self::Compute { .. } => "compute",
        }
    }

    /// Mutable references to every template-capable field, for the freeze
    /// pass
    pub(crate) fn params_mut(&mut self) -> Vec<&mut Param> {
        match self {
            Self::Match {
                reference,
                max_wobble,
                max_mismatch,
                base_offset,
                ..
            } => {
                let mut params =
                    vec![reference, max_wobble, max_mismatch];
                params.extend(base_offset.as_mut());
                params
            }
            Self::Extract { start, length, .. } => vec![start, length],
            Self::HammingTest {
                reference,
                start,
                length,
                max_mismatch,
                ..
            } => vec![reference, start, length, max_mismatch],
            Self::Test { expression, .. } => vec![expression],
            Self::RegexSearch { .. } => vec![],
            Self::Compute {
                expression,
                pass_if,
                ..
            } => {
                let mut params = vec![expression];
                params.extend(pass_if.as_mut());
                params
            }
        }
    }
}

/// A step field that is either a constant or a template rendered per read.
/// Only strings containing `{{` are parsed as templates; every other value
/// (including plain strings) is passed through verbatim.
#[derive(Clone, Debug, PartialEq)]
pub enum Param {
    Constant(Value),
    Template(Template),
}

impl Param {
    pub(crate) fn from_value(
        value: Value,
    ) -> Result<Self, TemplateParseError> {
        match value {
            Value::String(s) if s.contains("{{") => {
                Ok(Self::Template(s.parse()?))
            }
            value => Ok(Self::Constant(value)),
        }
    }

    /// Resolve this param to a value: constants are returned as-is,
    /// templates are rendered against the given context
    pub fn render<Ctx: Context>(
        &self,
        context: &Ctx,
    ) -> Result<Value, RenderError> {
        match self {
            Self::Constant(value) => Ok(value.clone()),
            Self::Template(template) => template.render(context),
        }
    }

    /// Is this param still a template after freezing?
    pub fn is_template(&self) -> bool {
        matches!(self, Self::Template(_))
    }
}

/// Print constants in value syntax and templates in their source form
impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Constant(value) => write!(f, "{value}"),
            Self::Template(template) => write!(f, "{}", template.display()),
        }
    }
}

impl<'de> Deserialize<'de> for Param {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(value).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use read_break_util::assert_matches;

    /// A full spec deserializes with flattened op payloads and defaults
    #[test]
    fn test_deserialize_spec() {
        let yaml = "
pipeline:
  - id: match_s1
    read: 1
    op: match
    ref: GGGTAC
    hamming_fn: hamming
    max_wobble: 5
    max_mismatch: 0
    store_pos_as: s1_start
  - id: extract_tag
    read: 2
    op: extract
    must_pass: false
    start: '{{ s1_start + 6 }}'
    length: 4
    store_seq_as: tag
params:
  LT_LEN: 15
";
        let config: PipelineConfig =
            serde_yaml::from_str(yaml).expect("deserialization failed");
        assert_eq!(config.params["LT_LEN"], Value::Integer(15));
        assert_eq!(config.pipeline.len(), 2);

        let first = &config.pipeline[0];
        assert_eq!(first.id.as_deref(), Some("match_s1"));
        assert_eq!(first.read, Some(ReadEnd::R1));
        assert!(first.must_pass);
        let reference = assert_matches!(
            &first.op,
            Op::Match {
                reference: Param::Constant(Value::String(reference)),
                hamming_fn: Metric::Hamming,
                ..
            } => reference,
        );
        assert_eq!(reference, "GGGTAC");

        let second = &config.pipeline[1];
        assert!(!second.must_pass);
        assert_matches!(
            &second.op,
            Op::Extract { start: Param::Template(_), length: Param::Constant(Value::Integer(4)), .. },
        );
    }

    #[rstest::rstest]
    #[case::unknown_op("pipeline: [{op: align, read: 1}]")]
    #[case::unknown_metric(
        "pipeline: [{op: match, read: 1, ref: A, hamming_fn: levenshtein, \
         max_wobble: 0, max_mismatch: 0, store_pos_as: p}]"
    )]
    #[case::bad_read("pipeline: [{op: test, read: 3, expression: 'true'}]")]
    #[case::missing_field("pipeline: [{op: extract, read: 1, start: 0}]")]
    fn test_deserialize_error(#[case] yaml: &str) {
        assert!(serde_yaml::from_str::<PipelineConfig>(yaml).is_err());
    }
}
