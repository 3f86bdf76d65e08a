//! Pipeline compilation: globals resolution, constant freezing, regex
//! compilation, and whitelist loading. Compilation runs once; the resulting
//! [Pipeline] is immutable and can be shared between evaluators.

use crate::config::{Op, Param, PipelineConfig, ReadEnd, StepConfig};
use indexmap::IndexMap;
use itertools::Itertools;
use read_break_template::{
    MapContext, RenderError, Template, TemplateParseError, Value,
};
use regex::Regex;
use std::{
    collections::HashSet,
    fmt, fs,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{info, warn};

/// Upper bound on globals resolution passes. An acyclic spec settles in at
/// most one pass per dependency level, so hitting this means a cycle.
const MAX_RESOLVE_PASSES: usize = 10;

/// Default name the globals are exposed under inside templates
pub const DEFAULT_NAMESPACE: &str = "params";

/// Options for [Pipeline::compile]
#[derive(Clone, Debug)]
pub struct CompileOptions {
    /// Directory that whitelist paths are resolved against
    pub base_dir: Option<PathBuf>,
    /// Name the globals are exposed under inside templates
    pub namespace: String,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            base_dir: None,
            namespace: DEFAULT_NAMESPACE.to_owned(),
        }
    }
}

/// A compiled pipeline: steps with synthesized ids and frozen constant
/// fields, fully resolved globals, compiled regexes, and loaded whitelists.
/// Nothing in here is mutated after construction.
#[derive(Debug)]
pub struct Pipeline {
    steps: Vec<Step>,
    /// Resolved globals, as an object so templates can do `params.NAME`
    globals: Value,
    namespace: String,
    regexes: IndexMap<String, Regex>,
    whitelists: IndexMap<String, HashSet<String>>,
}

/// One compiled pipeline step
#[derive(Clone, Debug)]
pub struct Step {
    pub id: String,
    pub read: Option<ReadEnd>,
    pub must_pass: bool,
    pub op: Op,
}

impl Pipeline {
    /// Compile a pipeline spec. This resolves the globals to a fixed point,
    /// freezes step fields that depend only on globals, compiles regex
    /// patterns, and loads barcode whitelists.
    pub fn compile(
        config: PipelineConfig,
        options: CompileOptions,
    ) -> Result<Self, PipelineError> {
        let PipelineConfig { pipeline, params } = config;

        let mut globals = params;
        resolve_globals(&mut globals, &options.namespace)?;
        let regexes = compile_regexes(&globals)?;
        let whitelists =
            load_whitelists(&globals, options.base_dir.as_deref())?;
        let globals = Value::Object(globals);

        let steps = pipeline
            .into_iter()
            .enumerate()
            .map(|(index, config)| {
                let StepConfig {
                    id,
                    read,
                    must_pass,
                    op,
                } = config;
                let mut step = Step {
                    id: id.unwrap_or_else(|| format!("step_{index}")),
                    read,
                    must_pass,
                    op,
                };
                freeze_step(&mut step, &globals, &options.namespace)?;
                Ok(step)
            })
            .collect::<Result<Vec<_>, PipelineError>>()?;

        info!(
            steps = steps.len(),
            regexes = regexes.len(),
            whitelists = whitelists.len(),
            "Compiled pipeline"
        );
        Ok(Self {
            steps,
            globals,
            namespace: options.namespace,
            regexes,
            whitelists,
        })
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn step_ids(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().map(|step| step.id.as_str())
    }

    /// The resolved globals object
    pub fn globals(&self) -> &Value {
        &self.globals
    }

    /// The name the globals are exposed under inside templates
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn regex(&self, name: &str) -> Option<&Regex> {
        self.regexes.get(name)
    }

    pub fn whitelist(&self, name: &str) -> Option<&HashSet<String>> {
        self.whitelists.get(name)
    }
}

/// Step table, for `read-break check` and logs
impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Pipeline:")?;
        for (index, step) in self.steps.iter().enumerate() {
            let Step {
                id,
                read,
                must_pass,
                op,
            } = step;
            match op {
                Op::Test { expression, .. }
                | Op::Compute { expression, .. } => writeln!(
                    f,
                    "[{index:3} ]  {id}: {op} ({expression}, must pass: \
                     {must_pass})",
                    op = op.name(),
                )?,
                _ => {
                    let read = read
                        .map(|read| (read as u8).to_string())
                        .unwrap_or_else(|| "-".to_owned());
                    writeln!(
                        f,
                        "[{index:3} ]  {id}: {op} (read {read}, must pass: \
                         {must_pass})",
                        op = op.name(),
                    )?;
                }
            }
        }
        Ok(())
    }
}

/// Evaluate templates that appear inside the globals map (e.g.
/// `VT2_START: "{{ params.R2_S2 | length }}"`). Runs until a pass makes no
/// further changes, so globals can reference each other regardless of
/// declaration order. A value that fails to render in one pass (because its
/// dependency is still templated) is retried on the next.
fn resolve_globals(
    globals: &mut IndexMap<String, Value>,
    namespace: &str,
) -> Result<(), PipelineError> {
    let variables = IndexMap::new();

    for _ in 0..MAX_RESOLVE_PASSES {
        let mut changed = false;
        let keys: Vec<String> = globals.keys().cloned().collect();
        for key in keys {
            let Some(source) = templated_string(globals, &key) else {
                continue;
            };
            let template = source.parse::<Template>()
                .map_err(|error| PipelineError::GlobalTemplate {
                    name: key.clone(),
                    error,
                })?;
            // Earlier updates in this same pass are visible, like the source
            // map being mutated in place
            let scope = MapContext {
                variables: &variables,
                namespace_key: namespace,
                namespace: &Value::Object(globals.clone()),
            };
            if let Ok(value) = template.render(&scope)
                && globals[&key] != value
            {
                globals[&key] = value;
                changed = true;
            }
        }

        if !changed {
            // Anything still templated must at least render cleanly now;
            // otherwise it references something that will never exist
            for key in globals.keys().cloned().collect::<Vec<_>>() {
                let Some(source) = templated_string(globals, &key) else {
                    continue;
                };
                let template = source
                    .parse::<Template>()
                    .map_err(|error| PipelineError::GlobalTemplate {
                        name: key.clone(),
                        error,
                    })?;
                let scope = MapContext {
                    variables: &variables,
                    namespace_key: namespace,
                    namespace: &Value::Object(globals.clone()),
                };
                template.render(&scope).map_err(|error| {
                    PipelineError::GlobalResolve { name: key, error }
                })?;
            }
            return Ok(());
        }
    }
    Err(PipelineError::GlobalCycle)
}

/// Get a global's value as a template source string, if it is one
fn templated_string(
    globals: &IndexMap<String, Value>,
    key: &str,
) -> Option<String> {
    match globals.get(key) {
        Some(Value::String(s)) if s.contains("{{") => Some(s.clone()),
        _ => None,
    }
}

/// Render any step field that references **only** global params (i.e. does
/// not depend on per-read context) exactly once, demoting it to a constant
fn freeze_step(
    step: &mut Step,
    globals: &Value,
    namespace: &str,
) -> Result<(), PipelineError> {
    let variables = IndexMap::new();
    let scope = MapContext {
        variables: &variables,
        namespace_key: namespace,
        namespace: globals,
    };
    for param in step.op.params_mut() {
        if let Param::Template(template) = param {
            let free = template.free_variables();
            if free.iter().all(|variable| *variable == namespace) {
                let value = template.render(&scope).map_err(|error| {
                    PipelineError::Freeze {
                        step: step.id.clone(),
                        error,
                    }
                })?;
                *param = Param::Constant(value);
            }
        }
    }
    Ok(())
}

/// Compile the `regex_patterns` section of the globals. Compile failures and
/// unknown pattern types are fatal here, rather than deferred to first use.
fn compile_regexes(
    globals: &IndexMap<String, Value>,
) -> Result<IndexMap<String, Regex>, PipelineError> {
    let Some(section) = section(globals, "regex_patterns")? else {
        return Ok(IndexMap::new());
    };

    let mut regexes = IndexMap::new();
    for (name, entry) in section {
        let Value::Object(entry) = entry else {
            return Err(PipelineError::Section {
                section: "regex_patterns",
                reason: format!("pattern `{name}` must be a mapping"),
            });
        };
        let sequence = match entry.get("sequence") {
            Some(Value::String(s)) => s.as_str(),
            _ => {
                return Err(PipelineError::Section {
                    section: "regex_patterns",
                    reason: format!(
                        "pattern `{name}` is missing a `sequence` string"
                    ),
                });
            }
        };
        let pattern_type = match entry.get("type") {
            None => "full",
            Some(Value::String(s)) => s.as_str(),
            Some(other) => {
                return Err(PipelineError::Section {
                    section: "regex_patterns",
                    reason: format!(
                        "pattern `{name}` has a non-string type `{other}`"
                    ),
                });
            }
        };

        let pattern = match pattern_type {
            "full" => sequence.to_owned(),
            "full_or_tail" => {
                let min_tail = match entry.get("min_tail") {
                    None => 4,
                    Some(value) => {
                        value.clone().try_into_int().map_err(|_| {
                            PipelineError::Section {
                                section: "regex_patterns",
                                reason: format!(
                                    "pattern `{name}` has a non-integer \
                                     min_tail"
                                ),
                            }
                        })?
                    }
                };
                full_or_tail(name, sequence, min_tail)?
            }
            other => {
                return Err(PipelineError::RegexType {
                    name: name.clone(),
                    pattern_type: other.to_owned(),
                });
            }
        };

        let compiled = Regex::new(&pattern).map_err(|source| {
            PipelineError::RegexCompile {
                name: name.clone(),
                source,
            }
        })?;
        regexes.insert(name.clone(), compiled);
    }
    Ok(regexes)
}

/// Build the pattern that matches either the full sequence anywhere, or any
/// prefix of it with at least `min_tail` characters anchored to the end of
/// the input
fn full_or_tail(
    name: &str,
    sequence: &str,
    min_tail: i64,
) -> Result<String, PipelineError> {
    // Byte offset after each character, so prefixes stay on char boundaries
    let boundaries: Vec<usize> = sequence
        .char_indices()
        .map(|(offset, _)| offset)
        .skip(1)
        .chain([sequence.len()])
        .collect();
    let length = boundaries.len();
    if !(1..=length as i64).contains(&min_tail) {
        return Err(PipelineError::MinTail {
            name: name.to_owned(),
            min_tail,
            length,
        });
    }

    let alternates = (min_tail as usize..=length)
        .map(|count| &sequence[..boundaries[count - 1]])
        .join("|");
    Ok(format!("{sequence}|({alternates})$"))
}

/// Load the barcode whitelist files named in the globals. An unreadable file
/// is downgraded to a warning and an empty set, so every lookup against it
/// fails but compilation proceeds.
fn load_whitelists(
    globals: &IndexMap<String, Value>,
    base_dir: Option<&Path>,
) -> Result<IndexMap<String, HashSet<String>>, PipelineError> {
    let Some(section) = section(globals, "barcode_whitelists")? else {
        return Ok(IndexMap::new());
    };

    let mut whitelists = IndexMap::new();
    for (name, path) in section {
        let Value::String(path) = path else {
            return Err(PipelineError::Section {
                section: "barcode_whitelists",
                reason: format!("whitelist `{name}` must be a path string"),
            });
        };
        let full_path = match base_dir {
            Some(base_dir) => base_dir.join(path),
            None => PathBuf::from(path),
        };
        let whitelist: HashSet<String> = match fs::read_to_string(&full_path)
        {
            Ok(contents) => contents
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_owned)
                .collect(),
            Err(error) => {
                warn!(
                    name,
                    path = ?full_path,
                    %error,
                    "Error loading whitelist; substituting empty set"
                );
                HashSet::new()
            }
        };
        info!(name, barcodes = whitelist.len(), "Loaded barcode whitelist");
        whitelists.insert(name.clone(), whitelist);
    }
    Ok(whitelists)
}

/// Get a named section of the globals as a mapping, if present
fn section<'a>(
    globals: &'a IndexMap<String, Value>,
    name: &'static str,
) -> Result<Option<&'a IndexMap<String, Value>>, PipelineError> {
    match globals.get(name) {
        None => Ok(None),
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(_) => Err(PipelineError::Section {
            section: name,
            reason: "expected a mapping".to_owned(),
        }),
    }
}

/// A fatal configuration error raised during pipeline compilation
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid template for global `{name}`")]
    GlobalTemplate {
        name: String,
        #[source]
        error: TemplateParseError,
    },

    #[error("Could not resolve global `{name}`")]
    GlobalResolve {
        name: String,
        #[source]
        error: RenderError,
    },

    #[error(
        "Globals did not settle after {MAX_RESOLVE_PASSES} passes; check \
         for cyclic references"
    )]
    GlobalCycle,

    #[error("Error freezing constant fields of step `{step}`")]
    Freeze {
        step: String,
        #[source]
        error: RenderError,
    },

    #[error("Unknown regex type `{pattern_type}` for pattern `{name}`")]
    RegexType { name: String, pattern_type: String },

    #[error(
        "min_tail ({min_tail}) is out of range for pattern `{name}` with \
         sequence length {length}"
    )]
    MinTail {
        name: String,
        min_tail: i64,
        length: usize,
    },

    #[error("Error compiling regex pattern `{name}`")]
    RegexCompile {
        name: String,
        #[source]
        source: regex::Error,
    },

    #[error("Invalid `{section}` section: {reason}")]
    Section {
        section: &'static str,
        reason: String,
    },
}
