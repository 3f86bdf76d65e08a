//! Per-read pipeline execution

use crate::{
    config::{Op, Param, ReadEnd},
    fastq::ReadPair,
    log::ParseLog,
    pipeline::{Pipeline, Step},
    seq::wobble_match,
};
use indexmap::IndexMap;
use read_break_template::{MapContext, RenderError, Value};
use read_break_util::slice_bounds;
use std::sync::Arc;
use thiserror::Error;
use tracing::trace;

/// Executes a compiled pipeline against read pairs, one pair at a time. The
/// pipeline is shared and immutable; each parser owns its parse log, so
/// parallel callers run one parser per worker and merge the logs.
#[derive(Debug)]
pub struct ReadParser {
    pipeline: Arc<Pipeline>,
    log: ParseLog,
}

impl ReadParser {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        let log = ParseLog::new(pipeline.step_ids());
        Self { pipeline, log }
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn log(&self) -> &ParseLog {
        &self.log
    }

    pub fn reset_log(&mut self) {
        self.log = ParseLog::new(self.pipeline.step_ids());
    }

    /// Execute the pipeline on a single read pair. Each step runs in
    /// declared order against a context seeded with the read id and
    /// sequence lengths; steps read values their predecessors stored. The
    /// first must-pass step to fail aborts the pair; optional failures are
    /// counted and skipped.
    pub fn parse(&mut self, pair: &ReadPair) -> Outcome {
        let pipeline = Arc::clone(&self.pipeline);
        self.log.total_reads += 1;

        let mut context: IndexMap<String, Value> = IndexMap::from_iter([
            ("read_id".to_owned(), Value::String(pair.id.clone())),
            (
                "len_seq1".to_owned(),
                Value::Integer(pair.seq1.chars().count() as i64),
            ),
            (
                "len_seq2".to_owned(),
                Value::Integer(pair.seq2.chars().count() as i64),
            ),
        ]);

        for step in pipeline.steps() {
            let seq = match step.read {
                Some(ReadEnd::R1) => pair.seq1.as_str(),
                Some(ReadEnd::R2) => pair.seq2.as_str(),
                None => "",
            };

            // A step error (bad coercion, unknown regex, ...) takes the same
            // path as an ordinary failed check; it must never escape parse()
            let message =
                match eval_step(&pipeline, step, seq, &mut context) {
                    Ok(true) => continue,
                    Ok(false) => format!(
                        "{} operation failed",
                        capitalize(step.op.name())
                    ),
                    Err(error) => format!(
                        "{} operation error: {error}",
                        capitalize(step.op.name())
                    ),
                };

            // Count every step failure exactly once, must-pass or not
            self.log.record_step_failure(&step.id);
            if step.must_pass {
                self.log.failed_reads += 1;
                trace!(
                    read_id = %pair.id,
                    step = %step.id,
                    %message,
                    "Read failed"
                );
                return Outcome::Fail(ParseFailure {
                    read_id: pair.id.clone(),
                    failed_step: step.id.clone(),
                    message,
                });
            }
        }

        context
            .insert("status".to_owned(), Value::String("ok".to_owned()));
        self.log.successful_reads += 1;
        Outcome::Ok(context)
    }
}

/// Result of parsing one read pair
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    /// Every must-pass step succeeded. The context holds the seeded
    /// metadata, everything the steps stored, and `status: "ok"`.
    Ok(IndexMap<String, Value>),
    /// A must-pass step failed or errored
    Fail(ParseFailure),
}

impl Outcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok(_))
    }

    pub fn context(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Self::Ok(context) => Some(context),
            Self::Fail(_) => None,
        }
    }
}

/// The record returned for a failed read: which step aborted the pair, and
/// a human-readable reason
#[derive(Clone, Debug, PartialEq)]
pub struct ParseFailure {
    pub read_id: String,
    pub failed_step: String,
    pub message: String,
}

/// An error caught while evaluating a single step. These are converted to
/// step failures by the evaluator loop.
#[derive(Debug, Error)]
pub enum StepError {
    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("No regex named `{name}`")]
    UnknownRegex { name: String },

    #[error("Field `{field}` must be non-negative, got {value}")]
    NegativeField { field: &'static str, value: i64 },
}

/// Evaluate one step against the selected sequence. `Ok(true)` is success,
/// `Ok(false)` is a failed check, `Err` is a caught step error; the caller
/// funnels the latter two into the same failure handling.
fn eval_step(
    pipeline: &Pipeline,
    step: &Step,
    seq: &str,
    context: &mut IndexMap<String, Value>,
) -> Result<bool, StepError> {
    match &step.op {
        Op::Match {
            reference,
            max_wobble,
            max_mismatch,
            base_offset,
            hamming_fn,
            store_pos_as,
        } => {
            let (reference, max_wobble, max_mismatch, base_offset) = {
                let scope = scope(pipeline, context);
                (
                    render_string(reference, &scope)?,
                    render_index(max_wobble, "max_wobble", &scope)?,
                    render_index(max_mismatch, "max_mismatch", &scope)?,
                    base_offset
                        .as_ref()
                        .map(|param| {
                            render_index(param, "base_offset", &scope)
                        })
                        .transpose()?
                        .unwrap_or(0),
                )
            };
            match wobble_match(
                seq,
                &reference,
                max_wobble,
                max_mismatch,
                base_offset,
                *hamming_fn,
            ) {
                Some(offset) => {
                    context.insert(
                        store_pos_as.clone(),
                        Value::Integer(offset as i64),
                    );
                    Ok(true)
                }
                // A miss fails a must-pass step; an optional step records
                // the miss as null and carries on successfully
                None if step.must_pass => Ok(false),
                None => {
                    context.insert(store_pos_as.clone(), Value::Null);
                    Ok(true)
                }
            }
        }

        Op::Extract {
            start,
            length,
            store_seq_as,
            whitelist,
            store_match_as,
        } => {
            let (start, length) = {
                let scope = scope(pipeline, context);
                (render_int(start, &scope)?, render_int(length, &scope)?)
            };
            let fragment = substring(seq, start, length);
            context.insert(
                store_seq_as.clone(),
                Value::String(fragment.clone()),
            );
            match whitelist {
                Some(name) => {
                    let ok = pipeline
                        .whitelist(name)
                        .is_some_and(|set| set.contains(&fragment));
                    let key = store_match_as
                        .clone()
                        .unwrap_or_else(|| format!("{}_ok", step.id));
                    context.insert(key, Value::Boolean(ok));
                    Ok(ok)
                }
                None => Ok(true),
            }
        }

        Op::HammingTest {
            reference,
            start,
            length,
            max_mismatch,
            hamming_fn,
            store_result_as,
        } => {
            let (reference, start, length, max_mismatch) = {
                let scope = scope(pipeline, context);
                (
                    render_string(reference, &scope)?,
                    render_int(start, &scope)?,
                    render_int(length, &scope)?,
                    render_int(max_mismatch, &scope)?,
                )
            };
            let window = substring(seq, start, length);
            let distance = hamming_fn.distance(&reference, &window) as i64;
            let result = distance <= max_mismatch;
            let key = store_result_as
                .clone()
                .unwrap_or_else(|| step.id.clone());
            context.insert(key, Value::Boolean(result));
            Ok(result)
        }

        Op::Test {
            expression,
            store_result_as,
        } => {
            let result = {
                let scope = scope(pipeline, context);
                expression.render(&scope)?.to_bool()
            };
            let key = store_result_as
                .clone()
                .unwrap_or_else(|| step.id.clone());
            context.insert(key, Value::Boolean(result));
            Ok(result)
        }

        Op::RegexSearch {
            pattern,
            store_pos_as,
            store_match_as,
            default,
        } => {
            let regex = pipeline.regex(pattern).ok_or_else(|| {
                StepError::UnknownRegex {
                    name: pattern.clone(),
                }
            })?;
            match regex.find(seq) {
                Some(found) => {
                    context.insert(
                        store_pos_as.clone(),
                        Value::Integer(found.start() as i64),
                    );
                    if let Some(key) = store_match_as {
                        context.insert(
                            key.clone(),
                            Value::String(found.as_str().to_owned()),
                        );
                    }
                    Ok(true)
                }
                None => {
                    context.insert(
                        store_pos_as.clone(),
                        default.clone().unwrap_or(Value::Null),
                    );
                    Ok(false)
                }
            }
        }

        Op::Compute {
            expression,
            store_as,
            pass_if,
        } => {
            let value = {
                let scope = scope(pipeline, context);
                expression.render(&scope)?
            };
            context.insert(store_as.clone(), value);
            match pass_if {
                // pass_if may reference the value just stored
                Some(pass_if) => {
                    let scope = scope(pipeline, context);
                    Ok(pass_if.render(&scope)?.to_bool())
                }
                None => Ok(true),
            }
        }
    }
}

/// Build the template scope for a render: per-read context variables first,
/// then the globals under their namespace
fn scope<'a>(
    pipeline: &'a Pipeline,
    context: &'a IndexMap<String, Value>,
) -> MapContext<'a> {
    MapContext {
        variables: context,
        namespace_key: pipeline.namespace(),
        namespace: pipeline.globals(),
    }
}

fn render_string(
    param: &Param,
    scope: &MapContext,
) -> Result<String, StepError> {
    Ok(param.render(scope)?.try_into_string()?)
}

fn render_int(param: &Param, scope: &MapContext) -> Result<i64, StepError> {
    Ok(param.render(scope)?.try_into_int()?)
}

/// Render an integer field that must be usable as a sequence offset
fn render_index(
    param: &Param,
    field: &'static str,
    scope: &MapContext,
) -> Result<usize, StepError> {
    let value = render_int(param, scope)?;
    usize::try_from(value)
        .map_err(|_| StepError::NegativeField { field, value })
}

/// `seq[start..start + length]` with Python slicing rules: negative indices
/// count from the end, and out-of-range bounds clamp to a shorter (possibly
/// empty) fragment
fn substring(seq: &str, start: i64, length: i64) -> String {
    let chars: Vec<char> = seq.chars().collect();
    let (from, to) = slice_bounds(
        chars.len(),
        Some(start),
        Some(start.saturating_add(length)),
    );
    chars[from..to].iter().collect()
}

/// Uppercase the first character, like Python's str.capitalize but without
/// lowercasing the rest (op names are already lowercase)
fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
