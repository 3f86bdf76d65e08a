//! Clip-and-write driver: run the pipeline over a stream of read pairs,
//! then trim, tag, and write the pairs that parse cleanly

use crate::{
    eval::{Outcome, ReadParser},
    fastq::{FastqError, FastqWriter, ReadPair},
};
use indexmap::IndexMap;
use read_break_template::Value;
use read_break_util::slice_bounds;
use std::io;
use thiserror::Error;
use tracing::info;

/// How often to log running totals while clipping
const PROGRESS_INTERVAL: u64 = 100_000;

/// Destination for clipped pairs. [FastqWriter] is the production
/// implementation; tests collect into a `Vec`.
pub trait PairSink {
    fn write_pair(&mut self, pair: &ReadPair) -> io::Result<()>;
}

impl PairSink for FastqWriter {
    fn write_pair(&mut self, pair: &ReadPair) -> io::Result<()> {
        self.write(pair)
    }
}

impl PairSink for Vec<ReadPair> {
    fn write_pair(&mut self, pair: &ReadPair) -> io::Result<()> {
        self.push(pair.clone());
        Ok(())
    }
}

/// Fallback clip bounds and read tag, used where the parse context doesn't
/// override them. An end of `-1` (or null) means "to the end of the read".
#[derive(Clone, Debug)]
pub struct ClipDefaults {
    pub start_r1: i64,
    pub end_r1: i64,
    pub start_r2: i64,
    pub end_r2: i64,
    pub read_tag: String,
}

impl Default for ClipDefaults {
    fn default() -> Self {
        Self {
            start_r1: 0,
            end_r1: -1,
            start_r2: 0,
            end_r2: -1,
            read_tag: String::new(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ClipError {
    #[error(transparent)]
    Fastq(#[from] FastqError),

    #[error("Error writing clipped pair")]
    Write(#[from] io::Error),

    #[error("Clip override `{key}` in context is not usable as a number")]
    Override { key: &'static str },
}

/// Iterate the reader; parse each pair; trim, tag, and write. Pairs that
/// fail the pipeline are skipped (the parser's log records them). Returns
/// the number of pairs written.
///
/// Context keys looked for: `start_r1`, `end_r1`, `start_r2`, `end_r2`,
/// `read_tag`. Any missing key falls back to the corresponding default.
/// The written id is `<read_id>/1`, with `_<tag>` appended when a non-empty
/// tag is set.
pub fn clip_and_write(
    reader: impl IntoIterator<Item = Result<ReadPair, FastqError>>,
    parser: &mut ReadParser,
    writer: &mut impl PairSink,
    defaults: &ClipDefaults,
) -> Result<u64, ClipError> {
    let mut written = 0;
    for pair in reader {
        let pair = pair?;
        let outcome = parser.parse(&pair);
        let log = parser.log();
        if log.total_reads % PROGRESS_INTERVAL == 0 {
            info!(
                total = log.total_reads,
                successful = log.successful_reads,
                failed = log.failed_reads,
                "Clipping progress"
            );
        }
        let Outcome::Ok(context) = outcome else {
            continue;
        };

        let start1 = clip_start(&context, "start_r1", defaults.start_r1)?;
        let end1 = clip_end(&context, "end_r1", defaults.end_r1)?;
        let start2 = clip_start(&context, "start_r2", defaults.start_r2)?;
        let end2 = clip_end(&context, "end_r2", defaults.end_r2)?;
        let tag = match context.get("read_tag") {
            None => defaults.read_tag.clone(),
            Some(Value::Null) => String::new(),
            Some(value) => value
                .clone()
                .try_into_string()
                .map_err(|_| ClipError::Override { key: "read_tag" })?,
        };

        let (seq1, qual1) = clip_mate(&pair.seq1, &pair.qual1, start1, end1);
        let (seq2, qual2) = clip_mate(&pair.seq2, &pair.qual2, start2, end2);
        let id = if tag.is_empty() {
            format!("{}/1", pair.id)
        } else {
            format!("{}/1_{tag}", pair.id)
        };
        writer.write_pair(&ReadPair {
            id,
            seq1,
            qual1,
            seq2,
            qual2,
        })?;
        written += 1;
    }
    Ok(written)
}

/// Start override: a null in the context means the beginning of the read
fn clip_start(
    context: &IndexMap<String, Value>,
    key: &'static str,
    default: i64,
) -> Result<i64, ClipError> {
    match context.get(key) {
        None => Ok(default),
        Some(Value::Null) => Ok(0),
        Some(value) => value
            .clone()
            .try_into_int()
            .map_err(|_| ClipError::Override { key }),
    }
}

/// End override, normalized so `None` means the end of the read
fn clip_end(
    context: &IndexMap<String, Value>,
    key: &'static str,
    default: i64,
) -> Result<Option<i64>, ClipError> {
    let value = match context.get(key) {
        None => default,
        Some(Value::Null) => -1,
        Some(value) => value
            .clone()
            .try_into_int()
            .map_err(|_| ClipError::Override { key })?,
    };
    Ok((value != -1).then_some(value))
}

/// Slice sequence and quality by the same bounds
fn clip_mate(
    seq: &str,
    qual: &str,
    start: i64,
    end: Option<i64>,
) -> (String, String) {
    let seq_chars: Vec<char> = seq.chars().collect();
    let qual_chars: Vec<char> = qual.chars().collect();
    let (from, to) = slice_bounds(seq_chars.len(), Some(start), end);
    (
        seq_chars[from..to].iter().collect(),
        qual_chars[from..to].iter().collect(),
    )
}
