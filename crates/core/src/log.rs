//! Run-scoped parsing statistics

use indexmap::IndexMap;
use serde::Serialize;

/// Monotonic counters for one parsing run. One log belongs to one evaluator;
/// parallel callers should keep a log per worker and [merge](Self::merge)
/// them at the end.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ParseLog {
    pub total_reads: u64,
    pub successful_reads: u64,
    pub failed_reads: u64,
    /// Failure count per step id, incremented for *every* step failure:
    /// must-pass failures, optional failures, and caught step errors alike
    pub failures_by_step: IndexMap<String, u64>,
}

impl ParseLog {
    /// Create a log with a zeroed counter for every step id, so the stats
    /// table has stable columns even before any read fails
    pub fn new<'a>(step_ids: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            failures_by_step: step_ids
                .into_iter()
                .map(|id| (id.to_owned(), 0))
                .collect(),
            ..Self::default()
        }
    }

    pub(crate) fn record_step_failure(&mut self, step_id: &str) {
        *self
            .failures_by_step
            .entry(step_id.to_owned())
            .or_default() += 1;
    }

    /// Percentage of reads that passed every must-pass step, if any reads
    /// have been seen
    pub fn success_rate(&self) -> Option<f64> {
        (self.total_reads > 0).then(|| {
            self.successful_reads as f64 / self.total_reads as f64 * 100.0
        })
    }

    /// Fold another log's counters into this one
    pub fn merge(&mut self, other: &Self) {
        self.total_reads += other.total_reads;
        self.successful_reads += other.successful_reads;
        self.failed_reads += other.failed_reads;
        for (step_id, count) in &other.failures_by_step {
            *self.failures_by_step.entry(step_id.clone()).or_default() +=
                count;
        }
    }

    /// The counters as a JSON mapping, with the derived success rate
    /// (rounded to two decimals) appended when defined. Useful with
    /// `flatten_dot` for tabular output.
    pub fn to_json(&self) -> serde_json::Value {
        let mut json = serde_json::to_value(self)
            .expect("parse log serialization is infallible");
        if let (Some(rate), serde_json::Value::Object(map)) =
            (self.success_rate(), &mut json)
        {
            map.insert(
                "success_rate".to_owned(),
                serde_json::json!((rate * 100.0).round() / 100.0),
            );
        }
        json
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_success_rate() {
        let mut log = ParseLog::new(["a", "b"]);
        assert_eq!(log.success_rate(), None);
        log.total_reads = 4;
        log.successful_reads = 3;
        log.failed_reads = 1;
        assert_eq!(log.success_rate(), Some(75.0));
    }

    #[test]
    fn test_merge() {
        let mut left = ParseLog::new(["a", "b"]);
        left.total_reads = 2;
        left.successful_reads = 1;
        left.failed_reads = 1;
        left.record_step_failure("a");

        let mut right = ParseLog::new(["a", "b"]);
        right.total_reads = 3;
        right.successful_reads = 3;
        right.record_step_failure("a");
        right.record_step_failure("b");

        left.merge(&right);
        assert_eq!(left.total_reads, 5);
        assert_eq!(left.successful_reads, 4);
        assert_eq!(left.failed_reads, 1);
        assert_eq!(left.failures_by_step["a"], 2);
        assert_eq!(left.failures_by_step["b"], 1);
    }

    #[test]
    fn test_to_json() {
        let mut log = ParseLog::new(["a"]);
        log.total_reads = 3;
        log.successful_reads = 1;
        log.failed_reads = 2;
        let json = log.to_json();
        assert_eq!(json["total_reads"], serde_json::json!(3));
        assert_eq!(json["failures_by_step"]["a"], serde_json::json!(0));
        assert_eq!(json["success_rate"], serde_json::json!(33.33));
    }
}
