//! Small utilities shared across the read-break subcrates: YAML loading,
//! result tracing, and the dotted-key flattener used for tabular stats
//! output.

#[cfg(any(test, feature = "test"))]
mod test_util;

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use std::{io::Read, ops::Deref};
use tracing::error;

/// Extension trait for [Result]
pub trait ResultTraced<T, E>: Sized {
    /// If this is an error, trace it. Return the same result.
    #[must_use]
    fn traced(self) -> Self;
}

impl<T> ResultTraced<T, anyhow::Error> for anyhow::Result<T> {
    fn traced(self) -> Self {
        self.inspect_err(|err| error!(error = err.deref()))
    }
}

/// Parse bytes from a reader into YAML. This will merge any anchors/aliases,
/// so pipeline specs can share step fragments with `<<: *base`.
pub fn parse_yaml<T: DeserializeOwned>(reader: impl Read) -> anyhow::Result<T> {
    // Two-step parsing so we can pre-process the YAML value
    let mut yaml_value: serde_yaml::Value =
        serde_yaml::from_reader(reader)?;
    yaml_value.apply_merge()?;

    // Top-level fields starting with . are anchors-only scratch space
    if let serde_yaml::Value::Mapping(mapping) = &mut yaml_value {
        mapping.retain(|key, _| {
            !key.as_str().is_some_and(|key| key.starts_with('.'))
        });
    }

    let output = serde_yaml::from_value(yaml_value)?;
    Ok(output)
}

/// Normalize Python-style slice bounds against a sequence length: negative
/// indices count from the end, everything clamps to `[0, len]`, and an
/// inverted range collapses to empty. Returns `(start, end)` with
/// `start <= end <= len`.
pub fn slice_bounds(
    len: usize,
    start: Option<i64>,
    end: Option<i64>,
) -> (usize, usize) {
    fn resolve(len: usize, index: i64) -> usize {
        if index < 0 {
            // Count from the end, clamping at 0
            (len as i64 + index).max(0) as usize
        } else {
            (index as usize).min(len)
        }
    }

    let start = start.map_or(0, |index| resolve(len, index));
    let end = end.map_or(len, |index| resolve(len, index));
    (start, end.max(start))
}

/// Resolve a single Python-style index against a sequence length: negative
/// indices count from the end. Returns `None` if the index is out of range.
pub fn resolve_index(len: usize, index: i64) -> Option<usize> {
    let resolved = if index < 0 {
        len as i64 + index
    } else {
        index
    };
    if (0..len as i64).contains(&resolved) {
        Some(resolved as usize)
    } else {
        None
    }
}

/// Flatten a nested JSON mapping into a single-level map with dotted keys:
/// `{"a": {"b": 1}}` becomes `{"a.b": 1}`. Non-mapping values are passed
/// through untouched. Key order follows the input.
pub fn flatten_dot(
    value: &serde_json::Value,
) -> IndexMap<String, serde_json::Value> {
    fn inner(
        value: &serde_json::Value,
        prefix: &str,
        flat: &mut IndexMap<String, serde_json::Value>,
    ) {
        match value {
            serde_json::Value::Object(object) => {
                for (key, value) in object {
                    let path = if prefix.is_empty() {
                        key.clone()
                    } else {
                        format!("{prefix}.{key}")
                    };
                    inner(value, &path, flat);
                }
            }
            other => {
                flat.insert(prefix.to_owned(), other.clone());
            }
        }
    }

    let mut flat = IndexMap::new();
    inner(value, "", &mut flat);
    flat
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, PartialEq, Deserialize)]
    #[serde(deny_unknown_fields)]
    struct Data {
        data: Inner,
    }

    #[derive(Debug, PartialEq, Deserialize)]
    #[serde(deny_unknown_fields)]
    struct Inner {
        i: i32,
        b: bool,
        s: String,
    }

    /// Test YAML preprocessing: anchor/alias merging and removing . fields
    #[test]
    fn test_parse_yaml() {
        let yaml = "
.ignore: &base
  i: 1
  b: true
  s: base

data:
  i: 2
  <<: *base
  s: hello
";

        let actual: Data = parse_yaml(yaml.as_bytes()).unwrap();
        let expected = Data {
            data: Inner {
                i: 2,
                b: true,
                s: "hello".into(),
            },
        };
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_flatten_dot() {
        let value = json!({
            "total_reads": 10,
            "failures_by_step": {"match_s1": 2, "extract_tag": 0},
            "nested": {"a": {"b": null}},
        });
        let flat = flatten_dot(&value);
        let keys = flat.keys().map(String::as_str).collect::<Vec<_>>();
        assert_eq!(
            keys,
            [
                "total_reads",
                "failures_by_step.match_s1",
                "failures_by_step.extract_tag",
                "nested.a.b",
            ]
        );
        assert_eq!(flat["failures_by_step.match_s1"], json!(2));
        assert_eq!(flat["nested.a.b"], serde_json::Value::Null);
    }

    /// A scalar at the top level flattens to a single empty-keyed entry
    #[test]
    fn test_flatten_dot_scalar() {
        let flat = flatten_dot(&json!(3));
        assert_eq!(flat.len(), 1);
        assert_eq!(flat[""], json!(3));
    }

    #[rstest::rstest]
    #[case::full(10, None, None, (0, 10))]
    #[case::simple(10, Some(2), Some(5), (2, 5))]
    #[case::clamp_end(10, Some(2), Some(99), (2, 10))]
    #[case::clamp_start(10, Some(99), None, (10, 10))]
    #[case::negative_start(10, Some(-3), None, (7, 10))]
    #[case::negative_end(10, None, Some(-1), (0, 9))]
    #[case::negative_overflow(10, Some(-99), None, (0, 10))]
    #[case::inverted(10, Some(5), Some(2), (5, 5))]
    fn test_slice_bounds(
        #[case] len: usize,
        #[case] start: Option<i64>,
        #[case] end: Option<i64>,
        #[case] expected: (usize, usize),
    ) {
        assert_eq!(slice_bounds(len, start, end), expected);
    }

    #[rstest::rstest]
    #[case::zero(4, 0, Some(0))]
    #[case::last(4, 3, Some(3))]
    #[case::past_end(4, 4, None)]
    #[case::negative(4, -1, Some(3))]
    #[case::negative_first(4, -4, Some(0))]
    #[case::negative_past(4, -5, None)]
    fn test_resolve_index(
        #[case] len: usize,
        #[case] index: i64,
        #[case] expected: Option<usize>,
    ) {
        assert_eq!(resolve_index(len, index), expected);
    }
}
