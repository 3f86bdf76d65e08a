//! Low-level sequence logic: mismatch metrics and fuzzy matching with wobble
//! offsets. These functions are stateless and pure.

use serde::Deserialize;
use std::{fmt, str::FromStr};
use thiserror::Error;

/// Count the number of mismatched positions between two strings. Positions
/// past the end of the shorter string are ignored, so callers comparing
/// fixed-size windows must check lengths themselves.
pub fn hamming(x: &str, y: &str) -> usize {
    x.bytes().zip(y.bytes()).filter(|(a, b)| a != b).count()
}

/// Variant of [hamming] that ignores one directional base conversion.
/// Designed for detecting asymmetric enzyme-induced base changes (e.g. A→G
/// or T→C): a position where `x` has `from` and `y` has `to` is not counted
/// as a mismatch.
pub fn hamming35(x: &str, y: &str, from: u8, to: u8) -> usize {
    x.bytes()
        .zip(y.bytes())
        .filter(|&(a, b)| a != b && !(a == from && b == to))
        .count()
}

/// Attempt to align `target` within a wobble window of `test`.
///
/// Windows are tried at `base_offset`, `base_offset + 1`, ...,
/// `base_offset + max_wobble`, in that order; the first window within
/// `max_hamming` mismatches of `target` wins, even if a later window would
/// match more closely. A window that runs off the end of `test` stops the
/// search. Returns the winning offset *relative* to `base_offset`, or `None`
/// if no window qualifies.
pub fn wobble_match(
    test: &str,
    target: &str,
    max_wobble: usize,
    max_hamming: usize,
    base_offset: usize,
    metric: Metric,
) -> Option<usize> {
    for offset in base_offset..=base_offset + max_wobble {
        let Some(window) = test.get(offset..offset + target.len()) else {
            // Ran off the end; every later window overruns too
            break;
        };
        if metric.distance(target, window) <= max_hamming {
            return Some(offset - base_offset);
        }
    }
    None
}

/// A registered mismatch metric that pipeline steps can reference by name.
/// The set is fixed at build time; an unrecognized name in a spec is a
/// deserialization error.
#[derive(Copy, Clone, Debug, Deserialize, Eq, PartialEq)]
pub enum Metric {
    /// Plain positional mismatch count
    #[serde(rename = "hamming")]
    Hamming,
    /// Mismatch count that forgives T→C conversions
    #[serde(rename = "hammingTC")]
    HammingTC,
    /// Mismatch count that forgives A→G conversions
    #[serde(rename = "hammingAG")]
    HammingAG,
}

impl Metric {
    /// Distance from a reference string `x` to an observed string `y`. The
    /// asymmetric metrics forgive conversions from `x` into `y`, not the
    /// other way around.
    pub fn distance(self, x: &str, y: &str) -> usize {
        match self {
            Self::Hamming => hamming(x, y),
            Self::HammingTC => hamming35(x, y, b'T', b'C'),
            Self::HammingAG => hamming35(x, y, b'A', b'G'),
        }
    }

    /// The name this metric is registered under
    pub fn name(self) -> &'static str {
        match self {
            Self::Hamming => "hamming",
            Self::HammingTC => "hammingTC",
            Self::HammingAG => "hammingAG",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A metric name outside the fixed registry
#[derive(Debug, Error)]
#[error("Unknown hamming function `{0}`; expected one of hamming, hammingTC, hammingAG")]
pub struct UnknownMetricError(String);

impl FromStr for Metric {
    type Err = UnknownMetricError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hamming" => Ok(Self::Hamming),
            "hammingTC" => Ok(Self::HammingTC),
            "hammingAG" => Ok(Self::HammingAG),
            _ => Err(UnknownMetricError(s.to_owned())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    #[rstest]
    #[case::identical("ACGT", "ACGT", 0)]
    #[case::all_mismatched("ACGT", "CTAG", 4)]
    #[case::partial("AAAA", "AATA", 1)]
    #[case::shorter_rhs("AAAA", "AA", 0)]
    fn test_hamming(#[case] x: &str, #[case] y: &str, #[case] expected: usize) {
        assert_eq!(hamming(x, y), expected);
    }

    /// The asymmetric metrics forgive exactly one conversion direction
    #[rstest]
    // Four T→C conversions forgiven, one true mismatch (T vs G)
    #[case::tc(Metric::HammingTC, "TTTTT", "CCCCG", 1)]
    // The reverse direction is not forgiven
    #[case::tc_reversed(Metric::HammingTC, "CCCCG", "TTTTT", 5)]
    #[case::ag(Metric::HammingAG, "AAAAG", "GGGGT", 1)]
    #[case::plain(Metric::Hamming, "TTTTT", "CCCCG", 5)]
    fn test_metric_distance(
        #[case] metric: Metric,
        #[case] x: &str,
        #[case] y: &str,
        #[case] expected: usize,
    ) {
        assert_eq!(metric.distance(x, y), expected);
    }

    #[rstest]
    #[case::found("NNNGGGTACCTAG", "GGGTAC", 5, 0, 0, Some(3))]
    #[case::at_start("AAAGGGTTTTCC", "AAAGGG", 3, 0, 0, Some(0))]
    // First qualifying offset wins even with zero mismatches available later
    #[case::first_wins("AAAT", "AAA", 1, 1, 0, Some(0))]
    #[case::relative_to_base("NNNGGGTACCTAG", "GGGTAC", 5, 0, 2, Some(1))]
    #[case::not_found("NNNGGGTACCTAG", "TTTTTT", 5, 0, 0, None)]
    // Window overruns the read before the wobble budget is exhausted
    #[case::overrun("ACGT", "CGTT", 5, 0, 0, None)]
    #[case::tolerates_mismatch("NNGAGTAC", "GGGTAC", 3, 1, 0, Some(2))]
    fn test_wobble_match(
        #[case] test: &str,
        #[case] target: &str,
        #[case] max_wobble: usize,
        #[case] max_hamming: usize,
        #[case] base_offset: usize,
        #[case] expected: Option<usize>,
    ) {
        assert_eq!(
            wobble_match(
                test,
                target,
                max_wobble,
                max_hamming,
                base_offset,
                Metric::Hamming
            ),
            expected
        );
    }

    #[test]
    fn test_metric_from_str() {
        assert_eq!("hammingTC".parse::<Metric>().unwrap(), Metric::HammingTC);
        assert!("levenshtein".parse::<Metric>().is_err());
    }

    prop_compose! {
        /// Generate a DNA-alphabet string
        fn dna(max_len: usize)(s in proptest::collection::vec(
            proptest::sample::select(vec!['A', 'C', 'G', 'T', 'N']),
            0..max_len,
        )) -> String {
            s.into_iter().collect()
        }
    }

    proptest! {
        /// hamming(x, x) == 0 and hamming is symmetric
        #[test]
        fn prop_hamming_identity_symmetry(
            x in dna(20),
            y in dna(20),
        ) {
            prop_assert_eq!(hamming(&x, &x), 0);
            prop_assert_eq!(hamming(&x, &y), hamming(&y, &x));
        }

        /// The asymmetric metric never exceeds the plain one, with equality
        /// iff no position holds the forgiven conversion
        #[test]
        fn prop_hamming35_bounded(x in dna(20), y in dna(20)) {
            let plain = hamming(&x, &y);
            let forgiving = hamming35(&x, &y, b'T', b'C');
            prop_assert!(forgiving <= plain);
            let conversions = x
                .bytes()
                .zip(y.bytes())
                .filter(|&(a, b)| a == b'T' && b == b'C')
                .count();
            prop_assert_eq!(plain - forgiving, conversions);
        }

        /// Any offset returned by wobble_match is within the wobble budget,
        /// its window qualifies, and no earlier window does
        #[test]
        fn prop_wobble_match_postconditions(
            test in dna(30),
            target in dna(8),
            max_wobble in 0usize..6,
            max_hamming in 0usize..3,
            base_offset in 0usize..4,
        ) {
            let result = wobble_match(
                &test,
                &target,
                max_wobble,
                max_hamming,
                base_offset,
                Metric::Hamming,
            );
            if let Some(relative) = result {
                prop_assert!(relative <= max_wobble);
                let offset = base_offset + relative;
                let window = &test[offset..offset + target.len()];
                prop_assert!(hamming(&target, window) <= max_hamming);
                // Minimality: every earlier window either overruns (it
                // can't, since a later one fit) or exceeds the budget
                for earlier in base_offset..offset {
                    let window = &test[earlier..earlier + target.len()];
                    prop_assert!(hamming(&target, window) > max_hamming);
                }
            }
        }
    }
}
