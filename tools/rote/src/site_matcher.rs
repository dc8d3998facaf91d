//! Matching of stored site patterns against page URLs.
//!
//! Patterns are regular expressions when that is cheap and safe to evaluate,
//! and plain substrings otherwise:
//!
//! 1. longer than [`MAX_PATTERN_LEN`] characters: substring test on the
//!    pattern truncated to the cap
//! 2. matching a known catastrophic-backtracking shape: substring test on
//!    the whole pattern
//! 3. otherwise compiled as a regex; a pattern that fails to compile falls
//!    back to a substring test
//!
//! The shape check in step 2 is a denylist heuristic. It does not prove a
//! pattern is safe.

use regex::{Regex, RegexBuilder};
use std::sync::LazyLock;

pub const MAX_PATTERN_LEN: usize = 200;

const COMPILED_SIZE_LIMIT: usize = 1 << 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStrategy {
    TruncatedSubstring,
    Substring,
    Regex,
    InvalidRegexSubstring,
}

struct DangerousShape {
    name: &'static str,
    regex: &'static LazyLock<Regex>,
}

// A quantified group whose last element is itself quantified: (a+)+, (a*)*, (x{2,})+
static NESTED_QUANTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:[+*]|\{\d*,?\d*\})\)+(?:[+*]|\{\d)").expect("nested quantifier regex")
});
// A quantified alternation group: (a|aa)+, (x|y)*
static QUANTIFIED_ALTERNATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\([^()]*\|[^()]*\)(?:[+*]|\{\d)").expect("quantified alternation regex")
});
// Three or more adjacent wildcard runs: .*.*.*
static STACKED_WILDCARDS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:\.[*+]){3,}").expect("stacked wildcard regex"));

static DANGEROUS_SHAPES: &[DangerousShape] = &[
    DangerousShape {
        name: "nested_quantifier",
        regex: &NESTED_QUANTIFIER,
    },
    DangerousShape {
        name: "quantified_alternation",
        regex: &QUANTIFIED_ALTERNATION,
    },
    DangerousShape {
        name: "stacked_wildcards",
        regex: &STACKED_WILDCARDS,
    },
];

/// Name of the first dangerous shape `pattern` exhibits, if any.
pub fn dangerous_shape(pattern: &str) -> Option<&'static str> {
    DANGEROUS_SHAPES
        .iter()
        .find(|shape| shape.regex.is_match(pattern))
        .map(|shape| shape.name)
}

pub fn strategy_for(pattern: &str) -> MatchStrategy {
    if pattern.chars().count() > MAX_PATTERN_LEN {
        return MatchStrategy::TruncatedSubstring;
    }
    if dangerous_shape(pattern).is_some() {
        return MatchStrategy::Substring;
    }
    match compile(pattern) {
        Some(_) => MatchStrategy::Regex,
        None => MatchStrategy::InvalidRegexSubstring,
    }
}

pub fn site_matches(pattern: &str, url: &str) -> bool {
    if pattern.chars().count() > MAX_PATTERN_LEN {
        let truncated = pattern.chars().take(MAX_PATTERN_LEN).collect::<String>();
        return url.contains(&truncated);
    }
    if dangerous_shape(pattern).is_some() {
        return url.contains(pattern);
    }
    match compile(pattern) {
        Some(regex) => regex.is_match(url),
        None => url.contains(pattern),
    }
}

fn compile(pattern: &str) -> Option<Regex> {
    RegexBuilder::new(pattern)
        .size_limit(COMPILED_SIZE_LIMIT)
        .build()
        .ok()
}
