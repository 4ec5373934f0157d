//! Code-side weight literals declared for dispatchable functions.
//!
//! Dispatch files attach costs either as a `#[pallet::weight(...)]` attribute
//! above the function or as an expression inside its body. Extraction is a
//! textual proximity search over those two regions rather than a parse of
//! the file, so any syntax it does not recognize reads as zero.
use crate::numeric::normalize;
use crate::scope::{self, FunctionScope};
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeSet;
use std::ops::Range;
use std::sync::LazyLock;

/// `Weight::from_parts(N, ..)`; capture 1 is the ref-time literal.
pub(crate) static WEIGHT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Weight::from_(?:parts|ref_time)\(\s*([0-9](?:[0-9_]*[0-9])?)")
        .expect("WEIGHT_RE regex should compile")
});

/// `reads_writes(R, W)`; captures 1 and 2 are reads and writes.
pub(crate) static READS_WRITES_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\breads_writes\(\s*([0-9](?:[0-9_]*[0-9])?)(?:_?u64)?\s*,\s*([0-9](?:[0-9_]*[0-9])?)(?:_?u64)?\s*\)",
    )
    .expect("READS_WRITES_RE regex should compile")
});

pub(crate) static READS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\breads\(\s*([0-9](?:[0-9_]*[0-9])?)(?:_?u64)?\s*\)")
        .expect("READS_RE regex should compile")
});

pub(crate) static WRITES_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bwrites\(\s*([0-9](?:[0-9_]*[0-9])?)(?:_?u64)?\s*\)")
        .expect("WRITES_RE regex should compile")
});

/// Declared cost of one function. Unrecognized syntax leaves fields at zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CodeLiteral {
    /// Ref-time weight in picoseconds.
    pub weight: u64,
    pub reads: u64,
    pub writes: u64,
}

/// Last-seen literal values while scanning a region line by line.
#[derive(Debug, Clone, Copy, Default)]
struct LiteralTracker {
    weight: Option<u64>,
    reads: Option<u64>,
    writes: Option<u64>,
}

impl LiteralTracker {
    fn scan(region: &str) -> Self {
        region.lines().fold(Self::default(), Self::observe)
    }

    fn observe(mut self, line: &str) -> Self {
        if let Some(caps) = WEIGHT_RE.captures_iter(line).last() {
            self.weight = Some(normalize(&caps[1]));
        }

        // The combined call and the separate calls may both appear; the one
        // furthest right on the line wins, like any later line would.
        let combined = READS_WRITES_RE.captures_iter(line).last();
        let reads = READS_RE.captures_iter(line).last();
        let writes = WRITES_RE.captures_iter(line).last();
        let combined_at = combined.as_ref().and_then(|caps| caps.get(0)).map(|m| m.start());

        if let Some(caps) = &combined {
            self.reads = Some(normalize(&caps[1]));
            self.writes = Some(normalize(&caps[2]));
        }
        if let Some(caps) = reads.filter(|caps| right_of(caps, combined_at)) {
            self.reads = Some(normalize(&caps[1]));
        }
        if let Some(caps) = writes.filter(|caps| right_of(caps, combined_at)) {
            self.writes = Some(normalize(&caps[1]));
        }
        self
    }

    fn or(self, fallback: Self) -> Self {
        Self {
            weight: self.weight.or(fallback.weight),
            reads: self.reads.or(fallback.reads),
            writes: self.writes.or(fallback.writes),
        }
    }

    fn into_literal(self) -> CodeLiteral {
        CodeLiteral {
            weight: self.weight.unwrap_or(0),
            reads: self.reads.unwrap_or(0),
            writes: self.writes.unwrap_or(0),
        }
    }
}

fn right_of(caps: &regex::Captures<'_>, combined_at: Option<usize>) -> bool {
    match (caps.get(0), combined_at) {
        (Some(found), Some(combined_at)) => found.start() > combined_at,
        _ => true,
    }
}

/// Declared weight, reads, and writes for the first function named `name`.
///
/// The attribute block above the declaration is searched first; when it
/// carries no weight constructor the body is used instead. A missing
/// function yields an all-zero literal.
pub fn extract_literal(source: &str, name: &str) -> CodeLiteral {
    let Some(scope) = scope::locate(source, name) else {
        return CodeLiteral::default();
    };
    let [primary, fallback] = literal_regions(source, &scope);
    let primary = LiteralTracker::scan(&source[primary]);
    let fallback = LiteralTracker::scan(&source[fallback]);
    primary.or(fallback).into_literal()
}

/// The function's regions, the one that declares its cost first.
///
/// That is the attribute block unless only the body carries a weight
/// constructor. The patcher rewrites literals in the same order so it edits
/// the values this module reads.
pub(crate) fn literal_regions(source: &str, scope: &FunctionScope) -> [Range<usize>; 2] {
    let [leading, body] = scope.regions();
    let declares_weight = |range: &Range<usize>| WEIGHT_RE.is_match(&source[range.clone()]);
    if !declares_weight(&leading) && declares_weight(&body) {
        [body, leading]
    } else {
        [leading, body]
    }
}

/// Literals for every distinct function in `source`, first declaration wins.
pub fn extract_all(source: &str) -> Vec<(String, CodeLiteral)> {
    let mut seen = BTreeSet::new();
    scope::declared_names(source)
        .into_iter()
        .filter(|name| seen.insert(name.clone()))
        .map(|name| {
            let literal = extract_literal(source, &name);
            (name, literal)
        })
        .collect()
}
