//! Benchmark output parsing.
//!
//! The benchmarking CLI prints one block per extrinsic: a header naming the
//! extrinsic followed by analysis sections with `Time ~=`, `Reads =`, and
//! `Writes =` lines. The parser is a fold over those lines with exactly one
//! open record; a header flushes the open record and starts the next one.
use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

static EXTRINSIC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"Extrinsic:\s*"([^"]+)""#).expect("EXTRINSIC_RE regex should compile")
});

static TIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Time\s*~=\s*([0-9][0-9_,]*(?:\.[0-9]+)?)").expect("TIME_RE regex should compile")
});

static READS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*Reads\s*=\s*([0-9][0-9_,]*)").expect("READS_RE regex should compile")
});

static WRITES_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*Writes\s*=\s*([0-9][0-9_,]*)").expect("WRITES_RE regex should compile")
});

/// Legacy v1 benchmarks announce `benchmark_<name>`.
const LEGACY_PREFIX: &str = "benchmark_";

/// Measured cost of one extrinsic from a single benchmark run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtrinsicRecord {
    pub name: String,
    /// Median execution time in microseconds.
    pub time_us: f64,
    pub reads: u64,
    pub writes: u64,
}

/// A flushed record. Incomplete blocks are kept so callers can report them
/// instead of evaluating missing fields as zero.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ParsedRecord {
    Complete(ExtrinsicRecord),
    Incomplete {
        name: String,
        missing: Vec<&'static str>,
    },
}

impl ParsedRecord {
    pub fn name(&self) -> &str {
        match self {
            ParsedRecord::Complete(record) => &record.name,
            ParsedRecord::Incomplete { name, .. } => name,
        }
    }
}

/// The open record, filled as measurement lines arrive.
#[derive(Debug, Default)]
struct OpenRecord {
    name: String,
    time_us: Option<f64>,
    reads: Option<u64>,
    writes: Option<u64>,
}

impl OpenRecord {
    fn new(name: String) -> Self {
        Self {
            name,
            ..Self::default()
        }
    }

    fn finalize(self) -> ParsedRecord {
        match (self.time_us, self.reads, self.writes) {
            (Some(time_us), Some(reads), Some(writes)) => ParsedRecord::Complete(ExtrinsicRecord {
                name: self.name,
                time_us,
                reads,
                writes,
            }),
            (time_us, reads, writes) => {
                let mut missing = Vec::new();
                if time_us.is_none() {
                    missing.push("time");
                }
                if reads.is_none() {
                    missing.push("reads");
                }
                if writes.is_none() {
                    missing.push("writes");
                }
                ParsedRecord::Incomplete {
                    name: self.name,
                    missing,
                }
            }
        }
    }
}

/// Accumulator for a single pass over benchmark output.
#[derive(Debug, Default)]
pub struct OutputParser {
    open: Option<OpenRecord>,
}

impl OutputParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume one line; returns the record flushed by an extrinsic header.
    pub fn feed(&mut self, line: &str) -> Option<ParsedRecord> {
        if let Some(caps) = EXTRINSIC_RE.captures(line) {
            let name = caps[1].trim();
            let name = name.strip_prefix(LEGACY_PREFIX).unwrap_or(name);
            let flushed = self.open.replace(OpenRecord::new(name.to_string()));
            return flushed.map(OpenRecord::finalize);
        }

        let open = self.open.as_mut()?;
        if let Some(caps) = TIME_RE.captures(line) {
            let raw: String = caps[1].chars().filter(|ch| *ch != '_' && *ch != ',').collect();
            if let Ok(time_us) = raw.parse::<f64>() {
                open.time_us = Some(time_us);
            }
        } else if let Some(caps) = READS_RE.captures(line) {
            open.reads = Some(crate::numeric::normalize(&caps[1]));
        } else if let Some(caps) = WRITES_RE.captures(line) {
            open.writes = Some(crate::numeric::normalize(&caps[1]));
        }
        None
    }

    /// End of input: flush whatever record is still open.
    pub fn finish(self) -> Option<ParsedRecord> {
        self.open.map(OpenRecord::finalize)
    }
}

/// Parse a complete output into flushed records, in input order.
pub fn parse_lines<'a, I>(lines: I) -> Vec<ParsedRecord>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut parser = OutputParser::new();
    let mut records: Vec<ParsedRecord> = lines
        .into_iter()
        .filter_map(|line| parser.feed(line))
        .collect();
    records.extend(parser.finish());
    records
}
