//! Drift evaluation between measured and declared costs.
use crate::bench_output::ExtrinsicRecord;
use crate::literals::CodeLiteral;
use crate::numeric::group_digits;
use crate::patch::Correction;
use serde::Serialize;
use std::fmt;

/// Picoseconds per microsecond; benchmark times are printed in µs while
/// ref-time weights are picoseconds.
pub const PICOS_PER_MICRO: f64 = 1_000_000.0;

/// Percentage deviation of a measured weight from its declared literal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", content = "percent", rename_all = "snake_case")]
pub enum Drift {
    /// `(measured - declared) / declared * 100`, rounded to one decimal.
    Percent(f64),
    /// The declared weight is zero; always fails the threshold.
    Undefined,
}

impl Drift {
    pub fn between(measured: u64, declared: u64) -> Self {
        if declared == 0 {
            return Drift::Undefined;
        }
        let raw = (measured as f64 - declared as f64) / declared as f64 * 100.0;
        Drift::Percent((raw * 10.0).round() / 10.0)
    }

    /// Whether the integer part of the absolute drift is above `threshold`.
    pub fn exceeds(self, threshold: u32) -> bool {
        match self {
            Drift::Percent(percent) => percent.abs().trunc() > f64::from(threshold),
            Drift::Undefined => true,
        }
    }
}

impl fmt::Display for Drift {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Drift::Percent(percent) => write!(f, "{percent:+.1}%"),
            Drift::Undefined => f.write_str("undefined"),
        }
    }
}

/// Convert a benchmark time in microseconds to a picosecond weight.
pub fn measured_weight(time_us: f64) -> u64 {
    (time_us * PICOS_PER_MICRO).round() as u64
}

/// Measured values in the units the dispatch file declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Measured {
    pub weight: u64,
    pub reads: u64,
    pub writes: u64,
}

/// Outcome of comparing one extrinsic against its declared literal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evaluation {
    pub name: String,
    pub measured: Measured,
    pub declared: CodeLiteral,
    pub drift: Drift,
    pub reads_mismatch: bool,
    pub writes_mismatch: bool,
    pub weight_mismatch: bool,
}

pub fn evaluate(record: &ExtrinsicRecord, declared: CodeLiteral, threshold: u32) -> Evaluation {
    let measured = Measured {
        weight: measured_weight(record.time_us),
        reads: record.reads,
        writes: record.writes,
    };
    let drift = Drift::between(measured.weight, declared.weight);
    Evaluation {
        name: record.name.clone(),
        measured,
        declared,
        drift,
        reads_mismatch: measured.reads != declared.reads,
        writes_mismatch: measured.writes != declared.writes,
        weight_mismatch: drift.exceeds(threshold),
    }
}

impl Evaluation {
    pub fn passed(&self) -> bool {
        !(self.reads_mismatch || self.writes_mismatch || self.weight_mismatch)
    }

    /// One reason per flagged axis.
    pub fn failure_reasons(&self, threshold: u32) -> Vec<String> {
        let mut reasons = Vec::new();
        if self.reads_mismatch {
            reasons.push(format!(
                "{}: reads mismatch (code={}, measured={})",
                self.name, self.declared.reads, self.measured.reads
            ));
        }
        if self.writes_mismatch {
            reasons.push(format!(
                "{}: writes mismatch (code={}, measured={})",
                self.name, self.declared.writes, self.measured.writes
            ));
        }
        if self.weight_mismatch {
            reasons.push(format!(
                "{}: weight drift {} exceeds {threshold}% (code={}, measured={})",
                self.name,
                self.drift,
                group_digits(self.declared.weight),
                group_digits(self.measured.weight)
            ));
        }
        reasons
    }

    /// Corrective literal values for the flagged axes, if any.
    pub fn correction(&self) -> Option<Correction> {
        let correction = Correction {
            weight: self.weight_mismatch.then_some(self.measured.weight),
            reads: self.reads_mismatch.then_some(self.measured.reads),
            writes: self.writes_mismatch.then_some(self.measured.writes),
        };
        (!correction.is_empty()).then_some(correction)
    }

    /// One row of the running summary table.
    pub fn summary_line(&self) -> String {
        format!(
            "{:<40} reads {:>3}/{:<3} writes {:>3}/{:<3} weight {:>15}/{:<15} drift {}",
            self.name,
            self.declared.reads,
            self.measured.reads,
            self.declared.writes,
            self.measured.writes,
            group_digits(self.declared.weight),
            group_digits(self.measured.weight),
            self.drift
        )
    }
}
