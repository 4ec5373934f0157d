//! Per-pallet verification: benchmark, evaluate, retry, and patch.
//!
//! Every attempt starts from scratch. The dispatch file is re-read and the
//! tool runs once, so no records or literals carry over between attempts.
use crate::bench_output::ParsedRecord;
use crate::bench_tool::{BenchmarkTool, ToolExit};
use crate::config::{PalletTarget, PatchPolicy};
use crate::drift::{evaluate, Evaluation};
use crate::error::WeightCheckError;
use crate::literals::extract_literal;
use crate::patch::{apply_patch_set, PatchSet};
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Run-wide knobs; fixed for every pallet of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub threshold: u32,
    pub auto_patch: bool,
    pub patch_policy: PatchPolicy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PalletStatus {
    Passed,
    Patched,
    Failed,
}

impl PalletStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PalletStatus::Passed => "passed",
            PalletStatus::Patched => "patched",
            PalletStatus::Failed => "failed",
        }
    }
}

/// Final state of one pallet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PalletOutcome {
    pub pallet: String,
    pub status: PalletStatus,
    /// Attempts across every round, including re-verification.
    pub attempts: u32,
    /// Failure reasons from the last attempt.
    pub failures: Vec<String>,
    /// Extrinsics whose output block was incomplete in the last attempt.
    pub incomplete: Vec<String>,
    /// Evaluations from the last attempt.
    pub evaluations: Vec<Evaluation>,
    pub corrections: PatchSet,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patched_file: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Dispatch files modified during the run, in path order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct PatchedFiles(BTreeSet<PathBuf>);

impl PatchedFiles {
    pub fn insert(&mut self, path: &Path) {
        self.0.insert(path.to_path_buf());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PathBuf> {
        self.0.iter()
    }
}

/// Everything observed during one benchmark attempt.
#[derive(Debug, Default)]
struct AttemptReport {
    evaluations: Vec<Evaluation>,
    failures: Vec<String>,
    patches: PatchSet,
    incomplete: Vec<String>,
}

impl AttemptReport {
    /// Evaluate a flushed record against the literals in `source`.
    fn absorb(&mut self, record: ParsedRecord, source: &str, threshold: u32) {
        match record {
            ParsedRecord::Complete(record) => {
                let declared = extract_literal(source, &record.name);
                let evaluation = evaluate(&record, declared, threshold);
                println!("{}", evaluation.summary_line());
                if !evaluation.passed() {
                    tracing::debug!(extrinsic = %evaluation.name, drift = %evaluation.drift, "extrinsic drifted");
                    self.failures.extend(evaluation.failure_reasons(threshold));
                    if let Some(correction) = evaluation.correction() {
                        self.patches.insert(evaluation.name.clone(), correction);
                    }
                }
                self.evaluations.push(evaluation);
            }
            ParsedRecord::Incomplete { name, missing } => {
                tracing::warn!(
                    extrinsic = %name,
                    missing = %missing.join(", "),
                    "skipping incomplete benchmark record"
                );
                self.incomplete.push(name);
            }
        }
    }

    fn close(&mut self, exit: &ToolExit) {
        if !exit.success {
            if !exit.tail.is_empty() {
                tracing::warn!(tail = %exit.tail, "benchmark output before failure");
            }
            self.failures
                .push(format!("benchmark tool failed ({})", exit.describe()));
            // Measurements from a crashed run are not trusted for patching.
            self.patches.clear();
        } else if self.evaluations.is_empty() {
            self.failures
                .push("benchmark produced no complete records".to_string());
        }
    }

    fn passed(&self) -> bool {
        self.failures.is_empty()
    }
}

enum Round {
    Passed(AttemptReport),
    Exhausted(AttemptReport),
}

/// Verify one pallet under `policy`, patching its dispatch file when
/// retries run out and auto-patching is enabled.
///
/// Exhausting retries is reported through the outcome status, not as an
/// error; errors are reserved for I/O and tool invocation failures.
pub fn verify_pallet(
    tool: &mut dyn BenchmarkTool,
    pallet: &PalletTarget,
    policy: &RetryPolicy,
    patched: &mut PatchedFiles,
) -> Result<PalletOutcome> {
    let mut attempts = 0;
    let last = match run_round(tool, pallet, policy, &mut attempts)? {
        Round::Passed(report) => {
            return Ok(outcome(pallet, PalletStatus::Passed, attempts, report, None));
        }
        Round::Exhausted(report) => report,
    };

    if !policy.auto_patch {
        let detail = format!("retries exhausted after {attempts} attempts; auto-patch disabled");
        return Ok(outcome(pallet, PalletStatus::Failed, attempts, last, Some(detail)));
    }
    if last.patches.is_empty() {
        let detail = "no correctable literals in the last attempt".to_string();
        return Ok(outcome(pallet, PalletStatus::Failed, attempts, last, Some(detail)));
    }

    let changed = apply_patch_set(&pallet.dispatch_path, &last.patches)
        .with_context(|| format!("patch dispatch file for pallet {}", pallet.name))?;
    if !changed {
        let detail = "patch left the dispatch file unchanged".to_string();
        return Ok(outcome(pallet, PalletStatus::Failed, attempts, last, Some(detail)));
    }
    patched.insert(&pallet.dispatch_path);
    println!("Patched {} ({} extrinsics)", pallet.dispatch_rel, last.patches.len());

    let mut result = outcome(pallet, PalletStatus::Patched, attempts, last, None);
    result.patched_file = Some(PathBuf::from(&pallet.dispatch_rel));
    if policy.patch_policy == PatchPolicy::StopAfterPatch {
        return Ok(result);
    }

    tracing::info!(pallet = %pallet.name, "re-verifying patched dispatch file");
    let corrections = std::mem::take(&mut result.corrections);
    let (status, report, detail) = match run_round(tool, pallet, policy, &mut attempts)? {
        Round::Passed(report) => (PalletStatus::Patched, report, None),
        Round::Exhausted(report) => {
            let unresolved = WeightCheckError::UnresolvedAfterPatch {
                pallet: pallet.name.clone(),
                path: pallet.dispatch_path.clone(),
            };
            (PalletStatus::Failed, report, Some(unresolved.to_string()))
        }
    };
    let mut result = outcome(pallet, status, attempts, report, detail);
    result.corrections = corrections;
    result.patched_file = Some(PathBuf::from(&pallet.dispatch_rel));
    Ok(result)
}

/// Attempt up to `max_attempts` times, stopping at the first pass.
fn run_round(
    tool: &mut dyn BenchmarkTool,
    pallet: &PalletTarget,
    policy: &RetryPolicy,
    attempts: &mut u32,
) -> Result<Round> {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        *attempts += 1;
        tracing::info!(pallet = %pallet.name, attempt, max_attempts, "benchmark attempt");
        let report = run_attempt(tool, pallet, policy.threshold)?;
        if report.passed() {
            tracing::info!(pallet = %pallet.name, attempt, "attempt passed");
            return Ok(Round::Passed(report));
        }

        println!(
            "Attempt {attempt}/{max_attempts} for {} failed:",
            pallet.name
        );
        for failure in &report.failures {
            println!("  - {failure}");
        }
        if attempt >= max_attempts {
            return Ok(Round::Exhausted(report));
        }
        attempt += 1;
    }
}

fn run_attempt(
    tool: &mut dyn BenchmarkTool,
    pallet: &PalletTarget,
    threshold: u32,
) -> Result<AttemptReport> {
    let source = fs::read_to_string(&pallet.dispatch_path)
        .with_context(|| format!("read dispatch file {}", pallet.dispatch_path.display()))?;
    let mut report = AttemptReport::default();
    let exit = tool
        .run(pallet, &mut |record| report.absorb(record, &source, threshold))
        .with_context(|| format!("run benchmark for pallet {}", pallet.name))?;
    report.close(&exit);
    Ok(report)
}

fn outcome(
    pallet: &PalletTarget,
    status: PalletStatus,
    attempts: u32,
    report: AttemptReport,
    detail: Option<String>,
) -> PalletOutcome {
    PalletOutcome {
        pallet: pallet.name.clone(),
        status,
        attempts,
        failures: report.failures,
        incomplete: report.incomplete,
        evaluations: report.evaluations,
        corrections: report.patches,
        patched_file: None,
        detail,
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
