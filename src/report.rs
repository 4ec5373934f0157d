//! End-of-run summary and the optional JSON run report.
use crate::config::PatchPolicy;
use crate::publish::PublishOutcome;
use crate::retry::{PalletOutcome, PalletStatus, RetryPolicy};
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::Path;

pub const REPORT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub schema_version: u32,
    pub threshold_percent: u32,
    pub max_attempts: u32,
    pub auto_patch: bool,
    pub patch_policy: PatchPolicy,
    pub pallets: Vec<PalletOutcome>,
    /// Patched dispatch files, relative to the repository root.
    pub patched_files: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publish: Option<PublishOutcome>,
    /// Reason the run stopped before every pallet was checked.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aborted: Option<String>,
}

impl RunReport {
    pub fn new(policy: &RetryPolicy) -> Self {
        Self {
            schema_version: REPORT_SCHEMA_VERSION,
            threshold_percent: policy.threshold,
            max_attempts: policy.max_attempts,
            auto_patch: policy.auto_patch,
            patch_policy: policy.patch_policy,
            pallets: Vec::new(),
            patched_files: Vec::new(),
            publish: None,
            aborted: None,
        }
    }

    pub fn failed_pallets(&self) -> Vec<&str> {
        self.pallets
            .iter()
            .filter(|outcome| outcome.status == PalletStatus::Failed)
            .map(|outcome| outcome.pallet.as_str())
            .collect()
    }

    /// Print the per-pallet status table to stdout.
    pub fn print_summary(&self) {
        println!();
        println!("Weight check summary (threshold {}%)", self.threshold_percent);
        for outcome in &self.pallets {
            println!(
                "  {:<20} {:<8} attempts {}",
                outcome.pallet,
                outcome.status.as_str(),
                outcome.attempts
            );
            if let Some(detail) = &outcome.detail {
                println!("    {detail}");
            }
            for name in &outcome.incomplete {
                println!("    incomplete benchmark output for {name}");
            }
        }
        for path in &self.patched_files {
            println!("  patched {path}");
        }
        match &self.publish {
            Some(PublishOutcome::Pushed { branch, commit }) => {
                println!("  pushed {commit} to {branch}");
            }
            Some(PublishOutcome::NoDiff) => println!("  patched files had no changes to commit"),
            Some(PublishOutcome::NothingPatched) | None => {}
        }
        if let Some(reason) = &self.aborted {
            println!("  aborted: {reason}");
        }
    }
}

pub fn write_report(path: &Path, report: &RunReport) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create report directory {}", parent.display()))?;
        }
    }
    let json = serde_json::to_string_pretty(report).context("serialize run report")?;
    fs::write(path, json).with_context(|| format!("write run report {}", path.display()))?;
    tracing::info!(path = %path.display(), "wrote run report");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patch::PatchSet;

    fn outcome(pallet: &str, status: PalletStatus) -> PalletOutcome {
        PalletOutcome {
            pallet: pallet.to_string(),
            status,
            attempts: 3,
            failures: Vec::new(),
            incomplete: Vec::new(),
            evaluations: Vec::new(),
            corrections: PatchSet::new(),
            patched_file: None,
            detail: None,
        }
    }

    #[test]
    fn report_serializes_statuses_and_publish_result() {
        let policy = RetryPolicy {
            max_attempts: 3,
            threshold: 40,
            auto_patch: true,
            patch_policy: PatchPolicy::Reverify,
        };
        let mut report = RunReport::new(&policy);
        report.pallets.push(outcome("subtensor", PalletStatus::Passed));
        report.pallets.push(outcome("drand", PalletStatus::Failed));
        report.publish = Some(PublishOutcome::NoDiff);

        assert_eq!(report.failed_pallets(), vec!["drand"]);

        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("out/report.json");
        write_report(&path, &report).expect("write report");
        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).expect("read report"))
                .expect("parse report");
        assert_eq!(value["patch_policy"], "reverify");
        assert_eq!(value["pallets"][0]["status"], "passed");
        assert_eq!(value["pallets"][1]["status"], "failed");
        assert_eq!(value["publish"]["result"], "no_diff");
        assert!(value.get("aborted").is_none());
    }
}
