//! The `run` pipeline: verify each configured pallet, then publish patches.
use crate::bench_tool::{BenchmarkTool, NodeBenchmark};
use crate::config::{resolve_config, Config, PalletTarget, PatchPolicy};
use crate::error::WeightCheckError;
use crate::publish::{GitPublisher, PublishOutcome};
use crate::report::{write_report, RunReport};
use crate::retry::{verify_pallet, PalletStatus, PatchedFiles, RetryPolicy};
use crate::util::display_path;
use anyhow::{anyhow, Result};
use std::path::PathBuf;

/// Command-line overrides layered on top of the config file.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub repo_root: PathBuf,
    pub config: Option<PathBuf>,
    pub pallets: Vec<String>,
    pub auto_patch: bool,
    pub patch_policy: Option<PatchPolicy>,
    pub threshold: Option<u32>,
    pub max_retries: Option<u32>,
    pub publish: bool,
    pub report: Option<PathBuf>,
}

impl RunOptions {
    fn policy(&self, config: &Config) -> Result<RetryPolicy> {
        let max_attempts = self.max_retries.unwrap_or(config.max_retries);
        if max_attempts == 0 {
            return Err(anyhow!("max retries must be at least 1"));
        }
        Ok(RetryPolicy {
            max_attempts,
            threshold: self.threshold.unwrap_or(config.threshold_percent),
            auto_patch: self.auto_patch,
            patch_policy: self.patch_policy.unwrap_or(config.patch_policy),
        })
    }
}

pub fn run(options: &RunOptions) -> Result<()> {
    let config = resolve_config(options.config.as_deref(), &options.repo_root)?;
    let policy = options.policy(&config)?;
    let names = config.select_pallets(&options.pallets)?;
    // Every pallet must resolve before the first benchmark starts.
    let targets = names
        .iter()
        .map(|name| config.resolve_pallet(name, &options.repo_root))
        .collect::<std::result::Result<Vec<_>, _>>()?;

    tracing::info!(
        pallets = targets.len(),
        threshold = policy.threshold,
        max_attempts = policy.max_attempts,
        auto_patch = policy.auto_patch,
        "starting weight check"
    );

    let mut tool = NodeBenchmark::new(config.benchmark.clone(), &options.repo_root);
    let mut report = RunReport::new(&policy);
    let mut patched = PatchedFiles::default();

    if let Err(err) = check_pallets(&mut tool, &targets, &policy, &mut patched, &mut report) {
        report.aborted = Some(format!("{err:#}"));
        finish(options, &mut report, &patched)?;
        return Err(err);
    }

    if options.publish && !patched.is_empty() {
        let published = GitPublisher::new(&options.repo_root, config.commit.clone())
            .and_then(|publisher| publisher.publish(&patched));
        match published {
            Ok(outcome) => report.publish = Some(outcome),
            Err(err) => {
                report.aborted = Some(format!("{err:#}"));
                finish(options, &mut report, &patched)?;
                return Err(err);
            }
        }
    } else if options.publish {
        report.publish = Some(PublishOutcome::NothingPatched);
    } else if !patched.is_empty() {
        println!("Leaving {} patched file(s) uncommitted", patched.len());
    }

    finish(options, &mut report, &patched)?;
    let failed = report.failed_pallets();
    if !failed.is_empty() {
        return Err(anyhow!(
            "{} pallet(s) failed weight verification: {}",
            failed.len(),
            failed.join(", ")
        ));
    }
    Ok(())
}

/// Verify pallets in order; an exhausted pallet without auto-patch stops
/// the run.
fn check_pallets(
    tool: &mut dyn BenchmarkTool,
    targets: &[PalletTarget],
    policy: &RetryPolicy,
    patched: &mut PatchedFiles,
    report: &mut RunReport,
) -> Result<()> {
    for target in targets {
        println!("==> {} ({})", target.name, target.dispatch_rel);
        let outcome = verify_pallet(tool, target, policy, patched)?;
        let attempts = outcome.attempts;
        let status = outcome.status;
        report.pallets.push(outcome);
        if status == PalletStatus::Failed && !policy.auto_patch {
            return Err(WeightCheckError::DriftExceeded {
                pallet: target.name.clone(),
                attempts,
            }
            .into());
        }
    }
    Ok(())
}

fn finish(options: &RunOptions, report: &mut RunReport, patched: &PatchedFiles) -> Result<()> {
    report.patched_files = patched
        .iter()
        .map(|path| display_path(path, Some(&options.repo_root)))
        .collect();
    report.print_summary();
    if let Some(path) = &options.report {
        write_report(path, report)?;
    }
    Ok(())
}
