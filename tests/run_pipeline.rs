//! End-to-end runs of `bweights run` against a fake benchmark binary.
#![cfg(unix)]

mod common;

use common::{stderr, stdout, Workspace, DISPATCH_REL};

fn read_report(workspace: &Workspace) -> serde_json::Value {
    let content =
        std::fs::read_to_string(workspace.root().join("report.json")).expect("read run report");
    serde_json::from_str(&content).expect("parse run report")
}

#[test]
fn auto_patch_rewrites_drifting_literals() {
    let workspace = Workspace::new(None);
    workspace.install_fake_node("bench_drift.txt", 0);

    let output = workspace.bweights(&[
        "run",
        "--auto-patch",
        "--no-publish",
        "--report",
        "report.json",
    ]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let dispatch = workspace.dispatch();
    assert!(dispatch.contains("Weight::from_parts(1_200_000, 0)"));
    assert!(dispatch.contains(".reads(3))"));
    assert!(dispatch.contains(".writes(1))"));
    // The extrinsic within threshold keeps its literals.
    assert!(dispatch.contains("Weight::from_parts(25_000_000, 0)"));
    assert!(dispatch.contains("reads_writes(1, 1)"));

    let out = stdout(&output);
    assert!(out.contains("do_thing: reads mismatch (code=2, measured=3)"));
    assert!(out.contains("do_thing: weight drift -99.9% exceeds 40%"));
    assert_eq!(workspace.invocations(), 2);

    let report = read_report(&workspace);
    assert_eq!(report["pallets"][0]["pallet"], "demo");
    assert_eq!(report["pallets"][0]["status"], "patched");
    assert_eq!(report["pallets"][0]["attempts"], 2);
    assert_eq!(report["pallets"][0]["corrections"]["do_thing"]["weight"], 1_200_000);
    assert!(report["pallets"][0]["corrections"]["do_thing"]["writes"].is_null());
    assert_eq!(report["patched_files"][0], DISPATCH_REL);
    assert!(report.get("publish").is_none());
}

#[test]
fn benchmark_invocation_targets_the_pallet_module() {
    let workspace = Workspace::new(None);
    workspace.install_fake_node("bench_ok.txt", 0);

    let output = workspace.bweights(&["run", "--no-publish"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let args = std::fs::read_to_string(workspace.args_log()).expect("read args log");
    let args: Vec<&str> = args.lines().collect();
    assert_eq!(&args[..2], ["benchmark", "pallet"]);
    let pallet_at = args.iter().position(|arg| *arg == "--pallet").expect("--pallet");
    assert_eq!(args[pallet_at + 1], "pallet_demo");
    let extrinsic_at = args
        .iter()
        .position(|arg| *arg == "--extrinsic")
        .expect("--extrinsic");
    assert_eq!(args[extrinsic_at + 1], "*");
    assert!(args.contains(&"--genesis-builder-preset=benchmark"));
    assert_eq!(&args[args.len() - 2..], ["--heap-pages", "4096"]);
}

#[test]
fn matching_weights_pass_without_touching_files() {
    let workspace = Workspace::new(None);
    workspace.install_fake_node("bench_ok.txt", 0);
    let before = workspace.dispatch();

    let output = workspace.bweights(&["run", "--auto-patch", "--report", "report.json"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert_eq!(workspace.dispatch(), before);
    assert_eq!(workspace.invocations(), 1);

    let report = read_report(&workspace);
    assert_eq!(report["pallets"][0]["status"], "passed");
    assert_eq!(report["publish"]["result"], "nothing_patched");
}

#[test]
fn drift_without_auto_patch_fails_and_keeps_file() {
    let workspace = Workspace::new(None);
    workspace.install_fake_node("bench_drift.txt", 0);
    let before = workspace.dispatch();

    let output = workspace.bweights(&["run", "--report", "report.json"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("auto-patch is disabled"));
    assert_eq!(workspace.dispatch(), before);
    assert_eq!(workspace.invocations(), 2);

    let report = read_report(&workspace);
    assert_eq!(report["pallets"][0]["status"], "failed");
    assert!(report["aborted"]
        .as_str()
        .expect("aborted reason")
        .contains("weights drifted after 2 attempts"));
}

#[test]
fn environment_toggle_enables_patching() {
    let workspace = Workspace::new(None);
    workspace.install_fake_node("bench_drift.txt", 0);

    let output = workspace.bweights_with_env(
        &["run", "--no-publish", "--max-retries", "1"],
        &[("AUTO_COMMIT_WEIGHTS", "true")],
    );
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(workspace.dispatch().contains("Weight::from_parts(1_200_000, 0)"));
    assert_eq!(workspace.invocations(), 1);
}

#[test]
fn reverify_checks_the_patched_file_again() {
    let workspace = Workspace::new(None);
    // Same measurements after patching: the re-verification passes.
    workspace.install_fake_node("bench_drift.txt", 0);

    let output = workspace.bweights(&[
        "run",
        "--auto-patch",
        "--no-publish",
        "--patch-policy",
        "reverify",
        "--report",
        "report.json",
    ]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert_eq!(workspace.invocations(), 3);

    let report = read_report(&workspace);
    assert_eq!(report["patch_policy"], "reverify");
    assert_eq!(report["pallets"][0]["status"], "patched");
    assert_eq!(report["pallets"][0]["attempts"], 3);
}

#[test]
fn failing_benchmark_is_never_patched() {
    let workspace = Workspace::new(None);
    workspace.install_fake_node("bench_drift.txt", 1);
    let before = workspace.dispatch();

    let output = workspace.bweights(&[
        "run",
        "--auto-patch",
        "--no-publish",
        "--report",
        "report.json",
    ]);
    assert!(!output.status.success());
    assert!(stdout(&output).contains("benchmark tool failed (exit code 1)"));
    assert_eq!(workspace.dispatch(), before);

    let report = read_report(&workspace);
    assert_eq!(report["pallets"][0]["status"], "failed");
    assert_eq!(
        report["pallets"][0]["detail"],
        "no correctable literals in the last attempt"
    );
}

#[test]
fn configuration_errors_stop_before_benchmarking() {
    let workspace = Workspace::new(Some(
        r#"{
  "schema_version": 1,
  "pallets": ["demo", "absent"],
  "dispatch_paths": { "demo": "pallets/demo/src/lib.rs", "absent": "pallets/absent/src/lib.rs" },
  "benchmark": {
    "binary": "bin/fake-node",
    "runtime": "runtime.wasm",
    "genesis_preset": "benchmark",
    "execution": "compiled",
    "steps": 2,
    "repeat": 1
  }
}"#,
    ));
    workspace.install_fake_node("bench_ok.txt", 0);

    let output = workspace.bweights(&["run", "--no-publish"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("pallet absent: dispatch file"));
    assert_eq!(workspace.invocations(), 0);

    let output = workspace.bweights(&["run", "--no-publish", "--pallet", "nope"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("unknown pallet \"nope\""));
}

#[test]
fn runs_leave_the_temp_dir_empty() {
    let workspace = Workspace::new(None);
    let scratch = workspace.root().join("tmp");
    std::fs::create_dir_all(&scratch).expect("create scratch dir");
    let scratch_env = scratch.to_str().expect("utf-8 scratch path");

    workspace.install_fake_node("bench_ok.txt", 0);
    let output = workspace.bweights_with_env(&["run", "--no-publish"], &[("TMPDIR", scratch_env)]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    workspace.install_fake_node("bench_drift.txt", 1);
    let output = workspace.bweights_with_env(&["run", "--no-publish"], &[("TMPDIR", scratch_env)]);
    assert!(!output.status.success());

    let leftovers: Vec<_> = std::fs::read_dir(&scratch)
        .expect("read scratch dir")
        .map(|entry| entry.expect("dir entry").file_name())
        .collect();
    assert!(leftovers.is_empty(), "left behind: {leftovers:?}");
}
