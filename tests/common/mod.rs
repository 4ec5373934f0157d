//! Shared test infrastructure for integration tests.
//!
//! A `Workspace` is a throwaway repository root holding the demo pallet's
//! dispatch file, a config, and a fake node binary that replays captured
//! benchmark output and logs its arguments.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

pub const DISPATCH_REL: &str = "pallets/demo/src/lib.rs";

fn manifest_dir() -> PathBuf {
    PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap_or_else(|_| ".".into()))
}

/// Path to a file under tests/fixtures/demo/.
pub fn fixture_path(name: &str) -> PathBuf {
    manifest_dir().join("tests/fixtures/demo").join(name)
}

pub fn fixture_text(name: &str) -> String {
    let path = fixture_path(name);
    fs::read_to_string(&path).unwrap_or_else(|err| panic!("read {}: {err}", path.display()))
}

pub struct Workspace {
    pub dir: TempDir,
}

#[allow(dead_code)]
impl Workspace {
    /// A repo root with the demo dispatch file and a config that points the
    /// benchmark binary at `bin/fake-node`.
    pub fn new(config_override: Option<&str>) -> Self {
        let dir = TempDir::new().expect("create temp dir");
        let root = dir.path();
        let dispatch = root.join(DISPATCH_REL);
        fs::create_dir_all(dispatch.parent().expect("dispatch parent")).expect("create pallet dir");
        fs::write(&dispatch, fixture_text("dispatches.rs")).expect("write dispatch file");

        let config = config_override.map(str::to_string).unwrap_or_else(|| {
            format!(
                r#"{{
  "schema_version": 1,
  "threshold_percent": 40,
  "max_retries": 2,
  "pallets": ["demo"],
  "dispatch_paths": {{ "demo": "{DISPATCH_REL}" }},
  "benchmark": {{
    "binary": "bin/fake-node",
    "runtime": "target/release/wbuild/demo_runtime.compact.compressed.wasm",
    "genesis_preset": "benchmark",
    "execution": "compiled",
    "steps": 2,
    "repeat": 1,
    "extra_args": "--heap-pages 4096"
  }}
}}"#
            )
        });
        fs::write(root.join("bench-weights.json"), config).expect("write config");
        Self { dir }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn dispatch(&self) -> String {
        fs::read_to_string(self.root().join(DISPATCH_REL)).expect("read dispatch file")
    }

    pub fn args_log(&self) -> PathBuf {
        self.root().join("fake-node.args")
    }

    /// Number of times the fake node ran.
    pub fn invocations(&self) -> usize {
        fs::read_to_string(self.args_log())
            .map(|log| log.lines().filter(|line| *line == "benchmark").count())
            .unwrap_or(0)
    }

    /// Install the fake node, replaying `output` and exiting with `exit_code`.
    #[cfg(unix)]
    pub fn install_fake_node(&self, output: &str, exit_code: i32) {
        use std::os::unix::fs::PermissionsExt;

        let bin_dir = self.root().join("bin");
        fs::create_dir_all(&bin_dir).expect("create bin dir");
        let output_path = self.root().join("fake-node.out");
        fs::write(&output_path, fixture_text(output)).expect("write canned output");
        let script = format!(
            "#!/bin/sh\nprintf '%s\\n' \"$@\" >> '{}'\ncat '{}'\nexit {exit_code}\n",
            self.args_log().display(),
            output_path.display()
        );
        let script_path = bin_dir.join("fake-node");
        fs::write(&script_path, script).expect("write fake node");
        fs::set_permissions(&script_path, fs::Permissions::from_mode(0o755))
            .expect("chmod fake node");
    }

    /// Run `bweights <args>` from the workspace root with auto-patching
    /// disabled unless the caller opts in.
    pub fn bweights(&self, args: &[&str]) -> Output {
        self.bweights_with_env(args, &[])
    }

    pub fn bweights_with_env(&self, args: &[&str], envs: &[(&str, &str)]) -> Output {
        let mut command = Command::new(env!("CARGO_BIN_EXE_bweights"));
        command
            .args(args)
            .current_dir(self.root())
            .env_remove("AUTO_COMMIT_WEIGHTS")
            .env("RUST_LOG", "info");
        for (key, value) in envs {
            command.env(key, value);
        }
        command.output().expect("run bweights")
    }
}

pub fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

pub fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}
