//! Invocation of the external benchmarking binary.
//!
//! Output is streamed line by line into the parser. Only the last lines are
//! retained, in memory, for the failure diagnostic; nothing is written to
//! disk, so an interrupted run leaves no capture behind.
use crate::bench_output::{OutputParser, ParsedRecord};
use crate::config::{BenchmarkSettings, PalletTarget};
use crate::util::truncate_string;
use anyhow::{anyhow, Context, Result};
use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::time::Instant;

const FAILURE_TAIL_LINES: usize = 20;
const FAILURE_TAIL_BYTES: usize = 4096;

/// How the benchmarking process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolExit {
    pub success: bool,
    pub code: Option<i32>,
    /// Last lines of captured stdout when the process failed.
    pub tail: String,
}

impl ToolExit {
    pub fn describe(&self) -> String {
        match self.code {
            Some(code) => format!("exit code {code}"),
            None => "termination by signal".to_string(),
        }
    }
}

/// Source of benchmark records for one pallet.
pub trait BenchmarkTool {
    /// Run the benchmark once for `pallet`, handing each flushed record to
    /// `sink` as soon as it is parsed.
    fn run(&mut self, pallet: &PalletTarget, sink: &mut dyn FnMut(ParsedRecord))
        -> Result<ToolExit>;
}

/// Runs `<binary> benchmark pallet ...` as a blocking subprocess.
pub struct NodeBenchmark {
    settings: BenchmarkSettings,
    repo_root: PathBuf,
}

impl NodeBenchmark {
    pub fn new(settings: BenchmarkSettings, repo_root: &Path) -> Self {
        Self {
            settings,
            repo_root: repo_root.to_path_buf(),
        }
    }

    /// Arguments for benchmarking every extrinsic of `module`.
    pub fn command_args(&self, module: &str) -> Result<Vec<String>> {
        let settings = &self.settings;
        let mut args = vec![
            "benchmark".to_string(),
            "pallet".to_string(),
            "--runtime".to_string(),
            settings.runtime.clone(),
            "--genesis-builder=runtime".to_string(),
            format!("--genesis-builder-preset={}", settings.genesis_preset),
            format!("--wasm-execution={}", settings.execution),
            "--pallet".to_string(),
            module.to_string(),
            "--extrinsic".to_string(),
            "*".to_string(),
            "--steps".to_string(),
            settings.steps.to_string(),
            "--repeat".to_string(),
            settings.repeat.to_string(),
        ];
        let extra = shell_words::split(&settings.extra_args)
            .with_context(|| format!("parse extra args {:?}", settings.extra_args))?;
        args.extend(extra);
        Ok(args)
    }

    fn resolve_binary(&self) -> Result<PathBuf> {
        let configured = Path::new(&self.settings.binary);
        if configured.components().count() == 1 && !configured.is_absolute() {
            return which::which(configured)
                .with_context(|| format!("locate benchmark binary {:?} on PATH", self.settings.binary));
        }
        let path = self.repo_root.join(configured);
        if !path.is_file() {
            return Err(anyhow!(
                "benchmark binary not found at {} (build the node first)",
                path.display()
            ));
        }
        // Spawning with a different cwd must not reinterpret a relative path.
        path.canonicalize()
            .with_context(|| format!("resolve benchmark binary {}", path.display()))
    }
}

impl BenchmarkTool for NodeBenchmark {
    fn run(
        &mut self,
        pallet: &PalletTarget,
        sink: &mut dyn FnMut(ParsedRecord),
    ) -> Result<ToolExit> {
        let binary = self.resolve_binary()?;
        let args = self.command_args(&pallet.module)?;
        tracing::info!(
            pallet = %pallet.name,
            command = %shell_words::join(std::iter::once(binary.display().to_string()).chain(args.iter().cloned())),
            "starting benchmark"
        );

        let start = Instant::now();
        let mut child = Command::new(&binary)
            .args(&args)
            .current_dir(&self.repo_root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .with_context(|| format!("spawn benchmark binary {}", binary.display()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("benchmark stdout was not captured"))?;

        let mut tail = OutputTail::new(FAILURE_TAIL_LINES);
        // The process always runs to completion, even if streaming fails.
        let streamed = stream_records(stdout, &mut tail, sink);
        let status = child.wait().context("wait for benchmark binary")?;
        let line_count = streamed?;
        let elapsed_ms = start.elapsed().as_millis();

        tracing::info!(
            pallet = %pallet.name,
            elapsed_ms,
            lines = line_count,
            success = status.success(),
            "benchmark complete"
        );

        let tail = if status.success() {
            String::new()
        } else {
            tail.render(FAILURE_TAIL_BYTES)
        };
        Ok(exit_from_status(status, tail))
    }
}

/// The last `limit` lines of a stream.
struct OutputTail {
    lines: VecDeque<String>,
    limit: usize,
}

impl OutputTail {
    fn new(limit: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(limit),
            limit,
        }
    }

    fn push(&mut self, line: &str) {
        if self.limit == 0 {
            return;
        }
        if self.lines.len() == self.limit {
            self.lines.pop_front();
        }
        self.lines.push_back(line.to_string());
    }

    fn render(&self, max_bytes: usize) -> String {
        let joined = self.lines.iter().map(String::as_str).collect::<Vec<_>>().join("\n");
        truncate_string(&joined, max_bytes)
    }
}

/// Feed every stdout line to the parser and the tail; returns the number of
/// lines read.
fn stream_records<R: Read>(
    stdout: R,
    tail: &mut OutputTail,
    sink: &mut dyn FnMut(ParsedRecord),
) -> Result<usize> {
    let mut reader = BufReader::new(stdout);
    let mut parser = OutputParser::new();
    let mut buf = Vec::new();
    let mut count = 0;
    loop {
        buf.clear();
        let read = reader
            .read_until(b'\n', &mut buf)
            .context("read benchmark output")?;
        if read == 0 {
            break;
        }
        count += 1;
        let decoded = String::from_utf8_lossy(&buf);
        let line = decoded.trim_end_matches(['\r', '\n']);
        tail.push(line);
        if let Some(record) = parser.feed(line) {
            tracing::debug!(extrinsic = %record.name(), "flushed benchmark record");
            sink(record);
        }
    }
    if let Some(record) = parser.finish() {
        sink(record);
    }
    Ok(count)
}

fn exit_from_status(status: ExitStatus, tail: String) -> ToolExit {
    ToolExit {
        success: status.success(),
        code: status.code(),
        tail,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bench_output::ExtrinsicRecord;

    fn target() -> PalletTarget {
        PalletTarget {
            name: "demo".to_string(),
            module: "pallet_demo".to_string(),
            dispatch_rel: "pallets/demo/src/lib.rs".to_string(),
            dispatch_path: PathBuf::from("pallets/demo/src/lib.rs"),
        }
    }

    #[test]
    fn command_args_select_every_extrinsic_of_module() {
        let settings = BenchmarkSettings {
            extra_args: "--heap-pages 4096 --output 'weights out.rs'".to_string(),
            ..BenchmarkSettings::default()
        };
        let tool = NodeBenchmark::new(settings, Path::new("."));
        let args = tool.command_args("pallet_demo").expect("build args");

        let pallet_at = args.iter().position(|arg| arg == "--pallet").expect("--pallet");
        assert_eq!(args[pallet_at + 1], "pallet_demo");
        let extrinsic_at = args
            .iter()
            .position(|arg| arg == "--extrinsic")
            .expect("--extrinsic");
        assert_eq!(args[extrinsic_at + 1], "*");
        assert!(args.contains(&"--genesis-builder-preset=benchmark".to_string()));
        assert!(args.contains(&"--wasm-execution=compiled".to_string()));
        assert_eq!(&args[..2], ["benchmark", "pallet"]);
        assert_eq!(
            &args[args.len() - 4..],
            ["--heap-pages", "4096", "--output", "weights out.rs"]
        );
    }

    #[test]
    fn streaming_emits_records_and_keeps_tail() {
        let output = "Extrinsic: \"a\"\nTime ~= 1.5\nReads = 1\nWrites = 0\nExtrinsic: \"b\"\nTime ~= 2\n";
        let mut tail = OutputTail::new(2);
        let mut records = Vec::new();
        let count = stream_records(output.as_bytes(), &mut tail, &mut |record| {
            records.push(record)
        })
        .expect("stream");

        assert_eq!(count, 6);
        assert_eq!(tail.render(4096), "Extrinsic: \"b\"\nTime ~= 2");
        assert_eq!(
            records[0],
            ParsedRecord::Complete(ExtrinsicRecord {
                name: "a".to_string(),
                time_us: 1.5,
                reads: 1,
                writes: 0,
            })
        );
        assert_eq!(
            records[1],
            ParsedRecord::Incomplete {
                name: "b".to_string(),
                missing: vec!["reads", "writes"],
            }
        );
    }

    #[test]
    fn missing_binary_path_is_an_error() {
        let root = tempfile::tempdir().expect("create temp dir");
        let settings = BenchmarkSettings {
            binary: "target/production/absent-node".to_string(),
            ..BenchmarkSettings::default()
        };
        let mut tool = NodeBenchmark::new(settings, root.path());
        let err = tool
            .run(&target(), &mut |_| {})
            .expect_err("absent binary");
        assert!(err.to_string().contains("benchmark binary not found"));
    }

    #[test]
    fn tail_is_bounded_and_truncated() {
        let mut tail = OutputTail::new(3);
        for idx in 0..10 {
            tail.push(&format!("line {idx}"));
        }
        assert_eq!(tail.render(4096), "line 7\nline 8\nline 9");
        assert_eq!(tail.render(6), "line 7");
        assert_eq!(OutputTail::new(0).render(4096), "");
    }

    #[cfg(unix)]
    fn install_script(dir: &Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let script = dir.join("fake-node");
        std::fs::write(&script, body).expect("write script");
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755))
            .expect("chmod script");
        script
    }

    #[cfg(unix)]
    fn entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .expect("read dir")
            .map(|entry| entry.expect("dir entry").file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }

    #[cfg(unix)]
    #[test]
    fn successful_run_leaves_no_files_behind() {
        let root = tempfile::tempdir().expect("create temp dir");
        let script = install_script(
            root.path(),
            "#!/bin/sh\necho 'Extrinsic: \"a\"'\necho 'Time ~= 1'\necho 'Reads = 0'\necho 'Writes = 0'\n",
        );
        let settings = BenchmarkSettings {
            binary: script.display().to_string(),
            ..BenchmarkSettings::default()
        };
        let mut tool = NodeBenchmark::new(settings, root.path());
        let exit = tool.run(&target(), &mut |_| {}).expect("run fake node");

        assert!(exit.success);
        assert!(exit.tail.is_empty());
        assert_eq!(entries(root.path()), vec!["fake-node"]);
    }

    #[cfg(unix)]
    #[test]
    fn failing_binary_reports_exit_and_tail() {
        let root = tempfile::tempdir().expect("create temp dir");
        let script = install_script(
            root.path(),
            "#!/bin/sh\necho 'Extrinsic: \"a\"'\necho 'Error: runtime panicked'\nexit 3\n",
        );

        let settings = BenchmarkSettings {
            binary: script.display().to_string(),
            ..BenchmarkSettings::default()
        };
        let mut tool = NodeBenchmark::new(settings, root.path());
        let mut records = Vec::new();
        let exit = tool
            .run(&target(), &mut |record| records.push(record))
            .expect("run fake node");

        assert!(!exit.success);
        assert_eq!(exit.code, Some(3));
        assert_eq!(exit.describe(), "exit code 3");
        assert_eq!(exit.tail, "Extrinsic: \"a\"\nError: runtime panicked");
        assert_eq!(records.len(), 1);
        assert_eq!(entries(root.path()), vec!["fake-node"]);
    }
}
