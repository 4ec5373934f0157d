//! Commit and push of patched dispatch files.
use crate::config::CommitSettings;
use crate::error::WeightCheckError;
use crate::retry::PatchedFiles;
use crate::util::display_path;
use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum PublishOutcome {
    /// No dispatch file was modified during the run.
    NothingPatched,
    /// Patched files carried no staged difference.
    NoDiff,
    Pushed { branch: String, commit: String },
}

pub struct GitPublisher {
    repo_root: PathBuf,
    git: PathBuf,
    settings: CommitSettings,
}

impl GitPublisher {
    pub fn new(repo_root: &Path, settings: CommitSettings) -> Result<Self> {
        let git = which::which("git").context("locate git on PATH")?;
        Ok(Self {
            repo_root: repo_root.to_path_buf(),
            git,
            settings,
        })
    }

    /// Stage, commit, and push `files` to the current branch.
    pub fn publish(&self, files: &PatchedFiles) -> Result<PublishOutcome> {
        if files.is_empty() {
            return Ok(PublishOutcome::NothingPatched);
        }
        let start = Instant::now();
        let paths: Vec<String> = files
            .iter()
            .map(|path| display_path(path, Some(&self.repo_root)))
            .collect();

        let mut add_args = vec!["add".to_string(), "--".to_string()];
        add_args.extend(paths.iter().cloned());
        let add = self.git(&add_args)?;
        if !add.status.success() {
            return Err(self.failure("add", &add).into());
        }

        // Diff and commit are limited to the patched paths so that unrelated
        // staged changes stay out of the commit.
        let mut diff_args: Vec<String> = ["diff", "--cached", "--quiet", "--"]
            .iter()
            .map(|arg| arg.to_string())
            .collect();
        diff_args.extend(paths.iter().cloned());
        let diff = self.git(&diff_args)?;
        match diff.status.code() {
            Some(0) => {
                tracing::info!(files = paths.len(), "patched files carry no staged changes");
                return Ok(PublishOutcome::NoDiff);
            }
            Some(1) => {}
            _ => return Err(self.failure("diff", &diff).into()),
        }

        let mut commit_args = Vec::new();
        if let Some(name) = &self.settings.author_name {
            commit_args.extend(["-c".to_string(), format!("user.name={name}")]);
        }
        if let Some(email) = &self.settings.author_email {
            commit_args.extend(["-c".to_string(), format!("user.email={email}")]);
        }
        commit_args.extend([
            "commit".to_string(),
            "-m".to_string(),
            self.settings.message.clone(),
            "--".to_string(),
        ]);
        commit_args.extend(paths.iter().cloned());
        let commit = self.git(&commit_args)?;
        if !commit.status.success() {
            return Err(self.failure("commit", &commit).into());
        }

        let branch = self.current_branch()?;
        let refspec = format!("HEAD:{branch}");
        let push = self.git(&["push", self.settings.remote.as_str(), refspec.as_str()])?;
        if !push.status.success() {
            return Err(self.failure("push", &push).into());
        }

        let commit = self.last_commit();
        tracing::info!(
            elapsed_ms = start.elapsed().as_millis(),
            files = paths.len(),
            branch = %branch,
            remote = %self.settings.remote,
            "pushed weight patch"
        );
        Ok(PublishOutcome::Pushed { branch, commit })
    }

    fn git<S: AsRef<str>>(&self, args: &[S]) -> Result<Output> {
        let args: Vec<&str> = args.iter().map(AsRef::as_ref).collect();
        tracing::debug!(command = %shell_words::join(&args), "git");
        Command::new(&self.git)
            .args(&args)
            .current_dir(&self.repo_root)
            .output()
            .with_context(|| format!("run git {}", args.first().copied().unwrap_or_default()))
    }

    fn current_branch(&self) -> Result<String> {
        let output = self.git(&["rev-parse", "--abbrev-ref", "HEAD"])?;
        if !output.status.success() {
            return Err(self.failure("rev-parse", &output).into());
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn last_commit(&self) -> String {
        match self.git(&["log", "-1", "--oneline"]) {
            Ok(output) if output.status.success() => {
                String::from_utf8_lossy(&output.stdout).trim().to_string()
            }
            _ => "unknown".to_string(),
        }
    }

    /// Build a publish error with whatever branch context is recoverable.
    fn failure(&self, step: &'static str, output: &Output) -> WeightCheckError {
        let branch = match self.git(&["rev-parse", "--abbrev-ref", "HEAD"]) {
            Ok(branch) if branch.status.success() => {
                String::from_utf8_lossy(&branch.stdout).trim().to_string()
            }
            _ => "unknown".to_string(),
        };
        WeightCheckError::Publish {
            step,
            branch,
            last_commit: self.last_commit(),
            detail: stderr_trim(output),
        }
    }
}

fn stderr_trim(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if stderr.is_empty() {
        format!("status {}", output.status)
    } else {
        stderr
    }
}
