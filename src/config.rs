//! Run configuration.
//!
//! A repo-owned JSON file names the pallets to check, where their dispatch
//! files live, and how the benchmarking binary is invoked. Threshold and
//! retry count apply to the whole run, never per pallet.
use crate::error::WeightCheckError;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_SCHEMA_VERSION: u32 = 1;

/// Config file looked up in the repository root when `--config` is absent.
pub const DEFAULT_CONFIG_PATH: &str = "bench-weights.json";

/// Environment toggle that permits patching and committing.
pub const AUTO_PATCH_ENV: &str = "AUTO_COMMIT_WEIGHTS";

const DEFAULT_THRESHOLD_PERCENT: u32 = 40;
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_COMMIT_MESSAGE: &str = "auto-update benchmark weights";

/// What happens after retries are exhausted and literals were patched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum PatchPolicy {
    /// Accept the patch and move on to the next pallet.
    #[default]
    StopAfterPatch,
    /// Reset the attempt counter and verify against the patched file once.
    Reverify,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BenchmarkSettings {
    /// Node binary; a bare name is looked up on `PATH`, anything else is
    /// relative to the repository root.
    pub binary: String,
    /// Runtime artifact passed as `--runtime`.
    pub runtime: String,
    pub genesis_preset: String,
    /// Value for `--wasm-execution`.
    pub execution: String,
    pub steps: u32,
    pub repeat: u32,
    /// Extra shell-style arguments appended to every invocation.
    #[serde(default)]
    pub extra_args: String,
}

impl Default for BenchmarkSettings {
    fn default() -> Self {
        Self {
            binary: "target/production/node-subtensor".to_string(),
            runtime: "target/production/wbuild/node-subtensor-runtime/node_subtensor_runtime.compact.compressed.wasm"
                .to_string(),
            genesis_preset: "benchmark".to_string(),
            execution: "compiled".to_string(),
            steps: 50,
            repeat: 5,
            extra_args: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommitSettings {
    pub message: String,
    pub remote: String,
    #[serde(default)]
    pub author_name: Option<String>,
    #[serde(default)]
    pub author_email: Option<String>,
}

impl Default for CommitSettings {
    fn default() -> Self {
        Self {
            message: DEFAULT_COMMIT_MESSAGE.to_string(),
            remote: "origin".to_string(),
            author_name: None,
            author_email: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub schema_version: u32,
    #[serde(default = "default_threshold_percent")]
    pub threshold_percent: u32,
    /// Total benchmark runs per pallet, first run included: 3 means three
    /// runs, not one run plus three retries.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default)]
    pub patch_policy: PatchPolicy,
    /// Pallets in the order they are checked.
    pub pallets: Vec<String>,
    /// Pallet name to dispatch file, relative to the repository root.
    pub dispatch_paths: BTreeMap<String, String>,
    /// Benchmark module overrides; defaults to `pallet_<name>`.
    #[serde(default)]
    pub modules: BTreeMap<String, String>,
    #[serde(default)]
    pub benchmark: BenchmarkSettings,
    #[serde(default)]
    pub commit: CommitSettings,
}

fn default_threshold_percent() -> u32 {
    DEFAULT_THRESHOLD_PERCENT
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

/// A pallet resolved against the repository root, ready to benchmark.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PalletTarget {
    pub name: String,
    /// Module name passed to `--pallet`.
    pub module: String,
    /// Dispatch file path as configured.
    pub dispatch_rel: String,
    pub dispatch_path: PathBuf,
}

impl Config {
    /// Resolve `name` to its dispatch file; a missing mapping or file is a
    /// configuration error.
    pub fn resolve_pallet(
        &self,
        name: &str,
        repo_root: &Path,
    ) -> std::result::Result<PalletTarget, WeightCheckError> {
        let rel = self.dispatch_paths.get(name).ok_or_else(|| {
            WeightCheckError::MissingDispatchPath {
                pallet: name.to_string(),
            }
        })?;
        let dispatch_path = repo_root.join(rel);
        if !dispatch_path.is_file() {
            return Err(WeightCheckError::MissingDispatchFile {
                pallet: name.to_string(),
                path: dispatch_path,
            });
        }
        let module = self
            .modules
            .get(name)
            .cloned()
            .unwrap_or_else(|| format!("pallet_{name}"));
        Ok(PalletTarget {
            name: name.to_string(),
            module,
            dispatch_rel: rel.clone(),
            dispatch_path,
        })
    }

    /// Pallets to check: all configured ones, or the requested subset in
    /// configured order.
    pub fn select_pallets(
        &self,
        requested: &[String],
    ) -> std::result::Result<Vec<String>, WeightCheckError> {
        if let Some(unknown) = requested.iter().find(|name| !self.pallets.contains(*name)) {
            return Err(WeightCheckError::UnknownPallet {
                pallet: unknown.clone(),
                configured: self.pallets.join(", "),
            });
        }
        Ok(self
            .pallets
            .iter()
            .filter(|name| requested.is_empty() || requested.contains(*name))
            .cloned()
            .collect())
    }
}

/// Build the default config used when no config file exists.
pub fn default_config() -> Config {
    let dispatch_paths = [
        ("subtensor", "pallets/subtensor/src/macros/dispatches.rs"),
        ("admin_utils", "pallets/admin-utils/src/lib.rs"),
        ("commitments", "pallets/commitments/src/lib.rs"),
        ("drand", "pallets/drand/src/lib.rs"),
    ];
    Config {
        schema_version: CONFIG_SCHEMA_VERSION,
        threshold_percent: DEFAULT_THRESHOLD_PERCENT,
        max_retries: DEFAULT_MAX_RETRIES,
        patch_policy: PatchPolicy::default(),
        pallets: dispatch_paths
            .iter()
            .map(|(name, _)| name.to_string())
            .collect(),
        dispatch_paths: dispatch_paths
            .iter()
            .map(|(name, path)| (name.to_string(), path.to_string()))
            .collect(),
        modules: BTreeMap::new(),
        benchmark: BenchmarkSettings::default(),
        commit: CommitSettings::default(),
    }
}

/// Render a pretty JSON config stub for `init`.
pub fn config_stub() -> Result<String> {
    serde_json::to_string_pretty(&default_config()).context("serialize config stub")
}

pub fn load_config(path: &Path) -> Result<Config> {
    let bytes = fs::read(path).with_context(|| format!("read config {}", path.display()))?;
    let config: Config = serde_json::from_slice(&bytes)
        .with_context(|| format!("parse config JSON {}", path.display()))?;
    validate_config(&config)?;
    Ok(config)
}

/// Load the explicit config path, the repo default if present, or the
/// built-in defaults.
pub fn resolve_config(explicit: Option<&Path>, repo_root: &Path) -> Result<Config> {
    if let Some(path) = explicit {
        return load_config(path);
    }
    let default_path = repo_root.join(DEFAULT_CONFIG_PATH);
    if default_path.is_file() {
        return load_config(&default_path);
    }
    tracing::debug!(
        path = %default_path.display(),
        "no config file found; using built-in defaults"
    );
    Ok(default_config())
}

pub fn validate_config(config: &Config) -> Result<()> {
    if config.schema_version != CONFIG_SCHEMA_VERSION {
        return Err(anyhow!(
            "unsupported config schema_version {}",
            config.schema_version
        ));
    }
    if config.max_retries == 0 {
        return Err(anyhow!("max_retries must be at least 1"));
    }
    if config.pallets.is_empty() {
        return Err(anyhow!("pallets must list at least one pallet"));
    }
    if config.benchmark.steps == 0 || config.benchmark.repeat == 0 {
        return Err(anyhow!("benchmark steps and repeat must be non-zero"));
    }
    for (name, rel) in &config.dispatch_paths {
        validate_relative_path(rel, &format!("dispatch_paths.{name}"))?;
    }
    shell_words::split(&config.benchmark.extra_args).context("parse benchmark.extra_args")?;
    Ok(())
}

fn validate_relative_path(rel: &str, label: &str) -> Result<()> {
    let path = Path::new(rel);
    if rel.trim().is_empty() || path.is_absolute() || has_parent_components(path) {
        return Err(anyhow!(
            "{label} must be a non-empty relative path without '..' (got {rel:?})"
        ));
    }
    Ok(())
}

fn has_parent_components(path: &Path) -> bool {
    path.components()
        .any(|component| matches!(component, std::path::Component::ParentDir))
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
