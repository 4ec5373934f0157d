//! CLI argument parsing for the weight check workflow.
use crate::config::{PatchPolicy, AUTO_PATCH_ENV, DEFAULT_CONFIG_PATH};
use clap::builder::BoolishValueParser;
use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

/// Root CLI entrypoint.
#[derive(Parser, Debug)]
#[command(
    name = "bweights",
    version,
    about = "Benchmark-weight drift checker for pallet dispatch files",
    after_help = "Examples:\n  bweights run --pallet subtensor\n  AUTO_COMMIT_WEIGHTS=1 bweights run --report target/weights.json\n  bweights parse --input bench.txt\n  bweights literals --file pallets/drand/src/lib.rs --name write_pulse\n  bweights patch --file pallets/drand/src/lib.rs --name write_pulse --reads 4\n  bweights init",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    /// Enable debug logging (overridden by RUST_LOG)
    #[arg(long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    Run(RunArgs),
    Parse(ParseArgs),
    Literals(LiteralsArgs),
    Patch(PatchArgs),
    Init(InitArgs),
}

/// Run command inputs: which pallets to check and how to react to drift.
#[derive(Parser, Debug)]
#[command(about = "Benchmark pallets and compare against declared weights")]
pub struct RunArgs {
    /// Config file (default: <repo-root>/bench-weights.json, else built-in defaults)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Repository root that dispatch paths and the node binary are relative to
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub repo_root: PathBuf,

    /// Restrict the run to these pallets (repeatable)
    #[arg(long = "pallet", value_name = "NAME")]
    pub pallets: Vec<String>,

    /// Patch drifting literals and commit them once retries are exhausted
    #[arg(
        long,
        env = AUTO_PATCH_ENV,
        action = ArgAction::SetTrue,
        value_parser = BoolishValueParser::new()
    )]
    pub auto_patch: bool,

    /// What to do after patching (overrides the config file)
    #[arg(long, value_enum, value_name = "POLICY")]
    pub patch_policy: Option<PatchPolicy>,

    /// Drift threshold in percent (overrides the config file)
    #[arg(long, value_name = "PERCENT")]
    pub threshold: Option<u32>,

    /// Total benchmark runs per pallet, first run included (overrides the config file)
    #[arg(long, value_name = "N")]
    pub max_retries: Option<u32>,

    /// Patch files but skip git add/commit/push
    #[arg(long)]
    pub no_publish: bool,

    /// Write a JSON run report to this path
    #[arg(long, value_name = "FILE")]
    pub report: Option<PathBuf>,
}

/// Parse command inputs for offline inspection of saved benchmark output.
#[derive(Parser, Debug)]
#[command(about = "Parse saved benchmark output and print the records")]
pub struct ParseArgs {
    /// File containing captured benchmark stdout
    #[arg(long, value_name = "FILE")]
    pub input: PathBuf,

    /// Emit machine-readable JSON output
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
#[command(about = "Print the weight literals declared in a dispatch file")]
pub struct LiteralsArgs {
    /// Dispatch source file
    #[arg(long, value_name = "FILE")]
    pub file: PathBuf,

    /// Only print the first function with this name
    #[arg(long, value_name = "FN")]
    pub name: Option<String>,

    /// Emit machine-readable JSON output
    #[arg(long)]
    pub json: bool,
}

/// Patch command inputs for a one-off manual correction.
#[derive(Parser, Debug)]
#[command(about = "Rewrite the weight literals of one dispatch function")]
pub struct PatchArgs {
    /// Dispatch source file
    #[arg(long, value_name = "FILE")]
    pub file: PathBuf,

    /// Function to patch; the first declaration wins
    #[arg(long, value_name = "FN")]
    pub name: String,

    /// New ref-time weight in picoseconds
    #[arg(long, value_name = "PS")]
    pub weight: Option<u64>,

    #[arg(long, value_name = "N")]
    pub reads: Option<u64>,

    #[arg(long, value_name = "N")]
    pub writes: Option<u64>,
}

#[derive(Parser, Debug)]
#[command(about = "Write a config stub with the built-in defaults")]
pub struct InitArgs {
    /// Destination path
    #[arg(long, value_name = "FILE", default_value = DEFAULT_CONFIG_PATH)]
    pub out: PathBuf,

    /// Overwrite an existing file
    #[arg(long)]
    pub force: bool,
}
