use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::fs;
use tracing_subscriber::EnvFilter;

mod bench_output;
mod bench_tool;
mod cli;
mod config;
mod drift;
mod error;
mod literals;
mod numeric;
mod patch;
mod publish;
mod report;
mod retry;
mod run;
mod scope;
mod util;

use crate::bench_output::{parse_lines, ParsedRecord};
use crate::cli::{Command, InitArgs, LiteralsArgs, ParseArgs, PatchArgs, RootArgs, RunArgs};
use crate::drift::measured_weight;
use crate::numeric::group_digits;
use crate::patch::Correction;

fn main() -> Result<()> {
    let args = RootArgs::parse();
    init_tracing(args.verbose);

    match args.command {
        Command::Run(args) => cmd_run(args),
        Command::Parse(args) => cmd_parse(args),
        Command::Literals(args) => cmd_literals(args),
        Command::Patch(args) => cmd_patch(args),
        Command::Init(args) => cmd_init(args),
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn cmd_run(args: RunArgs) -> Result<()> {
    let options = run::RunOptions {
        repo_root: args.repo_root,
        config: args.config,
        pallets: args.pallets,
        auto_patch: args.auto_patch,
        patch_policy: args.patch_policy,
        threshold: args.threshold,
        max_retries: args.max_retries,
        publish: !args.no_publish,
        report: args.report,
    };
    run::run(&options)
}

fn cmd_parse(args: ParseArgs) -> Result<()> {
    let bytes = fs::read(&args.input)
        .with_context(|| format!("read benchmark output {}", args.input.display()))?;
    let text = String::from_utf8_lossy(&bytes);
    let records = parse_lines(text.lines());

    if args.json {
        let json = serde_json::to_string_pretty(&records).context("serialize records")?;
        println!("{json}");
        return Ok(());
    }
    for record in &records {
        match record {
            ParsedRecord::Complete(record) => println!(
                "{:<40} time {:>12} us  weight {:>15}  reads {:>3}  writes {:>3}",
                record.name,
                record.time_us,
                group_digits(measured_weight(record.time_us)),
                record.reads,
                record.writes
            ),
            ParsedRecord::Incomplete { name, missing } => {
                println!("{name:<40} incomplete (missing {})", missing.join(", "))
            }
        }
    }
    println!("{} record(s)", records.len());
    Ok(())
}

fn cmd_literals(args: LiteralsArgs) -> Result<()> {
    let source = fs::read_to_string(&args.file)
        .with_context(|| format!("read dispatch file {}", args.file.display()))?;

    let entries = match &args.name {
        Some(name) => {
            let scope = scope::locate(&source, name).ok_or_else(|| {
                anyhow!("no function named {name} in {}", args.file.display())
            })?;
            tracing::debug!(function = %name, line = scope.decl_line + 1, "located declaration");
            vec![(name.clone(), literals::extract_literal(&source, name))]
        }
        None => literals::extract_all(&source),
    };

    if args.json {
        let map: serde_json::Map<String, serde_json::Value> = entries
            .iter()
            .map(|(name, literal)| Ok((name.clone(), serde_json::to_value(literal)?)))
            .collect::<Result<_, serde_json::Error>>()
            .context("serialize literals")?;
        println!(
            "{}",
            serde_json::to_string_pretty(&map).context("serialize literals")?
        );
        return Ok(());
    }
    for (name, literal) in &entries {
        println!(
            "{:<40} weight {:>15}  reads {:>3}  writes {:>3}",
            name,
            group_digits(literal.weight),
            literal.reads,
            literal.writes
        );
    }
    Ok(())
}

fn cmd_patch(args: PatchArgs) -> Result<()> {
    let correction = Correction {
        weight: args.weight,
        reads: args.reads,
        writes: args.writes,
    };
    if correction.is_empty() {
        return Err(anyhow!("nothing to patch: pass --weight, --reads, or --writes"));
    }
    if patch::patch_file(&args.file, &args.name, &correction)? {
        println!("Patched {} in {}", args.name, args.file.display());
    } else {
        println!("No change to {} in {}", args.name, args.file.display());
    }
    Ok(())
}

fn cmd_init(args: InitArgs) -> Result<()> {
    if args.out.exists() && !args.force {
        return Err(anyhow!(
            "{} already exists (use --force to overwrite)",
            args.out.display()
        ));
    }
    if let Some(parent) = args.out.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create {}", parent.display()))?;
        }
    }
    let stub = config::config_stub()?;
    fs::write(&args.out, stub + "\n")
        .with_context(|| format!("write {}", args.out.display()))?;
    println!("Wrote {}", args.out.display());
    Ok(())
}
