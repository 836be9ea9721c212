//! Run command implementation

use anyhow::Result;
use clap::Args;
use console::style;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::time::Instant;

use super::utils::{parse_policy_overrides, read_blocks, resolve_settings};
use crate::config::CliOverrides;
use crate::domain::RerunPolicy;
use crate::engine::EngineRegistry;
use crate::highlight::highlighter_from_settings;
use crate::pipeline::{build, persist, BuildSummary, Services};
use crate::store::GlobalStore;

#[derive(Args)]
pub struct RunArgs {
    /// Code blocks as JSON Lines ('-' reads stdin)
    #[arg(short, long, value_name = "FILE")]
    pub blocks: PathBuf,

    /// Document root used for config discovery and relative paths
    #[arg(long, value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// Path to config file (texrun.toml or .texrun.yml)
    #[arg(short = 'c', long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Directory for scripts, outputs and the store
    #[arg(short = 'o', long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Directory interpreters run in
    #[arg(long, value_name = "DIR")]
    pub working_dir: Option<PathBuf>,

    /// Name of the store and macro files
    #[arg(long, value_name = "NAME")]
    pub jobname: Option<String>,

    /// Rerun policy: never, modified, errors, warnings or always
    #[arg(long, value_name = "POLICY")]
    pub rerun: Option<RerunPolicy>,

    /// Per-family rerun policies (comma-separated family=policy)
    #[arg(long, value_name = "PAIRS")]
    pub rerun_override: Option<String>,

    /// Track dependencies by content hash instead of modification time
    #[arg(long)]
    pub hash_dependencies: bool,

    /// Maximum number of sessions executing at once
    #[arg(short = 'j', long, value_name = "N")]
    pub jobs: Option<usize>,

    /// Kill a session after this many seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Skip syntax highlighting
    #[arg(long)]
    pub no_highlight: bool,

    /// Exit with a non-zero status when any errors remain
    #[arg(long)]
    pub error_exit_code: bool,

    /// Print the summary as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: RunArgs) -> Result<()> {
    let overrides = CliOverrides {
        output_dir: args.output_dir.clone(),
        working_dir: args.working_dir.clone(),
        jobname: args.jobname.clone(),
        rerun: args.rerun,
        rerun_overrides: parse_policy_overrides(&args.rerun_override)?,
        hash_dependencies: args.hash_dependencies,
        max_concurrency: args.jobs,
        timeout_secs: args.timeout,
        no_highlight: args.no_highlight,
    };
    let settings = resolve_settings(&args.root, args.config.as_deref(), overrides)?;
    let blocks = read_blocks(&args.blocks)?;
    tracing::debug!("Read {} code blocks", blocks.len());

    let engines = EngineRegistry::from_settings(&settings);
    let highlighter = highlighter_from_settings(&settings);
    let services = Services {
        engines: &engines,
        highlighter: highlighter.as_ref(),
        progress: std::io::stderr().is_terminal(),
    };

    let started = Instant::now();
    let previous = GlobalStore::load(&settings.store_path())?;
    let mut outcome = build(&blocks, &settings, &services, previous)?;
    let written = persist(&mut outcome, &settings)?;

    for message in &outcome.summary.messages {
        eprintln!("{} {}", style("texrun:").yellow(), message);
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome.summary)?);
    } else {
        print_summary(&outcome.summary, &settings.store_path(), written, started);
    }

    let errors = outcome.summary.total().errors;
    if args.error_exit_code && errors > 0 {
        anyhow::bail!("{errors} error(s) remain");
    }
    Ok(())
}

fn print_summary(summary: &BuildSummary, store_path: &std::path::Path, written: bool, started: Instant) {
    let total = summary.total();
    println!();
    println!("{}", style("Build complete").bold());
    println!();
    println!(
        "  Sessions:        {} ({} executed, {} cached, {} removed)",
        summary.sessions, summary.executed, summary.cached, summary.removed
    );
    if summary.invalidated {
        println!("  Store:           {}", style("invalidated (settings changed)").yellow());
    }
    println!("  Highlighted:     {}", summary.highlighted);
    println!("  Files reaped:    {}", summary.reaped);
    println!(
        "  Errors:          {} ({} this run, {} carried over)",
        paint(total.errors, true),
        summary.fresh.errors,
        summary.carried.errors
    );
    println!(
        "  Warnings:        {} ({} this run, {} carried over)",
        paint(total.warnings, false),
        summary.fresh.warnings,
        summary.carried.warnings
    );
    println!(
        "  Store:           {}{}",
        store_path.display(),
        if written { "" } else { " (unchanged)" }
    );
    println!("  Time:            {:.2}s", started.elapsed().as_secs_f64());
}

fn paint(count: u32, is_error: bool) -> String {
    match (count, is_error) {
        (0, _) => style(count).green().to_string(),
        (_, true) => style(count).red().bold().to_string(),
        (_, false) => style(count).yellow().to_string(),
    }
}
