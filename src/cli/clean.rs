//! Clean command implementation

use anyhow::Result;
use clap::Args;
use std::path::PathBuf;

use super::utils::resolve_settings;
use crate::config::CliOverrides;
use crate::reap::reap;
use crate::store::GlobalStore;

#[derive(Args)]
pub struct CleanArgs {
    /// Document root used for config discovery
    #[arg(long, value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// Path to config file
    #[arg(short = 'c', long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Directory holding the store
    #[arg(short = 'o', long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Name of the store file
    #[arg(long, value_name = "NAME")]
    pub jobname: Option<String>,
}

/// Delete every recorded artifact, the macro file and the store itself.
pub fn run(args: CleanArgs) -> Result<()> {
    let overrides = CliOverrides {
        output_dir: args.output_dir.clone(),
        jobname: args.jobname.clone(),
        ..CliOverrides::default()
    };
    let settings = resolve_settings(&args.root, args.config.as_deref(), overrides)?;
    let store_path = settings.store_path();

    let mut doomed = match GlobalStore::load(&store_path)? {
        Some(store) => store.all_files(),
        None => Default::default(),
    };
    doomed.insert(settings.macros_path());
    doomed.insert(store_path);

    let report = reap(&doomed);
    for failure in &report.failures {
        eprintln!("warning: {failure}");
    }
    println!("Removed {} file(s)", report.deleted);
    Ok(())
}
