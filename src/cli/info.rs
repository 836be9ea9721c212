//! Info command implementation

use anyhow::Result;
use clap::Args;
use console::style;
use std::path::PathBuf;

use super::utils::resolve_settings;
use crate::config::CliOverrides;
use crate::engine::EngineRegistry;
use crate::store::GlobalStore;

#[derive(Args)]
pub struct InfoArgs {
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

    /// List every session
    #[arg(long)]
    pub sessions: bool,
}

pub fn run(args: InfoArgs) -> Result<()> {
    let overrides = CliOverrides {
        output_dir: args.output_dir.clone(),
        jobname: args.jobname.clone(),
        ..CliOverrides::default()
    };
    let settings = resolve_settings(&args.root, args.config.as_deref(), overrides)?;
    let store_path = settings.store_path();
    let engines = EngineRegistry::from_settings(&settings);
    println!("Engines:          {}", engines.families().collect::<Vec<_>>().join(", "));

    let Some(store) = GlobalStore::load(&store_path)? else {
        println!("No store at {}", store_path.display());
        return Ok(());
    };

    let (errors, warnings) = store.sessions.values().fold((0, 0), |(e, w), record| {
        let status = record.exit_status_or_clean();
        (e + status.errors, w + status.warnings)
    });

    println!("Store:            {}", store_path.display());
    println!("Format:           {}", store.vitals.version);
    println!("Encoding:         {}", store.vitals.encoding);
    println!("Last updated:     {}", store.updated_at.as_deref().unwrap_or("never"));
    println!("Sessions:         {}", store.sessions.len());
    println!("Highlights:       {}", store.highlights.len());
    println!("Tracked files:    {}", store.all_files().len());
    println!("Recorded issues:  {} errors, {} warnings", errors, warnings);

    if args.sessions && !store.sessions.is_empty() {
        println!();
        for (key_run, record) in &store.sessions {
            let status = record.exit_status_or_clean();
            let marker = if status.errors > 0 {
                style("error").red().to_string()
            } else if status.warnings > 0 {
                style("warn").yellow().to_string()
            } else {
                style("ok").green().to_string()
            };
            println!(
                "  {:<5} {}  files={} deps={}",
                marker,
                key_run,
                record.files.len(),
                record.dependencies.len()
            );
        }
    }
    Ok(())
}
