//! Command-line interface for texrun
//!
//! Provides `run`, `info` and `clean` subcommands.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod clean;
mod info;
mod run;
mod utils;

pub use utils::{parse_blocks, read_blocks};

/// Incremental execution cache for code embedded in documents
#[derive(Parser)]
#[command(name = "texrun")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging (sets log level to DEBUG)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute the sessions that need it and update the store
    Run(Box<run::RunArgs>),

    /// Display what the store currently holds
    Info(info::InfoArgs),

    /// Delete every recorded artifact and the store
    Clean(clean::CleanArgs),
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG in the environment always takes precedence; --verbose falls back to DEBUG.
    let filter = if cli.verbose {
        EnvFilter::from_default_env().add_directive(Level::DEBUG.into())
    } else {
        EnvFilter::from_default_env().add_directive(Level::WARN.into())
    };
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init();

    match cli.command {
        Commands::Run(args) => run::run(*args),
        Commands::Info(args) => info::run(args),
        Commands::Clean(args) => clean::run(args),
    }
}
