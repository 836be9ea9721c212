//! Configuration loading and merging
//!
//! Settings come from a config file next to the document and from CLI
//! arguments, with precedence CLI > File > Defaults.

pub mod loader;
pub mod merge;

pub use loader::load_config;
pub use merge::{merge_cli_with_config, CliOverrides};
