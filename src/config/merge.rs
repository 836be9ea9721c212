//! Merge CLI arguments over file settings (CLI > file > defaults).

use crate::domain::{RerunPolicy, Settings};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Values given on the command line; `None` leaves the file setting alone.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub output_dir: Option<PathBuf>,
    pub working_dir: Option<PathBuf>,
    pub jobname: Option<String>,
    pub rerun: Option<RerunPolicy>,
    pub rerun_overrides: BTreeMap<String, RerunPolicy>,
    pub hash_dependencies: bool,
    pub max_concurrency: Option<usize>,
    pub timeout_secs: Option<u64>,
    pub no_highlight: bool,
}

pub fn merge_cli_with_config(mut settings: Settings, cli: CliOverrides) -> Settings {
    if let Some(dir) = cli.output_dir {
        settings.output_dir = dir;
    }
    if let Some(dir) = cli.working_dir {
        settings.working_dir = dir;
    }
    if let Some(jobname) = cli.jobname {
        settings.jobname = jobname;
    }
    if let Some(policy) = cli.rerun {
        settings.rerun = policy;
    }
    settings.rerun_overrides.extend(cli.rerun_overrides);
    // a switch can only turn hashing on
    settings.hash_dependencies |= cli.hash_dependencies;
    if cli.max_concurrency.is_some() {
        settings.max_concurrency = cli.max_concurrency;
    }
    if cli.timeout_secs.is_some() {
        settings.timeout_secs = cli.timeout_secs;
    }
    if cli.no_highlight {
        settings.highlight.enabled = false;
    }
    settings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_values_win_and_absent_values_keep_the_file() {
        let file = Settings {
            jobname: "paper".to_string(),
            rerun: RerunPolicy::Modified,
            timeout_secs: Some(30),
            ..Settings::default()
        };
        let merged = merge_cli_with_config(
            file,
            CliOverrides {
                rerun: Some(RerunPolicy::Always),
                max_concurrency: Some(2),
                ..CliOverrides::default()
            },
        );
        assert_eq!(merged.rerun, RerunPolicy::Always);
        assert_eq!(merged.max_concurrency, Some(2));
        assert_eq!(merged.jobname, "paper");
        assert_eq!(merged.timeout_secs, Some(30));
    }

    #[test]
    fn hash_switch_does_not_turn_file_setting_off() {
        let file = Settings { hash_dependencies: true, ..Settings::default() };
        let merged = merge_cli_with_config(file, CliOverrides::default());
        assert!(merged.hash_dependencies);
    }
}
