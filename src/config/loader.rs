//! Config file loading

use crate::domain::Settings;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

const SECTION: &str = "texrun";

/// Load settings for a document rooted at `root`.
///
/// An explicit config file must parse; an auto-discovered one that does not
/// is reported and ignored. Relative paths in the result are anchored at
/// `root`.
pub fn load_config(root: &Path, config_path: Option<&Path>) -> Result<Settings> {
    let explicit = config_path.is_some();

    let discovered = match config_path {
        Some(path) => Some(path.to_path_buf()),
        None => discover_config(root),
    };

    let mut settings = match discovered {
        None => Settings::default(),
        Some(config_file) => match parse_config_file(&config_file) {
            Ok(settings) => {
                tracing::debug!("Loaded config from {}", config_file.display());
                settings
            }
            Err(e) if explicit => return Err(e),
            Err(e) => {
                tracing::warn!(
                    "Failed to parse auto-discovered config {}: {:#}",
                    config_file.display(),
                    e
                );
                Settings::default()
            }
        },
    };

    anchor_paths(&mut settings, root);
    Ok(settings)
}

fn parse_config_file(config_file: &Path) -> Result<Settings> {
    let content = fs::read_to_string(config_file)
        .with_context(|| format!("Failed reading config file: {}", config_file.display()))?;

    let ext = config_file.extension().and_then(|e| e.to_str()).unwrap_or("").to_ascii_lowercase();
    match ext.as_str() {
        "toml" => parse_toml_config(&content, config_file),
        "yaml" | "yml" => parse_yaml_config(&content, config_file),
        other => anyhow::bail!(
            "Unsupported config extension '.{}' for file {}",
            other,
            config_file.display()
        ),
    }
}

/// Parse TOML settings, honouring a nested `[texrun]` section.
fn parse_toml_config(content: &str, config_file: &Path) -> Result<Settings> {
    let raw: toml::Value = toml::from_str(content)
        .with_context(|| format!("Invalid TOML syntax: {}", config_file.display()))?;

    let value = match raw.get(SECTION) {
        Some(nested) => nested.clone(),
        None => raw,
    };

    value.try_into().with_context(|| format!("Invalid TOML config: {}", config_file.display()))
}

fn parse_yaml_config(content: &str, config_file: &Path) -> Result<Settings> {
    let raw: serde_yaml::Value = serde_yaml::from_str(content)
        .with_context(|| format!("Invalid YAML syntax: {}", config_file.display()))?;

    let value = match raw.get(SECTION) {
        Some(nested) => nested.clone(),
        None => raw,
    };

    serde_yaml::from_value(value)
        .with_context(|| format!("Invalid YAML config: {}", config_file.display()))
}

fn anchor_paths(settings: &mut Settings, root: &Path) {
    for path in [&mut settings.output_dir, &mut settings.working_dir] {
        if path.is_relative() {
            *path = root.join(&*path);
        }
    }
}

fn discover_config(root: &Path) -> Option<PathBuf> {
    let candidates = [
        "texrun.toml",
        ".texrun.toml",
        "texrun.yml",
        ".texrun.yml",
        "texrun.yaml",
        ".texrun.yaml",
    ];

    candidates.iter().map(|candidate| root.join(candidate)).find(|path| path.exists())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{GobbleMode, RerunPolicy};
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_config_defaults_when_missing() {
        let tmp = TempDir::new().expect("tmp");
        let settings = load_config(tmp.path(), None).expect("config");
        assert_eq!(settings.rerun, RerunPolicy::Errors);
        assert_eq!(settings.output_dir, tmp.path().join("texrun-files"));
    }

    #[test]
    fn test_load_toml_config() {
        let tmp = TempDir::new().expect("tmp");
        fs::write(
            tmp.path().join("texrun.toml"),
            "rerun = 'modified'\ngobble = 'auto'\n[rerun_overrides]\nruby = 'always'\n",
        )
        .expect("write");

        let settings = load_config(tmp.path(), None).expect("config");
        assert_eq!(settings.rerun, RerunPolicy::Modified);
        assert_eq!(settings.gobble, GobbleMode::Auto);
        assert_eq!(settings.policy_for("ruby"), RerunPolicy::Always);
    }

    #[test]
    fn test_nested_section_is_honoured() {
        let tmp = TempDir::new().expect("tmp");
        fs::write(tmp.path().join("texrun.toml"), "[texrun]\njobname = 'paper'\nfvextfile = 20\n")
            .expect("write");

        let settings = load_config(tmp.path(), None).expect("config");
        assert_eq!(settings.jobname, "paper");
        assert_eq!(settings.fvextfile, Some(20));
    }

    #[test]
    fn test_yaml_engine_definition() {
        let tmp = TempDir::new().expect("tmp");
        fs::write(
            tmp.path().join(".texrun.yaml"),
            "engines:\n  lua:\n    extension: lua\n    command: [lua, '{file}']\n    delimiter: \"print('{delim}')\"\n",
        )
        .expect("write");

        let settings = load_config(tmp.path(), None).expect("config");
        let lua = &settings.engines["lua"];
        assert_eq!(lua.extension, "lua");
        assert_eq!(lua.command, vec!["lua".to_string(), "{file}".to_string()]);
    }

    #[test]
    fn test_explicit_config_invalid_policy_returns_err() {
        let tmp = TempDir::new().expect("tmp");
        let path = tmp.path().join("bad.toml");
        fs::write(&path, "rerun = 'sometimes'\n").expect("write");

        assert!(load_config(tmp.path(), Some(&path)).is_err());
    }

    #[test]
    fn test_auto_discovered_invalid_config_returns_default() {
        let tmp = TempDir::new().expect("tmp");
        fs::write(tmp.path().join("texrun.toml"), "max_concurrency = 'many'\n").expect("write");

        let settings = load_config(tmp.path(), None).expect("should not error on auto-discovery");
        assert_eq!(settings.max_concurrency, None);
    }

    #[test]
    fn test_explicit_unsupported_extension_returns_err() {
        let tmp = TempDir::new().expect("tmp");
        let path = tmp.path().join("texrun.ini");
        fs::write(&path, "rerun=never\n").expect("write");

        assert!(load_config(tmp.path(), Some(&path)).is_err());
    }
}
