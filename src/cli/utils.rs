//! Shared CLI utilities.

use crate::config::{load_config, merge_cli_with_config, CliOverrides};
use crate::domain::{CodeBlock, RerunPolicy, Settings};
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Parse a comma-separated string into a `Vec<String>`, trimming whitespace and
/// discarding empty segments.  Returns `None` when `value` is `None`.
pub fn parse_csv(value: &Option<String>) -> Option<Vec<String>> {
    value.as_ref().map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| part.to_string())
            .collect::<Vec<_>>()
    })
}

/// Parse `family=policy` pairs, e.g. `ruby=always,sh=never`.
pub fn parse_policy_overrides(value: &Option<String>) -> Result<BTreeMap<String, RerunPolicy>> {
    let mut overrides = BTreeMap::new();
    for pair in parse_csv(value).unwrap_or_default() {
        let Some((family, policy)) = pair.split_once('=') else {
            anyhow::bail!("Invalid rerun override '{pair}' (expected family=policy)");
        };
        let policy = policy.parse::<RerunPolicy>().map_err(anyhow::Error::msg)?;
        overrides.insert(family.trim().to_string(), policy);
    }
    Ok(overrides)
}

/// Read code blocks as JSON Lines from a file, or stdin when `path` is `-`.
pub fn read_blocks(path: &Path) -> Result<Vec<CodeBlock>> {
    let content = if path == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf).context("Failed reading blocks from stdin")?;
        buf
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed reading blocks file: {}", path.display()))?
    };
    parse_blocks(&content)
}

pub fn parse_blocks(content: &str) -> Result<Vec<CodeBlock>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            serde_json::from_str::<CodeBlock>(line)
                .with_context(|| format!("Invalid code block on input line {}", idx + 1))
        })
        .collect()
}

/// Settings for a document root: config file first, then CLI overrides.
pub fn resolve_settings(
    root: &Option<PathBuf>,
    config: Option<&Path>,
    overrides: CliOverrides,
) -> Result<Settings> {
    let root = root.clone().unwrap_or_else(|| PathBuf::from("."));
    if !root.is_dir() {
        anyhow::bail!("Document root is not a directory: {}", root.display());
    }
    let file_settings = load_config(&root, config)?;
    Ok(merge_cli_with_config(file_settings, overrides))
}
