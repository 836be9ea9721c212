//! Build settings: everything the engine reads but never mutates.

use crate::engine::EngineTemplate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// How aggressively cached results are trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RerunPolicy {
    Never,
    Modified,
    #[default]
    Errors,
    Warnings,
    Always,
}

impl RerunPolicy {
    /// Policies under which carried-over issues stay unresolved until the code changes.
    pub fn is_conservative(self) -> bool {
        matches!(self, Self::Never | Self::Modified | Self::Errors)
    }
}

impl FromStr for RerunPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "never" => Ok(Self::Never),
            "modified" => Ok(Self::Modified),
            "errors" => Ok(Self::Errors),
            "warnings" => Ok(Self::Warnings),
            "always" => Ok(Self::Always),
            other => Err(format!(
                "Invalid rerun policy '{other}' (expected never|modified|errors|warnings|always)"
            )),
        }
    }
}

impl fmt::Display for RerunPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Never => "never",
            Self::Modified => "modified",
            Self::Errors => "errors",
            Self::Warnings => "warnings",
            Self::Always => "always",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GobbleMode {
    #[default]
    None,
    Auto,
}

/// Freshness token flavour for declared dependencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyMode {
    Mtime,
    Hash,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HighlightSettings {
    pub enabled: bool,
    /// External highlighter argv; `{lexer}` and `{style}` are substituted.
    pub command: Option<Vec<String>>,
    pub style: String,
    /// Per-family lexer overrides.
    pub lexers: BTreeMap<String, String>,
}

impl Default for HighlightSettings {
    fn default() -> Self {
        Self { enabled: true, command: None, style: "default".to_string(), lexers: BTreeMap::new() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub jobname: String,
    pub output_dir: PathBuf,
    pub working_dir: PathBuf,
    pub encoding: String,
    pub gobble: GobbleMode,
    /// Highlighted output longer than this many lines goes to its own file.
    pub fvextfile: Option<usize>,
    pub rerun: RerunPolicy,
    pub rerun_overrides: BTreeMap<String, RerunPolicy>,
    pub hash_dependencies: bool,
    pub max_concurrency: Option<usize>,
    pub timeout_secs: Option<u64>,
    pub highlight: HighlightSettings,
    pub engines: BTreeMap<String, EngineTemplate>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            jobname: "texrun".to_string(),
            output_dir: PathBuf::from("texrun-files"),
            working_dir: PathBuf::from("."),
            encoding: "utf-8".to_string(),
            gobble: GobbleMode::None,
            fvextfile: None,
            rerun: RerunPolicy::Errors,
            rerun_overrides: BTreeMap::new(),
            hash_dependencies: false,
            max_concurrency: None,
            timeout_secs: None,
            highlight: HighlightSettings::default(),
            engines: BTreeMap::new(),
        }
    }
}

impl Settings {
    pub fn policy_for(&self, family: &str) -> RerunPolicy {
        self.rerun_overrides.get(family).copied().unwrap_or(self.rerun)
    }

    pub fn dependency_mode(&self) -> DependencyMode {
        if self.hash_dependencies {
            DependencyMode::Hash
        } else {
            DependencyMode::Mtime
        }
    }

    pub fn concurrency(&self) -> usize {
        self.max_concurrency
            .filter(|n| *n > 0)
            .or_else(|| std::thread::available_parallelism().ok().map(|n| n.get()))
            .unwrap_or(1)
    }

    pub fn store_path(&self) -> PathBuf {
        self.output_dir.join(format!("{}.store.json", self.jobname))
    }

    pub fn macros_path(&self) -> PathBuf {
        self.output_dir.join(format!("{}.macros", self.jobname))
    }
}
