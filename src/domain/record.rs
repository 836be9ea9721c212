//! Persisted per-session bookkeeping.

use crate::domain::{GobbleMode, Settings};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Bumped whenever the persisted layout changes.
pub const STORE_FORMAT_VERSION: &str = "texrun-store-1";

/// Everything about a session that forces re-execution when it changes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint {
    pub code: String,
    pub custom_code: String,
    pub engine: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExitStatus {
    pub errors: u32,
    pub warnings: u32,
}

impl ExitStatus {
    pub fn new(errors: u32, warnings: u32) -> Self {
        Self { errors, warnings }
    }

    pub fn is_clean(&self) -> bool {
        self.errors == 0 && self.warnings == 0
    }
}

/// Freshness of one declared dependency. Tokens of different kinds never
/// compare equal, so switching modes between runs forces a rerun.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DepToken {
    Mtime(f64),
    Hash(String),
    /// Changed while the build that recorded it was running.
    Unresolved,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub fingerprint: Fingerprint,
    #[serde(default)]
    pub exit_status: Option<ExitStatus>,
    #[serde(default)]
    pub macros: Vec<String>,
    #[serde(default)]
    pub files: Vec<PathBuf>,
    #[serde(default)]
    pub dependencies: BTreeMap<String, DepToken>,
    /// Console transcripts by instance, trusted only while the fingerprint holds.
    #[serde(default)]
    pub typeset_cache: BTreeMap<u64, String>,
}

impl SessionRecord {
    pub fn new(fingerprint: Fingerprint) -> Self {
        Self {
            fingerprint,
            exit_status: None,
            macros: Vec::new(),
            files: Vec::new(),
            dependencies: BTreeMap::new(),
            typeset_cache: BTreeMap::new(),
        }
    }

    pub fn exit_status_or_clean(&self) -> ExitStatus {
        self.exit_status.unwrap_or_default()
    }
}

/// Highlighted form of one typeset artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HighlightEntry {
    Inline(String),
    File(PathBuf),
}

impl HighlightEntry {
    pub fn file(&self) -> Option<&PathBuf> {
        match self {
            Self::File(path) => Some(path),
            Self::Inline(_) => None,
        }
    }
}

/// Global settings whose change invalidates the whole store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vitals {
    pub version: String,
    pub encoding: String,
    pub gobble: GobbleMode,
    pub fvextfile: Option<usize>,
}

impl Vitals {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            version: STORE_FORMAT_VERSION.to_string(),
            encoding: settings.encoding.to_ascii_lowercase(),
            gobble: settings.gobble,
            fvextfile: settings.fvextfile,
        }
    }
}
