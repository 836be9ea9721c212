//! Persisted state carried from one build to the next.

use crate::domain::{HighlightEntry, SessionRecord, Vitals};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

pub mod reconcile;

pub use reconcile::{apply_vitals_gate, reconcile, Reconciliation, VitalsGate};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalStore {
    pub vitals: Vitals,
    #[serde(default)]
    pub sessions: BTreeMap<String, SessionRecord>,
    #[serde(default)]
    pub typeset_hashes: BTreeMap<String, String>,
    #[serde(default)]
    pub highlights: BTreeMap<String, HighlightEntry>,
    #[serde(default)]
    pub highlight_fingerprint: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl GlobalStore {
    pub fn new(vitals: Vitals) -> Self {
        Self {
            vitals,
            sessions: BTreeMap::new(),
            typeset_hashes: BTreeMap::new(),
            highlights: BTreeMap::new(),
            highlight_fingerprint: None,
            updated_at: None,
        }
    }

    pub fn get(&self, key_run: &str) -> Option<&SessionRecord> {
        self.sessions.get(key_run)
    }

    /// Insert or replace; putting the same record twice is a no-op.
    pub fn put(&mut self, key_run: impl Into<String>, record: SessionRecord) {
        self.sessions.insert(key_run.into(), record);
    }

    pub fn remove(&mut self, key_run: &str) -> Option<SessionRecord> {
        self.sessions.remove(key_run)
    }

    /// Every artifact path referenced anywhere in the store.
    pub fn all_files(&self) -> BTreeSet<PathBuf> {
        let mut files: BTreeSet<PathBuf> =
            self.sessions.values().flat_map(|record| record.files.iter().cloned()).collect();
        files.extend(self.highlights.values().filter_map(HighlightEntry::file).cloned());
        files
    }

    /// Load a store; a missing or unreadable file yields `None`.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("Failed reading store: {}", path.display()))
            }
        };
        match serde_json::from_slice::<Self>(&bytes) {
            Ok(store) => Ok(Some(store)),
            Err(err) => {
                let stale = crate::error::EngineError::StaleStoreFormat(err.to_string());
                tracing::warn!("Discarding store {}: {}", path.display(), stale);
                Ok(None)
            }
        }
    }

    /// Write the store atomically: temp file in the same directory, then rename.
    pub fn save(&self, path: &Path) -> Result<()> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed creating store directory: {}", dir.display()))?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir)
            .with_context(|| format!("Failed creating temp file in {}", dir.display()))?;
        let payload = serde_json::to_vec_pretty(self)?;
        tmp.write_all(&payload)?;
        tmp.flush()?;
        tmp.persist(path)
            .map_err(|err| err.error)
            .with_context(|| format!("Failed replacing store: {}", path.display()))?;
        tracing::debug!("Store written to {}", path.display());
        Ok(())
    }
}
