//! Carry unchanged sessions forward and collect artifacts to reap.

use super::GlobalStore;
use crate::domain::Vitals;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

/// Result of comparing the stored vitals with this run's.
#[derive(Debug)]
pub struct VitalsGate {
    pub store: GlobalStore,
    pub reap: BTreeSet<PathBuf>,
    pub invalidated: bool,
}

/// Discard the entire old store when the vitals differ.
///
/// Every file the discarded store referenced is marked for deletion.
pub fn apply_vitals_gate(old: Option<GlobalStore>, vitals: &Vitals) -> VitalsGate {
    match old {
        None => VitalsGate { store: GlobalStore::new(vitals.clone()), reap: BTreeSet::new(), invalidated: false },
        Some(store) if store.vitals == *vitals => {
            VitalsGate { store, reap: BTreeSet::new(), invalidated: false }
        }
        Some(store) => {
            tracing::info!(
                "Store vitals changed ({:?} -> {:?}); invalidating every session",
                store.vitals,
                vitals
            );
            VitalsGate {
                reap: store.all_files(),
                store: GlobalStore::new(vitals.clone()),
                invalidated: true,
            }
        }
    }
}

#[derive(Debug)]
pub struct Reconciliation {
    /// New store holding only the carried-forward sessions.
    pub store: GlobalStore,
    pub reap: BTreeSet<PathBuf>,
    pub rerun: Vec<String>,
    pub removed: Vec<String>,
}

/// Split the old store by this build's decisions.
///
/// `decisions` holds every session present in the document. Sessions that
/// will not rerun are copied forward unchanged; sessions that rerun have
/// their files marked and their record left for the scheduler to fill;
/// sessions absent from the document are dropped and their files marked.
pub fn reconcile(old: &GlobalStore, decisions: &BTreeMap<String, bool>) -> Reconciliation {
    let mut store = old.clone();
    let mut reap = BTreeSet::new();
    let mut rerun = Vec::new();
    let mut removed = Vec::new();

    for (key_run, must_run) in decisions {
        if !*must_run {
            continue;
        }
        rerun.push(key_run.clone());
        if let Some(record) = store.remove(key_run) {
            reap.extend(record.files);
        }
    }

    let gone: Vec<String> =
        old.sessions.keys().filter(|key_run| !decisions.contains_key(*key_run)).cloned().collect();
    for key_run in gone {
        if let Some(record) = store.remove(&key_run) {
            tracing::debug!("Session {} no longer in the document", key_run);
            reap.extend(record.files);
            removed.push(key_run);
        }
    }

    Reconciliation { store, reap, rerun, removed }
}
