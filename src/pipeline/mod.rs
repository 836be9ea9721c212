//! One incremental build: decide, reap, execute, merge.

use crate::deps::{is_stale, settle_changed_during_run};
use crate::domain::{CodeBlock, DepToken, ExitStatus, Settings, Vitals};
use crate::engine::EngineProvider;
use crate::error::EngineError;
use crate::exec::{ExecutionResult, ExecutionUnit, HighlightJob, Scheduler, SessionJob, UnitContext};
use crate::fingerprint::{compute_fingerprints, FingerprintSet};
use crate::highlight::{highlight_fingerprint, Highlighter};
use crate::reap::reap;
use crate::rerun::should_rerun;
use crate::store::{apply_vitals_gate, reconcile, GlobalStore};
use crate::utils::write_text_file;
use anyhow::{Context, Result};
use std::collections::{BTreeMap, BTreeSet};

mod highlights;
pub mod summary;

pub use summary::BuildSummary;

/// External capabilities a build needs.
pub struct Services<'a> {
    pub engines: &'a dyn EngineProvider,
    pub highlighter: &'a dyn Highlighter,
    /// Show a progress bar on an interactive terminal.
    pub progress: bool,
}

#[derive(Debug)]
pub struct BuildOutcome {
    pub store: GlobalStore,
    pub summary: BuildSummary,
    /// The store differs from the one passed in and should be written back.
    pub dirty: bool,
}

/// Run one build against the previous store.
///
/// Malformed blocks and families without an engine abort the build before
/// anything is deleted or executed. Every other problem is counted in the
/// summary against the session that caused it.
pub fn build(
    blocks: &[CodeBlock],
    settings: &Settings,
    services: &Services<'_>,
    previous: Option<GlobalStore>,
) -> Result<BuildOutcome> {
    let had_store = previous.is_some();
    let fingerprints = compute_fingerprints(blocks, settings, services.engines)?;

    let vitals = Vitals::from_settings(settings);
    let gate = apply_vitals_gate(previous, &vitals);
    let mut summary = BuildSummary {
        sessions: fingerprints.sessions.len(),
        invalidated: gate.invalidated,
        ..BuildSummary::default()
    };

    let decisions = decide(&gate.store, &fingerprints, settings, &mut summary);
    let reconciliation = reconcile(&gate.store, &decisions);
    let mut store = reconciliation.store;
    let rerun: BTreeSet<String> = reconciliation.rerun.iter().cloned().collect();

    let highlight_fp = highlight_fingerprint(settings, services.highlighter);
    let highlight_plan = highlights::plan_highlights(
        &mut store,
        &fingerprints,
        &rerun,
        settings,
        services.engines,
        &highlight_fp,
        &mut summary,
    );

    let doomed: BTreeSet<_> = gate
        .reap
        .iter()
        .chain(&reconciliation.reap)
        .chain(&highlight_plan.reap)
        .cloned()
        .collect();
    let report = reap(&doomed);
    summary.reaped = report.deleted;
    for failure in report.failures {
        summary.warning(failure);
    }

    let mut units: Vec<ExecutionUnit> = rerun
        .iter()
        .filter_map(|key_run| fingerprints.sessions.get(key_run))
        .map(|plan| ExecutionUnit::Session(SessionJob { plan: plan.clone() }))
        .collect();
    if !highlight_plan.requests.is_empty() {
        units.push(ExecutionUnit::Highlight(HighlightJob { requests: highlight_plan.requests }));
    }
    let dispatched = units.len();

    let ctx = UnitContext {
        settings,
        engines: services.engines,
        highlighter: services.highlighter,
        custom_code: &fingerprints.custom_code,
    };
    let mut scheduler = Scheduler::new(settings.concurrency())?;
    if !services.progress {
        scheduler = scheduler.quiet();
    }
    let results = scheduler.run(units, &ctx);
    merge_results(&mut store, results, &fingerprints, &mut summary);

    let mode = settings.dependency_mode();
    for key_run in &rerun {
        if let Some(record) = store.sessions.get_mut(key_run) {
            for warning in settle_changed_during_run(key_run, &mut record.dependencies, mode, &settings.working_dir) {
                summary.warning(warning.to_string());
            }
        }
    }

    summary.executed = rerun.len();
    summary.cached = decisions.len() - rerun.len();
    summary.removed = reconciliation.removed.len();
    summary.carried = carried_status(&store, &decisions, settings);

    let dirty = !had_store
        || gate.invalidated
        || dispatched > 0
        || !reconciliation.removed.is_empty()
        || highlight_plan.changed;

    tracing::info!(
        "Build finished: {} executed, {} cached, {} removed",
        summary.executed,
        summary.cached,
        summary.removed
    );
    Ok(BuildOutcome { store, summary, dirty })
}

fn decide(
    store: &GlobalStore,
    fingerprints: &FingerprintSet,
    settings: &Settings,
    summary: &mut BuildSummary,
) -> BTreeMap<String, bool> {
    let mode = settings.dependency_mode();
    let mut decisions = BTreeMap::new();
    for (key_run, plan) in &fingerprints.sessions {
        let old = store.get(key_run);
        let deps = old
            .map(|record| is_stale(key_run, &record.dependencies, mode, &settings.working_dir))
            .unwrap_or_default();
        let decision = should_rerun(
            &plan.fingerprint,
            old.map(|record| &record.fingerprint),
            old.and_then(|record| record.exit_status),
            settings.policy_for(&plan.family),
            deps.stale,
        );
        if decision.drift {
            summary.warning(format!("{key_run}: code or dependencies changed but rerun policy is 'never'"));
        }
        if !decision.rerun {
            // a rerun reports its own missing dependencies; an unresolved
            // token was already counted by the run that recorded it
            for missing in deps.missing {
                let counted = matches!(
                    &missing,
                    EngineError::MissingDependency { path, .. }
                        if old.and_then(|record| record.dependencies.get(path)) == Some(&DepToken::Unresolved)
                );
                if !counted {
                    summary.error(missing.to_string());
                }
            }
        }
        tracing::debug!("{}: rerun={}", key_run, decision.rerun);
        decisions.insert(key_run.clone(), decision.rerun);
    }
    decisions
}

fn merge_results(
    store: &mut GlobalStore,
    results: Vec<ExecutionResult>,
    fingerprints: &FingerprintSet,
    summary: &mut BuildSummary,
) {
    for result in results {
        summary.absorb(result.status(), result.messages());
        let highlighted = match result {
            ExecutionResult::Code(outcome) => {
                store.put(outcome.key_run, outcome.record);
                BTreeMap::new()
            }
            ExecutionResult::Console(outcome) => {
                store.put(outcome.session.key_run, outcome.session.record);
                outcome.highlights
            }
            ExecutionResult::Highlight(outcome) => outcome.entries,
        };
        summary.highlighted += highlighted.len();
        for (key, entry) in highlighted {
            if let Some(item) = fingerprints.typeset.get(&key) {
                store.typeset_hashes.insert(key.clone(), item.hash.clone());
            }
            store.highlights.insert(key, entry);
        }
    }
}

/// Issues still attached to sessions that were not rerun.
fn carried_status(store: &GlobalStore, decisions: &BTreeMap<String, bool>, settings: &Settings) -> ExitStatus {
    let mut carried = ExitStatus::default();
    for (key_run, _) in decisions.iter().filter(|(_, rerun)| !**rerun) {
        let Some(record) = store.get(key_run) else { continue };
        let family = key_run.split('#').next().unwrap_or_default();
        if settings.policy_for(family).is_conservative() {
            let status = record.exit_status_or_clean();
            carried.errors += status.errors;
            carried.warnings += status.warnings;
        }
    }
    carried
}

/// Write a dirty build's store and macro file; clean builds touch nothing.
pub fn persist(outcome: &mut BuildOutcome, settings: &Settings) -> Result<bool> {
    if !outcome.dirty {
        tracing::debug!("Nothing changed; store left as is");
        return Ok(false);
    }
    outcome.store.updated_at = Some(chrono::Utc::now().to_rfc3339());
    outcome.store.save(&settings.store_path())?;

    let mut macros = String::new();
    for record in outcome.store.sessions.values() {
        for fragment in &record.macros {
            macros.push_str(fragment);
            macros.push('\n');
        }
    }
    let macros_path = settings.macros_path();
    write_text_file(&macros_path, &macros, &settings.encoding)
        .with_context(|| format!("Failed writing macros to {}", macros_path.display()))?;
    Ok(true)
}
