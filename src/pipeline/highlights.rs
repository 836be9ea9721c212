//! Decide which typeset artifacts need (re)highlighting.

use super::summary::BuildSummary;
use crate::domain::{HighlightEntry, Settings};
use crate::engine::EngineProvider;
use crate::fingerprint::{FingerprintSet, TypesetItem};
use crate::highlight::{resolve_lexer, HighlightRequest, HighlightSource};
use crate::store::GlobalStore;
use crate::utils::resolve_in;
use std::collections::BTreeSet;
use std::path::PathBuf;

#[derive(Debug, Default)]
pub(crate) struct HighlightPlan {
    pub requests: Vec<HighlightRequest>,
    pub reap: BTreeSet<PathBuf>,
    /// Entries were removed or the configuration changed.
    pub changed: bool,
}

fn drop_entry(store: &mut GlobalStore, key: &str, reap: &mut BTreeSet<PathBuf>) {
    store.typeset_hashes.remove(key);
    if let Some(HighlightEntry::File(path)) = store.highlights.remove(key) {
        reap.insert(path);
    }
}

fn lexer_for(item: &TypesetItem, settings: &Settings, engines: &dyn EngineProvider) -> String {
    let language = item
        .block
        .highlight_lexer()
        .map(str::to_string)
        .or_else(|| engines.template(&item.block.family).ok().map(|t| t.language.clone()))
        .unwrap_or_else(|| "text".to_string());
    resolve_lexer(settings, &item.block.family, &language)
}

/// Update `store` in place and return the highlighting work left to do.
///
/// Console transcripts of rerun sessions are highlighted by their own unit.
/// Transcripts of sessions that did not rerun come from the stored
/// `typeset_cache`, and only when the stored fingerprint matches the current
/// one; otherwise the previous highlight is kept and its hash left alone.
pub(crate) fn plan_highlights(
    store: &mut GlobalStore,
    fingerprints: &FingerprintSet,
    rerun: &BTreeSet<String>,
    settings: &Settings,
    engines: &dyn EngineProvider,
    highlight_fingerprint: &str,
    summary: &mut BuildSummary,
) -> HighlightPlan {
    let mut plan = HighlightPlan::default();

    if !settings.highlight.enabled {
        plan.changed = !store.highlights.is_empty() || store.highlight_fingerprint.is_some();
        plan.reap.extend(store.highlights.values().filter_map(HighlightEntry::file).cloned());
        store.highlights.clear();
        store.typeset_hashes.clear();
        store.highlight_fingerprint = None;
        return plan;
    }

    let config_changed = store.highlight_fingerprint.as_deref() != Some(highlight_fingerprint);
    if config_changed {
        tracing::debug!("Highlighting configuration changed; every entry is stale");
        plan.changed = true;
        store.highlight_fingerprint = Some(highlight_fingerprint.to_string());
    }

    let vanished: BTreeSet<String> = store
        .typeset_hashes
        .keys()
        .chain(store.highlights.keys())
        .filter(|key| !fingerprints.typeset.contains_key(*key))
        .cloned()
        .collect();
    for key in &vanished {
        drop_entry(store, key, &mut plan.reap);
        plan.changed = true;
    }

    for (key, item) in &fingerprints.typeset {
        let session = fingerprints.sessions.get(&item.key_run);
        let engine_console = engines.template(&item.block.family).map(|t| t.console).unwrap_or(false);
        let is_transcript = session.is_some() && (item.block.is_cons() || engine_console);
        let up_to_date = !config_changed
            && store.typeset_hashes.get(key) == Some(&item.hash)
            && store.highlights.contains_key(key);

        if is_transcript && rerun.contains(&item.key_run) {
            drop_entry(store, key, &mut plan.reap);
            continue;
        }
        if up_to_date {
            continue;
        }

        let source = if is_transcript {
            let instance = item.block.instance_index().unwrap_or_default();
            let cached = store
                .get(&item.key_run)
                .filter(|record| session.is_some_and(|current| current.fingerprint == record.fingerprint))
                .and_then(|record| record.typeset_cache.get(&instance))
                .cloned();
            match cached {
                Some(transcript) => HighlightSource::Transcript(transcript),
                None => {
                    summary.warning(format!(
                        "{key}: console transcript is out of date; keeping the previous output"
                    ));
                    continue;
                }
            }
        } else {
            match item.block.external_path() {
                Some(path) => HighlightSource::External(resolve_in(&settings.working_dir, path)),
                None => HighlightSource::Code(item.block.gobbled_code(settings.gobble).into_owned()),
            }
        };

        drop_entry(store, key, &mut plan.reap);
        plan.requests.push(HighlightRequest {
            key_typeset: key.clone(),
            lexer: lexer_for(item, settings, engines),
            source,
        });
    }

    plan
}
