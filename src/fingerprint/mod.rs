//! Session and typeset fingerprints.
//!
//! A session fingerprint is a pure function of the retained blocks'
//! `(key_typeset, command, context, args_run, code)` in document order, the
//! family's custom code and the family's engine template. Source line numbers
//! and pretty-print arguments never reach it; pretty-print arguments only
//! feed the per-instance typeset hash.

use crate::domain::{CodeBlock, CustomCodePosition, Fingerprint, Settings};
use crate::engine::{CustomCode, EngineProvider};
use crate::error::EngineResult;
use crate::utils::{resolve_in, sha256_hex, FieldHasher};
use std::collections::{BTreeMap, HashMap};

/// Everything the rest of the build needs to know about one session.
#[derive(Debug, Clone)]
pub struct SessionPlan {
    pub key_run: String,
    pub family: String,
    pub console: bool,
    pub fingerprint: Fingerprint,
    /// Retained executable blocks in document order.
    pub blocks: Vec<CodeBlock>,
}

/// A block whose code is displayed, with its presentation hash.
#[derive(Debug, Clone)]
pub struct TypesetItem {
    pub key_run: String,
    pub hash: String,
    pub block: CodeBlock,
}

#[derive(Debug, Clone, Default)]
pub struct FingerprintSet {
    pub sessions: BTreeMap<String, SessionPlan>,
    pub typeset: BTreeMap<String, TypesetItem>,
    pub custom_code: BTreeMap<String, CustomCode>,
}

impl FingerprintSet {
    pub fn typeset_hashes(&self) -> BTreeMap<String, String> {
        self.typeset.iter().map(|(key, item)| (key.clone(), item.hash.clone())).collect()
    }
}

/// Drop superseded duplicates, keeping document order.
///
/// Per `key_run`, a strictly higher instance advances the session; an instance
/// equal to the highest seen so far is a reprocessed copy and replaces the
/// earlier one; a lower instance is stale and skipped.
pub fn retain_latest_instances(blocks: &[CodeBlock]) -> EngineResult<Vec<&CodeBlock>> {
    let mut slots: Vec<Option<&CodeBlock>> = Vec::with_capacity(blocks.len());
    let mut latest: HashMap<String, (u64, usize)> = HashMap::new();

    for block in blocks {
        block.validate()?;
        let instance = block.instance_index()?;
        let key_run = block.key_run();
        match latest.get(&key_run).copied() {
            Some((max, _)) if instance < max => {
                tracing::debug!("Skipping stale instance {} of {}", instance, key_run);
            }
            Some((max, slot)) if instance == max => {
                slots[slot] = None;
                latest.insert(key_run, (instance, slots.len()));
                slots.push(Some(block));
            }
            _ => {
                latest.insert(key_run, (instance, slots.len()));
                slots.push(Some(block));
            }
        }
    }

    Ok(slots.into_iter().flatten().collect())
}

struct SessionAccumulator {
    family: String,
    console: bool,
    hasher: FieldHasher,
    blocks: Vec<CodeBlock>,
}

fn feed_delimiters(hasher: &mut FieldHasher, block: &CodeBlock, key_typeset: &str) {
    hasher.fields(&[key_typeset, &block.command, &block.context, &block.args_run]);
}

pub fn compute_fingerprints(
    blocks: &[CodeBlock],
    settings: &Settings,
    engines: &dyn EngineProvider,
) -> EngineResult<FingerprintSet> {
    let retained = retain_latest_instances(blocks)?;

    let mut sessions: BTreeMap<String, SessionAccumulator> = BTreeMap::new();
    let mut cc_hashes: BTreeMap<String, FieldHasher> = BTreeMap::new();
    let mut custom_code: BTreeMap<String, CustomCode> = BTreeMap::new();
    let mut typeset: BTreeMap<String, (String, FieldHasher, CodeBlock)> = BTreeMap::new();

    for block in retained {
        let key_typeset = block.key_typeset();
        let code = block.gobbled_code(settings.gobble);

        if block.is_code() || block.is_cons() {
            let acc = sessions.entry(block.key_run()).or_insert_with(|| SessionAccumulator {
                family: block.family.clone(),
                console: false,
                hasher: FieldHasher::new(),
                blocks: Vec::new(),
            });
            feed_delimiters(&mut acc.hasher, block, &key_typeset);
            acc.hasher.field(&code);
            acc.console |= block.is_cons();
            acc.blocks.push(block.clone());

            if block.is_typeset() {
                let entry = typeset_entry(&mut typeset, block, &key_typeset);
                feed_delimiters(entry, block, &key_typeset);
                entry.fields(&[&code, &block.args_prettyprint]);
            }
        } else if let Some((family, position)) = block.custom_code_target() {
            let hasher = cc_hashes.entry(family.to_string()).or_default();
            feed_delimiters(hasher, block, &key_typeset);
            hasher.field(&code);
            let cc = custom_code.entry(family.to_string()).or_default();
            match position {
                CustomCodePosition::Begin => cc.begin.push(block.clone()),
                CustomCodePosition::End => cc.end.push(block.clone()),
            }
        } else {
            let entry = typeset_entry(&mut typeset, block, &key_typeset);
            feed_delimiters(entry, block, &key_typeset);
            entry.fields(&[&code, &block.args_prettyprint]);
            if let Some(path) = block.external_path() {
                entry.field(&external_source_hash(settings, path));
            }
        }
    }

    let empty_cc = FieldHasher::new().hex_digest();
    let mut plans = BTreeMap::new();
    for (key_run, acc) in sessions {
        let template = engines.template(&acc.family)?;
        let fingerprint = Fingerprint {
            code: acc.hasher.hex_digest(),
            custom_code: cc_hashes
                .get(&acc.family)
                .map(FieldHasher::hex_digest)
                .unwrap_or_else(|| empty_cc.clone()),
            engine: engines.engine_hash(&acc.family)?,
        };
        plans.insert(
            key_run.clone(),
            SessionPlan {
                key_run,
                family: acc.family,
                console: acc.console || template.console,
                fingerprint,
                blocks: acc.blocks,
            },
        );
    }

    let typeset = typeset
        .into_iter()
        .map(|(key, (key_run, hasher, block))| {
            (key, TypesetItem { key_run, hash: hasher.hex_digest(), block })
        })
        .collect();

    Ok(FingerprintSet { sessions: plans, typeset, custom_code })
}

fn typeset_entry<'a>(
    typeset: &'a mut BTreeMap<String, (String, FieldHasher, CodeBlock)>,
    block: &CodeBlock,
    key_typeset: &str,
) -> &'a mut FieldHasher {
    &mut typeset
        .entry(key_typeset.to_string())
        .or_insert_with(|| (block.key_run(), FieldHasher::new(), block.clone()))
        .1
}

fn external_source_hash(settings: &Settings, declared: &str) -> String {
    let path = resolve_in(&settings.working_dir, declared);
    match std::fs::read(&path) {
        Ok(bytes) => sha256_hex(&bytes),
        Err(_) => "missing".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::block::block;
    use crate::engine::EngineRegistry;

    fn fingerprints(blocks: &[CodeBlock]) -> FingerprintSet {
        compute_fingerprints(blocks, &Settings::default(), &EngineRegistry::with_builtins())
            .expect("fingerprints")
    }

    fn code_hash(blocks: &[CodeBlock]) -> String {
        fingerprints(blocks).sessions["python#main#default"].fingerprint.code.clone()
    }

    #[test]
    fn line_numbers_do_not_affect_the_hash() {
        let a = block("python", "main", 0, "code", "x = 1");
        let mut b = a.clone();
        b.line = 99;
        assert_eq!(code_hash(&[a]), code_hash(&[b]));
    }

    #[test]
    fn execution_fields_change_the_hash() {
        let base = block("python", "main", 0, "code", "x = 1");
        let baseline = code_hash(&[base.clone()]);

        let mut code = base.clone();
        code.code = "x = 2".to_string();
        let mut args = base.clone();
        args.args_run = "--fast".to_string();
        let mut command = base.clone();
        command.command = "block".to_string();
        let mut context = base.clone();
        context.context = "textwidth=5in".to_string();

        for changed in [code, args, command, context] {
            assert_ne!(baseline, code_hash(&[changed]));
        }
    }

    #[test]
    fn prettyprint_args_only_touch_the_typeset_hash() {
        let a = block("python", "main", 0, "block", "x = 1");
        let mut b = a.clone();
        b.args_prettyprint = "linenos".to_string();
        let fa = fingerprints(&[a]);
        let fb = fingerprints(&[b]);
        let key = "python#main#default";
        assert_eq!(fa.sessions[key].fingerprint, fb.sessions[key].fingerprint);
        assert_ne!(fa.typeset[&format!("{key}#0")].hash, fb.typeset[&format!("{key}#0")].hash);
    }

    #[test]
    fn duplicate_instance_keeps_the_later_copy() {
        let blocks = vec![
            block("python", "main", 0, "code", "a"),
            block("python", "main", 1, "code", "first"),
            block("python", "main", 1, "code", "second"),
            block("python", "main", 2, "code", "c"),
        ];
        let plan = &fingerprints(&blocks).sessions["python#main#default"];
        let codes: Vec<_> = plan.blocks.iter().map(|b| b.code.as_str()).collect();
        assert_eq!(codes, vec!["a", "second", "c"]);

        let deduped = vec![blocks[0].clone(), blocks[2].clone(), blocks[3].clone()];
        assert_eq!(code_hash(&blocks), code_hash(&deduped));
    }

    #[test]
    fn instance_counters_are_per_session() {
        let blocks = vec![
            block("python", "a", 5, "code", "x"),
            block("python", "b", 0, "code", "y"),
            block("python", "a", 3, "code", "stale"),
        ];
        let set = fingerprints(&blocks);
        assert_eq!(set.sessions["python#a#default"].blocks.len(), 1);
        assert_eq!(set.sessions["python#b#default"].blocks.len(), 1);
    }

    #[test]
    fn custom_code_change_touches_every_session_of_the_family() {
        let session_a = block("python", "a", 0, "code", "x");
        let session_b = block("python", "b", 0, "code", "y");
        let ruby = block("ruby", "a", 0, "code", "z");
        let cc1 = block("CC:python:begin", "a", 0, "code", "import math");
        let mut cc2 = cc1.clone();
        cc2.code = "import os".to_string();

        let before = fingerprints(&[cc1, session_a.clone(), session_b.clone(), ruby.clone()]);
        let after = fingerprints(&[cc2, session_a, session_b, ruby]);
        for key in ["python#a#default", "python#b#default"] {
            assert_eq!(before.sessions[key].fingerprint.code, after.sessions[key].fingerprint.code);
            assert_ne!(before.sessions[key].fingerprint, after.sessions[key].fingerprint);
        }
        assert_eq!(
            before.sessions["ruby#a#default"].fingerprint,
            after.sessions["ruby#a#default"].fingerprint
        );
        assert_eq!(after.custom_code["python"].begin.len(), 1);
    }

    #[test]
    fn console_sessions_are_flagged() {
        let set = fingerprints(&[block("pycon", "main", 0, "console", "1 + 1")]);
        assert!(set.sessions["pycon#main#default"].console);
        assert!(set.typeset.contains_key("pycon#main#default#0"));
    }

    #[test]
    fn highlight_only_blocks_have_no_session() {
        let set = fingerprints(&[block("PYGrust", "main", 0, "verb", "fn main() {}")]);
        assert!(set.sessions.is_empty());
        assert!(set.typeset.contains_key("PYGrust#main#default#0"));
    }

    #[test]
    fn unknown_family_aborts() {
        let result = compute_fingerprints(
            &[block("cobol", "main", 0, "code", "DISPLAY 'X'.")],
            &Settings::default(),
            &EngineRegistry::with_builtins(),
        );
        assert!(result.is_err());
    }
}
