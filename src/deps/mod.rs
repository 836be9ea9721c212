//! Freshness tracking for files a session declares it depends on.

use crate::domain::{DepToken, DependencyMode};
use crate::error::EngineError;
use crate::utils::{resolve_in, sha256_hex};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::UNIX_EPOCH;

/// Outcome of checking one session's recorded dependencies.
#[derive(Debug, Default)]
pub struct DependencyCheck {
    pub stale: bool,
    pub missing: Vec<EngineError>,
}

/// Current token for a dependency, or `None` when the file is gone.
pub fn freshness_token(path: &Path, mode: DependencyMode) -> Option<DepToken> {
    match mode {
        DependencyMode::Mtime => {
            let modified = fs::metadata(path).ok()?.modified().ok()?;
            let secs = modified.duration_since(UNIX_EPOCH).ok()?.as_secs_f64();
            Some(DepToken::Mtime(secs))
        }
        DependencyMode::Hash => fs::read(path).ok().map(|bytes| DepToken::Hash(sha256_hex(&bytes))),
    }
}

/// Compare stored tokens with the files on disk.
///
/// A missing file is reported but does not make the session stale: rerunning
/// cannot bring it back.
pub fn is_stale(
    session_key: &str,
    stored: &BTreeMap<String, DepToken>,
    mode: DependencyMode,
    working_dir: &Path,
) -> DependencyCheck {
    let mut check = DependencyCheck::default();
    for (declared, token) in stored {
        let path = resolve_in(working_dir, declared);
        match freshness_token(&path, mode) {
            None => {
                tracing::warn!("{}: dependency {} is missing", session_key, path.display());
                check.missing.push(EngineError::MissingDependency {
                    session: session_key.to_string(),
                    path: declared.clone(),
                });
            }
            Some(fresh) if &fresh != token => {
                tracing::debug!("{}: dependency {} changed", session_key, declared);
                check.stale = true;
            }
            Some(_) => {}
        }
    }
    check
}

/// Token to record for each declared path right after a session ran.
///
/// Missing paths are recorded as `Unresolved` so the session reruns once they
/// appear.
pub fn record_tokens(
    session_key: &str,
    declared: &[String],
    mode: DependencyMode,
    working_dir: &Path,
) -> (BTreeMap<String, DepToken>, Vec<EngineError>) {
    let mut tokens = BTreeMap::new();
    let mut missing = Vec::new();
    for path in declared {
        match freshness_token(&resolve_in(working_dir, path), mode) {
            Some(token) => {
                tokens.insert(path.clone(), token);
            }
            None => {
                missing.push(EngineError::MissingDependency {
                    session: session_key.to_string(),
                    path: path.clone(),
                });
                tokens.insert(path.clone(), DepToken::Unresolved);
            }
        }
    }
    (tokens, missing)
}

/// Reset tokens that no longer match the file after the whole build finished.
///
/// Returns one warning per dependency that changed while the build ran; those
/// tokens become `Unresolved` so the next build reruns the session.
pub fn settle_changed_during_run(
    session_key: &str,
    recorded: &mut BTreeMap<String, DepToken>,
    mode: DependencyMode,
    working_dir: &Path,
) -> Vec<EngineError> {
    let mut warnings = Vec::new();
    for (declared, token) in recorded.iter_mut() {
        if *token == DepToken::Unresolved {
            continue;
        }
        let fresh = freshness_token(&resolve_in(working_dir, declared), mode);
        if fresh.as_ref() != Some(&*token) {
            *token = DepToken::Unresolved;
            warnings.push(EngineError::UnresolvedDependency {
                session: session_key.to_string(),
                path: declared.clone(),
            });
        }
    }
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn tokens_for(dir: &Path, name: &str, mode: DependencyMode) -> BTreeMap<String, DepToken> {
        let token = freshness_token(&dir.join(name), mode).expect("token");
        BTreeMap::from([(name.to_string(), token)])
    }

    #[test]
    fn unchanged_file_is_fresh() {
        let tmp = TempDir::new().expect("tmp");
        fs::write(tmp.path().join("data.csv"), "1,2\n").expect("write");
        let stored = tokens_for(tmp.path(), "data.csv", DependencyMode::Hash);
        let check = is_stale("python#main#default", &stored, DependencyMode::Hash, tmp.path());
        assert!(!check.stale);
        assert!(check.missing.is_empty());
    }

    #[test]
    fn content_change_is_stale_in_hash_mode() {
        let tmp = TempDir::new().expect("tmp");
        fs::write(tmp.path().join("data.csv"), "1,2\n").expect("write");
        let stored = tokens_for(tmp.path(), "data.csv", DependencyMode::Hash);
        fs::write(tmp.path().join("data.csv"), "3,4\n").expect("rewrite");
        assert!(is_stale("k", &stored, DependencyMode::Hash, tmp.path()).stale);
    }

    #[test]
    fn missing_file_is_reported_but_not_stale() {
        let tmp = TempDir::new().expect("tmp");
        let stored = BTreeMap::from([("gone.csv".to_string(), DepToken::Hash("abc".to_string()))]);
        let check = is_stale("k", &stored, DependencyMode::Hash, tmp.path());
        assert!(!check.stale);
        assert_eq!(check.missing.len(), 1);
    }

    #[test]
    fn mode_switch_forces_staleness() {
        let tmp = TempDir::new().expect("tmp");
        fs::write(tmp.path().join("data.csv"), "1\n").expect("write");
        let stored = tokens_for(tmp.path(), "data.csv", DependencyMode::Mtime);
        assert!(is_stale("k", &stored, DependencyMode::Hash, tmp.path()).stale);
    }

    #[test]
    fn unresolved_token_is_always_stale() {
        let tmp = TempDir::new().expect("tmp");
        fs::write(tmp.path().join("data.csv"), "1\n").expect("write");
        let stored = BTreeMap::from([("data.csv".to_string(), DepToken::Unresolved)]);
        assert!(is_stale("k", &stored, DependencyMode::Mtime, tmp.path()).stale);
    }

    #[test]
    fn change_during_run_becomes_unresolved() {
        let tmp = TempDir::new().expect("tmp");
        fs::write(tmp.path().join("data.csv"), "1\n").expect("write");
        let mut recorded = tokens_for(tmp.path(), "data.csv", DependencyMode::Hash);
        fs::write(tmp.path().join("data.csv"), "2\n").expect("rewrite");

        let warnings =
            settle_changed_during_run("k", &mut recorded, DependencyMode::Hash, tmp.path());
        assert_eq!(warnings.len(), 1);
        assert_eq!(recorded["data.csv"], DepToken::Unresolved);
    }
}
