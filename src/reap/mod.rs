//! Deletion of artifacts that must not be mistaken for valid cache.

use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::PathBuf;

#[derive(Debug, Default)]
pub struct ReapReport {
    pub deleted: usize,
    /// Failures other than "already gone"; reported as warnings.
    pub failures: Vec<String>,
}

/// Delete each path that exists. Missing files are not an error.
pub fn reap<'a, I>(paths: I) -> ReapReport
where
    I: IntoIterator<Item = &'a PathBuf>,
{
    let mut report = ReapReport::default();
    let unique: BTreeSet<&PathBuf> = paths.into_iter().collect();
    for path in unique {
        match std::fs::remove_file(path) {
            Ok(()) => {
                tracing::debug!("Reaped {}", path.display());
                report.deleted += 1;
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => {
                tracing::warn!("Could not remove {}: {}", path.display(), err);
                report.failures.push(format!("could not remove {}: {err}", path.display()));
            }
        }
    }
    report
}
