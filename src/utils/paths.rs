//! Path normalization

use std::path::{Path, PathBuf};

pub fn normalize_path(path: &str) -> String {
    // Convert backslashes to forward slashes and normalize
    path.replace('\\', "/")
}

/// Resolve a declared path against a base directory unless it is absolute.
pub fn resolve_in(base: &Path, declared: &str) -> PathBuf {
    let normalized = PathBuf::from(normalize_path(declared));
    if normalized.is_absolute() {
        normalized
    } else {
        base.join(normalized)
    }
}

/// Turn a session key into a safe file-name stem.
///
/// `#` separators become `_`; every other byte outside `[A-Za-z0-9.-]`,
/// `_` and `%` included, is written as `%XX`. Distinct keys therefore never
/// share a stem.
pub fn file_stem_for_key(key: &str) -> String {
    let mut stem = String::with_capacity(key.len());
    for byte in key.bytes() {
        match byte {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'.' => stem.push(char::from(byte)),
            b'#' => stem.push('_'),
            _ => stem.push_str(&format!("%{byte:02X}")),
        }
    }
    stem
}
