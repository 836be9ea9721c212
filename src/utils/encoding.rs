//! Text encoding for generated scripts and captured subprocess output.
//!
//! The configured document encoding is a store vital, so every script written
//! and every byte read back goes through the same `encoding_rs` codec.

use anyhow::{Context, Result};
use encoding_rs::{Encoding, UTF_8};
use std::path::Path;

/// Resolve an encoding label, falling back to UTF-8 for unknown labels.
pub fn resolve_encoding(label: &str) -> &'static Encoding {
    let trimmed = label.trim();
    let normalized = trimmed.strip_suffix("-sig").unwrap_or(trimmed);
    Encoding::for_label(normalized.as_bytes()).unwrap_or_else(|| {
        tracing::warn!("Unknown encoding '{}', using utf-8", label);
        UTF_8
    })
}

/// Encode text for writing. Unmappable characters become numeric entities.
pub fn encode_text(text: &str, label: &str) -> Vec<u8> {
    let (bytes, _encoding_used, _had_errors) = resolve_encoding(label).encode(text);
    bytes.into_owned()
}

/// Decode bytes, replacing invalid sequences rather than failing.
pub fn decode_bytes(bytes: &[u8], label: &str) -> String {
    let (decoded, _encoding_used, _had_errors) = resolve_encoding(label).decode(bytes);
    decoded.into_owned()
}

pub fn read_text_file(path: &Path, label: &str) -> Result<String> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read file: {}", path.display()))?;
    Ok(decode_bytes(&bytes, label))
}

pub fn write_text_file(path: &Path, text: &str, label: &str) -> Result<()> {
    std::fs::write(path, encode_text(text, label))
        .with_context(|| format!("Failed to write file: {}", path.display()))
}
