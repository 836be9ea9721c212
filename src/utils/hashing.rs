//! Stable hashing for fingerprints and dependency tokens

use serde::Serialize;
use sha2::{Digest, Sha256};

pub fn sha256_hex(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}

/// Hash of a value's JSON form. Maps must be ordered for this to be stable.
pub fn json_hash<T: Serialize>(value: &T) -> String {
    sha256_hex(&serde_json::to_vec(value).unwrap_or_default())
}

/// Incremental SHA-256 over a sequence of fields.
///
/// Every field is length-prefixed, so `("ab", "c")` and `("a", "bc")` differ.
#[derive(Clone, Default)]
pub struct FieldHasher {
    inner: Sha256,
}

impl FieldHasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(&mut self, value: &str) -> &mut Self {
        self.inner.update((value.len() as u64).to_le_bytes());
        self.inner.update(value.as_bytes());
        self
    }

    pub fn fields(&mut self, values: &[&str]) -> &mut Self {
        for value in values {
            self.field(value);
        }
        self
    }

    pub fn hex_digest(&self) -> String {
        format!("{:x}", self.inner.clone().finalize())
    }
}
