//! Shared helpers

pub mod encoding;
pub mod hashing;
pub mod paths;

pub use encoding::{decode_bytes, encode_text, read_text_file, write_text_file};
pub use hashing::{json_hash, sha256_hex, FieldHasher};
pub use paths::{file_stem_for_key, normalize_path, resolve_in};
