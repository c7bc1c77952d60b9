//! Stable content and metadata fingerprints.
//!
//! A fingerprint is the lowercase hex SHA-256 of some canonical input. The
//! content fingerprint covers document text; the metadata fingerprint covers
//! a flattened, case-folded, sorted rendering of the attribute mapping so
//! that attribute order and letter case do not matter.

use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::extract::Attributes;

pub fn hash_bytes(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

pub fn content_hash(text: &str) -> String {
    hash_bytes(text.as_bytes())
}

/// Fingerprint of a file's raw bytes.
pub fn file_hash(path: &Path) -> Result<String> {
    Ok(hash_bytes(&std::fs::read(path)?))
}

/// Every key and every value is lowercased and collected into one list
/// (without key/value grouping), which is sorted and joined with single
/// spaces before hashing.
pub fn metadata_hash(attrs: &Attributes) -> String {
    let mut tokens: Vec<String> = attrs.iter()
        .flat_map(|(key, values)| std::iter::once(key).chain(values))
        .map(|token| token.to_lowercase())
        .collect();

    tokens.sort_unstable();
    content_hash(&tokens.join(" "))
}
