//! Content hashing for swagger version detection and cache keys.
//!
//! Swagger hashes are computed over the raw pre-parse bytes so that two
//! fetches of the same document always agree, regardless of how the document
//! later normalizes. Code hashes are computed over whitespace-normalized
//! source so trivial formatting differences stay cache-identical.

use sha2::{Digest, Sha256};

/// Compute the SHA-256 hash of raw content as a lowercase hex string.
#[must_use]
pub fn hash_content(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}

/// Hash source code for cache-key generation.
///
/// Normalizes the code first: blank lines are dropped and every remaining
/// line is right-trimmed, so whitespace-only edits map to the same entry.
#[must_use]
pub fn hash_code(code: &str) -> String {
    let normalized: Vec<&str> = code
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(str::trim_end)
        .collect();
    hash_content(normalized.join("\n").as_bytes())
}

/// Combine multiple hashes into a single composite hash.
///
/// Inputs are sorted before joining so the result is order-independent.
#[must_use]
pub fn combine_hashes(hashes: &[String]) -> String {
    let mut sorted: Vec<&str> = hashes.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    hash_content(sorted.join("|").as_bytes())
}
