//! Content fingerprints for idempotent extraction.
//!
//! Normalization lowercases, collapses every run of whitespace or
//! punctuation into a single space, trims, and keeps a fixed-length prefix.
//! Small phrasing drift between model runs ("File the brief." vs
//! "file  the brief") therefore hashes identically.

use std::sync::LazyLock;

use regex::Regex;
use sha2::{Digest, Sha256};

use super::model::CandidateExtraction;

static SEPARATOR_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\p{L}\p{N}]+").expect("separator pattern is valid"));

/// Normalize free text for hashing.
pub fn normalize_text(text: &str, prefix_chars: usize) -> String {
    let lowered = text.to_lowercase();
    let collapsed = SEPARATOR_RUNS.replace_all(&lowered, " ");
    collapsed.trim().chars().take(prefix_chars).collect::<String>().trim_end().to_string()
}

/// Hex SHA-256 over `(thread, source message, variant, normalized text)`.
pub fn fingerprint(
    thread_id: &str,
    source_message_id: &str,
    kind: &str,
    text: &str,
    prefix_chars: usize,
) -> String {
    let normalized = normalize_text(text, prefix_chars);
    let mut hasher = Sha256::new();
    // Unit separators keep adjacent fields from running together.
    for part in [thread_id, source_message_id, kind, normalized.as_str()] {
        hasher.update(part.as_bytes());
        hasher.update([0x1f]);
    }
    hex::encode(hasher.finalize())
}

/// Fingerprint a validated candidate for `thread_id`.
pub fn candidate_fingerprint(
    thread_id: &str,
    candidate: &CandidateExtraction,
    prefix_chars: usize,
) -> String {
    fingerprint(
        thread_id,
        &candidate.source_message_id,
        candidate.payload.kind().as_str(),
        &candidate.payload.fingerprint_text(),
        prefix_chars,
    )
}
