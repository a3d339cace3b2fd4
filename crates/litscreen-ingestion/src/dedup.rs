//! Duplicate detection for corpus documents.
//!
//! Web crawls repeat pages across shards. A document is a content duplicate
//! when its normalised text hashes to a fingerprint already seen in the run;
//! an identifier duplicate when another document already claimed its id.

use sha2::{Digest, Sha256};
use std::collections::HashSet;

/// Result of a deduplication check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sighting {
    /// First time this document is seen; process it.
    New,
    /// Same normalised text as an earlier document.
    DuplicateContent,
    /// Different text, but the identifier is already taken.
    DuplicateIdentifier,
}

/// SHA-256 of normalised text, hex encoded.
pub fn fingerprint(normalised_text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalised_text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Fingerprints and identifiers seen so far in one filter run.
#[derive(Debug, Default)]
pub struct SeenDocuments {
    fingerprints: HashSet<String>,
    identifiers: HashSet<String>,
}

impl SeenDocuments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a document and report whether it was new. With
    /// `check_content` off only identifier clashes are reported.
    pub fn observe(&mut self, identifier: &str, normalised_text: &str, check_content: bool) -> Sighting {
        if self.identifiers.contains(identifier) {
            return Sighting::DuplicateIdentifier;
        }
        if check_content && !self.fingerprints.insert(fingerprint(normalised_text)) {
            return Sighting::DuplicateContent;
        }
        self.identifiers.insert(identifier.to_string());
        Sighting::New
    }
}
