// src/delta/name.rs

//! Delta artifact names
//!
//! A delta artifact is named after the content it transforms:
//!
//! ```text
//! SRC_HASH-TGT_HASH
//! FROM_VERSION-TO_VERSION-SRC_HASH-TGT_HASH   (legacy, versions ignored)
//! ```
//!
//! Deltas are matched to files by hash only, so the legacy version tokens
//! are skipped without being interpreted.

use std::fmt;

use crate::hash::ContentHash;

/// Source and target hashes decoded from a delta artifact name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeltaName {
    pub source: ContentHash,
    pub target: ContentHash,
}

impl fmt::Display for DeltaName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.source, self.target)
    }
}

/// Decodes delta artifact names for one fixed hash length
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeltaNameCodec {
    hash_len: usize,
}

impl DeltaNameCodec {
    /// `hash_len` is the length of one hash string, e.g. 64 for SHA-256
    pub fn new(hash_len: usize) -> Self {
        Self { hash_len }
    }

    pub fn hash_len(&self) -> usize {
        self.hash_len
    }

    /// Decode `name` into its source and target hashes
    ///
    /// Returns `None` for anything that is not exactly two hashes joined by
    /// `-`, optionally preceded by two `-`-terminated version tokens.
    pub fn parse(&self, name: &str) -> Option<DeltaName> {
        let h = self.hash_len;
        let expected_len = h * 2 + 1;
        let mut rest = name;

        if rest.len() > expected_len {
            for _ in 0..2 {
                let (_, after) = rest.split_once('-')?;
                rest = after;
            }
        }

        if rest.len() != expected_len || rest.as_bytes()[h] != b'-' {
            return None;
        }

        let source = ContentHash::new(rest.get(..h)?).ok()?;
        let target = ContentHash::new(rest.get(h + 1..)?).ok()?;

        Some(DeltaName { source, target })
    }
}
