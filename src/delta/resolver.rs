// src/delta/resolver.rs

//! Locating a verified on-disk source for a delta
//!
//! The manifest says which logical paths should hold a given hash, but the
//! filesystem may have drifted (local edits, corruption, missing files).
//! A candidate is only accepted after its on-disk content is re-hashed and
//! found to match.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::filesystem::{ContentIdentifier, StateLayout};
use crate::hash::ContentHash;
use crate::manifest::{FileRecord, Manifest};

/// Finds installed files whose verified content matches a source hash
///
/// Records are indexed by hash once; each bucket keeps manifest order so
/// the scan over candidates for one hash is deterministic.
pub struct SourceResolver<'a> {
    layout: &'a StateLayout,
    identifier: &'a dyn ContentIdentifier,
    by_hash: HashMap<&'a ContentHash, Vec<&'a FileRecord>>,
}

impl<'a> SourceResolver<'a> {
    pub fn new(
        manifest: &'a Manifest,
        layout: &'a StateLayout,
        identifier: &'a dyn ContentIdentifier,
    ) -> Self {
        let mut by_hash: HashMap<&ContentHash, Vec<&FileRecord>> = HashMap::new();
        for record in manifest.files.iter().filter(|f| f.is_installable_content()) {
            by_hash.entry(&record.hash).or_default().push(record);
        }

        debug!(
            "Indexed {} distinct source hashes from {} manifest records",
            by_hash.len(),
            manifest.files.len()
        );

        Self {
            layout,
            identifier,
            by_hash,
        }
    }

    /// Number of manifest records claiming `hash`
    pub fn candidate_count(&self, hash: &ContentHash) -> usize {
        self.by_hash.get(hash).map_or(0, Vec::len)
    }

    /// Return the installed path of the first candidate that verifies
    ///
    /// Candidates that are missing or whose content no longer matches are
    /// logged and skipped; the scan continues with the next one.
    pub fn find_source(&self, source_hash: &ContentHash) -> Option<PathBuf> {
        let candidates = self.by_hash.get(source_hash)?;

        for record in candidates {
            let path = match self.layout.installed_path(&record.path) {
                Ok(path) => path,
                Err(e) => {
                    warn!("File \"{}\" cannot be used as a delta source: {}", record.path, e);
                    continue;
                }
            };

            match fs::symlink_metadata(&path) {
                Ok(metadata) if metadata.file_type().is_file() => {}
                Ok(metadata) => {
                    warn!(
                        "File \"{}\" is not a regular file ({:?}), skipping",
                        record.path,
                        metadata.file_type()
                    );
                    continue;
                }
                Err(e) => {
                    warn!("File \"{}\" is missing or corrupted: {}", record.path, e);
                    continue;
                }
            }

            match self.identifier.identify(&path) {
                Ok(actual) if actual == *source_hash => {
                    debug!("Delta source for {} is {}", source_hash.short(), path.display());
                    return Some(path);
                }
                Ok(actual) => {
                    warn!(
                        "File \"{}\" is missing or corrupted (hash {} expected {})",
                        record.path,
                        actual.short(),
                        source_hash.short()
                    );
                }
                Err(e) => {
                    warn!("File \"{}\" is missing or corrupted: {}", record.path, e);
                }
            }
        }

        None
    }

    /// Like [`find_source`](Self::find_source), but a miss is an error
    pub fn require_source(&self, source_hash: &ContentHash) -> Result<PathBuf> {
        self.find_source(source_hash)
            .ok_or_else(|| Error::SourceUnavailable(source_hash.to_string()))
    }
}
