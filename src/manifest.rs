// src/manifest.rs

//! Target manifest file records
//!
//! A manifest is the declarative list of files making up the target
//! software version. It is loaded once per update cycle and is read-only
//! while deltas are applied and permissions are evaluated.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::debug;

use crate::error::Result;
use crate::hash::ContentHash;

/// Kind of filesystem entry a record describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    #[default]
    File,
    Directory,
    Symlink,
    Other,
}

/// One file entry declared by the target version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Install-relative path (e.g. "/usr/bin/foo")
    pub path: String,

    /// Hash of the desired final content
    pub hash: ContentHash,

    #[serde(default)]
    pub kind: FileKind,

    /// Removed in the target version
    #[serde(default)]
    pub deleted: bool,

    /// Tracked but never installed as content
    #[serde(default)]
    pub ghosted: bool,

    /// The file existed (with any content) in the installed version
    #[serde(default)]
    pub has_prior_version: bool,
}

impl FileRecord {
    /// Create a regular, non-deleted record with no prior version
    pub fn new(path: impl Into<String>, hash: ContentHash) -> Self {
        Self {
            path: path.into(),
            hash,
            kind: FileKind::File,
            deleted: false,
            ghosted: false,
            has_prior_version: false,
        }
    }

    /// Mark the record as an update of a previously installed file
    pub fn with_prior_version(mut self, has_prior_version: bool) -> Self {
        self.has_prior_version = has_prior_version;
        self
    }

    #[inline]
    pub fn is_regular_file(&self) -> bool {
        self.kind == FileKind::File
    }

    /// Whether this record can supply installed content for a delta
    #[inline]
    pub fn is_installable_content(&self) -> bool {
        !self.deleted && !self.ghosted && self.is_regular_file()
    }
}

/// The set of file records for one target version
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Target version number, informational only
    #[serde(default)]
    pub version: u32,

    #[serde(default)]
    pub files: Vec<FileRecord>,
}

impl Manifest {
    pub fn new(files: Vec<FileRecord>) -> Self {
        Self { version: 0, files }
    }

    /// Load a JSON manifest from disk
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let manifest: Self = serde_json::from_str(&content)?;
        debug!(
            "Loaded manifest {} (version {}, {} files)",
            path.display(),
            manifest.version,
            manifest.files.len()
        );
        Ok(manifest)
    }

    /// Records that describe content the update would install
    pub fn installable(&self) -> impl Iterator<Item = &FileRecord> {
        self.files.iter().filter(|f| !f.deleted)
    }
}
