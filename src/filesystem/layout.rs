// src/filesystem/layout.rs

//! On-disk layout of the update state
//!
//! ```text
//! {state_dir}/delta/<name>     pending delta artifacts, emptied by a sweep
//! {state_dir}/staged/<hash>    content-addressed, write-once staged files
//! {root}/<manifest path>       live install, read-only here
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::Result;
use crate::hash::ContentHash;

use super::path::safe_join;

/// Path mapping for pending deltas, staged content and the live install
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateLayout {
    state_dir: PathBuf,
    root: PathBuf,
}

impl StateLayout {
    pub fn new(state_dir: impl AsRef<Path>, root: impl AsRef<Path>) -> Self {
        Self {
            state_dir: state_dir.as_ref().to_path_buf(),
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    /// Live install root (path prefix)
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding pending delta artifacts
    pub fn delta_dir(&self) -> PathBuf {
        self.state_dir.join("delta")
    }

    /// Directory holding staged content
    pub fn staged_dir(&self) -> PathBuf {
        self.state_dir.join("staged")
    }

    /// Staged location for content with the given hash
    ///
    /// `ContentHash` is validated hex, so the hash is always a single plain
    /// path component.
    pub fn staged_file(&self, hash: &ContentHash) -> PathBuf {
        self.staged_dir().join(hash.as_str())
    }

    /// Live location of a manifest path under the install root
    pub fn installed_path(&self, logical_path: &str) -> Result<PathBuf> {
        safe_join(&self.root, logical_path)
    }

    /// Create the delta and staged directories if missing
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [self.delta_dir(), self.staged_dir()] {
            if !dir.exists() {
                fs::create_dir_all(&dir)?;
                debug!("Created state directory: {}", dir.display());
            }
        }
        Ok(())
    }
}
