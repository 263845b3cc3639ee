// src/filesystem/identify.rs

//! Content identifiers for files on disk
//!
//! The same identifier must be used everywhere a hash is compared against a
//! manifest: when verifying delta sources on disk and when verifying patched
//! output. Manifests are produced with a particular algorithm and metadata
//! policy, and a mismatch on either makes verification meaningless.

use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use crate::error::{Error, Result};
use crate::hash::{self, ContentHash, HashAlgorithm, Hasher};

use super::xattrs::read_xattrs;

/// Permission bits included in metadata-aware hashes
const PERMISSION_MASK: u32 = 0o7777;

/// Which file metadata contributes to a content hash
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MetadataPolicy {
    /// File bytes only
    Content,
    /// File type and permission bits, then bytes
    Permissions,
    /// As `Permissions`, plus every extended attribute in name order
    #[default]
    PermissionsAndXattrs,
}

/// Computes the content hash of a file on disk
pub trait ContentIdentifier: Send + Sync {
    /// Hash the file at `path` (symlinks are not followed)
    fn identify(&self, path: &Path) -> Result<ContentHash>;

    /// Length of every hash this identifier produces
    fn hash_len(&self) -> usize;
}

/// Default identifier: configured algorithm plus metadata policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileIdentifier {
    algorithm: HashAlgorithm,
    policy: MetadataPolicy,
}

impl FileIdentifier {
    pub fn new(algorithm: HashAlgorithm, policy: MetadataPolicy) -> Self {
        Self { algorithm, policy }
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    pub fn policy(&self) -> MetadataPolicy {
        self.policy
    }

    fn hash_metadata(&self, hasher: &mut Hasher, kind: &str, mode: u32, path: &Path) -> Result<()> {
        if self.policy == MetadataPolicy::Content {
            return Ok(());
        }

        hasher.update(format!("{}:{:o}\0", kind, mode & PERMISSION_MASK).as_bytes());

        if self.policy == MetadataPolicy::PermissionsAndXattrs {
            for (name, value) in read_xattrs(path)? {
                hasher.update(name.as_bytes());
                hasher.update(b"=");
                hasher.update(&value);
                hasher.update(b"\0");
            }
        }
        Ok(())
    }
}

impl Default for FileIdentifier {
    fn default() -> Self {
        Self::new(HashAlgorithm::default(), MetadataPolicy::default())
    }
}

impl ContentIdentifier for FileIdentifier {
    fn identify(&self, path: &Path) -> Result<ContentHash> {
        let metadata = fs::symlink_metadata(path)?;
        let file_type = metadata.file_type();
        let mode = metadata.permissions().mode();
        let mut hasher = Hasher::new(self.algorithm);

        if file_type.is_file() {
            self.hash_metadata(&mut hasher, "file", mode, path)?;
            let mut file = File::open(path)?;
            hash::update_from_reader(&mut hasher, &mut file)?;
        } else if file_type.is_symlink() {
            self.hash_metadata(&mut hasher, "symlink", mode, path)?;
            let target = fs::read_link(path)?;
            hasher.update(b"symlink:");
            hasher.update(target.as_os_str().as_bytes());
        } else {
            return Err(Error::HashComputation {
                path: path.to_path_buf(),
                reason: format!("unsupported file type {:?}", file_type),
            });
        }

        Ok(hasher.finalize())
    }

    fn hash_len(&self) -> usize {
        self.algorithm.hex_len()
    }
}
