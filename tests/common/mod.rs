// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.

#![allow(dead_code)]

use deltastage::filesystem::{ContentIdentifier, FileIdentifier, MetadataPolicy, StateLayout};
use deltastage::{ContentHash, HashAlgorithm};
use std::fs;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A state directory plus an install root inside one temp dir
///
/// Keep the struct alive for the duration of the test.
pub struct Fixture {
    pub temp: TempDir,
    pub layout: StateLayout,
    pub identifier: FileIdentifier,
}

impl Fixture {
    /// Fixture hashing with xxh128 over permissions and content
    pub fn new() -> Self {
        Self::with_identifier(FileIdentifier::new(
            HashAlgorithm::Xxh128,
            MetadataPolicy::Permissions,
        ))
    }

    pub fn with_identifier(identifier: FileIdentifier) -> Self {
        let temp = tempfile::tempdir().unwrap();
        let layout = StateLayout::new(temp.path().join("state"), temp.path().join("root"));
        layout.ensure_dirs().unwrap();
        fs::create_dir_all(layout.root()).unwrap();
        Self {
            temp,
            layout,
            identifier,
        }
    }

    /// Write an installed file under the root and return its hash
    pub fn install(&self, logical_path: &str, data: &[u8], mode: u32) -> ContentHash {
        let path = self.layout.installed_path(logical_path).unwrap();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, data).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(mode)).unwrap();
        self.identifier.identify(&path).unwrap()
    }

    /// Hash that content would have on disk with the given mode
    pub fn expected_hash(&self, data: &[u8], mode: u32) -> ContentHash {
        let scratch = self.temp.path().join("scratch");
        fs::create_dir_all(&scratch).unwrap();
        let path = scratch.join("expected");
        fs::write(&path, data).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(mode)).unwrap();
        let hash = self.identifier.identify(&path).unwrap();
        fs::remove_file(&path).unwrap();
        hash
    }

    /// Drop a delta artifact into the pending-delta directory
    pub fn add_delta(&self, name: &str, payload: &[u8]) -> PathBuf {
        let path = self.layout.delta_dir().join(name);
        fs::write(&path, payload).unwrap();
        path
    }

    /// Stage content directly, bypassing delta application
    pub fn stage(&self, hash: &ContentHash, data: &[u8], mode: u32) -> PathBuf {
        let path = self.layout.staged_file(hash);
        fs::write(&path, data).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(mode)).unwrap();
        path
    }

    pub fn pending_count(&self) -> usize {
        fs::read_dir(self.layout.delta_dir()).unwrap().count()
    }
}

/// Produce a delta in the format `ZstdDictPatcher` consumes
pub fn encode_delta(old: &[u8], new: &[u8]) -> Vec<u8> {
    let dict = zstd::dict::EncoderDictionary::copy(old, 3);
    let mut encoder = zstd::Encoder::with_prepared_dictionary(Vec::new(), &dict).unwrap();
    encoder.write_all(new).unwrap();
    encoder.finish().unwrap()
}

pub fn mode_of(path: &Path) -> u32 {
    fs::symlink_metadata(path).unwrap().permissions().mode() & 0o7777
}
