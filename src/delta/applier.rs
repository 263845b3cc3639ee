// src/delta/applier.rs

//! Applying one delta to a verified source file
//!
//! The patched output is written to a temporary file inside the staging
//! directory, given the source's metadata, re-hashed, and only then
//! published under its target hash. Output that fails any step never
//! becomes visible as a staged file.

use std::fs::{self, File};
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::filesystem::{xattrs, ContentIdentifier, StateLayout};
use crate::hash::ContentHash;

/// Binary patch primitive: reconstruct `dest` from `source` and `delta`
pub trait PatchApplier: Send + Sync {
    fn apply(&self, source: &Path, delta: &Path, dest: &Path) -> Result<()>;
}

/// Deltas encoded as a zstd frame using the old file as dictionary
///
/// ```text
/// delta = zstd_compress(new_content, dictionary=old_content)
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct ZstdDictPatcher;

impl PatchApplier for ZstdDictPatcher {
    fn apply(&self, source: &Path, delta: &Path, dest: &Path) -> Result<()> {
        let dictionary = fs::read(source)?;
        let payload = io::BufReader::new(File::open(delta)?);
        debug!(
            "Decoding {} with {} byte dictionary",
            delta.display(),
            dictionary.len()
        );

        let decoder_dict = zstd::dict::DecoderDictionary::copy(&dictionary);
        let mut decoder = zstd::Decoder::with_prepared_dictionary(payload, &decoder_dict)
            .map_err(|e| patch_error(delta, format!("Failed to create decoder: {}", e)))?;

        let mut output = File::create(dest)?;
        let written = io::copy(&mut decoder, &mut output)
            .map_err(|e| patch_error(delta, format!("Failed to decode delta: {}", e)))?;
        output.sync_all()?;

        debug!("Reconstructed {} bytes into {}", written, dest.display());
        Ok(())
    }
}

fn patch_error(delta: &Path, reason: String) -> Error {
    Error::PatchApply {
        path: delta.to_path_buf(),
        reason,
    }
}

/// Produces verified staged content from a source file and a delta
pub struct DeltaPatchEngine<'a> {
    layout: &'a StateLayout,
    identifier: &'a dyn ContentIdentifier,
    patcher: &'a dyn PatchApplier,
}

impl<'a> DeltaPatchEngine<'a> {
    pub fn new(
        layout: &'a StateLayout,
        identifier: &'a dyn ContentIdentifier,
        patcher: &'a dyn PatchApplier,
    ) -> Self {
        Self {
            layout,
            identifier,
            patcher,
        }
    }

    /// Apply `delta` to `source`, staging the result as `target_hash`
    ///
    /// Callers are expected to skip targets that are already staged. If
    /// another writer publishes the same hash first, that copy is kept and
    /// this call still succeeds.
    pub fn apply(&self, source: &Path, target_hash: &ContentHash, delta: &Path) -> Result<PathBuf> {
        let staged_dir = self.layout.staged_dir();
        fs::create_dir_all(&staged_dir)?;
        let staged = self.layout.staged_file(target_hash);

        let output = tempfile::Builder::new()
            .prefix(".delta-")
            .tempfile_in(&staged_dir)?;

        if let Err(e) = self.patcher.apply(source, delta, output.path()) {
            warn!("Couldn't use delta file {}: {}", delta.display(), e);
            return Err(match e {
                Error::PatchApply { .. } => e,
                other => patch_error(delta, other.to_string()),
            });
        }

        propagate_metadata(source, output.path());

        let actual = match self.identifier.identify(output.path()) {
            Ok(hash) => hash,
            Err(e) => {
                warn!(
                    "Couldn't use delta file {}: hash calculation failed: {}",
                    delta.display(),
                    e
                );
                return Err(Error::HashComputation {
                    path: delta.to_path_buf(),
                    reason: e.to_string(),
                });
            }
        };

        if actual != *target_hash {
            warn!(
                "Couldn't use delta file {}: application resulted in wrong hash",
                delta.display()
            );
            return Err(Error::ChecksumMismatch {
                expected: target_hash.to_string(),
                actual: actual.to_string(),
            });
        }

        if let Err(e) = output.persist_noclobber(&staged) {
            if e.error.kind() != io::ErrorKind::AlreadyExists {
                return Err(e.error.into());
            }
            debug!("Staged file {} appeared concurrently, keeping it", target_hash.short());
        }

        info!(
            "Applied delta {} -> {}",
            source.display(),
            target_hash.short()
        );
        Ok(staged)
    }
}

/// Copy what the delta format does not carry: permission bits and xattrs
fn propagate_metadata(source: &Path, dest: &Path) {
    match fs::symlink_metadata(source) {
        Ok(metadata) => {
            let mode = metadata.permissions().mode() & 0o7777;
            if let Err(e) = fs::set_permissions(dest, fs::Permissions::from_mode(mode)) {
                warn!("Could not set mode {:o} on {}: {}", mode, dest.display(), e);
            }
        }
        Err(e) => warn!("Could not stat delta source {}: {}", source.display(), e),
    }

    xattrs::copy_xattrs(source, dest);
}
