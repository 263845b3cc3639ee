// src/permissions/mod.rs

//! Dangerous permission checks for staged updates
//!
//! Before staged content replaces the live install, every file about to be
//! installed is checked for setuid, setgid and sticky bits:
//!
//! | Situation | Verdict |
//! |-----------|---------|
//! | record absent or deleted | `Clean` |
//! | staged file cannot be stat'd | `IntegrityFailure` |
//! | no dangerous bits staged | `Clean` |
//! | dangerous bits on a brand-new file | `NewDangerous` |
//! | installed file cannot be stat'd | `IntegrityFailure` |
//! | a staged dangerous bit the installed file lacks | `EscalatedDangerous` |
//! | only bits the installed file already had | `Clean` |
//!
//! Dangerous verdicts can be accepted by an operator; integrity failures
//! cannot, because there is nothing trustworthy to show them.

mod confirm;

pub use confirm::{validate_file_permissions, AssumeAnswer, Confirm, StdinConfirm};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use tracing::{debug, warn};

use crate::error::Error;
use crate::filesystem::StateLayout;
use crate::manifest::FileRecord;

/// A single mode bit that can grant elevated privileges
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DangerousBit {
    Setuid,
    Setgid,
    Sticky,
}

impl DangerousBit {
    pub const fn mode(&self) -> u32 {
        match self {
            Self::Setuid => 0o4000,
            Self::Setgid => 0o2000,
            Self::Sticky => 0o1000,
        }
    }
}

/// The set of mode bits treated as dangerous
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DangerousBits {
    mask: u32,
}

impl DangerousBits {
    pub fn from_bits(bits: &[DangerousBit]) -> Self {
        Self {
            mask: bits.iter().fold(0, |mask, bit| mask | bit.mode()),
        }
    }

    pub fn mask(&self) -> u32 {
        self.mask
    }

    /// Dangerous bits present in `mode`
    #[inline]
    pub fn present(&self, mode: u32) -> u32 {
        mode & self.mask
    }
}

impl Default for DangerousBits {
    fn default() -> Self {
        Self::from_bits(&[DangerousBit::Setuid, DangerousBit::Setgid, DangerousBit::Sticky])
    }
}

/// Outcome of checking one file, or a whole batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PermissionVerdict {
    Clean,
    /// A new file arrives with dangerous bits
    NewDangerous,
    /// An existing file gains dangerous bits it did not have
    EscalatedDangerous,
    /// A staged or installed file needed for the decision is missing
    IntegrityFailure,
}

impl PermissionVerdict {
    /// Ordering used for aggregation; both dangerous kinds rank the same
    pub const fn severity(&self) -> u8 {
        match self {
            Self::Clean => 0,
            Self::NewDangerous | Self::EscalatedDangerous => 1,
            Self::IntegrityFailure => 2,
        }
    }

    pub const fn requires_confirmation(&self) -> bool {
        matches!(self, Self::NewDangerous | Self::EscalatedDangerous)
    }

    pub const fn is_blocking(&self) -> bool {
        matches!(self, Self::IntegrityFailure)
    }
}

impl fmt::Display for PermissionVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Clean => "clean",
            Self::NewDangerous => "new file with dangerous permissions",
            Self::EscalatedDangerous => "dangerous permissions added",
            Self::IntegrityFailure => "cannot verify permissions",
        };
        f.write_str(text)
    }
}

/// A non-clean verdict for one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub path: String,
    pub verdict: PermissionVerdict,
}

/// Aggregate result over a batch of files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchVerdict {
    /// Highest-severity verdict in the batch
    pub verdict: PermissionVerdict,
    /// Every file that was not clean, in input order
    pub findings: Vec<Finding>,
}

impl BatchVerdict {
    fn new() -> Self {
        Self {
            verdict: PermissionVerdict::Clean,
            findings: Vec::new(),
        }
    }

    fn push(&mut self, path: &str, verdict: PermissionVerdict) {
        if verdict == PermissionVerdict::Clean {
            return;
        }
        if verdict.severity() > self.verdict.severity() {
            self.verdict = verdict;
        }
        self.findings.push(Finding {
            path: path.to_string(),
            verdict,
        });
    }

    /// Paths of findings with the given verdict severity
    pub fn paths_with_severity(&self, severity: u8) -> Vec<String> {
        self.findings
            .iter()
            .filter(|f| f.verdict.severity() == severity)
            .map(|f| f.path.clone())
            .collect()
    }
}

/// Evaluates staged files against their installed counterparts
#[derive(Debug, Clone)]
pub struct PermissionGuard {
    layout: StateLayout,
    bits: DangerousBits,
}

impl PermissionGuard {
    pub fn new(layout: StateLayout, bits: DangerousBits) -> Self {
        Self { layout, bits }
    }

    /// Check one record about to be installed
    pub fn evaluate(&self, file: Option<&FileRecord>) -> PermissionVerdict {
        let Some(file) = file else {
            return PermissionVerdict::Clean;
        };
        if file.deleted {
            return PermissionVerdict::Clean;
        }

        let staged_path = self.layout.staged_file(&file.hash);
        let staged_mode = match fs::symlink_metadata(&staged_path) {
            Ok(metadata) => metadata.permissions().mode(),
            Err(e) => {
                warn!(
                    "Staged file for {} ({}) is missing: {}",
                    file.path,
                    file.hash.short(),
                    e
                );
                return PermissionVerdict::IntegrityFailure;
            }
        };

        let staged_bits = self.bits.present(staged_mode);
        if staged_bits == 0 {
            return PermissionVerdict::Clean;
        }

        if !file.has_prior_version {
            warn!(
                "The update has a new file {} with dangerous permissions ({:o})",
                file.path,
                staged_mode & 0o7777
            );
            return PermissionVerdict::NewDangerous;
        }

        let installed_mode = match self
            .layout
            .installed_path(&file.path)
            .and_then(|path| fs::symlink_metadata(path).map_err(Error::from))
        {
            Ok(metadata) => metadata.permissions().mode(),
            Err(e) => {
                warn!("Installed file {} cannot be checked: {}", file.path, e);
                return PermissionVerdict::IntegrityFailure;
            }
        };

        let added = staged_bits & !self.bits.present(installed_mode);
        if added != 0 {
            warn!(
                "The update sets dangerous permissions to file {} ({:o} -> {:o})",
                file.path,
                installed_mode & 0o7777,
                staged_mode & 0o7777
            );
            return PermissionVerdict::EscalatedDangerous;
        }

        debug!(
            "File {} keeps its existing dangerous permissions ({:o})",
            file.path,
            staged_mode & 0o7777
        );
        PermissionVerdict::Clean
    }

    /// Check every record and aggregate by severity
    pub fn evaluate_batch<'a, I>(&self, files: I) -> BatchVerdict
    where
        I: IntoIterator<Item = &'a FileRecord>,
    {
        let mut batch = BatchVerdict::new();
        for file in files {
            batch.push(&file.path, self.evaluate(Some(file)));
        }
        batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::{hash_bytes, ContentHash, HashAlgorithm};
    use tempfile::TempDir;

    struct Fixture {
        _temp: TempDir,
        layout: StateLayout,
        guard: PermissionGuard,
    }

    fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let layout = StateLayout::new(temp.path().join("state"), temp.path().join("root"));
        layout.ensure_dirs().unwrap();
        fs::create_dir_all(layout.root()).unwrap();
        let guard = PermissionGuard::new(layout.clone(), DangerousBits::default());
        Fixture {
            _temp: temp,
            layout,
            guard,
        }
    }

    fn stage(fx: &Fixture, content: &[u8], mode: u32) -> ContentHash {
        let hash = hash_bytes(HashAlgorithm::Sha256, content);
        let path = fx.layout.staged_file(&hash);
        fs::write(&path, content).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(mode)).unwrap();
        hash
    }

    fn install(fx: &Fixture, name: &str, mode: u32) {
        let path = fx.layout.root().join(name);
        fs::write(&path, b"installed").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(mode)).unwrap();
    }

    #[test]
    fn test_absent_and_deleted_are_clean() {
        let fx = fixture();
        assert_eq!(fx.guard.evaluate(None), PermissionVerdict::Clean);

        // Deleted records are clean even with nothing staged
        let mut record = FileRecord::new("/gone", hash_bytes(HashAlgorithm::Sha256, b"x"));
        record.deleted = true;
        assert_eq!(fx.guard.evaluate(Some(&record)), PermissionVerdict::Clean);
    }

    #[test]
    fn test_missing_staged_file_is_integrity_failure() {
        let fx = fixture();
        let record = FileRecord::new("/usr/bin/x", hash_bytes(HashAlgorithm::Sha256, b"x"));
        assert_eq!(
            fx.guard.evaluate(Some(&record)),
            PermissionVerdict::IntegrityFailure
        );
    }

    #[test]
    fn test_plain_modes_are_clean() {
        let fx = fixture();
        let hash = stage(&fx, b"plain", 0o755);
        let record = FileRecord::new("/plain", hash);
        assert_eq!(fx.guard.evaluate(Some(&record)), PermissionVerdict::Clean);
    }

    #[test]
    fn test_new_setuid_file() {
        let fx = fixture();
        let hash = stage(&fx, b"suid", 0o4755);
        let record = FileRecord::new("/suid", hash);
        assert_eq!(
            fx.guard.evaluate(Some(&record)),
            PermissionVerdict::NewDangerous
        );
    }

    #[test]
    fn test_escalated_setgid() {
        let fx = fixture();
        install(&fx, "tool", 0o755);
        let hash = stage(&fx, b"tool v2", 0o2755);
        let record = FileRecord::new("/tool", hash).with_prior_version(true);
        assert_eq!(
            fx.guard.evaluate(Some(&record)),
            PermissionVerdict::EscalatedDangerous
        );
    }

    #[test]
    fn test_escalation_is_per_bit() {
        let fx = fixture();
        install(&fx, "tool", 0o4755);
        // Keeps setuid but adds sticky
        let hash = stage(&fx, b"tool v2", 0o5755);
        let record = FileRecord::new("/tool", hash).with_prior_version(true);
        assert_eq!(
            fx.guard.evaluate(Some(&record)),
            PermissionVerdict::EscalatedDangerous
        );
    }

    #[test]
    fn test_preexisting_setuid_is_clean() {
        let fx = fixture();
        install(&fx, "passwd", 0o4755);
        let hash = stage(&fx, b"passwd v2", 0o4755);
        let record = FileRecord::new("/passwd", hash).with_prior_version(true);
        assert_eq!(fx.guard.evaluate(Some(&record)), PermissionVerdict::Clean);

        // Dropping a bit is not an escalation either
        install(&fx, "both", 0o6755);
        let hash = stage(&fx, b"both v2", 0o4755);
        let record = FileRecord::new("/both", hash).with_prior_version(true);
        assert_eq!(fx.guard.evaluate(Some(&record)), PermissionVerdict::Clean);
    }

    #[test]
    fn test_missing_installed_file_is_integrity_failure() {
        let fx = fixture();
        let hash = stage(&fx, b"suid", 0o4755);
        let record = FileRecord::new("/not-installed", hash).with_prior_version(true);
        assert_eq!(
            fx.guard.evaluate(Some(&record)),
            PermissionVerdict::IntegrityFailure
        );
    }

    #[test]
    fn test_custom_bits() {
        let fx = fixture();
        let hash = stage(&fx, b"sticky", 0o1755);
        let record = FileRecord::new("/sticky", hash);

        let setuid_only = PermissionGuard::new(
            fx.layout.clone(),
            DangerousBits::from_bits(&[DangerousBit::Setuid]),
        );
        assert_eq!(setuid_only.evaluate(Some(&record)), PermissionVerdict::Clean);
        assert_eq!(
            fx.guard.evaluate(Some(&record)),
            PermissionVerdict::NewDangerous
        );
    }

    #[test]
    fn test_batch_aggregation() {
        let fx = fixture();
        install(&fx, "esc", 0o755);
        let clean_a = FileRecord::new("/a", stage(&fx, b"a", 0o644));
        let clean_b = FileRecord::new("/b", stage(&fx, b"b", 0o644));
        let escalated = FileRecord::new("/esc", stage(&fx, b"esc", 0o2755)).with_prior_version(true);
        let new_suid = FileRecord::new("/suid", stage(&fx, b"suid", 0o4755));
        let missing = FileRecord::new("/missing", hash_bytes(HashAlgorithm::Sha256, b"gone"));

        let batch = fx.guard.evaluate_batch([&clean_a, &clean_b, &escalated]);
        assert_eq!(batch.verdict, PermissionVerdict::EscalatedDangerous);
        assert!(batch.verdict.requires_confirmation());
        assert_eq!(batch.findings.len(), 1);

        let batch = fx.guard.evaluate_batch([&clean_a, &missing, &new_suid]);
        assert_eq!(batch.verdict, PermissionVerdict::IntegrityFailure);
        assert!(batch.verdict.is_blocking());
        assert_eq!(batch.paths_with_severity(2), vec!["/missing".to_string()]);
        assert_eq!(batch.paths_with_severity(1), vec!["/suid".to_string()]);

        let batch = fx.guard.evaluate_batch([&clean_a, &clean_b]);
        assert_eq!(batch.verdict, PermissionVerdict::Clean);
        assert!(batch.findings.is_empty());
    }

    #[test]
    fn test_severity_order() {
        assert!(PermissionVerdict::Clean.severity() < PermissionVerdict::NewDangerous.severity());
        assert_eq!(
            PermissionVerdict::NewDangerous.severity(),
            PermissionVerdict::EscalatedDangerous.severity()
        );
        assert!(
            PermissionVerdict::EscalatedDangerous.severity()
                < PermissionVerdict::IntegrityFailure.severity()
        );
    }
}
