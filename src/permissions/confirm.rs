// src/permissions/confirm.rs

//! Operator confirmation for dangerous permission changes

use std::io::{self, BufRead, Write};
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::manifest::FileRecord;

use super::{PermissionGuard, PermissionVerdict};

/// Asks the operator whether to continue
pub trait Confirm {
    fn confirm(&self, prompt: &str) -> bool;
}

/// Interactive prompt on stderr, reading the answer from stdin
///
/// Anything other than "y" or "yes" declines, including EOF.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdinConfirm;

impl Confirm for StdinConfirm {
    fn confirm(&self, prompt: &str) -> bool {
        let mut stderr = io::stderr();
        if write!(stderr, "{} (y/N): ", prompt).and_then(|_| stderr.flush()).is_err() {
            return false;
        }

        let mut answer = String::new();
        match io::stdin().lock().read_line(&mut answer) {
            Ok(_) => parse_answer(&answer),
            Err(_) => false,
        }
    }
}

fn parse_answer(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

/// Fixed answer for non-interactive runs (`--yes` / `--assume-no`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssumeAnswer(pub bool);

impl Confirm for AssumeAnswer {
    fn confirm(&self, prompt: &str) -> bool {
        info!(
            "{} -> assuming {}",
            prompt,
            if self.0 { "yes" } else { "no" }
        );
        self.0
    }
}

/// Gate a set of files about to be installed on their permissions
///
/// Dangerous changes need operator confirmation; declining rejects the
/// update. Integrity failures reject it without asking.
pub fn validate_file_permissions<'a, I>(
    guard: &PermissionGuard,
    files: I,
    confirm: &dyn Confirm,
) -> Result<()>
where
    I: IntoIterator<Item = &'a FileRecord>,
{
    info!("Validating file permissions");
    let batch = guard.evaluate_batch(files);

    match batch.verdict {
        PermissionVerdict::Clean => Ok(()),
        PermissionVerdict::IntegrityFailure => {
            let paths = batch.paths_with_severity(PermissionVerdict::IntegrityFailure.severity());
            warn!(
                "Refusing update: permissions of {} file(s) cannot be verified",
                paths.len()
            );
            Err(Error::PermissionIntegrity { paths })
        }
        PermissionVerdict::NewDangerous | PermissionVerdict::EscalatedDangerous => {
            for finding in &batch.findings {
                warn!("{}: {}", finding.path, finding.verdict);
            }
            warn!("The update you are about to install contains files with dangerous permissions");

            if confirm.confirm("Do you want to continue?") {
                info!("Dangerous permissions accepted by operator");
                Ok(())
            } else {
                Err(Error::DangerousPermissionsDeclined {
                    paths: batch.findings.into_iter().map(|f| f.path).collect(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filesystem::StateLayout;
    use crate::hash::{hash_bytes, HashAlgorithm};
    use crate::permissions::DangerousBits;
    use std::cell::Cell;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    /// Records whether it was asked
    struct Recorder {
        answer: bool,
        asked: Cell<bool>,
    }

    impl Confirm for Recorder {
        fn confirm(&self, _prompt: &str) -> bool {
            self.asked.set(true);
            self.answer
        }
    }

    fn recorder(answer: bool) -> Recorder {
        Recorder {
            answer,
            asked: Cell::new(false),
        }
    }

    fn setup() -> (TempDir, PermissionGuard, FileRecord, FileRecord) {
        let temp = TempDir::new().unwrap();
        let layout = StateLayout::new(temp.path().join("state"), temp.path().join("root"));
        layout.ensure_dirs().unwrap();

        let hash = hash_bytes(HashAlgorithm::Sha256, b"suid");
        let staged = layout.staged_file(&hash);
        fs::write(&staged, b"suid").unwrap();
        fs::set_permissions(&staged, fs::Permissions::from_mode(0o4755)).unwrap();

        let dangerous = FileRecord::new("/usr/bin/suid", hash);
        let missing = FileRecord::new("/usr/bin/missing", hash_bytes(HashAlgorithm::Sha256, b"no"));
        let guard = PermissionGuard::new(layout, DangerousBits::default());
        (temp, guard, dangerous, missing)
    }

    #[test]
    fn test_parse_answer() {
        assert!(parse_answer("y\n"));
        assert!(parse_answer(" YES "));
        assert!(!parse_answer("n"));
        assert!(!parse_answer(""));
    }

    #[test]
    fn test_clean_batch_does_not_prompt() {
        let (_temp, guard, _, _) = setup();
        let confirm = recorder(false);
        assert!(validate_file_permissions(&guard, std::iter::empty::<&FileRecord>(), &confirm).is_ok());
        assert!(!confirm.asked.get());
    }

    #[test]
    fn test_dangerous_accepted() {
        let (_temp, guard, dangerous, _) = setup();
        let confirm = recorder(true);
        assert!(validate_file_permissions(&guard, [&dangerous], &confirm).is_ok());
        assert!(confirm.asked.get());
    }

    #[test]
    fn test_dangerous_declined() {
        let (_temp, guard, dangerous, _) = setup();
        let result = validate_file_permissions(&guard, [&dangerous], &AssumeAnswer(false));
        match result {
            Err(Error::DangerousPermissionsDeclined { paths }) => {
                assert_eq!(paths, vec!["/usr/bin/suid".to_string()]);
            }
            other => panic!("Expected DangerousPermissionsDeclined, got {:?}", other),
        }
    }

    #[test]
    fn test_integrity_failure_never_prompts() {
        let (_temp, guard, dangerous, missing) = setup();
        let confirm = recorder(true);
        let result = validate_file_permissions(&guard, [&dangerous, &missing], &confirm);

        assert!(matches!(result, Err(Error::PermissionIntegrity { .. })));
        assert!(!confirm.asked.get());
    }
}
