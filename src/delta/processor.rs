// src/delta/processor.rs

//! Sweeping the pending-delta directory
//!
//! Every entry in the delta directory is processed once and then removed,
//! whatever the outcome. Deltas are single-use: a delta that cannot be
//! applied means the full file will be fetched by other means.

use rayon::prelude::*;
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::filesystem::{ContentIdentifier, StateLayout};
use crate::hash::ContentHash;
use crate::manifest::Manifest;

use super::applier::{DeltaPatchEngine, PatchApplier};
use super::name::DeltaNameCodec;
use super::resolver::SourceResolver;

/// What happened to one delta artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactOutcome {
    /// Patched output verified and staged
    Applied,
    /// Target content was already staged
    AlreadyStaged,
    /// Name does not encode a source/target pair
    MalformedName,
    /// No installed file verifies against the source hash
    SourceUnavailable,
    /// Patch primitive failed or produced the wrong content
    ApplyFailed,
}

/// Totals for one sweep of the delta directory
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub applied: usize,
    pub already_staged: usize,
    pub malformed: usize,
    pub source_unavailable: usize,
    pub apply_failed: usize,
    /// Artifacts that could not be removed afterwards
    pub cleanup_failed: usize,
}

impl SweepReport {
    fn record(&mut self, outcome: ArtifactOutcome) {
        match outcome {
            ArtifactOutcome::Applied => self.applied += 1,
            ArtifactOutcome::AlreadyStaged => self.already_staged += 1,
            ArtifactOutcome::MalformedName => self.malformed += 1,
            ArtifactOutcome::SourceUnavailable => self.source_unavailable += 1,
            ArtifactOutcome::ApplyFailed => self.apply_failed += 1,
        }
    }

    /// Number of artifacts processed
    pub fn total(&self) -> usize {
        self.applied + self.already_staged + self.malformed + self.source_unavailable + self.apply_failed
    }

    /// Artifacts whose content must come from a full download instead
    pub fn fallbacks(&self) -> usize {
        self.malformed + self.source_unavailable + self.apply_failed
    }
}

/// Drives name decoding, source lookup and patching for every pending delta
pub struct DeltaProcessor {
    layout: StateLayout,
    identifier: Box<dyn ContentIdentifier>,
    patcher: Box<dyn PatchApplier>,
    codec: DeltaNameCodec,
}

/// Per-sweep borrowed state shared by sequential and parallel runs
struct Sweep<'a> {
    layout: &'a StateLayout,
    codec: DeltaNameCodec,
    resolver: SourceResolver<'a>,
    engine: DeltaPatchEngine<'a>,
    in_flight: InFlight,
}

/// Target hashes currently being produced, one producer per hash
#[derive(Default)]
struct InFlight {
    targets: Mutex<HashSet<ContentHash>>,
    released: Condvar,
}

/// Held while producing one target; releasing wakes waiting workers
struct Claim<'a> {
    in_flight: &'a InFlight,
    hash: ContentHash,
}

impl DeltaProcessor {
    pub fn new(
        layout: StateLayout,
        identifier: Box<dyn ContentIdentifier>,
        patcher: Box<dyn PatchApplier>,
    ) -> Self {
        let codec = DeltaNameCodec::new(identifier.hash_len());
        Self {
            layout,
            identifier,
            patcher,
            codec,
        }
    }

    pub fn layout(&self) -> &StateLayout {
        &self.layout
    }

    fn sweep<'a>(&'a self, manifest: &'a Manifest) -> Sweep<'a> {
        Sweep {
            layout: &self.layout,
            codec: self.codec,
            resolver: SourceResolver::new(manifest, &self.layout, self.identifier.as_ref()),
            engine: DeltaPatchEngine::new(&self.layout, self.identifier.as_ref(), self.patcher.as_ref()),
            in_flight: InFlight::default(),
        }
    }

    /// Process every pending delta artifact once, sequentially
    ///
    /// Only a failure to enumerate the delta directory is an error; a
    /// missing directory means there is nothing to do.
    pub fn run(&self, manifest: &Manifest) -> Result<SweepReport> {
        let artifacts = self.pending_artifacts()?;
        let sweep = self.sweep(manifest);
        let mut report = SweepReport::default();

        for (name, path) in &artifacts {
            let outcome = sweep.process(name, path);
            report.record(outcome);
            if !remove_artifact(path) {
                report.cleanup_failed += 1;
            }
        }

        log_report(&report);
        Ok(report)
    }

    /// Process pending artifacts on up to `jobs` worker threads
    ///
    /// Each target hash has at most one producer at a time. A worker that
    /// reaches a target already in flight waits for it, then re-checks the
    /// staging area and applies its own delta if the target is still
    /// missing. Each artifact is removed by the worker that processed it.
    pub fn run_parallel(&self, manifest: &Manifest, jobs: usize) -> Result<SweepReport> {
        if jobs <= 1 {
            return self.run(manifest);
        }

        let artifacts = self.pending_artifacts()?;
        let sweep = self.sweep(manifest);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(jobs)
            .build()
            .map_err(|e| io::Error::other(format!("Failed to start delta workers: {}", e)))?;

        let results: Vec<(ArtifactOutcome, bool)> = pool.install(|| {
            artifacts
                .par_iter()
                .map(|(name, path)| {
                    let outcome = sweep.process(name, path);
                    (outcome, remove_artifact(path))
                })
                .collect()
        });

        let mut report = SweepReport::default();
        for (outcome, removed) in results {
            report.record(outcome);
            if !removed {
                report.cleanup_failed += 1;
            }
        }

        log_report(&report);
        Ok(report)
    }

    /// Enumerate the delta directory as (file name, path) pairs
    fn pending_artifacts(&self) -> Result<Vec<(String, PathBuf)>> {
        let delta_dir = self.layout.delta_dir();
        let entries = match fs::read_dir(&delta_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No delta directory at {}", delta_dir.display());
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let mut artifacts = Vec::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            artifacts.push((name, entry.path()));
        }

        debug!("Found {} pending delta artifacts", artifacts.len());
        Ok(artifacts)
    }
}

impl Sweep<'_> {
    fn process(&self, name: &str, path: &Path) -> ArtifactOutcome {
        let Some(delta) = self.codec.parse(name) else {
            warn!("Invalid name for delta file: {}", path.display());
            return ArtifactOutcome::MalformedName;
        };

        let staged = self.layout.staged_file(&delta.target);
        if staged.symlink_metadata().is_ok() {
            debug!("Target {} already staged, skipping delta", delta.target.short());
            return ArtifactOutcome::AlreadyStaged;
        }

        let _claim = self.in_flight.claim(&delta.target);
        if staged.symlink_metadata().is_ok() {
            debug!("Target {} was staged by another worker", delta.target.short());
            return ArtifactOutcome::AlreadyStaged;
        }

        match self.resolver.require_source(&delta.source) {
            Err(e) => {
                warn!(
                    "Couldn't use delta file {} because original file is corrupted or missing: {}",
                    path.display(),
                    e
                );
                info!("Consider running a repair/verify pass to fix the issue");
                ArtifactOutcome::SourceUnavailable
            }
            Ok(source) => match self.engine.apply(&source, &delta.target, path) {
                Ok(_) => ArtifactOutcome::Applied,
                Err(_) => ArtifactOutcome::ApplyFailed,
            },
        }
    }
}

impl InFlight {
    fn lock(&self) -> MutexGuard<'_, HashSet<ContentHash>> {
        self.targets.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait until no other worker is producing `hash`, then take it
    fn claim(&self, hash: &ContentHash) -> Claim<'_> {
        let mut targets = self.lock();
        while targets.contains(hash) {
            debug!("Waiting for another worker producing {}", hash.short());
            targets = self
                .released
                .wait(targets)
                .unwrap_or_else(PoisonError::into_inner);
        }
        targets.insert(hash.clone());
        Claim {
            in_flight: self,
            hash: hash.clone(),
        }
    }
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        self.in_flight.lock().remove(&self.hash);
        self.in_flight.released.notify_all();
    }
}

/// Delete one artifact; deltas are never kept for a retry
fn remove_artifact(path: &Path) -> bool {
    let result = match path.symlink_metadata() {
        Ok(metadata) if metadata.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => true,
        Err(e) => {
            warn!("Failed to remove delta file {}: {}", path.display(), e);
            false
        }
    }
}

fn log_report(report: &SweepReport) {
    if report.total() == 0 {
        return;
    }
    info!(
        "Delta sweep: {} applied, {} already staged, {} malformed, {} without source, {} failed",
        report.applied,
        report.already_staged,
        report.malformed,
        report.source_unavailable,
        report.apply_failed
    );
}
