// src/error.rs

//! Error types for deltastage
//!
//! Per-artifact delta failures are reported as values by the sweep and only
//! surface here when an individual operation is called directly. Permission
//! failures always surface here so the update pipeline can refuse to commit.

use std::path::PathBuf;
use thiserror::Error;

use crate::config::ConfigError;
use crate::hash::HashError;

/// Errors produced by deltastage operations
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A path from an untrusted source tried to escape its root
    #[error("Path traversal detected: {0}")]
    PathTraversal(String),

    /// A path that cannot be used (empty, not UTF-8, ...)
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// A content hash that failed validation
    #[error("Invalid content hash: {0}")]
    InvalidHash(#[from] HashError),

    /// Manifest could not be parsed
    #[error("Failed to parse manifest: {0}")]
    Manifest(#[from] serde_json::Error),

    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Delta artifact name does not encode a source/target hash pair
    #[error("Invalid name for delta file: {0}")]
    MalformedArtifactName(String),

    /// No on-disk file verifies against the delta's source hash
    #[error("No usable source file with hash {0}; consider running a repair pass")]
    SourceUnavailable(String),

    /// The binary patch primitive failed
    #[error("Failed to apply delta {path}: {reason}")]
    PatchApply { path: PathBuf, reason: String },

    /// Content hash of a file could not be computed
    #[error("Hash calculation failed for {path}: {reason}")]
    HashComputation { path: PathBuf, reason: String },

    /// Produced content does not match the expected hash
    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    /// Permission evaluation could not stat a staged or installed file
    #[error("Cannot verify permissions of {}: staged or installed file is missing", join_paths(.paths))]
    PermissionIntegrity { paths: Vec<String> },

    /// Operator declined an update that introduces dangerous permissions
    #[error("Update rejected: dangerous permissions on {} were not confirmed", join_paths(.paths))]
    DangerousPermissionsDeclined { paths: Vec<String> },
}

fn join_paths(paths: &[String]) -> String {
    paths.join(", ")
}

/// Result type alias for deltastage operations
pub type Result<T> = std::result::Result<T, Error>;
