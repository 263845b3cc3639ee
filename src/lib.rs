// src/lib.rs

//! Deltastage: delta application and permission gating for OS updates
//!
//! Given a target manifest and a directory of downloaded binary deltas,
//! deltastage produces verified, content-addressed staged files and then
//! decides whether the staged set may be installed.
//!
//! # Architecture
//!
//! - Content-addressed: files are identified only by their content hash
//! - Verify before trust: delta sources and patched output are re-hashed
//! - Single-use deltas: every artifact is deleted after one attempt
//! - Permission gate: new or escalated setuid/setgid/sticky bits need an
//!   operator's confirmation, and unverifiable files block the update
//!
//! Committing staged files to the live install is left to the caller.

pub mod config;
pub mod delta;
mod error;
pub mod filesystem;
pub mod hash;
pub mod manifest;
pub mod permissions;

pub use config::{Config, ConfigError};
pub use delta::{ArtifactOutcome, DeltaNameCodec, DeltaProcessor, SweepReport, ZstdDictPatcher};
pub use error::{Error, Result};
pub use filesystem::{ContentIdentifier, FileIdentifier, MetadataPolicy, StateLayout};
pub use hash::{ContentHash, HashAlgorithm};
pub use manifest::{FileKind, FileRecord, Manifest};
pub use permissions::{
    validate_file_permissions, BatchVerdict, DangerousBits, PermissionGuard, PermissionVerdict,
};
